//! Keychain storage backends
//!
//! Every backend persists a keychain as a [`KeychainDocument`]. Backends only
//! implement [`DocumentStore`]; the item-level [`KeychainStorage`] operations
//! are provided for all of them.

mod document;
mod factory;
mod file_store;
mod keychain_store;

pub use document::{ItemSummary, KeychainDocument, StoredItem, FORMAT_VERSION};
pub use factory::{KeychainBackend, create_backend};
pub use file_store::{FileKeychainStore, FileKeychainStoreBuilder, MasterKey};
pub use keychain_store::OsKeychainStore;

use crate::Result;
use crate::config::HttpCredential;
use crate::identity::{Certificate, Identity};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;
use zeroize::Zeroizing;

/// Item-level keychain operations
pub trait KeychainStorage: Send + Sync {
    /// Password stored for a generic password credential, if any
    async fn find_generic_password(
        &self,
        keychain: &str,
        credential: &HttpCredential,
    ) -> Result<Option<Zeroizing<String>>>;

    /// Create or replace the password of a generic password credential
    async fn set_generic_password(
        &self,
        keychain: &str,
        credential: &HttpCredential,
        password: &str,
    ) -> Result<()>;

    /// Remove a generic password credential, returning whether it existed
    async fn delete_generic_password(
        &self,
        keychain: &str,
        credential: &HttpCredential,
    ) -> Result<bool>;

    /// Store an identity as a certificate item plus a private key item
    async fn add_identity(&self, keychain: &str, identity: &Identity) -> Result<()>;

    /// Store identities and stand-alone certificates in one write
    ///
    /// Either every item is stored or, on error, none is.
    async fn add_items(
        &self,
        keychain: &str,
        identities: &[Identity],
        certificates: &[(String, Certificate)],
    ) -> Result<()>;

    /// All identities in a keychain
    async fn identities(&self, keychain: &str) -> Result<Vec<Identity>>;

    /// Store a certificate that has no private key
    async fn add_certificate(
        &self,
        keychain: &str,
        label: &str,
        certificate: &Certificate,
    ) -> Result<()>;

    /// Certificates not bound to a private key
    async fn certificates(&self, keychain: &str) -> Result<Vec<Certificate>>;

    /// Remove identities (all, or those with `label`), returning how many were removed
    async fn delete_identities(&self, keychain: &str, label: Option<&str>) -> Result<usize>;

    /// Summaries of every item, without secret payloads
    async fn items(&self, keychain: &str) -> Result<Vec<ItemSummary>>;

    /// Remove a whole keychain, returning whether it existed
    async fn delete_keychain(&self, keychain: &str) -> Result<bool>;
}

/// Persistence of whole keychain documents
pub trait DocumentStore: Send + Sync {
    /// Short backend name for logs and errors
    fn backend_name(&self) -> &'static str;

    /// Load a keychain, `None` when it does not exist
    async fn load(&self, keychain: &str) -> Result<Option<KeychainDocument>>;

    /// Replace a keychain
    async fn save(&self, keychain: &str, document: &KeychainDocument) -> Result<()>;

    /// Remove a keychain, returning whether it existed
    async fn remove(&self, keychain: &str) -> Result<bool>;

    /// Protect a secret payload of the item `item_id`
    fn seal(&self, item_id: &Uuid, plaintext: &[u8]) -> Result<String>;

    /// Recover a payload produced by [`DocumentStore::seal`]
    fn unseal(&self, item_id: &Uuid, sealed: &str) -> Result<Zeroizing<Vec<u8>>>;

    /// Per-keychain write locks
    fn locks(&self) -> &KeychainLocks;
}

/// Serializes read-modify-write cycles on each keychain
#[derive(Debug, Default)]
pub struct KeychainLocks {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl KeychainLocks {
    /// Wait for exclusive access to `keychain`
    pub async fn acquire(&self, keychain: &str) -> OwnedMutexGuard<()> {
        let lock = self.locks.entry(keychain.to_string()).or_default().clone();
        lock.lock_owned().await
    }
}
