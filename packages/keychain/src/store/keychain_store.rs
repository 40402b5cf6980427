//! OS credential store backend (macOS Keychain, Windows Credential Manager,
//! Secret Service on Linux)
//!
//! Each keychain is one credential entry: service `<app>.keychain.<name>`,
//! account `items`, holding the JSON document. The OS encrypts the entry, so
//! secret payloads are only base64-encoded inside it.

use super::{DocumentStore, KeychainDocument, KeychainLocks};
use crate::{KeychainError, Result};
use base64::{Engine, engine::general_purpose::STANDARD};
use log::debug;
use std::sync::Arc;
use uuid::Uuid;
use zeroize::Zeroizing;

const ENTRY_ACCOUNT: &str = "items";
const CHECK_SERVICE_SUFFIX: &str = "keychain-check";

/// Keychain store backed by the platform credential manager
#[derive(Clone, Debug)]
pub struct OsKeychainStore {
    app_name: String,
    locks: Arc<KeychainLocks>,
}

impl OsKeychainStore {
    /// Create a store whose entries are namespaced by `app_name`
    pub fn for_app(app_name: impl Into<String>) -> Self {
        Self {
            app_name: app_name.into(),
            locks: Arc::new(KeychainLocks::default()),
        }
    }

    /// Credential service name used for `keychain`
    #[must_use]
    pub fn service_name(&self, keychain: &str) -> String {
        format!("{}.keychain.{keychain}", self.app_name)
    }

    /// Write, re-read through a new entry and delete a throwaway credential
    ///
    /// Blocks on the credential store. Without a native store `keyring` hands
    /// out unconnected in-memory entries, which fail this check.
    ///
    /// # Errors
    ///
    /// Returns `StorageBackendError` if the store is unreachable or the
    /// credential cannot be read back.
    pub fn verify_persistence(&self) -> Result<()> {
        let service = format!("{}.{CHECK_SERVICE_SUFFIX}", self.app_name);
        let token = Uuid::new_v4().to_string();
        Self::perform_store(&service, &token)?;
        let read_back = Self::perform_load(&service);
        if let Err(e) = Self::perform_delete(&service) {
            debug!("Could not remove credential store check entry: {e}");
        }
        match read_back? {
            Some(value) if value == token => Ok(()),
            _ => Err(KeychainError::backend(
                "verify",
                "the OS credential store does not keep entries on this platform",
            )),
        }
    }

    async fn run_blocking<T, F>(operation: &'static str, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T> + Send + 'static,
    {
        tokio::task::spawn_blocking(f)
            .await
            .map_err(|e| KeychainError::backend(operation, e))?
    }

    fn perform_load(service: &str) -> Result<Option<String>> {
        let entry = keyring::Entry::new(service, ENTRY_ACCOUNT)?;
        match entry.get_password() {
            Ok(document) => Ok(Some(document)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(KeychainError::backend("load", e)),
        }
    }

    fn perform_store(service: &str, document: &str) -> Result<()> {
        let entry = keyring::Entry::new(service, ENTRY_ACCOUNT)?;
        entry
            .set_password(document)
            .map_err(|e| KeychainError::backend("save", e))
    }

    fn perform_delete(service: &str) -> Result<bool> {
        let entry = keyring::Entry::new(service, ENTRY_ACCOUNT)?;
        match entry.delete_credential() {
            Ok(()) => Ok(true),
            Err(keyring::Error::NoEntry) => Ok(false),
            Err(e) => Err(KeychainError::backend("delete", e)),
        }
    }
}

impl DocumentStore for OsKeychainStore {
    fn backend_name(&self) -> &'static str {
        "os"
    }

    async fn load(&self, keychain: &str) -> Result<Option<KeychainDocument>> {
        let service = self.service_name(keychain);
        let Some(raw) = Self::run_blocking("load", move || Self::perform_load(&service)).await?
        else {
            return Ok(None);
        };
        Ok(Some(serde_json::from_str(&raw)?))
    }

    async fn save(&self, keychain: &str, document: &KeychainDocument) -> Result<()> {
        let service = self.service_name(keychain);
        let raw = serde_json::to_string(document)?;
        Self::run_blocking("save", move || Self::perform_store(&service, &raw)).await?;
        debug!("Saved keychain {keychain} to OS credential store ({} items)", document.items.len());
        Ok(())
    }

    async fn remove(&self, keychain: &str) -> Result<bool> {
        let service = self.service_name(keychain);
        Self::run_blocking("delete", move || Self::perform_delete(&service)).await
    }

    fn seal(&self, _item_id: &Uuid, plaintext: &[u8]) -> Result<String> {
        Ok(STANDARD.encode(plaintext))
    }

    fn unseal(&self, item_id: &Uuid, sealed: &str) -> Result<Zeroizing<Vec<u8>>> {
        STANDARD
            .decode(sealed)
            .map(Zeroizing::new)
            .map_err(|e| KeychainError::DecryptionFailed(format!("item {item_id}: {e}")))
    }

    fn locks(&self) -> &KeychainLocks {
        &self.locks
    }
}
