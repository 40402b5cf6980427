//! # Dynamo Keychain
//!
//! Keychain helper for the Dynamo web server.
//!
//! ## Features
//!
//! - **HTTP credentials**: store and fetch the HTTP server password
//! - **SSL identities**: generate self-signed identities and hand them to rustls
//! - **Storage backends**: AES-256-GCM encrypted files or the OS credential store
//! - **Import/export**: PEM and DER certificates and keys
//! - **Platform constants**: names for external formats, item types and item classes
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use dynamo_keychain::prelude::*;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let keychain = Keychain::from_config(KeychainConfig::load(None)?)?;
//!
//! keychain.set_password_for_http_server("s3cret").await?;
//! let credentials = keychain.ensure_ssl_identity("DynamoSSL").await?;
//! let tls = credentials.server_config()?;
//! # Ok(())
//! # }
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod config;
pub mod error;
pub mod format;
pub mod generation;
pub mod identity;
pub mod keychain;
pub mod logging;
pub mod paths;
pub mod store;
pub mod transfer;

// Re-export core types
pub use config::KeychainConfig;
pub use error::{KeychainError, Result};
pub use format::{
    ExternalFormat, ExternalItemType, KeychainAttrType, string_for_external_format,
    string_for_external_item_type, string_for_keychain_attr_type,
};
pub use generation::IdentityGenerator;
pub use identity::{Certificate, Identity, PrivateKey, SslCredentials};
pub use keychain::Keychain;
pub use store::{FileKeychainStore, KeychainBackend, KeychainStorage, MasterKey, OsKeychainStore};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::KeychainConfig;
    pub use crate::error::{KeychainError, Result};
    pub use crate::format::{ExternalFormat, ExternalItemType, KeychainAttrType};
    pub use crate::identity::{Certificate, Identity, SslCredentials};
    pub use crate::keychain::Keychain;
    pub use crate::store::KeychainStorage;
}
