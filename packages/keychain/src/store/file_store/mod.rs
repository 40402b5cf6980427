//! Encrypted file storage
//!
//! One JSON document per keychain (`<dir>/<name>.keychain`). Passwords and
//! private keys inside it are sealed with AES-256-GCM under a master key.

mod core;
mod encryption;
mod master_key;
mod storage;

pub use self::core::{FileKeychainStore, FileKeychainStoreBuilder};
pub use master_key::MasterKey;
