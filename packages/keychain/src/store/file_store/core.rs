//! File keychain store type and builder

use super::MasterKey;
use crate::Result;
use crate::store::KeychainLocks;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub(super) const KEYCHAIN_EXTENSION: &str = "keychain";

/// Keychain store writing one encrypted document per keychain
#[derive(Clone, Debug)]
pub struct FileKeychainStore {
    pub(super) base_path: PathBuf,
    pub(super) master_key: Arc<MasterKey>,
    pub(super) locks: Arc<KeychainLocks>,
}

/// Builder for [`FileKeychainStore`]
pub struct FileKeychainStoreBuilder {
    base_path: PathBuf,
}

impl FileKeychainStore {
    /// Start building a store rooted at `base_path`
    pub fn at<P: AsRef<Path>>(base_path: P) -> FileKeychainStoreBuilder {
        FileKeychainStoreBuilder {
            base_path: base_path.as_ref().to_path_buf(),
        }
    }

    /// Store rooted at `base_path` using `master_key`
    pub fn new<P: AsRef<Path>>(base_path: P, master_key: MasterKey) -> Self {
        Self::at(base_path).with_master_key(master_key)
    }

    /// Directory holding keychain files
    #[must_use]
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// File backing the keychain `name`
    #[must_use]
    pub fn keychain_path(&self, name: &str) -> PathBuf {
        self.base_path.join(format!("{name}.{KEYCHAIN_EXTENSION}"))
    }

    /// Names of keychains present on disk, sorted
    ///
    /// # Errors
    ///
    /// Returns `Io` if the directory exists but cannot be read.
    pub fn list_keychains(&self) -> Result<Vec<String>> {
        let entries = match std::fs::read_dir(&self.base_path) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut names = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) == Some(KEYCHAIN_EXTENSION)
                && let Some(stem) = path.file_stem().and_then(|s| s.to_str())
            {
                names.push(stem.to_string());
            }
        }
        names.sort();
        Ok(names)
    }
}

impl FileKeychainStoreBuilder {
    /// Set the master key and build the store
    #[must_use]
    pub fn with_master_key(self, master_key: MasterKey) -> FileKeychainStore {
        FileKeychainStore {
            base_path: self.base_path,
            master_key: Arc::new(master_key),
            locks: Arc::new(KeychainLocks::default()),
        }
    }
}
