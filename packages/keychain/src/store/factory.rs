//! Backend selection from configuration

use super::{
    DocumentStore, FileKeychainStore, KeychainDocument, KeychainLocks, MasterKey, OsKeychainStore,
};
use crate::{KeychainError, Result};
use crate::config::{BackendKind, KeychainConfig};
use log::info;
use uuid::Uuid;
use zeroize::Zeroizing;

/// Configured storage backend
///
/// An enum rather than a trait object, since [`DocumentStore`] has async methods.
#[derive(Clone, Debug)]
pub enum KeychainBackend {
    /// Encrypted files
    File(FileKeychainStore),
    /// OS credential store
    Os(OsKeychainStore),
}

impl KeychainBackend {
    /// Names of the stored keychains, sorted
    ///
    /// # Errors
    ///
    /// Returns `StorageBackendError` for the OS backend, whose credential
    /// store cannot be enumerated, or `Io` if the keychain directory cannot
    /// be read.
    pub fn list_keychains(&self) -> Result<Vec<String>> {
        match self {
            Self::File(store) => store.list_keychains(),
            Self::Os(_) => Err(KeychainError::backend(
                "list",
                "the OS credential store cannot enumerate keychains",
            )),
        }
    }
}

impl DocumentStore for KeychainBackend {
    fn backend_name(&self) -> &'static str {
        match self {
            Self::File(store) => store.backend_name(),
            Self::Os(store) => store.backend_name(),
        }
    }

    async fn load(&self, keychain: &str) -> Result<Option<KeychainDocument>> {
        match self {
            Self::File(store) => store.load(keychain).await,
            Self::Os(store) => store.load(keychain).await,
        }
    }

    async fn save(&self, keychain: &str, document: &KeychainDocument) -> Result<()> {
        match self {
            Self::File(store) => store.save(keychain, document).await,
            Self::Os(store) => store.save(keychain, document).await,
        }
    }

    async fn remove(&self, keychain: &str) -> Result<bool> {
        match self {
            Self::File(store) => store.remove(keychain).await,
            Self::Os(store) => store.remove(keychain).await,
        }
    }

    fn seal(&self, item_id: &Uuid, plaintext: &[u8]) -> Result<String> {
        match self {
            Self::File(store) => store.seal(item_id, plaintext),
            Self::Os(store) => store.seal(item_id, plaintext),
        }
    }

    fn unseal(&self, item_id: &Uuid, sealed: &str) -> Result<Zeroizing<Vec<u8>>> {
        match self {
            Self::File(store) => store.unseal(item_id, sealed),
            Self::Os(store) => store.unseal(item_id, sealed),
        }
    }

    fn locks(&self) -> &KeychainLocks {
        match self {
            Self::File(store) => store.locks(),
            Self::Os(store) => store.locks(),
        }
    }
}

/// Build the backend named by `config`
///
/// The file backend resolves (and on first use creates) its master key here.
/// The OS backend is only returned once the credential store has kept a
/// test entry between two separate lookups.
///
/// # Errors
///
/// Returns an error if the master key cannot be obtained, or
/// `StorageBackendError` if the OS credential store is unavailable or does
/// not persist entries.
pub fn create_backend(config: &KeychainConfig) -> Result<KeychainBackend> {
    match config.backend {
        BackendKind::File => {
            let master_key = MasterKey::resolve(&config.master_key, &config.keychain_dir)?;
            info!("Using file keychain backend at {}", config.keychain_dir.display());
            Ok(KeychainBackend::File(
                FileKeychainStore::at(&config.keychain_dir).with_master_key(master_key),
            ))
        }
        BackendKind::Os => {
            let store = OsKeychainStore::for_app(config.app_name.clone());
            store.verify_persistence()?;
            info!("Using OS credential store backend for {}", config.app_name);
            Ok(KeychainBackend::Os(store))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_file_backend_creates_key() {
        let dir = tempfile::tempdir().unwrap();
        let config = KeychainConfig {
            keychain_dir: dir.path().join("keychains"),
            ..KeychainConfig::default()
        };
        let backend = create_backend(&config).unwrap();
        assert_eq!(backend.backend_name(), "file");
        assert!(config.keychain_dir.join("master.key").exists());
    }

    #[test]
    fn test_file_backend_lists_keychains() {
        let dir = tempfile::tempdir().unwrap();
        let config = KeychainConfig {
            keychain_dir: dir.path().to_path_buf(),
            ..KeychainConfig::default()
        };
        let backend = create_backend(&config).unwrap();
        assert!(backend.list_keychains().unwrap().is_empty());

        std::fs::write(dir.path().join("DynamoSSL.keychain"), b"{}").unwrap();
        assert_eq!(backend.list_keychains().unwrap(), vec!["DynamoSSL"]);
    }

    #[tokio::test]
    async fn test_os_backend_is_usable_or_refused() {
        use crate::config::HttpCredential;
        use crate::store::KeychainStorage;

        let config = KeychainConfig {
            app_name: format!("dynamo_keychain_test_{}", std::process::id()),
            backend: BackendKind::Os,
            ..KeychainConfig::default()
        };
        let backend = match create_backend(&config) {
            Ok(backend) => backend,
            Err(e) => {
                assert!(matches!(e, KeychainError::StorageBackendError { .. }));
                return;
            }
        };

        assert!(backend.list_keychains().is_err());
        let credential = HttpCredential::default();
        backend
            .set_generic_password("lifecycle", &credential, "pw")
            .await
            .unwrap();
        let found = backend
            .find_generic_password("lifecycle", &credential)
            .await
            .unwrap();
        assert_eq!(found.as_deref().map(String::as_str), Some("pw"));
        assert!(backend.delete_keychain("lifecycle").await.unwrap());
        assert!(backend.load("lifecycle").await.unwrap().is_none());
    }
}
