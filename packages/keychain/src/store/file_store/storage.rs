//! DocumentStore implementation for the file backend

use super::core::FileKeychainStore;
use super::encryption;
use crate::paths::restrict_to_owner;
use crate::store::{DocumentStore, KeychainDocument, KeychainLocks};
use crate::{KeychainError, Result};
use base64::{Engine, engine::general_purpose::STANDARD};
use log::debug;
use std::path::{Path, PathBuf};
use uuid::Uuid;
use zeroize::Zeroizing;

impl DocumentStore for FileKeychainStore {
    fn backend_name(&self) -> &'static str {
        "file"
    }

    async fn load(&self, keychain: &str) -> Result<Option<KeychainDocument>> {
        let path = self.keychain_path(keychain);
        let raw = match tokio::fs::read(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let document = serde_json::from_slice(&raw)?;
        Ok(Some(document))
    }

    async fn save(&self, keychain: &str, document: &KeychainDocument) -> Result<()> {
        let path = self.keychain_path(keychain);
        let data = serde_json::to_vec_pretty(document)?;
        let base_path = self.base_path.clone();

        tokio::task::spawn_blocking(move || {
            if !base_path.exists() {
                std::fs::create_dir_all(&base_path)?;
                restrict_to_owner(&base_path, true);
            }
            atomic_replace(&path, &data)
        })
        .await
        .map_err(|e| KeychainError::backend("save", e))??;

        debug!("Saved keychain {keychain} ({} items)", document.items.len());
        Ok(())
    }

    async fn remove(&self, keychain: &str) -> Result<bool> {
        match tokio::fs::remove_file(self.keychain_path(keychain)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn seal(&self, item_id: &Uuid, plaintext: &[u8]) -> Result<String> {
        let sealed = encryption::seal(plaintext, self.master_key.as_bytes(), item_id.as_bytes())?;
        Ok(STANDARD.encode(sealed))
    }

    fn unseal(&self, item_id: &Uuid, sealed: &str) -> Result<Zeroizing<Vec<u8>>> {
        let sealed = STANDARD
            .decode(sealed)
            .map_err(|e| KeychainError::DecryptionFailed(format!("item {item_id}: {e}")))?;
        encryption::open(&sealed, self.master_key.as_bytes(), item_id.as_bytes())
    }

    fn locks(&self) -> &KeychainLocks {
        &self.locks
    }
}

/// Write `data` to a fresh owner-only temp file beside `path`, then rename over it
fn atomic_replace(path: &Path, data: &[u8]) -> Result<()> {
    use std::io::Write;

    let temp_path: PathBuf = path.with_extension(format!("tmp.{}", Uuid::new_v4()));
    {
        let mut options = std::fs::OpenOptions::new();
        options.create_new(true).write(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let mut temp_file = options.open(&temp_path)?;
        temp_file.write_all(data)?;
        temp_file.sync_all()?;
    }

    std::fs::rename(&temp_path, path).map_err(|e| {
        let _ = std::fs::remove_file(&temp_path);
        KeychainError::backend("save", format!("rename into {} failed: {e}", path.display()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HttpCredential;
    use crate::store::{KeychainStorage, MasterKey};

    fn store(dir: &Path) -> FileKeychainStore {
        FileKeychainStore::at(dir).with_master_key(MasterKey::from_bytes([3u8; 32]))
    }

    #[tokio::test]
    async fn test_password_is_not_stored_in_clear() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        store
            .set_generic_password("login", &HttpCredential::default(), "plaintext-canary")
            .await
            .unwrap();

        let raw = std::fs::read_to_string(store.keychain_path("login")).unwrap();
        assert!(!raw.contains("plaintext-canary"));
        assert!(raw.contains("\"format_version\": 1"));
    }

    #[tokio::test]
    async fn test_missing_keychain_loads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir.path().join("not-yet"));
        assert!(store.load("login").await.unwrap().is_none());
        assert!(!store.remove("login").await.unwrap());
        assert!(store.list_keychains().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_save_leaves_no_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        for _ in 0..3 {
            store.save("a", &KeychainDocument::default()).await.unwrap();
        }
        store.save("b", &KeychainDocument::default()).await.unwrap();

        let entries = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(entries, 2);
        assert_eq!(store.list_keychains().unwrap(), vec!["a", "b"]);

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(store.keychain_path("a"))
                .unwrap()
                .permissions()
                .mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }

    #[tokio::test]
    async fn test_wrong_master_key_cannot_unseal() {
        let dir = tempfile::tempdir().unwrap();
        store(dir.path())
            .set_generic_password("login", &HttpCredential::default(), "pw")
            .await
            .unwrap();

        let other = FileKeychainStore::new(dir.path(), MasterKey::from_bytes([4u8; 32]));
        assert!(matches!(
            other
                .find_generic_password("login", &HttpCredential::default())
                .await,
            Err(KeychainError::DecryptionFailed(_))
        ));
    }

    #[tokio::test]
    async fn test_concurrent_writers_do_not_lose_updates() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        let mut tasks = Vec::new();
        for i in 0..8 {
            let store = store.clone();
            tasks.push(tokio::spawn(async move {
                let credential = HttpCredential {
                    service: "svc".to_string(),
                    account: format!("user{i}"),
                };
                store
                    .set_generic_password("shared", &credential, "pw")
                    .await
                    .unwrap();
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }
        assert_eq!(store.items("shared").await.unwrap().len(), 8);
    }

    #[tokio::test]
    async fn test_corrupt_document_is_serialization_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        std::fs::write(store.keychain_path("broken"), b"{]").unwrap();
        assert!(matches!(
            store.load("broken").await,
            Err(KeychainError::Serialization(_))
        ));
    }
}
