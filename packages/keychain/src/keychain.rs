//! Keychain facade used by the web server
//!
//! [`Keychain`] wraps a storage backend with the operations the server needs:
//! the HTTP server password, a self-signed SSL identity per keychain, and a
//! scratch directory.
//!
//! ```ignore
//! let keychain = Keychain::from_config(KeychainConfig::load(None)?)?;
//! let credentials = keychain.ensure_ssl_identity("DynamoSSL").await?;
//! let tls = credentials.server_config()?;
//! ```

use crate::config::KeychainConfig;
use crate::generation::IdentityGenerator;
use crate::identity::{Certificate, Identity, SslCredentials};
use crate::logging::log_keychain_event;
use crate::paths::{application_temporary_directory, validate_keychain_name};
use crate::store::{ItemSummary, KeychainBackend, KeychainStorage, create_backend};
use crate::transfer::{self, ImportSummary};
use crate::{KeychainError, Result};
use chrono::Utc;
use std::path::PathBuf;
use tracing::{info, warn};
use zeroize::Zeroizing;

/// Keychain operations over a storage backend
#[derive(Debug, Clone)]
pub struct Keychain<S = KeychainBackend> {
    store: S,
    config: KeychainConfig,
}

impl Keychain<KeychainBackend> {
    /// Open the backend described by `config`
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is inconsistent or the backend
    /// cannot be initialized.
    pub fn from_config(config: KeychainConfig) -> Result<Self> {
        config.validate()?;
        let store = create_backend(&config)?;
        Ok(Self { store, config })
    }

    /// Names of the stored keychains
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot enumerate keychains.
    pub fn keychain_names(&self) -> Result<Vec<String>> {
        self.store.list_keychains()
    }
}

impl<S: KeychainStorage> Keychain<S> {
    /// Wrap an existing store
    pub fn new(store: S, config: KeychainConfig) -> Self {
        Self { store, config }
    }

    /// Active configuration
    pub fn config(&self) -> &KeychainConfig {
        &self.config
    }

    /// Underlying store
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Password of the configured HTTP server credential, `None` if never set
    ///
    /// # Errors
    ///
    /// Returns an error if the keychain cannot be read or the stored password
    /// cannot be unsealed.
    pub async fn password_for_http_server(&self) -> Result<Option<Zeroizing<String>>> {
        self.store
            .find_generic_password(&self.config.default_keychain, &self.config.http_credential)
            .await
    }

    /// Store the HTTP server password, replacing any previous one
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` for an empty password, or a storage error.
    pub async fn set_password_for_http_server(&self, password: &str) -> Result<()> {
        if password.is_empty() {
            return Err(KeychainError::InvalidInput(
                "HTTP server password must not be empty".to_string(),
            ));
        }
        let keychain = &self.config.default_keychain;
        let result = self
            .store
            .set_generic_password(keychain, &self.config.http_credential, password)
            .await;
        log_keychain_event("set http password", keychain, result.is_ok());
        result
    }

    /// Remove the HTTP server password, returning whether one was stored
    ///
    /// # Errors
    ///
    /// Returns a storage error.
    pub async fn delete_http_password(&self) -> Result<bool> {
        self.store
            .delete_generic_password(&self.config.default_keychain, &self.config.http_credential)
            .await
    }

    /// Generate a self-signed identity and store it in `keychain_name`
    ///
    /// Existing identities are kept; lookups prefer the newest one.
    ///
    /// # Errors
    ///
    /// Returns `InvalidKeychainName`, a generation error, or a storage error.
    pub async fn create_new_identity(&self, keychain_name: &str) -> Result<Identity> {
        validate_keychain_name(keychain_name)?;
        let identity =
            IdentityGenerator::from_config(keychain_name, &self.config.identity).generate()?;
        let result = self.store.add_identity(keychain_name, &identity).await;
        log_keychain_event("create identity", keychain_name, result.is_ok());
        result?;
        info!(
            keychain = keychain_name,
            fingerprint = %identity.certificate().info().sha256_fingerprint,
            "Created SSL identity"
        );
        Ok(identity)
    }

    /// Newest currently valid identity plus the keychain's other certificates
    ///
    /// `None` when the keychain holds no valid identity. Expired or not yet
    /// valid identities are skipped.
    ///
    /// # Errors
    ///
    /// Returns `InvalidKeychainName` or a storage error.
    pub async fn ssl_identity_and_certificates(
        &self,
        keychain_name: &str,
    ) -> Result<Option<SslCredentials>> {
        let now = Utc::now();
        let mut newest: Option<Identity> = None;
        for identity in self.store.identities(keychain_name).await? {
            if !identity.certificate().is_valid_at(now) {
                warn!(
                    keychain = keychain_name,
                    label = identity.label(),
                    not_after = %identity.certificate().info().not_after,
                    "Skipping identity outside its validity period"
                );
                continue;
            }
            if newest
                .as_ref()
                .is_none_or(|current| identity.created_at() > current.created_at())
            {
                newest = Some(identity);
            }
        }

        let Some(identity) = newest else {
            return Ok(None);
        };
        let certificates = self.store.certificates(keychain_name).await?;
        Ok(Some(SslCredentials::new(identity, certificates)))
    }

    /// Existing SSL credentials, or a newly created identity when there are none
    ///
    /// # Errors
    ///
    /// Returns any error of identity creation or lookup.
    pub async fn ensure_ssl_identity(&self, keychain_name: &str) -> Result<SslCredentials> {
        if let Some(credentials) = self.ssl_identity_and_certificates(keychain_name).await? {
            return Ok(credentials);
        }
        info!(keychain = keychain_name, "No usable SSL identity, generating one");
        self.create_new_identity(keychain_name).await?;
        self.ssl_identity_and_certificates(keychain_name)
            .await?
            .ok_or_else(|| {
                KeychainError::ItemNotFound(format!(
                    "identity created in {keychain_name} could not be read back"
                ))
            })
    }

    /// Per-application scratch directory, created on first use
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn application_temporary_directory(&self) -> Result<PathBuf> {
        application_temporary_directory(&self.config.app_name)
    }

    /// Import certificates and keys from `data` into `keychain_name`
    ///
    /// Each private key must come with its certificate. Items are labelled
    /// `label`, defaulting to the keychain name.
    ///
    /// # Errors
    ///
    /// Returns `UnsupportedFormat`, `KeyMismatch`, a parse error, or a storage
    /// error. Nothing is stored unless every item is.
    pub async fn import(
        &self,
        keychain_name: &str,
        label: Option<&str>,
        data: &[u8],
    ) -> Result<ImportSummary> {
        validate_keychain_name(keychain_name)?;
        let parsed = transfer::parse_items(data)?;
        let format = parsed.format;
        let item_type = transfer::summarize_item_types(&parsed.item_types());
        let label = label.unwrap_or(keychain_name);
        let (identities, certificates) = transfer::pair_identities(label, parsed)?;

        let certificates: Vec<(String, Certificate)> = certificates
            .into_iter()
            .map(|certificate| (label.to_string(), certificate))
            .collect();
        self.store
            .add_items(keychain_name, &identities, &certificates)
            .await?;
        log_keychain_event("import", keychain_name, true);

        Ok(ImportSummary {
            format,
            item_type,
            identities: identities.len(),
            certificates: certificates.len(),
        })
    }

    /// PEM bundle of the current SSL credentials, `None` without an identity
    ///
    /// # Errors
    ///
    /// Returns any lookup error.
    pub async fn export_identity(&self, keychain_name: &str) -> Result<Option<Zeroizing<String>>> {
        Ok(self
            .ssl_identity_and_certificates(keychain_name)
            .await?
            .map(|credentials| transfer::export_pem(&credentials)))
    }

    /// Item summaries of `keychain_name`
    ///
    /// # Errors
    ///
    /// Returns `InvalidKeychainName` or a storage error.
    pub async fn items(&self, keychain_name: &str) -> Result<Vec<ItemSummary>> {
        self.store.items(keychain_name).await
    }

    /// Remove every identity from `keychain_name`
    ///
    /// # Errors
    ///
    /// Returns `InvalidKeychainName` or a storage error.
    pub async fn delete_identities(&self, keychain_name: &str) -> Result<usize> {
        let removed = self.store.delete_identities(keychain_name, None).await?;
        log_keychain_event("delete identities", keychain_name, true);
        Ok(removed)
    }

    /// Remove `keychain_name` entirely
    ///
    /// # Errors
    ///
    /// Returns `InvalidKeychainName` or a storage error.
    pub async fn delete_keychain(&self, keychain_name: &str) -> Result<bool> {
        let removed = self.store.delete_keychain(keychain_name).await?;
        log_keychain_event("delete keychain", keychain_name, removed);
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{FileKeychainStore, MasterKey};
    use chrono::Duration;

    fn keychain(dir: &std::path::Path) -> Keychain<FileKeychainStore> {
        let mut config = KeychainConfig {
            keychain_dir: dir.to_path_buf(),
            ..KeychainConfig::default()
        };
        config.identity.include_hostname = false;
        let store = FileKeychainStore::at(dir).with_master_key(MasterKey::generate());
        Keychain::new(store, config)
    }

    #[tokio::test]
    async fn test_http_password_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let keychain = keychain(dir.path());

        assert!(keychain.password_for_http_server().await.unwrap().is_none());
        keychain.set_password_for_http_server("s3cret").await.unwrap();
        assert_eq!(
            keychain
                .password_for_http_server()
                .await
                .unwrap()
                .as_deref()
                .map(String::as_str),
            Some("s3cret")
        );
        assert!(matches!(
            keychain.set_password_for_http_server("").await,
            Err(KeychainError::InvalidInput(_))
        ));
        assert!(keychain.delete_http_password().await.unwrap());
        assert!(keychain.password_for_http_server().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_missing_identity_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let keychain = keychain(dir.path());
        assert!(
            keychain
                .ssl_identity_and_certificates("DynamoSSL")
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_create_then_fetch_identity() {
        let dir = tempfile::tempdir().unwrap();
        let keychain = keychain(dir.path());

        let created = keychain.create_new_identity("DynamoSSL").await.unwrap();
        let credentials = keychain
            .ssl_identity_and_certificates("DynamoSSL")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(credentials.identity().certificate(), created.certificate());
        assert_eq!(
            credentials.identity().certificate().info().organization.as_deref(),
            Some("Dynamo")
        );
        assert!(credentials.certificates().is_empty());
        assert!(credentials.server_config().is_ok());
    }

    #[tokio::test]
    async fn test_newest_valid_identity_wins() {
        let dir = tempfile::tempdir().unwrap();
        let keychain = keychain(dir.path());

        let first = keychain.create_new_identity("k").await.unwrap();
        let second = keychain.create_new_identity("k").await.unwrap();
        assert!(second.created_at() >= first.created_at());

        let expired = IdentityGenerator::new("expired")
            .include_hostname(false)
            .valid_from(Utc::now() - Duration::days(100))
            .valid_for_days(10)
            .generate()
            .unwrap();
        keychain.store().add_identity("k", &expired).await.unwrap();

        let chosen = keychain
            .ssl_identity_and_certificates("k")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(chosen.identity().certificate(), second.certificate());
    }

    #[tokio::test]
    async fn test_only_expired_identity_is_none_and_ensure_replaces_it() {
        let dir = tempfile::tempdir().unwrap();
        let keychain = keychain(dir.path());
        let expired = IdentityGenerator::new("old")
            .include_hostname(false)
            .valid_from(Utc::now() - Duration::days(100))
            .valid_for_days(10)
            .generate()
            .unwrap();
        keychain.store().add_identity("k", &expired).await.unwrap();

        assert!(keychain.ssl_identity_and_certificates("k").await.unwrap().is_none());
        let ensured = keychain.ensure_ssl_identity("k").await.unwrap();
        assert!(ensured.identity().certificate().is_currently_valid());

        let again = keychain.ensure_ssl_identity("k").await.unwrap();
        assert_eq!(again.identity().certificate(), ensured.identity().certificate());
    }

    #[tokio::test]
    async fn test_import_export() {
        let dir = tempfile::tempdir().unwrap();
        let source = keychain(&dir.path().join("source"));
        let target = keychain(&dir.path().join("target"));

        source.create_new_identity("web").await.unwrap();
        let pem = source.export_identity("web").await.unwrap().unwrap();

        let summary = target.import("web", None, pem.as_bytes()).await.unwrap();
        assert_eq!(summary.identities, 1);
        assert_eq!(summary.certificates, 0);
        assert_eq!(summary.format, crate::format::ExternalFormat::PemSequence);

        let imported = target
            .ssl_identity_and_certificates("web")
            .await
            .unwrap()
            .unwrap();
        let original = source
            .ssl_identity_and_certificates("web")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            imported.identity().certificate(),
            original.identity().certificate()
        );
        assert!(target.export_identity("empty").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_identities_and_keychain() {
        let dir = tempfile::tempdir().unwrap();
        let keychain = keychain(dir.path());
        keychain.create_new_identity("gone").await.unwrap();

        assert_eq!(keychain.delete_identities("gone").await.unwrap(), 1);
        assert!(keychain.items("gone").await.unwrap().is_empty());
        assert!(keychain.delete_keychain("gone").await.unwrap());
        assert!(!keychain.delete_keychain("gone").await.unwrap());
    }

    #[tokio::test]
    async fn test_invalid_keychain_name() {
        let dir = tempfile::tempdir().unwrap();
        let keychain = keychain(dir.path());
        assert!(matches!(
            keychain.create_new_identity("../escape").await,
            Err(KeychainError::InvalidKeychainName(_))
        ));
    }

    #[test]
    fn test_application_temporary_directory_uses_app_name() {
        let dir = tempfile::tempdir().unwrap();
        let mut keychain = keychain(dir.path());
        keychain.config.app_name = format!("dynamo-facade-test-{}", std::process::id());
        let temp = keychain.application_temporary_directory().unwrap();
        assert!(temp.ends_with(&keychain.config.app_name));
        let _ = std::fs::remove_dir_all(temp);
    }
}
