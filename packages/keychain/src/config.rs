//! Keychain configuration

use crate::generation::MAX_VALID_FOR_DAYS;
use crate::paths::{default_config_path, default_keychain_dir};
use crate::{KeychainError, Result};
use log::debug;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Overrides the keychain directory
pub const ENV_KEYCHAIN_DIR: &str = "DYNAMO_KEYCHAIN_DIR";
/// Overrides the storage backend (`file` or `os`)
pub const ENV_KEYCHAIN_BACKEND: &str = "DYNAMO_KEYCHAIN_BACKEND";
/// Switches the file backend to a passphrase-derived master key
pub const ENV_KEYCHAIN_PASSPHRASE: &str = "DYNAMO_KEYCHAIN_PASSPHRASE";

#[derive(Clone, Debug, Serialize, Deserialize)]
/// Top-level configuration
pub struct KeychainConfig {
    /// Application name, used for the temporary directory and OS credential services
    #[serde(default = "default_app_name")]
    pub app_name: String,
    /// Directory holding `<name>.keychain` files
    #[serde(default = "default_keychain_dir")]
    pub keychain_dir: PathBuf,
    /// Storage backend
    #[serde(default)]
    pub backend: BackendKind,
    /// Keychain used for the HTTP server password
    #[serde(default = "default_keychain")]
    pub default_keychain: String,
    /// Credential naming the HTTP server password
    #[serde(default)]
    pub http_credential: HttpCredential,
    /// Settings for generated identities
    #[serde(default)]
    pub identity: IdentityConfig,
    /// Where the file backend gets its master key
    #[serde(default)]
    pub master_key: MasterKeySource,
}

/// Storage backend selection
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Encrypted files under `keychain_dir`
    #[default]
    File,
    /// OS credential store (macOS Keychain, Windows Credential Manager)
    Os,
}

impl std::str::FromStr for BackendKind {
    type Err = KeychainError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "file" => Ok(Self::File),
            "os" => Ok(Self::Os),
            other => Err(KeychainError::Configuration(format!(
                "unknown backend {other:?}, expected \"file\" or \"os\""
            ))),
        }
    }
}

/// Service and account naming the HTTP server password
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpCredential {
    /// Service name
    pub service: String,
    /// Account name
    pub account: String,
}

impl Default for HttpCredential {
    fn default() -> Self {
        Self {
            service: "HTTP Server".to_string(),
            account: "Dynamo".to_string(),
        }
    }
}

/// Settings for generated self-signed identities
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IdentityConfig {
    /// Subject common name; the keychain name is used when unset
    #[serde(default)]
    pub common_name: Option<String>,
    /// Subject organization
    #[serde(default = "default_organization")]
    pub organization: String,
    /// Validity period in days
    #[serde(default = "default_valid_for_days")]
    pub valid_for_days: u32,
    /// Add the local host name as a DNS subject alternative name
    #[serde(default = "default_true")]
    pub include_hostname: bool,
    /// Additional DNS subject alternative names
    #[serde(default)]
    pub extra_dns_names: Vec<String>,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            common_name: None,
            organization: default_organization(),
            valid_for_days: default_valid_for_days(),
            include_hostname: true,
            extra_dns_names: Vec::new(),
        }
    }
}

/// Source of the file backend master key
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MasterKeySource {
    /// Random key kept in a file (default `<keychain_dir>/master.key`)
    KeyFile {
        /// Key file location
        #[serde(default)]
        path: Option<PathBuf>,
    },
    /// Key derived with Argon2id from a passphrase read from an environment variable
    Passphrase {
        /// Variable holding the passphrase
        #[serde(default = "default_passphrase_env")]
        env: String,
    },
}

impl Default for MasterKeySource {
    fn default() -> Self {
        Self::KeyFile { path: None }
    }
}

fn default_app_name() -> String {
    "Dynamo".to_string()
}

fn default_keychain() -> String {
    "login".to_string()
}

fn default_organization() -> String {
    "Dynamo".to_string()
}

fn default_valid_for_days() -> u32 {
    365
}

fn default_true() -> bool {
    true
}

fn default_passphrase_env() -> String {
    ENV_KEYCHAIN_PASSPHRASE.to_string()
}

impl Default for KeychainConfig {
    fn default() -> Self {
        Self {
            app_name: default_app_name(),
            keychain_dir: default_keychain_dir(),
            backend: BackendKind::default(),
            default_keychain: default_keychain(),
            http_credential: HttpCredential::default(),
            identity: IdentityConfig::default(),
            master_key: MasterKeySource::default(),
        }
    }
}

impl KeychainConfig {
    /// Load configuration from `path`, or from the default location
    ///
    /// A missing file yields the defaults. Environment overrides are applied last.
    ///
    /// # Errors
    ///
    /// Returns an error if an existing file cannot be read or parsed, or if an
    /// override is invalid.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = path.map_or_else(default_config_path, Path::to_path_buf);
        let mut config = if path.exists() {
            debug!("Loading keychain configuration from {}", path.display());
            let raw = std::fs::read_to_string(&path)?;
            serde_json::from_str(&raw).map_err(|e| {
                KeychainError::Configuration(format!("{}: {e}", path.display()))
            })?
        } else {
            debug!("No configuration at {}, using defaults", path.display());
            Self::default()
        };
        config.apply_overrides(|name| std::env::var(name).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from a variable lookup (normally the process environment)
    ///
    /// # Errors
    ///
    /// Returns an error if the backend override is not a known backend.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(dir) = lookup(ENV_KEYCHAIN_DIR).filter(|d| !d.is_empty()) {
            self.keychain_dir = PathBuf::from(dir);
        }
        if let Some(backend) = lookup(ENV_KEYCHAIN_BACKEND).filter(|b| !b.is_empty()) {
            self.backend = backend.parse()?;
        }
        if lookup(ENV_KEYCHAIN_PASSPHRASE).is_some_and(|p| !p.is_empty()) {
            self.master_key = MasterKeySource::Passphrase {
                env: ENV_KEYCHAIN_PASSPHRASE.to_string(),
            };
        }
        Ok(())
    }

    /// Check internal consistency
    ///
    /// # Errors
    ///
    /// Returns `Configuration` for an unusable default keychain, empty
    /// credential names or a validity period out of range.
    pub fn validate(&self) -> Result<()> {
        crate::paths::validate_keychain_name(&self.default_keychain).map_err(|e| {
            KeychainError::Configuration(format!("default_keychain: {e}"))
        })?;
        if self.http_credential.service.is_empty() || self.http_credential.account.is_empty() {
            return Err(KeychainError::Configuration(
                "http_credential service and account must not be empty".to_string(),
            ));
        }
        if !(1..=MAX_VALID_FOR_DAYS).contains(&self.identity.valid_for_days) {
            return Err(KeychainError::Configuration(format!(
                "identity.valid_for_days must be between 1 and {MAX_VALID_FOR_DAYS}"
            )));
        }
        Ok(())
    }
}
