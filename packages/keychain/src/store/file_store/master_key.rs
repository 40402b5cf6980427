//! Master key for the file backend

use crate::config::MasterKeySource;
use crate::paths::restrict_to_owner;
use crate::{KeychainError, Result};
use log::info;
use std::fmt;
use std::path::Path;
use zeroize::Zeroizing;

const KEY_LEN: usize = 32;
const SALT_LEN: usize = 16;
const KEY_FILE: &str = "master.key";
const SALT_FILE: &str = "master.salt";

/// 256-bit key sealing every secret in a file keychain
#[derive(Clone)]
pub struct MasterKey(Zeroizing<[u8; KEY_LEN]>);

impl MasterKey {
    /// Fresh random key
    #[must_use]
    pub fn generate() -> Self {
        use rand::RngCore;

        let mut bytes = Zeroizing::new([0u8; KEY_LEN]);
        rand::rng().fill_bytes(&mut *bytes);
        Self(bytes)
    }

    /// Wrap existing key bytes
    #[must_use]
    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self(Zeroizing::new(bytes))
    }

    /// Derive a key from a passphrase with Argon2id
    ///
    /// # Errors
    ///
    /// Returns `InvalidMasterKey` for an empty passphrase or a salt shorter
    /// than 8 bytes.
    pub fn derive_from_passphrase(passphrase: &str, salt: &[u8]) -> Result<Self> {
        if passphrase.is_empty() {
            return Err(KeychainError::InvalidMasterKey(
                "passphrase is empty".to_string(),
            ));
        }
        let mut bytes = Zeroizing::new([0u8; KEY_LEN]);
        argon2::Argon2::default()
            .hash_password_into(passphrase.as_bytes(), salt, &mut *bytes)
            .map_err(|e| KeychainError::InvalidMasterKey(format!("key derivation failed: {e}")))?;
        Ok(Self(bytes))
    }

    /// Read the key stored at `path`, creating it if the file does not exist
    ///
    /// # Errors
    ///
    /// Returns `InvalidMasterKey` if the file has the wrong length, or `Io`
    /// if it cannot be read or written.
    pub fn load_or_create(path: &Path) -> Result<Self> {
        let bytes = Zeroizing::new(read_or_create(path, KEY_LEN)?);
        let key = <[u8; KEY_LEN]>::try_from(bytes.as_slice()).map_err(|_| {
            KeychainError::InvalidMasterKey(format!(
                "{} holds {} bytes, expected {KEY_LEN}",
                path.display(),
                bytes.len()
            ))
        })?;
        Ok(Self::from_bytes(key))
    }

    /// Obtain the key described by configuration
    ///
    /// # Errors
    ///
    /// Returns `Configuration` if a passphrase variable is unset, or any error
    /// of [`MasterKey::load_or_create`] and [`MasterKey::derive_from_passphrase`].
    pub fn resolve(source: &MasterKeySource, keychain_dir: &Path) -> Result<Self> {
        Self::resolve_with(source, keychain_dir, |name| std::env::var(name).ok())
    }

    /// [`MasterKey::resolve`] with an explicit variable lookup
    ///
    /// # Errors
    ///
    /// See [`MasterKey::resolve`].
    pub fn resolve_with(
        source: &MasterKeySource,
        keychain_dir: &Path,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        ensure_dir(keychain_dir)?;
        match source {
            MasterKeySource::KeyFile { path } => {
                let path = path
                    .clone()
                    .unwrap_or_else(|| keychain_dir.join(KEY_FILE));
                Self::load_or_create(&path)
            }
            MasterKeySource::Passphrase { env } => {
                let passphrase = Zeroizing::new(lookup(env).ok_or_else(|| {
                    KeychainError::Configuration(format!(
                        "master key passphrase variable {env} is not set"
                    ))
                })?);
                let salt = read_or_create(&keychain_dir.join(SALT_FILE), SALT_LEN)?;
                Self::derive_from_passphrase(&passphrase, &salt)
            }
        }
    }

    pub(super) fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

impl fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("MasterKey(<redacted>)")
    }
}

fn ensure_dir(dir: &Path) -> Result<()> {
    if !dir.exists() {
        std::fs::create_dir_all(dir)?;
        restrict_to_owner(dir, true);
    }
    Ok(())
}

fn read_or_create(path: &Path, len: usize) -> Result<Vec<u8>> {
    match std::fs::read(path) {
        Ok(bytes) => Ok(bytes),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            use rand::RngCore;

            if let Some(parent) = path.parent() {
                ensure_dir(parent)?;
            }
            let mut bytes = vec![0u8; len];
            rand::rng().fill_bytes(&mut bytes);
            write_new_private(path, &bytes)?;
            info!("Created {}", path.display());
            Ok(bytes)
        }
        Err(e) => Err(e.into()),
    }
}

fn write_new_private(path: &Path, data: &[u8]) -> Result<()> {
    use std::io::Write;

    let mut options = std::fs::OpenOptions::new();
    options.create_new(true).write(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(path)?;
    file.write_all(data)?;
    file.sync_all()?;
    Ok(())
}
