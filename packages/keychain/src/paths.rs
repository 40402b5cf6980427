//! Filesystem locations and keychain name validation

use crate::{KeychainError, Result};
use log::warn;
use std::path::{Path, PathBuf};

/// Maximum allowed keychain name length
pub const MAX_KEYCHAIN_NAME_LENGTH: usize = 128;

/// Directory name used under the OS config and data directories
const APP_DIR: &str = "dynamo";

/// Validate a keychain name before it is used as a file name or credential service
///
/// Names are 1 to 128 characters of ASCII letters, digits, `.`, `_`, `-` and
/// space, may not start with `.` and may not contain `..`.
///
/// # Errors
///
/// Returns `InvalidKeychainName` describing the first rule that failed.
pub fn validate_keychain_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(KeychainError::InvalidKeychainName(
            "name is empty".to_string(),
        ));
    }
    if name.len() > MAX_KEYCHAIN_NAME_LENGTH {
        return Err(KeychainError::InvalidKeychainName(format!(
            "name exceeds {MAX_KEYCHAIN_NAME_LENGTH} characters"
        )));
    }
    if name.starts_with('.') || name.contains("..") {
        return Err(KeychainError::InvalidKeychainName(format!(
            "{name:?} looks like a relative path"
        )));
    }
    if let Some(bad) = name
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-' | ' ')))
    {
        return Err(KeychainError::InvalidKeychainName(format!(
            "{name:?} contains unsupported character {bad:?}"
        )));
    }
    Ok(())
}

/// Per-application temporary directory, created when missing
///
/// An existing path is only reused if it is a real directory that no other
/// user can access.
///
/// # Errors
///
/// Returns an error if the application name is unusable, or the path exists
/// but is not a private directory, or it cannot be created.
pub fn application_temporary_directory(app_name: &str) -> Result<PathBuf> {
    validate_keychain_name(app_name).map_err(|e| {
        KeychainError::Configuration(format!("app_name cannot name a directory: {e}"))
    })?;
    private_directory_in(&std::env::temp_dir(), app_name)
}

fn private_directory_in(parent: &Path, name: &str) -> Result<PathBuf> {
    let dir = parent.join(name);
    let mut builder = std::fs::DirBuilder::new();
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(0o700);
    }
    match builder.create(&dir) {
        Ok(()) => {
            restrict_to_owner(&dir, true);
            Ok(dir)
        }
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
            check_private_directory(&dir)?;
            Ok(dir)
        }
        Err(e) => Err(e.into()),
    }
}

fn check_private_directory(dir: &Path) -> Result<()> {
    let metadata = std::fs::symlink_metadata(dir)?;
    if metadata.file_type().is_symlink() || !metadata.is_dir() {
        return Err(KeychainError::Configuration(format!(
            "{} exists and is not a directory",
            dir.display()
        )));
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = metadata.permissions().mode();
        if mode & 0o077 != 0 {
            return Err(KeychainError::Configuration(format!(
                "{} is accessible to other users (mode {:o})",
                dir.display(),
                mode & 0o777
            )));
        }
    }
    Ok(())
}

/// Default location of keychain files
#[must_use]
pub fn default_keychain_dir() -> PathBuf {
    match dirs::data_dir() {
        Some(dir) => dir.join(APP_DIR).join("keychains"),
        None => {
            warn!("Could not determine OS data directory, using ./{APP_DIR}/keychains");
            PathBuf::from(".").join(APP_DIR).join("keychains")
        }
    }
}

/// Default location of the JSON configuration file
#[must_use]
pub fn default_config_path() -> PathBuf {
    match dirs::config_dir() {
        Some(dir) => dir.join(APP_DIR).join("keychain.json"),
        None => PathBuf::from(".").join(APP_DIR).join("keychain.json"),
    }
}

/// Make a file (0600) or directory (0700) accessible to its owner only
pub fn restrict_to_owner(path: &Path, is_dir: bool) {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = if is_dir { 0o700 } else { 0o600 };
        if let Err(e) = std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode)) {
            warn!("Failed to restrict permissions on {}: {e}", path.display());
        }
    }
    #[cfg(not(unix))]
    {
        let _ = (path, is_dir);
    }
}
