//! Structured logging for keychain operations
//!
//! Provides env_logger-based logging with hashed identifiers for anything that
//! names a secret.

use log::{info, warn};
use sha2::{Digest, Sha256};
use std::sync::Once;

static INIT_LOGGER: Once = Once::new();

/// Initialize logging (call once at application startup)
///
/// Levels are configured with `RUST_LOG`, for example
/// `RUST_LOG=dynamo_keychain=debug`.
pub fn init() {
    INIT_LOGGER.call_once(|| {
        env_logger::Builder::from_default_env()
            .format_timestamp_micros()
            .init();
    });
}

/// Initialize logging for test environments
pub fn init_test() {
    let _ = env_logger::Builder::from_default_env()
        .is_test(true)
        .try_init();
}

/// Log the outcome of a keychain operation
pub fn log_keychain_event(operation: &str, keychain: &str, success: bool) {
    if success {
        info!("Keychain operation succeeded: {operation} (keychain: {keychain})");
    } else {
        warn!("Keychain operation failed: {operation} (keychain: {keychain})");
    }
}

/// Log access to a secret item, identified only by the hash of its name
pub fn log_secret_access(operation: &str, keychain: &str, item_name: &str, found: bool) {
    let item_hash = secure_hash(item_name);
    info!("Secret {operation} in keychain {keychain} (item_hash: {item_hash}, found: {found})");
}

/// Truncated SHA-256 of an identifier, safe to write to logs
#[must_use]
pub fn secure_hash(value: &str) -> String {
    let digest = Sha256::digest(value.as_bytes());
    hex::encode(&digest[..8])
}
