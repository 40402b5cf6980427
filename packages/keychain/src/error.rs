//! Error handling for keychain operations

use thiserror::Error;

/// Keychain-specific errors
#[derive(Debug, Error)]
pub enum KeychainError {
    /// Keychain name failed validation
    #[error("Invalid keychain name: {0}")]
    InvalidKeychainName(String),

    /// Requested item does not exist
    #[error("Item not found: {0}")]
    ItemNotFound(String),

    /// Caller supplied an unusable value
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Self-signed certificate generation failed
    #[error("Certificate generation error: {0}")]
    CertificateGeneration(String),

    /// Certificate bytes could not be parsed
    #[error("Certificate parsing failed: {0}")]
    CertificateParsing(String),

    /// Private key bytes could not be parsed or loaded
    #[error("Invalid private key: {0}")]
    InvalidPrivateKey(String),

    /// Private key does not belong to the certificate
    #[error("Private key does not match certificate: {0}")]
    KeyMismatch(String),

    /// External format is recognised but not importable
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// Sealing a secret failed
    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    /// Opening a sealed secret failed
    #[error("Decryption failed: {0}")]
    DecryptionFailed(String),

    /// Master key material is unusable
    #[error("Invalid master key: {0}")]
    InvalidMasterKey(String),

    /// Storage backend error occurred
    #[error("Storage backend error: {operation} failed - {details}")]
    StorageBackendError {
        /// The storage operation that failed
        operation: String,
        /// Detailed error information
        details: String,
    },

    /// Configuration could not be loaded or is inconsistent
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// TLS configuration could not be built
    #[error("TLS error: {0}")]
    Tls(String),

    /// Keychain document (de)serialization failed
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O operation failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl KeychainError {
    /// Create a storage backend error
    pub fn backend(operation: impl Into<String>, details: impl std::fmt::Display) -> Self {
        Self::StorageBackendError {
            operation: operation.into(),
            details: details.to_string(),
        }
    }
}

impl From<rcgen::Error> for KeychainError {
    fn from(e: rcgen::Error) -> Self {
        Self::CertificateGeneration(e.to_string())
    }
}

impl From<keyring::Error> for KeychainError {
    fn from(e: keyring::Error) -> Self {
        Self::backend("os keychain", e)
    }
}

impl From<rustls::Error> for KeychainError {
    fn from(e: rustls::Error) -> Self {
        Self::Tls(e.to_string())
    }
}

/// Result type for keychain operations
pub type Result<T> = std::result::Result<T, KeychainError>;
