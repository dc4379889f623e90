//! Error types for the vault

use thiserror::Error;

/// Result type alias for vault operations
pub type Result<T> = std::result::Result<T, VaultError>;

/// Errors that can occur while sealing, storing or restoring records
#[derive(Error, Debug)]
pub enum VaultError {
    /// Authentication failed: wrong password or tampered ciphertext.
    /// The two causes are deliberately indistinguishable.
    #[error("Decryption failed: wrong password or corrupted data")]
    Decryption,

    /// Envelope format version is not one this codec understands
    #[error("Unsupported envelope version: {0}")]
    UnsupportedVersion(u32),

    /// Backup export failed
    #[error("Export failed: {0}")]
    Export(String),

    /// Backup import failed
    #[error("Import failed: {0}")]
    Import(String),

    /// Cryptographic primitive misuse (bad key or nonce length)
    #[error("Cryptographic error: {0}")]
    Crypto(String),

    /// Storage operation failed
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Reminder could not be delivered
    #[error("Notification error: {0}")]
    Notification(String),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<serde_json::Error> for VaultError {
    fn from(err: serde_json::Error) -> Self {
        VaultError::Serialization(err.to_string())
    }
}

impl From<sqlx::Error> for VaultError {
    fn from(err: sqlx::Error) -> Self {
        VaultError::Storage(err.to_string())
    }
}

impl From<tokio::task::JoinError> for VaultError {
    fn from(err: tokio::task::JoinError) -> Self {
        VaultError::Crypto(format!("Worker task failed: {}", err))
    }
}
