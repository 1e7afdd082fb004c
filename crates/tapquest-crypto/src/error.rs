//! Error types for tapquest cryptography.

use thiserror::Error;

/// Errors that can occur while sealing, opening or backing up data.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// Tag mismatch or wrong password. Deliberately carries no detail.
    #[error("authentication failed")]
    AuthenticationFailed,

    #[error("encryption error: {0}")]
    EncryptionError(String),

    #[error("key derivation error: {0}")]
    KeyDerivation(String),

    #[error("malformed backup: {0}")]
    MalformedBackup(String),

    #[error("serialization error: {0}")]
    SerializationError(String),

    /// The message was not addressed to, or sent by, these keys.
    #[error("message not addressed to this key")]
    NotRecipient,

    #[error("invalid message signature")]
    InvalidSignature,

    #[error("core error: {0}")]
    CoreError(#[from] tapquest_core::CoreError),
}

/// Result type for crypto operations.
pub type Result<T> = std::result::Result<T, CryptoError>;
