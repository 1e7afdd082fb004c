//! Error types for tapquest core.

use thiserror::Error;

/// Core errors that can occur while handling keys, events and encodings.
///
/// Tap verification never surfaces these: verifiers convert every failure into
/// a typed outcome (see [`crate::verify`]).
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid signature")]
    InvalidSignature,

    #[error("invalid public key")]
    InvalidPublicKey,

    #[error("malformed input: {0}")]
    Malformed(String),

    #[error("encoding error: {0}")]
    EncodingError(String),

    #[error("decoding error: {0}")]
    DecodingError(String),
}

/// Reasons a profile update is rejected locally.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProfileError {
    #[error("display name must be 1 to {max} characters", max = crate::state::MAX_DISPLAY_NAME_LEN)]
    DisplayNameLength,

    #[error("display name must be alphanumeric")]
    DisplayNameCharset,
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
