//! Error types for the sync module.

use thiserror::Error;

/// Errors that can occur while appending to or syncing the message log.
///
/// Per-message problems during a fetch are not errors; they are collected in
/// [`crate::SyncReport::failures`].
#[derive(Debug, Error)]
pub enum SyncError {
    /// A message did not match the wire shape.
    #[error("invalid message: {0}")]
    InvalidMessage(String),

    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(String),

    /// The relay rejected the auth token.
    #[error("unauthorized")]
    Unauthorized,

    /// The event opened but its sender may not write it to this log.
    #[error("rejected event: {0}")]
    ForgedEvent(String),

    /// Local state has no key bundle to seal or open with.
    #[error("local state has no keys")]
    MissingKeys,

    #[error("crypto error: {0}")]
    Crypto(#[from] tapquest_crypto::CryptoError),

    #[error("core error: {0}")]
    Core(#[from] tapquest_core::CoreError),
}

impl SyncError {
    /// Failures that a caller-initiated retry may fix.
    pub fn is_transport(&self) -> bool {
        matches!(self, SyncError::Transport(_) | SyncError::InvalidMessage(_))
    }
}

/// Result type for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;
