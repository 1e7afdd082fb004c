//! Error types for a session.

use tapquest_crypto::CryptoError;
use tapquest_store::StoreError;
use tapquest_sync::SyncError;
use thiserror::Error;

/// Errors that can occur during session operations.
///
/// Invalid taps are not errors; they classify as
/// [`tapquest_core::TapState::CmacInvalid`].
#[derive(Debug, Error)]
pub enum SessionError {
    /// Restored material did not match what the account store holds.
    #[error("verification failed: {0}")]
    Verification(String),

    /// Wrong password, unknown account or a backup that fails to decrypt.
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// Network or server failure. Safe to retry.
    #[error("transport error: {0}")]
    Transport(String),

    /// Already taken or already done. Never retried.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The first self-message after account creation could not be delivered.
    /// Local credentials have been rolled back.
    #[error("registration failed: {0}")]
    FatalRegistration(String),

    /// No credentials, or the auth token has expired.
    #[error("not logged in")]
    NotLoggedIn,

    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Local persistence failed.
    #[error("store error: {0}")]
    Store(String),

    #[error("crypto error: {0}")]
    Crypto(CryptoError),
}

impl SessionError {
    /// Whether a caller-initiated retry may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SessionError::Transport(_))
    }
}

impl From<StoreError> for SessionError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(msg) => SessionError::Conflict(msg),
            StoreError::Unauthorized => SessionError::NotLoggedIn,
            StoreError::Unavailable(msg) => SessionError::Transport(msg),
            other => SessionError::Store(other.to_string()),
        }
    }
}

impl From<SyncError> for SessionError {
    fn from(err: SyncError) -> Self {
        match err {
            SyncError::Transport(msg) | SyncError::InvalidMessage(msg) => {
                SessionError::Transport(msg)
            }
            SyncError::ForgedEvent(msg) => SessionError::Verification(msg),
            SyncError::Unauthorized | SyncError::MissingKeys => SessionError::NotLoggedIn,
            SyncError::Crypto(e) => SessionError::Crypto(e),
            SyncError::Core(e) => SessionError::Crypto(CryptoError::from(e)),
        }
    }
}

impl From<CryptoError> for SessionError {
    fn from(err: CryptoError) -> Self {
        match err {
            CryptoError::AuthenticationFailed => {
                SessionError::Authentication("backup did not decrypt".into())
            }
            CryptoError::MalformedBackup(msg) => SessionError::Authentication(msg),
            other => SessionError::Crypto(other),
        }
    }
}

/// Result type for session operations.
pub type Result<T> = std::result::Result<T, SessionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_transport_is_retryable() {
        assert!(SessionError::Transport("down".into()).is_retryable());
        assert!(!SessionError::Conflict("taken".into()).is_retryable());
        assert!(!SessionError::FatalRegistration("x".into()).is_retryable());
        assert!(!SessionError::NotLoggedIn.is_retryable());
    }

    #[test]
    fn test_store_errors_map_by_kind() {
        assert!(matches!(
            SessionError::from(StoreError::Conflict("a".into())),
            SessionError::Conflict(_)
        ));
        assert!(SessionError::from(StoreError::Unavailable("b".into())).is_retryable());
        assert!(matches!(
            SessionError::from(StoreError::Unauthorized),
            SessionError::NotLoggedIn
        ));
    }

    #[test]
    fn test_shape_mismatch_is_transport() {
        let err = SessionError::from(SyncError::InvalidMessage("bad shape".into()));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_forged_event_is_verification() {
        let err = SessionError::from(SyncError::ForgedEvent(
            "item_redeemed from another sender".into(),
        ));
        assert!(matches!(err, SessionError::Verification(_)));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_decrypt_failure_is_authentication() {
        assert!(matches!(
            SessionError::from(CryptoError::AuthenticationFailed),
            SessionError::Authentication(_)
        ));
    }
}
