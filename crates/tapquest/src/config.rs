//! Session configuration.

use tapquest_crypto::KdfParams;
use tapquest_sync::SyncConfig;

/// Configuration for a [`crate::Session`].
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Argon2id cost for password verifiers and backup keys.
    pub kdf: KdfParams,
    /// Message log configuration.
    pub sync: SyncConfig,
    /// Refetch the whole mailbox after login instead of resuming from the
    /// restored cursor.
    pub full_sync_on_login: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            kdf: KdfParams::default(),
            sync: SyncConfig::default(),
            full_sync_on_login: true,
        }
    }
}

impl SessionConfig {
    /// Cheap KDF parameters for tests.
    pub fn insecure_fast() -> Self {
        Self {
            kdf: KdfParams::insecure_fast(),
            ..Self::default()
        }
    }
}
