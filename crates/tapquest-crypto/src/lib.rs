//! # Tapquest Crypto
//!
//! Sealed activity messages and password-protected backups.
//!
//! ## Overview
//!
//! - **Sealing**: activity events are encrypted with a key derived from
//!   X25519(sender, recipient) and signed with the sender's Ed25519 key. See
//!   [`SealedMessage`].
//! - **Backups**: the exported local state is encrypted under an Argon2id
//!   password key with ChaCha20-Poly1305. See [`BackupCodec`].
//! - **Password verifiers**: the account store checks passwords against an
//!   Argon2id hash under a per-account salt. See [`PasswordVerifier`].

pub mod backup;
pub mod crypto;
pub mod error;
pub mod password;
pub mod sealed;

pub use backup::{BackupBlob, BackupCodec, StoredBackup};
pub use crypto::{
    encryption_secret, generate_key_bundle, EncryptionNonce, EncryptionSecret, SharedKey,
    SymmetricKey, TAG_LEN,
};
pub use error::{CryptoError, Result};
pub use password::{
    derive_key, generate_salt, KdfParams, PasswordVerifier, PasswordVerifierExt, SALT_LEN,
};
pub use sealed::SealedMessage;
