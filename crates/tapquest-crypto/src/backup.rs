//! Password-protected account backups.
//!
//! ## Overview
//!
//! The backup is the whole [`LocalState`] as JSON. Unless the user chose
//! server custody, it is encrypted under a key derived from their password:
//!
//! 1. **Salt**: Blake3 (derive-key mode) over the account's random salt and
//!    the normalized identifier, truncated to 16 bytes.
//! 2. **Key**: Argon2id(password, salt) with [`KdfParams`].
//! 3. **Cipher**: ChaCha20-Poly1305 with a fresh 12-byte iv per call and the
//!    identifier as associated data. The 16-byte tag is stored detached.
//!
//! Decryption failures of any kind (wrong password, flipped bit, wrong
//! identifier) surface as [`CryptoError::AuthenticationFailed`].

use serde::{Deserialize, Serialize};
use tapquest_core::encoding::decode_hex_array;
use tapquest_core::LocalState;
use tracing::debug;

use crate::crypto::{EncryptionNonce, SymmetricKey, TAG_LEN};
use crate::error::{CryptoError, Result};
use crate::password::{derive_key, KdfParams, SALT_LEN};

const SALT_CONTEXT: &str = "tapquest-backup-v0 salt";

/// The encrypted backup envelope, hex-encoded at the boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupBlob {
    pub encrypted_data: String,
    pub authentication_tag: String,
    pub iv: String,
}

/// A backup as the account store keeps it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum StoredBackup {
    Encrypted(BackupBlob),
    /// Chosen explicitly by users who opt into server custody.
    Cleartext(String),
}

impl StoredBackup {
    pub fn is_encrypted(&self) -> bool {
        matches!(self, StoredBackup::Encrypted(_))
    }
}

fn normalize_identifier(identifier: &str) -> String {
    identifier.trim().to_lowercase()
}

/// Encrypts and decrypts one account's backups.
#[derive(Debug, Clone)]
pub struct BackupCodec {
    params: KdfParams,
    account_salt: [u8; SALT_LEN],
}

impl BackupCodec {
    /// `account_salt` is the random salt generated at registration and kept
    /// next to the password verifier.
    pub fn new(params: KdfParams, account_salt: [u8; SALT_LEN]) -> Self {
        Self { params, account_salt }
    }

    /// Argon2id key derivation under this codec's cost parameters.
    pub fn derive_key(&self, password: &str, salt: &[u8]) -> Result<SymmetricKey> {
        derive_key(&self.params, password, salt)
    }

    fn salt_for(&self, identifier: &str) -> [u8; SALT_LEN] {
        let mut hasher = blake3::Hasher::new_derive_key(SALT_CONTEXT);
        hasher.update(&self.account_salt);
        hasher.update(normalize_identifier(identifier).as_bytes());
        let mut salt = [0u8; SALT_LEN];
        salt.copy_from_slice(&hasher.finalize().as_bytes()[..SALT_LEN]);
        salt
    }

    /// Encrypt `plaintext` for `identifier` under `password`.
    pub fn encrypt(&self, plaintext: &[u8], identifier: &str, password: &str) -> Result<BackupBlob> {
        let key = self.derive_key(password, &self.salt_for(identifier))?;
        let iv = EncryptionNonce::generate();
        let aad = normalize_identifier(identifier);
        let (ciphertext, tag) = key.encrypt_detached(plaintext, &iv, aad.as_bytes())?;
        Ok(BackupBlob {
            encrypted_data: hex::encode(ciphertext),
            authentication_tag: hex::encode(tag),
            iv: hex::encode(iv.as_bytes()),
        })
    }

    /// Decrypt a blob. Fails with [`CryptoError::AuthenticationFailed`] on any
    /// tag mismatch.
    pub fn decrypt(&self, blob: &BackupBlob, identifier: &str, password: &str) -> Result<Vec<u8>> {
        let ciphertext = hex::decode(&blob.encrypted_data)
            .map_err(|e| CryptoError::MalformedBackup(format!("encrypted data: {e}")))?;
        let tag: [u8; TAG_LEN] = decode_hex_array(&blob.authentication_tag)
            .map_err(|e| CryptoError::MalformedBackup(format!("authentication tag: {e}")))?;
        let iv: [u8; 12] = decode_hex_array(&blob.iv)
            .map_err(|e| CryptoError::MalformedBackup(format!("iv: {e}")))?;

        let key = self.derive_key(password, &self.salt_for(identifier))?;
        let aad = normalize_identifier(identifier);
        key.decrypt_detached(&ciphertext, &tag, &EncryptionNonce::from_bytes(iv), aad.as_bytes())
    }

    /// Export `state`, encrypted unless the user opted into server custody.
    pub fn create_backup(
        &self,
        state: &LocalState,
        custodial: bool,
        identifier: &str,
        password: &str,
    ) -> Result<StoredBackup> {
        let json = serde_json::to_string(state)
            .map_err(|e| CryptoError::SerializationError(e.to_string()))?;
        debug!(custodial, bytes = json.len(), "creating backup");
        if custodial {
            return Ok(StoredBackup::Cleartext(json));
        }
        self.encrypt(json.as_bytes(), identifier, password)
            .map(StoredBackup::Encrypted)
    }

    /// Restore state from a stored backup.
    pub fn restore_backup(
        &self,
        backup: &StoredBackup,
        identifier: &str,
        password: &str,
    ) -> Result<LocalState> {
        let json = match backup {
            StoredBackup::Cleartext(json) => json.clone().into_bytes(),
            StoredBackup::Encrypted(blob) => self.decrypt(blob, identifier, password)?,
        };
        serde_json::from_slice(&json).map_err(|e| CryptoError::SerializationError(e.to_string()))
    }
}
