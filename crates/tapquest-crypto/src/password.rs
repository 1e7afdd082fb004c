//! Password hashing: the Argon2id KDF and the server-side password verifier.

use argon2::{Algorithm, Argon2, Params, Version};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;

use crate::crypto::SymmetricKey;
use crate::error::{CryptoError, Result};

/// Salt length in bytes.
pub const SALT_LEN: usize = tapquest_core::state::PASSWORD_SALT_LEN;

/// Argon2id cost parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfParams {
    /// Memory cost in KiB.
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl KdfParams {
    /// Interactive login cost: 19 MiB, 2 passes, 1 lane.
    pub const fn interactive() -> Self {
        Self {
            memory_kib: 19 * 1024,
            iterations: 2,
            parallelism: 1,
        }
    }

    /// The cheapest parameters Argon2 accepts. Tests only.
    pub const fn insecure_fast() -> Self {
        Self {
            memory_kib: 8,
            iterations: 1,
            parallelism: 1,
        }
    }

    fn argon2(&self) -> Result<Argon2<'static>> {
        let params = Params::new(self.memory_kib, self.iterations, self.parallelism, Some(32))
            .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;
        Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
    }
}

impl Default for KdfParams {
    fn default() -> Self {
        Self::interactive()
    }
}

/// Derive a 32-byte key from a password and salt with Argon2id.
pub fn derive_key(params: &KdfParams, password: &str, salt: &[u8]) -> Result<SymmetricKey> {
    let mut output = [0u8; 32];
    params
        .argon2()?
        .hash_password_into(password.as_bytes(), salt, &mut output)
        .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;
    Ok(SymmetricKey::from_bytes(output))
}

/// Generate a fresh random salt.
pub fn generate_salt() -> [u8; SALT_LEN] {
    let mut salt = [0u8; SALT_LEN];
    rand::thread_rng().fill_bytes(&mut salt);
    salt
}

pub use tapquest_core::PasswordVerifier;

/// Creating and checking [`PasswordVerifier`]s with Argon2id.
///
/// The verifier's salt doubles as the account's backup salt seed (see
/// [`crate::backup::BackupCodec`]); the backup key itself is never stored.
pub trait PasswordVerifierExt: Sized {
    /// Hash `password` under a fresh salt.
    fn create(params: &KdfParams, password: &str) -> Result<Self>;

    /// Constant-time check of `password` against the stored hash.
    fn verify(&self, params: &KdfParams, password: &str) -> Result<bool>;
}

impl PasswordVerifierExt for PasswordVerifier {
    fn create(params: &KdfParams, password: &str) -> Result<Self> {
        let salt = generate_salt();
        let hash = *derive_key(params, password, &salt)?.as_bytes();
        Ok(Self { salt, hash })
    }

    fn verify(&self, params: &KdfParams, password: &str) -> Result<bool> {
        let candidate = derive_key(params, password, &self.salt)?;
        Ok(candidate.as_bytes().ct_eq(&self.hash).into())
    }
}
