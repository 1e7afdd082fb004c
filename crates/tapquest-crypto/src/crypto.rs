//! X25519 key agreement and ChaCha20-Poly1305 authenticated encryption.

use chacha20poly1305::{
    aead::{Aead, AeadInPlace, KeyInit, Payload},
    ChaCha20Poly1305, Key, Nonce, Tag,
};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use tapquest_core::encoding::hex_array;
use tapquest_core::{EncryptionPublicKey, KeyBundle, Keypair};
use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{CryptoError, Result};

/// Length of a ChaCha20-Poly1305 tag in bytes.
pub const TAG_LEN: usize = 16;

const SEAL_CONTEXT: &str = "tapquest-jubsignal-v0 message key";

/// An X25519 static secret key.
pub struct EncryptionSecret(StaticSecret);

impl EncryptionSecret {
    /// Generate a new random secret.
    pub fn generate() -> Self {
        Self(StaticSecret::random_from_rng(rand::thread_rng()))
    }

    /// Create from seed bytes.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(StaticSecret::from(bytes))
    }

    pub fn to_bytes(&self) -> [u8; 32] {
        self.0.to_bytes()
    }

    /// Derive the public key.
    pub fn public_key(&self) -> EncryptionPublicKey {
        EncryptionPublicKey::from_bytes(*PublicKey::from(&self.0).as_bytes())
    }

    /// Perform key agreement with a peer's public key.
    pub fn diffie_hellman(&self, peer_public: &EncryptionPublicKey) -> SharedKey {
        let shared = self.0.diffie_hellman(&PublicKey::from(*peer_public.as_bytes()));
        SharedKey(*shared.as_bytes())
    }
}

/// A shared secret derived from X25519 key agreement.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SharedKey([u8; 32]);

impl SharedKey {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Derive the symmetric key for one sender/recipient pair.
    ///
    /// Both parties pass the same `(sender, recipient)` order, so the sender
    /// and the recipient arrive at the same key.
    pub fn derive_message_key(
        &self,
        sender: &EncryptionPublicKey,
        recipient: &EncryptionPublicKey,
    ) -> SymmetricKey {
        let mut hasher = blake3::Hasher::new_derive_key(SEAL_CONTEXT);
        hasher.update(&self.0);
        hasher.update(sender.as_bytes());
        hasher.update(recipient.as_bytes());
        SymmetricKey(*hasher.finalize().as_bytes())
    }
}

/// A 256-bit symmetric key for ChaCha20-Poly1305.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SymmetricKey([u8; 32]);

impl SymmetricKey {
    pub fn generate() -> Self {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    fn cipher(&self) -> ChaCha20Poly1305 {
        ChaCha20Poly1305::new(Key::from_slice(&self.0))
    }

    /// Encrypt, appending the tag to the ciphertext.
    pub fn encrypt(&self, plaintext: &[u8], nonce: &EncryptionNonce, aad: &[u8]) -> Result<Vec<u8>> {
        self.cipher()
            .encrypt(Nonce::from_slice(&nonce.0), Payload { msg: plaintext, aad })
            .map_err(|e| CryptoError::EncryptionError(e.to_string()))
    }

    /// Decrypt a ciphertext with an appended tag.
    pub fn decrypt(&self, ciphertext: &[u8], nonce: &EncryptionNonce, aad: &[u8]) -> Result<Vec<u8>> {
        self.cipher()
            .decrypt(Nonce::from_slice(&nonce.0), Payload { msg: ciphertext, aad })
            .map_err(|_| CryptoError::AuthenticationFailed)
    }

    /// Encrypt, returning the ciphertext and the tag separately.
    pub fn encrypt_detached(
        &self,
        plaintext: &[u8],
        nonce: &EncryptionNonce,
        aad: &[u8],
    ) -> Result<(Vec<u8>, [u8; TAG_LEN])> {
        let mut buffer = plaintext.to_vec();
        let tag = self
            .cipher()
            .encrypt_in_place_detached(Nonce::from_slice(&nonce.0), aad, &mut buffer)
            .map_err(|e| CryptoError::EncryptionError(e.to_string()))?;
        let mut detached = [0u8; TAG_LEN];
        detached.copy_from_slice(&tag);
        Ok((buffer, detached))
    }

    /// Decrypt a ciphertext whose tag is stored separately.
    pub fn decrypt_detached(
        &self,
        ciphertext: &[u8],
        tag: &[u8; TAG_LEN],
        nonce: &EncryptionNonce,
        aad: &[u8],
    ) -> Result<Vec<u8>> {
        let mut buffer = ciphertext.to_vec();
        self.cipher()
            .decrypt_in_place_detached(Nonce::from_slice(&nonce.0), aad, &mut buffer, Tag::from_slice(tag))
            .map_err(|_| CryptoError::AuthenticationFailed)?;
        Ok(buffer)
    }
}

/// A 96-bit nonce for ChaCha20-Poly1305.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptionNonce(#[serde(with = "hex_array")] pub [u8; 12]);

impl EncryptionNonce {
    /// Generate a new random nonce.
    pub fn generate() -> Self {
        let mut bytes = [0u8; 12];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub const fn from_bytes(bytes: [u8; 12]) -> Self {
        Self(bytes)
    }

    pub const fn as_bytes(&self) -> &[u8; 12] {
        &self.0
    }
}

/// Generate a fresh device key bundle.
pub fn generate_key_bundle() -> KeyBundle {
    let encryption = EncryptionSecret::generate();
    let signing = Keypair::generate();
    KeyBundle {
        encryption_private_key: encryption.to_bytes(),
        encryption_public_key: encryption.public_key(),
        signature_private_key: signing.seed(),
        signature_public_key: signing.public_key(),
    }
}

/// The X25519 secret half of a key bundle.
pub fn encryption_secret(keys: &KeyBundle) -> EncryptionSecret {
    EncryptionSecret::from_bytes(keys.encryption_private_key)
}
