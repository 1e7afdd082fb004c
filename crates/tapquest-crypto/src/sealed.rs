//! Sealed activity messages.
//!
//! A sealed message is an activity event encrypted from one X25519 key to
//! another and signed by the sender's Ed25519 key. Personal log entries are
//! sealed to the sender's own key; social exchanges are sealed to a peer.
//!
//! ## Layout
//!
//! The signature covers, in order:
//!
//! ```text
//! domain || ciphertext || nonce || sender_encryption_key || recipient_key
//! ```
//!
//! so neither the ciphertext nor the addressing can be swapped without
//! invalidating it.

use serde::{Deserialize, Serialize};
use tapquest_core::encoding::hex_bytes;
use tapquest_core::{Ed25519PublicKey, Ed25519Signature, EncryptionPublicKey, KeyBundle};

use crate::crypto::{encryption_secret, EncryptionNonce};
use crate::error::{CryptoError, Result};

const SIGNATURE_DOMAIN: &[u8] = b"tapquest-jubsignal-v0 signature";

/// An encrypted, signed activity event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SealedMessage {
    pub sender_encryption_public_key: EncryptionPublicKey,
    pub sender_signature_public_key: Ed25519PublicKey,
    pub recipient_public_key: EncryptionPublicKey,
    pub nonce: EncryptionNonce,
    #[serde(with = "hex_bytes")]
    pub ciphertext: Vec<u8>,
    pub signature: Ed25519Signature,
}

fn signing_bytes(
    ciphertext: &[u8],
    nonce: &EncryptionNonce,
    sender: &EncryptionPublicKey,
    recipient: &EncryptionPublicKey,
) -> Vec<u8> {
    let mut buf = Vec::with_capacity(SIGNATURE_DOMAIN.len() + ciphertext.len() + 12 + 64);
    buf.extend_from_slice(SIGNATURE_DOMAIN);
    buf.extend_from_slice(ciphertext);
    buf.extend_from_slice(nonce.as_bytes());
    buf.extend_from_slice(sender.as_bytes());
    buf.extend_from_slice(recipient.as_bytes());
    buf
}

impl SealedMessage {
    /// Encrypt `plaintext` to `recipient` and sign it with the sender's keys.
    pub fn seal(plaintext: &[u8], recipient: &EncryptionPublicKey, sender: &KeyBundle) -> Result<Self> {
        let sender_public = sender.encryption_public_key;
        let key = encryption_secret(sender)
            .diffie_hellman(recipient)
            .derive_message_key(&sender_public, recipient);
        let nonce = EncryptionNonce::generate();
        let ciphertext = key.encrypt(plaintext, &nonce, &[])?;

        let signature = sender
            .signing_keypair()
            .sign(&signing_bytes(&ciphertext, &nonce, &sender_public, recipient));

        Ok(Self {
            sender_encryption_public_key: sender_public,
            sender_signature_public_key: sender.signature_public_key,
            recipient_public_key: *recipient,
            nonce,
            ciphertext,
            signature,
        })
    }

    /// Check the sender's signature.
    pub fn verify(&self) -> Result<()> {
        let bytes = signing_bytes(
            &self.ciphertext,
            &self.nonce,
            &self.sender_encryption_public_key,
            &self.recipient_public_key,
        );
        self.sender_signature_public_key
            .verify(&bytes, &self.signature)
            .map_err(|_| CryptoError::InvalidSignature)
    }

    /// Decrypt with either the recipient's or the sender's keys.
    ///
    /// Does not check the signature; call [`SealedMessage::verify`] first.
    pub fn open(&self, keys: &KeyBundle) -> Result<Vec<u8>> {
        let own = keys.encryption_public_key;
        let peer = if own == self.recipient_public_key {
            self.sender_encryption_public_key
        } else if own == self.sender_encryption_public_key {
            self.recipient_public_key
        } else {
            return Err(CryptoError::NotRecipient);
        };
        let key = encryption_secret(keys)
            .diffie_hellman(&peer)
            .derive_message_key(&self.sender_encryption_public_key, &self.recipient_public_key);
        key.decrypt(&self.ciphertext, &self.nonce, &[])
    }
}
