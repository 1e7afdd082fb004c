//! Wire messages exchanged with the relay.
//!
//! The relay only ever sees [`EncryptedMessage`]s as JSON. It numbers what it
//! stores per mailbox and hands bodies back as raw bytes so the client can
//! validate the shape itself.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tapquest_crypto::SealedMessage;

use crate::error::{Result, SyncError};

/// Wire format version.
pub const PROTOCOL_VERSION: u8 = 0;

/// Message size limits.
pub mod limits {
    /// Max ciphertext bytes in one message.
    pub const MAX_CIPHERTEXT_BYTES: usize = 64 * 1024;
    /// Max messages in one post.
    pub const MAX_MESSAGES_PER_POST: usize = 100;
}

/// A sealed activity event as it travels to and from the relay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedMessage {
    pub version: u8,
    #[serde(flatten)]
    pub sealed: SealedMessage,
}

impl EncryptedMessage {
    pub fn new(sealed: SealedMessage) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            sealed,
        }
    }

    /// Parse and validate a message received from the relay.
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        let message: Self = serde_json::from_slice(bytes)
            .map_err(|e| SyncError::InvalidMessage(e.to_string()))?;
        if message.version != PROTOCOL_VERSION {
            return Err(SyncError::InvalidMessage(format!(
                "unsupported version {}",
                message.version
            )));
        }
        message
            .validate_limits()
            .map_err(|e| SyncError::InvalidMessage(e.to_string()))?;
        Ok(message)
    }

    pub fn to_json(&self) -> Result<Bytes> {
        serde_json::to_vec(self)
            .map(Bytes::from)
            .map_err(|e| SyncError::InvalidMessage(e.to_string()))
    }

    /// Check if this message respects size limits.
    pub fn validate_limits(&self) -> std::result::Result<(), &'static str> {
        if self.sealed.ciphertext.len() > limits::MAX_CIPHERTEXT_BYTES {
            return Err("ciphertext too large");
        }
        Ok(())
    }
}

/// One stored message as returned by a fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    /// Relay-assigned sequence number, increasing per mailbox.
    pub seq: u64,
    /// The raw JSON body, unvalidated.
    pub body: Bytes,
}
