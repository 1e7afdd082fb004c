//! The message log: append and sync.
//!
//! `append` seals one activity event into an [`EncryptedMessage`]. `sync`
//! posts pending messages, fetches the mailbox from the last applied cursor,
//! opens what it can and folds the rest into [`LocalState`] in
//! `(timestamp, id)` order.
//!
//! A single bad message never aborts a sync. It is recorded in
//! [`SyncReport::failures`] and the remaining messages are folded.

use std::sync::Arc;

use tapquest_core::encoding::{from_cbor, to_cbor};
use tapquest_core::{
    ActivityEvent, ActivityPayload, EncryptionPublicKey, KeyBundle, LocalState, LogCursor,
};
use tapquest_crypto::SealedMessage;
use tracing::{debug, warn};

use crate::error::{Result, SyncError};
use crate::messages::{EncryptedMessage, InboundMessage};
use crate::transport::MessageTransport;

/// Configuration for sync behavior.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Maximum messages posted in one request.
    pub max_batch_size: usize,
    /// Whether to check sender signatures before opening.
    pub verify_signatures: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_batch_size: 50,
            verify_signatures: true,
        }
    }
}

/// A fetched message that could not be folded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageFailure {
    pub seq: u64,
    pub reason: String,
}

/// Result of a sync.
#[derive(Debug, Default)]
pub struct SyncReport {
    /// Messages posted to the relay.
    pub posted: usize,
    /// Messages fetched from the relay.
    pub fetched: usize,
    /// Events folded for the first time.
    pub applied: usize,
    /// Events already present locally.
    pub duplicates: usize,
    /// Messages skipped, with why.
    pub failures: Vec<MessageFailure>,
}

impl SyncReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Client side of the jubSignal log.
pub struct MessageLog {
    transport: Arc<dyn MessageTransport>,
    config: SyncConfig,
}

impl MessageLog {
    pub fn new(transport: Arc<dyn MessageTransport>, config: SyncConfig) -> Self {
        Self { transport, config }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Seal `event` to `recipient` with the sender's keys.
    ///
    /// Personal log entries are sealed to the sender's own encryption key.
    pub fn append(
        &self,
        event: &ActivityEvent,
        recipient: &EncryptionPublicKey,
        sender: &KeyBundle,
    ) -> Result<EncryptedMessage> {
        let plaintext = to_cbor(event)?;
        let sealed = SealedMessage::seal(&plaintext, recipient, sender)?;
        debug!(event_id = %event.id, kind = event.payload.kind(), "sealed event");
        Ok(EncryptedMessage::new(sealed))
    }

    /// Post messages in batches of `max_batch_size`.
    pub async fn post(&self, token: &str, messages: Vec<EncryptedMessage>) -> Result<usize> {
        let total = messages.len();
        let batch = self.config.max_batch_size.max(1);
        let mut pending = messages;
        while !pending.is_empty() {
            let rest = pending.split_off(pending.len().min(batch));
            self.transport.post_messages(token, pending).await?;
            pending = rest;
        }
        Ok(total)
    }

    /// Post `outgoing`, then fetch and fold the mailbox into `state`.
    ///
    /// Fetches from `state.cursor` unless `force_refresh` asks for the whole
    /// mailbox. Transport failures abort before anything is folded.
    pub async fn sync(
        &self,
        token: &str,
        state: &mut LocalState,
        force_refresh: bool,
        outgoing: Vec<EncryptedMessage>,
    ) -> Result<SyncReport> {
        let keys = state.keys.clone().ok_or(SyncError::MissingKeys)?;
        let mut report = SyncReport::default();

        if !outgoing.is_empty() {
            report.posted = self.post(token, outgoing).await?;
        }

        let after = if force_refresh { None } else { state.cursor };
        let inbound = self.transport.get_messages(token, after).await?;
        report.fetched = inbound.len();

        let mut cursor = state.cursor;
        let mut events = Vec::with_capacity(inbound.len());
        for message in inbound {
            cursor = Some(cursor.map_or(LogCursor(message.seq), |c| c.advance(message.seq)));
            match self.open_inbound(&message, &keys) {
                Ok(event) => events.push(event),
                Err(e) => {
                    warn!(seq = message.seq, error = %e, "skipping message");
                    report.failures.push(MessageFailure {
                        seq: message.seq,
                        reason: e.to_string(),
                    });
                }
            }
        }

        let summary = state.apply_all(events);
        report.applied = summary.applied;
        report.duplicates = summary.duplicates;
        state.cursor = cursor;

        debug!(
            posted = report.posted,
            fetched = report.fetched,
            applied = report.applied,
            duplicates = report.duplicates,
            failures = report.failures.len(),
            "sync complete"
        );
        Ok(report)
    }

    /// Validate, verify and open one fetched message.
    pub fn open_inbound(&self, message: &InboundMessage, keys: &KeyBundle) -> Result<ActivityEvent> {
        let encrypted = EncryptedMessage::from_json(&message.body)?;
        self.open(&encrypted, keys)
    }

    /// Verify and open a message addressed to or sent by `keys`.
    pub fn open(&self, message: &EncryptedMessage, keys: &KeyBundle) -> Result<ActivityEvent> {
        let sealed = &message.sealed;
        if self.config.verify_signatures {
            sealed.verify()?;
        }
        let plaintext = sealed.open(keys)?;
        let event: ActivityEvent = from_cbor(&plaintext)?;
        if event.sender_public_key != sealed.sender_encryption_public_key
            || event.recipient_public_key != sealed.recipient_public_key
        {
            return Err(SyncError::InvalidMessage(
                "event addressing does not match envelope".into(),
            ));
        }
        check_author(&event, sealed, keys)?;
        Ok(event)
    }
}

/// Only the user writes their own record. A peer may only introduce itself,
/// with a `PersonTap` naming the key that signed the envelope.
fn check_author(event: &ActivityEvent, sealed: &SealedMessage, keys: &KeyBundle) -> Result<()> {
    let own = keys.encryption_public_key;
    let signer = sealed.sender_signature_public_key;
    let from_self = event.sender_public_key == own && signer == keys.signature_public_key;

    match &event.payload {
        ActivityPayload::PersonTap { .. } if from_self => Ok(()),
        ActivityPayload::PersonTap {
            person_id,
            signature_public_key,
            ..
        } => {
            if *signature_public_key == signer && *person_id == signer.to_hex() {
                Ok(())
            } else {
                Err(SyncError::ForgedEvent(
                    "person tap does not name its signer".into(),
                ))
            }
        }
        _ if from_self && event.recipient_public_key == own => Ok(()),
        other => Err(SyncError::ForgedEvent(format!(
            "{} from another sender",
            other.kind()
        ))),
    }
}
