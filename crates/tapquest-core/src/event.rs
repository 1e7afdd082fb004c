//! Activity events, the plaintext inside every jubSignal message.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use crate::crypto::{Ed25519PublicKey, EncryptionPublicKey};
use crate::types::{EventId, LocationId, QrId, Timestamp};

/// What happened. Closed: every consumer matches exhaustively.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ActivityPayload {
    /// First self-message after account creation.
    Registered,
    PersonTap {
        person_id: String,
        display_name: String,
        signature_public_key: Ed25519PublicKey,
        counter_message: Option<String>,
        signature: Option<String>,
    },
    LocationTap {
        location_id: LocationId,
        location_name: String,
        signature_public_key: String,
        signature_message: String,
        signature: String,
    },
    ItemRedeemed {
        item_id: String,
        item_name: String,
        qr_id: QrId,
    },
}

impl ActivityPayload {
    pub fn kind(&self) -> &'static str {
        match self {
            ActivityPayload::Registered => "registered",
            ActivityPayload::PersonTap { .. } => "person_tap",
            ActivityPayload::LocationTap { .. } => "location_tap",
            ActivityPayload::ItemRedeemed { .. } => "item_redeemed",
        }
    }
}

/// A single entry in a user's activity log.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityEvent {
    pub id: EventId,
    pub timestamp: Timestamp,
    pub sender_public_key: EncryptionPublicKey,
    pub recipient_public_key: EncryptionPublicKey,
    pub payload: ActivityPayload,
}

impl ActivityEvent {
    /// Build an event with a fresh random id.
    pub fn new(
        timestamp: Timestamp,
        sender_public_key: EncryptionPublicKey,
        recipient_public_key: EncryptionPublicKey,
        payload: ActivityPayload,
    ) -> Self {
        Self {
            id: EventId::random(),
            timestamp,
            sender_public_key,
            recipient_public_key,
            payload,
        }
    }

    /// The fold ordering key.
    pub fn order_key(&self) -> (Timestamp, EventId) {
        (self.timestamp, self.id)
    }

    /// Compare two events by `(timestamp, id)`.
    pub fn fold_order(a: &Self, b: &Self) -> Ordering {
        a.order_key().cmp(&b.order_key())
    }
}
