//! Local account state and the activity fold.
//!
//! ## Overview
//!
//! [`LocalState`] is the explicit value a session owns: credentials, profile,
//! the activity log keyed by event id, and the views derived from it.
//! [`LocalState::apply`] is the only way events enter the log. It is
//! idempotent (an id never folds twice) and every derived view is computed so
//! that folding the same set of events in any order gives the same state.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::counter::extract_counter_from_message;
use crate::crypto::{Ed25519PublicKey, EncryptionPublicKey, Keypair};
use crate::encoding::hex_array;
use crate::error::ProfileError;
use crate::event::{ActivityEvent, ActivityPayload};
use crate::types::{AuthToken, EventId, LocationId, LogCursor, QrId, Timestamp};

/// Maximum display name length, in characters.
pub const MAX_DISPLAY_NAME_LEN: usize = 20;

/// A device's encryption and signing keys.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyBundle {
    #[serde(with = "hex_array")]
    pub encryption_private_key: [u8; 32],
    pub encryption_public_key: EncryptionPublicKey,
    #[serde(with = "hex_array")]
    pub signature_private_key: [u8; 32],
    pub signature_public_key: Ed25519PublicKey,
}

impl KeyBundle {
    /// The Ed25519 signing half as a [`Keypair`].
    pub fn signing_keypair(&self) -> Keypair {
        Keypair::from_seed(&self.signature_private_key)
    }
}

impl fmt::Debug for KeyBundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyBundle")
            .field("encryption_public_key", &self.encryption_public_key)
            .field("signature_public_key", &self.signature_public_key)
            .finish_non_exhaustive()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub display_name: String,
    pub email: String,
    pub wants_server_custody: bool,
    pub allows_analytics: bool,
    pub encryption_public_key: EncryptionPublicKey,
    pub signature_public_key: Ed25519PublicKey,
}

/// Password salt length in bytes.
pub const PASSWORD_SALT_LEN: usize = 16;

/// A per-account random salt and the Argon2id password hash under it.
///
/// The account store keeps one to check logins; the device keeps a copy so it
/// can confirm the password before re-encrypting a backup.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PasswordVerifier {
    #[serde(rename = "passwordSalt", with = "hex_array")]
    pub salt: [u8; PASSWORD_SALT_LEN],
    #[serde(rename = "passwordHash", with = "hex_array")]
    pub hash: [u8; 32],
}

/// Check a display name: ASCII alphanumeric, 1 to 20 characters.
pub fn validate_display_name(name: &str) -> Result<(), ProfileError> {
    if name.is_empty() || name.chars().count() > MAX_DISPLAY_NAME_LEN {
        return Err(ProfileError::DisplayNameLength);
    }
    if !name.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(ProfileError::DisplayNameCharset);
    }
    Ok(())
}

/// The cached proof of a visit. At most one per location.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationSignature {
    pub sig: String,
    pub msg: String,
    pub timestamp: Timestamp,
    pub event_id: EventId,
    pub signature_public_key: String,
}

impl LocationSignature {
    /// The visitor number encoded in the signed message, if any.
    pub fn visitor_number(&self) -> Option<u32> {
        extract_counter_from_message(&self.msg)
    }

    fn order_key(&self) -> (Timestamp, EventId) {
        (self.timestamp, self.event_id)
    }
}

/// A person this user has tapped.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Connection {
    pub person_id: String,
    pub display_name: String,
    pub signature_public_key: Ed25519PublicKey,
    pub first_tapped_at: Timestamp,
    pub tap_count: u32,
    last_event: (Timestamp, EventId),
}

/// Whether an event changed the log.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FoldOutcome {
    Applied,
    Duplicate,
}

/// Counts from folding a batch.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FoldSummary {
    pub applied: usize,
    pub duplicates: usize,
}

/// Everything a device knows about its user.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalState {
    pub auth_token: Option<AuthToken>,
    pub keys: Option<KeyBundle>,
    pub profile: Option<Profile>,
    pub password_verifier: Option<PasswordVerifier>,
    pub activities: BTreeMap<EventId, ActivityEvent>,
    pub location_signatures: BTreeMap<LocationId, LocationSignature>,
    pub connections: BTreeMap<String, Connection>,
    pub redeemed_items: BTreeSet<QrId>,
    pub cursor: Option<LogCursor>,
}

impl LocalState {
    /// True if the state holds keys, a profile and an unexpired token.
    pub fn is_logged_in(&self, now: Timestamp) -> bool {
        self.keys.is_some()
            && self.profile.is_some()
            && self.auth_token.as_ref().is_some_and(|t| !t.is_expired(now))
    }

    pub fn contains(&self, id: &EventId) -> bool {
        self.activities.contains_key(id)
    }

    /// Fold one event. Re-folding a known id is a no-op.
    pub fn apply(&mut self, event: ActivityEvent) -> FoldOutcome {
        if self.activities.contains_key(&event.id) {
            return FoldOutcome::Duplicate;
        }
        self.derive(&event);
        self.activities.insert(event.id, event);
        FoldOutcome::Applied
    }

    /// Fold a batch in `(timestamp, id)` order.
    pub fn apply_all(&mut self, mut events: Vec<ActivityEvent>) -> FoldSummary {
        events.sort_by(ActivityEvent::fold_order);
        let mut summary = FoldSummary::default();
        for event in events {
            match self.apply(event) {
                FoldOutcome::Applied => summary.applied += 1,
                FoldOutcome::Duplicate => summary.duplicates += 1,
            }
        }
        summary
    }

    /// The activity log in fold order.
    pub fn ordered_activities(&self) -> Vec<&ActivityEvent> {
        let mut events: Vec<_> = self.activities.values().collect();
        events.sort_by(|a, b| ActivityEvent::fold_order(a, b));
        events
    }

    /// The cached signature for a location, if this user has visited it.
    pub fn location_signature(&self, location_id: &LocationId) -> Option<&LocationSignature> {
        self.location_signatures.get(location_id)
    }

    /// Drop everything, credentials included.
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    fn derive(&mut self, event: &ActivityEvent) {
        let key = event.order_key();
        match &event.payload {
            ActivityPayload::Registered => {}
            ActivityPayload::LocationTap {
                location_id,
                signature_public_key,
                signature_message,
                signature,
                ..
            } => {
                let candidate = LocationSignature {
                    sig: signature.clone(),
                    msg: signature_message.clone(),
                    timestamp: event.timestamp,
                    event_id: event.id,
                    signature_public_key: signature_public_key.clone(),
                };
                match self.location_signatures.get(location_id) {
                    Some(existing) if existing.order_key() <= candidate.order_key() => {}
                    _ => {
                        self.location_signatures.insert(location_id.clone(), candidate);
                    }
                }
            }
            ActivityPayload::PersonTap {
                person_id,
                display_name,
                signature_public_key,
                ..
            } => {
                let connection = self
                    .connections
                    .entry(person_id.clone())
                    .or_insert_with(|| Connection {
                        person_id: person_id.clone(),
                        display_name: display_name.clone(),
                        signature_public_key: *signature_public_key,
                        first_tapped_at: event.timestamp,
                        tap_count: 0,
                        last_event: key,
                    });
                connection.tap_count += 1;
                connection.first_tapped_at = connection.first_tapped_at.min(event.timestamp);
                if key >= connection.last_event {
                    connection.last_event = key;
                    connection.display_name = display_name.clone();
                    connection.signature_public_key = *signature_public_key;
                }
            }
            ActivityPayload::ItemRedeemed { qr_id, .. } => {
                self.redeemed_items.insert(qr_id.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn location_event(ts: Timestamp, id: u8, location: &str, msg: &str) -> ActivityEvent {
        ActivityEvent {
            id: EventId::from_bytes([id; 16]),
            timestamp: ts,
            sender_public_key: EncryptionPublicKey::from_bytes([1; 32]),
            recipient_public_key: EncryptionPublicKey::from_bytes([1; 32]),
            payload: ActivityPayload::LocationTap {
                location_id: LocationId::from(location),
                location_name: "Gallery".into(),
                signature_public_key: "pk".into(),
                signature_message: msg.into(),
                signature: format!("sig-{id}"),
            },
        }
    }

    fn person_event(ts: Timestamp, id: u8, person: &str, name: &str) -> ActivityEvent {
        ActivityEvent {
            id: EventId::from_bytes([id; 16]),
            timestamp: ts,
            sender_public_key: EncryptionPublicKey::from_bytes([1; 32]),
            recipient_public_key: EncryptionPublicKey::from_bytes([1; 32]),
            payload: ActivityPayload::PersonTap {
                person_id: person.into(),
                display_name: name.into(),
                signature_public_key: Ed25519PublicKey::from_bytes([2; 32]),
                counter_message: None,
                signature: None,
            },
        }
    }

    #[test]
    fn test_refold_is_noop() {
        let mut state = LocalState::default();
        let event = person_event(10, 1, "p1", "alice");
        assert_eq!(state.apply(event.clone()), FoldOutcome::Applied);
        let snapshot = state.clone();
        assert_eq!(state.apply(event), FoldOutcome::Duplicate);
        assert_eq!(state, snapshot);
        assert_eq!(state.connections["p1"].tap_count, 1);
    }

    #[test]
    fn test_earliest_location_signature_wins() {
        let mut state = LocalState::default();
        state.apply(location_event(20, 2, "loc", "00000002"));
        state.apply(location_event(10, 1, "loc", "00000001"));
        let sig = state.location_signature(&"loc".into()).unwrap();
        assert_eq!(sig.timestamp, 10);
        assert_eq!(sig.visitor_number(), Some(1));
        assert_eq!(state.activities.len(), 2);
    }

    #[test]
    fn test_display_name_validation() {
        assert!(validate_display_name("alice42").is_ok());
        assert_eq!(validate_display_name(""), Err(ProfileError::DisplayNameLength));
        assert_eq!(
            validate_display_name("abcdefghijklmnopqrstu"),
            Err(ProfileError::DisplayNameLength)
        );
        assert_eq!(validate_display_name("al ice"), Err(ProfileError::DisplayNameCharset));
        assert_eq!(validate_display_name("ålice"), Err(ProfileError::DisplayNameCharset));
    }

    #[test]
    fn test_key_bundle_debug_redacts_private_keys() {
        let keys = KeyBundle {
            encryption_private_key: [0xaa; 32],
            encryption_public_key: EncryptionPublicKey::from_bytes([1; 32]),
            signature_private_key: [0xbb; 32],
            signature_public_key: Ed25519PublicKey::from_bytes([2; 32]),
        };
        let debug = format!("{:?}", keys);
        assert!(!debug.contains("aaaa"));
        assert!(!debug.contains("bbbb"));
    }

    #[test]
    fn test_state_json_roundtrip() {
        let mut state = LocalState::default();
        state.apply(location_event(1, 1, "loc", "00000001"));
        state.cursor = Some(LogCursor(3));
        let json = serde_json::to_string(&state).unwrap();
        assert_eq!(serde_json::from_str::<LocalState>(&json).unwrap(), state);
    }

    fn arb_event() -> impl Strategy<Value = ActivityEvent> {
        (0u64..50, 0u8..40, 0u8..3, any::<bool>()).prop_map(|(ts, id, target, is_location)| {
            if is_location {
                location_event(ts, id, &format!("loc{target}"), &format!("{:08x}", ts))
            } else {
                person_event(ts, id, &format!("p{target}"), &format!("name{ts}"))
            }
        })
    }

    proptest! {
        #[test]
        fn prop_fold_is_order_independent(
            events in proptest::collection::vec(arb_event(), 0..24),
            seed in any::<u64>(),
        ) {
            let mut seen = BTreeSet::new();
            let events: Vec<_> = events.into_iter().filter(|e| seen.insert(e.id)).collect();

            let mut forward = LocalState::default();
            for e in events.iter().cloned() {
                forward.apply(e);
            }

            let mut shuffled = events.clone();
            let len = shuffled.len();
            if len > 1 {
                for i in 0..len {
                    let j = (seed.wrapping_mul(i as u64 + 1) % len as u64) as usize;
                    shuffled.swap(i, j);
                }
            }
            shuffled.reverse();
            let mut backward = LocalState::default();
            for e in shuffled.into_iter().chain(events.iter().cloned()) {
                backward.apply(e);
            }

            prop_assert_eq!(forward, backward);
        }
    }
}
