//! Proptest generators for property-based testing.

use proptest::prelude::*;

use tapquest_core::{
    ActivityEvent, ActivityPayload, Ed25519PublicKey, EncryptionPublicKey, EventId, Keypair,
    LocationId, QrId, Timestamp,
};

/// Generate a random keypair.
pub fn keypair() -> impl Strategy<Value = Keypair> {
    any::<[u8; 32]>().prop_map(|seed| Keypair::from_seed(&seed))
}

/// Generate a random Ed25519PublicKey.
pub fn public_key() -> impl Strategy<Value = Ed25519PublicKey> {
    keypair().prop_map(|kp| kp.public_key())
}

pub fn encryption_key() -> impl Strategy<Value = EncryptionPublicKey> {
    any::<[u8; 32]>().prop_map(EncryptionPublicKey::from_bytes)
}

pub fn event_id() -> impl Strategy<Value = EventId> {
    any::<[u8; 16]>().prop_map(EventId::from_bytes)
}

/// Millisecond timestamps in a narrow window, so collisions happen.
pub fn timestamp() -> impl Strategy<Value = Timestamp> {
    1_700_000_000_000u64..1_700_000_000_050u64
}

/// A display name that passes validation.
pub fn display_name() -> impl Strategy<Value = String> {
    "[A-Za-z0-9]{1,20}"
}

/// Eight hex digits of counter followed by up to eight bytes of nonce.
pub fn counter_message() -> impl Strategy<Value = String> {
    (any::<u32>(), prop::collection::vec(any::<u8>(), 0..8)).prop_map(|(counter, tail)| {
        let mut bytes = counter.to_be_bytes().to_vec();
        bytes.extend(tail);
        hex::encode(bytes)
    })
}

/// A small pool of location ids, so generated logs revisit locations.
pub fn location_id() -> impl Strategy<Value = LocationId> {
    prop::sample::select(vec!["pier", "gate", "cafe", "library"]).prop_map(LocationId::from)
}

pub fn activity_payload() -> impl Strategy<Value = ActivityPayload> {
    prop_oneof![
        Just(ActivityPayload::Registered),
        (display_name(), public_key(), prop::option::of(counter_message())).prop_map(
            |(name, key, counter_message)| ActivityPayload::PersonTap {
                person_id: key.to_hex(),
                display_name: name,
                signature_public_key: key,
                signature: counter_message.as_ref().map(|_| "00".repeat(64)),
                counter_message,
            }
        ),
        (location_id(), public_key(), counter_message()).prop_map(|(id, key, message)| {
            ActivityPayload::LocationTap {
                location_name: id.to_string(),
                location_id: id,
                signature_public_key: key.to_hex(),
                signature_message: message,
                signature: "00".repeat(64),
            }
        }),
        "[a-z]{1,8}".prop_map(|item| ActivityPayload::ItemRedeemed {
            item_name: item.to_uppercase(),
            qr_id: QrId::new(format!("qr-{item}")),
            item_id: item,
        }),
    ]
}

/// Parameters for generating an activity event.
#[derive(Debug, Clone)]
pub struct EventParams {
    pub id: EventId,
    pub timestamp: Timestamp,
    pub sender: EncryptionPublicKey,
    pub recipient: EncryptionPublicKey,
    pub payload: ActivityPayload,
}

impl Arbitrary for EventParams {
    type Parameters = ();
    type Strategy = BoxedStrategy<Self>;

    fn arbitrary_with(_: Self::Parameters) -> Self::Strategy {
        (
            event_id(),
            timestamp(),
            encryption_key(),
            prop::bool::ANY,
            encryption_key(),
            activity_payload(),
        )
            .prop_map(|(id, timestamp, sender, to_self, other, payload)| EventParams {
                id,
                timestamp,
                sender,
                recipient: if to_self { sender } else { other },
                payload,
            })
            .boxed()
    }
}

pub fn event_from_params(params: &EventParams) -> ActivityEvent {
    ActivityEvent {
        id: params.id,
        timestamp: params.timestamp,
        sender_public_key: params.sender,
        recipient_public_key: params.recipient,
        payload: params.payload.clone(),
    }
}

/// A log of up to `max_len` events with distinct ids.
pub fn activity_log(max_len: usize) -> impl Strategy<Value = Vec<ActivityEvent>> {
    prop::collection::btree_map(event_id(), any::<EventParams>(), 0..=max_len).prop_map(|events| {
        events
            .into_iter()
            .map(|(id, params)| ActivityEvent {
                id,
                ..event_from_params(&params)
            })
            .collect()
    })
}
