//! Tap classification.
//!
//! Turns a verification outcome plus a directory lookup into one of five
//! terminal states. Classification is deterministic and reads the user's
//! cached location signatures so an already-visited location comes back
//! together with its existing proof.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::state::LocationSignature;
use crate::tap::{DirectoryEntry, LocationRecord, LocationTap, PersonRecord, TapIdentity};
use crate::types::LocationId;
use crate::verify::{TapProof, TapVerification};

/// Terminal classification of a single tap.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "code", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TapState {
    CmacInvalid,
    PersonNotRegistered {
        identity: TapIdentity,
    },
    LocationNotRegistered {
        identity: TapIdentity,
    },
    ValidPerson {
        person: PersonRecord,
    },
    ValidLocation {
        location: LocationTap,
        existing_signature: Option<LocationSignature>,
    },
}

impl TapState {
    pub fn code(&self) -> &'static str {
        match self {
            TapState::CmacInvalid => "CMAC_INVALID",
            TapState::PersonNotRegistered { .. } => "PERSON_NOT_REGISTERED",
            TapState::LocationNotRegistered { .. } => "LOCATION_NOT_REGISTERED",
            TapState::ValidPerson { .. } => "VALID_PERSON",
            TapState::ValidLocation { .. } => "VALID_LOCATION",
        }
    }
}

fn location_response(record: LocationRecord, proof: &TapProof) -> Option<LocationTap> {
    let (signature_message, signature) = match (&record.server_signature, proof) {
        (Some(server), _) => (server.message.clone(), server.signature.clone()),
        (None, TapProof::Signed { message, signature }) => (message.clone(), signature.clone()),
        (None, TapProof::Cmac { .. }) => return None,
    };
    Some(LocationTap {
        location_id: record.location_id,
        name: record.name,
        signature_public_key: record.signature_public_key,
        signature_message,
        signature,
    })
}

/// Classify a verified tap.
///
/// `entry` is the directory's answer for the verified identity, `None` when
/// the identity is unknown. Unknown chips are people to be registered, unknown
/// signature cards are locations.
pub fn classify(
    verification: TapVerification,
    entry: Option<DirectoryEntry>,
    location_signatures: &BTreeMap<LocationId, LocationSignature>,
) -> TapState {
    let verified = match verification {
        TapVerification::Valid(verified) => verified,
        TapVerification::Invalid => return TapState::CmacInvalid,
    };

    let state = match entry {
        None if verified.identity.defaults_to_location() => TapState::LocationNotRegistered {
            identity: verified.identity,
        },
        None => TapState::PersonNotRegistered {
            identity: verified.identity,
        },
        Some(DirectoryEntry::UnboundPersonChip) => TapState::PersonNotRegistered {
            identity: verified.identity,
        },
        Some(DirectoryEntry::UnboundLocationChip) => TapState::LocationNotRegistered {
            identity: verified.identity,
        },
        Some(DirectoryEntry::Person(person)) => TapState::ValidPerson { person },
        Some(DirectoryEntry::Location(record)) => {
            let existing_signature = location_signatures.get(&record.location_id).cloned();
            match location_response(record, &verified.proof) {
                Some(location) => TapState::ValidLocation {
                    location,
                    existing_signature,
                },
                None => TapState::CmacInvalid,
            }
        }
    };
    debug!(code = state.code(), "classified tap");
    state
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{Ed25519PublicKey, EncryptionPublicKey};
    use crate::tap::SignedMessage;
    use crate::types::{ChipId, EventId};
    use crate::verify::VerifiedTap;

    fn chip_tap() -> TapVerification {
        TapVerification::Valid(VerifiedTap {
            identity: TapIdentity::Chip(ChipId::from("04a1")),
            proof: TapProof::Cmac {
                nonce: "aa".into(),
                counter: 1,
            },
        })
    }

    fn card_tap() -> TapVerification {
        TapVerification::Valid(VerifiedTap {
            identity: TapIdentity::SigCard("02ab".into()),
            proof: TapProof::Signed {
                message: "00000009".into(),
                signature: "cardsig".into(),
            },
        })
    }

    fn location(server_signature: Option<SignedMessage>) -> DirectoryEntry {
        DirectoryEntry::Location(LocationRecord {
            location_id: "cafe".into(),
            name: "Cafe".into(),
            signature_public_key: "02ab".into(),
            server_signature,
        })
    }

    #[test]
    fn test_invalid_verification() {
        let state = classify(TapVerification::Invalid, Some(location(None)), &BTreeMap::new());
        assert_eq!(state, TapState::CmacInvalid);
    }

    #[test]
    fn test_unknown_identities() {
        let none = BTreeMap::new();
        assert_eq!(classify(chip_tap(), None, &none).code(), "PERSON_NOT_REGISTERED");
        assert_eq!(classify(card_tap(), None, &none).code(), "LOCATION_NOT_REGISTERED");
        assert_eq!(
            classify(chip_tap(), Some(DirectoryEntry::UnboundLocationChip), &none).code(),
            "LOCATION_NOT_REGISTERED"
        );
        assert_eq!(
            classify(card_tap(), Some(DirectoryEntry::UnboundPersonChip), &none).code(),
            "PERSON_NOT_REGISTERED"
        );
    }

    #[test]
    fn test_valid_person() {
        let person = PersonRecord {
            person_id: "p1".into(),
            display_name: "alice".into(),
            encryption_public_key: EncryptionPublicKey::from_bytes([1; 32]),
            signature_public_key: Ed25519PublicKey::from_bytes([2; 32]),
            counter_tap: None,
        };
        let state = classify(chip_tap(), Some(DirectoryEntry::Person(person.clone())), &BTreeMap::new());
        assert_eq!(state, TapState::ValidPerson { person });
    }

    #[test]
    fn test_card_signature_used_without_server_signature() {
        let state = classify(card_tap(), Some(location(None)), &BTreeMap::new());
        match state {
            TapState::ValidLocation {
                location,
                existing_signature,
            } => {
                assert_eq!(location.signature, "cardsig");
                assert_eq!(location.signature_message, "00000009");
                assert!(existing_signature.is_none());
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_server_signature_preferred() {
        let server = SignedMessage {
            message: "00000002".into(),
            signature: "serversig".into(),
        };
        let state = classify(card_tap(), Some(location(Some(server))), &BTreeMap::new());
        let TapState::ValidLocation { location, .. } = state else {
            panic!("expected valid location");
        };
        assert_eq!(location.signature, "serversig");
    }

    #[test]
    fn test_chip_location_without_signature_is_invalid() {
        assert_eq!(classify(chip_tap(), Some(location(None)), &BTreeMap::new()), TapState::CmacInvalid);
    }

    #[test]
    fn test_already_visited_location_carries_existing_signature() {
        let existing = LocationSignature {
            sig: "old".into(),
            msg: "00000001".into(),
            timestamp: 5,
            event_id: EventId::from_bytes([3; 16]),
            signature_public_key: "02ab".into(),
        };
        let mut sigs = BTreeMap::new();
        sigs.insert(LocationId::from("cafe"), existing.clone());

        let state = classify(card_tap(), Some(location(None)), &sigs);
        let TapState::ValidLocation {
            existing_signature, ..
        } = state
        else {
            panic!("expected valid location");
        };
        assert_eq!(existing_signature, Some(existing));
    }
}
