//! Tap payloads and the directory records they resolve to.
//!
//! Payload fields are kept as the raw strings the tap produced. They are only
//! trusted after [`crate::verify`] has checked them.

use serde::{Deserialize, Serialize};

use crate::crypto::{Ed25519PublicKey, EncryptionPublicKey};
use crate::types::{ChipId, LocationId};

/// A person's counter message, signed with their Ed25519 key.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonTap {
    pub counter_message: String,
    pub signature: String,
    pub signer_public_key: String,
}

/// A signed visit proof for a location.
///
/// This is also the shape of a successful location classification: the
/// location record plus the message and signature that prove this visit.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationTap {
    pub location_id: LocationId,
    pub name: String,
    pub signature_public_key: String,
    pub signature_message: String,
    pub signature: String,
}

/// Raw output of a signature card: secp256k1 key, message and signature.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SigCardTap {
    pub signature_public_key: String,
    pub signature_message: String,
    pub raw_signature: String,
}

/// Query string emitted by a CMAC chip, e.g. `uid=..&ctr=..&cmac=..`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CmacParams {
    pub raw: String,
}

/// Every shape a tap can arrive in.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TapPayload {
    Person(PersonTap),
    Location(LocationTap),
    SigCard(SigCardTap),
    Cmac(CmacParams),
}

/// The identity a verified tap proves, used as the directory lookup key.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum TapIdentity {
    Chip(ChipId),
    /// Hex SEC1 public key of a signature card.
    SigCard(String),
    Person(Ed25519PublicKey),
    Location(LocationId),
}

impl TapIdentity {
    /// Whether an unknown identity of this kind should be registered as a
    /// location rather than a person.
    pub fn defaults_to_location(&self) -> bool {
        matches!(self, TapIdentity::SigCard(_) | TapIdentity::Location(_))
    }
}

/// A message and signature pair.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedMessage {
    pub message: String,
    pub signature: String,
}

/// A registered person, as the directory returns it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonRecord {
    pub person_id: String,
    pub display_name: String,
    pub encryption_public_key: EncryptionPublicKey,
    pub signature_public_key: Ed25519PublicKey,
    /// Counter message signed for this tap, when the person's chip produced one.
    #[serde(default)]
    pub counter_tap: Option<SignedMessage>,
}

impl PersonRecord {
    /// The signed counter message as a verifiable [`PersonTap`].
    pub fn person_tap(&self) -> Option<PersonTap> {
        self.counter_tap.as_ref().map(|signed| PersonTap {
            counter_message: signed.message.clone(),
            signature: signed.signature.clone(),
            signer_public_key: self.signature_public_key.to_hex(),
        })
    }
}

/// A registered location, as the directory returns it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationRecord {
    pub location_id: LocationId,
    pub name: String,
    pub signature_public_key: String,
    /// Signature issued by the server for this tap. Takes precedence over
    /// whatever the tapped card produced.
    #[serde(default)]
    pub server_signature: Option<SignedMessage>,
}

/// Result of a directory lookup for a known identity.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DirectoryEntry {
    Person(PersonRecord),
    Location(LocationRecord),
    /// Chip handed out for a person but not yet claimed.
    UnboundPersonChip,
    /// Chip handed out for a location but not yet claimed.
    UnboundLocationChip,
}
