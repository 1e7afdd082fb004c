//! Signature-card test vectors.
//!
//! Each vector is a deterministic card key and a message. Generating it yields
//! the high-s signature a misbehaving card would emit and the low-s form every
//! verifier must normalize it to. ECDSA signing here is RFC 6979, so the same
//! vector always produces the same bytes and other implementations can be
//! checked against the exported JSON.

use serde::Serialize;
use tapquest_core::{Secp256k1LowS, SigCardScheme};

use crate::fixtures::SignatureCard;

/// A signature-card test vector.
#[derive(Debug, Clone)]
pub struct SigCardVector {
    /// Human-readable name for the vector.
    pub name: &'static str,
    /// Card private key. Must be a valid secp256k1 scalar.
    pub seed: [u8; 32],
    /// Signed message, hex. The card signs the decoded bytes.
    pub message: &'static str,
    /// Expected normalized signature (hex). Empty until pinned.
    pub expected_signature: &'static str,
}

/// What a vector produces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedSigCard {
    pub name: String,
    pub signature_public_key: String,
    pub signature_message: String,
    pub raw_signature: String,
    pub normalized_signature: String,
}

/// Get all signature-card vectors.
pub fn all_vectors() -> Vec<SigCardVector> {
    vec![
        SigCardVector {
            name: "counter 1",
            seed: [0x11; 32],
            message: "00000001",
            expected_signature: "",
        },
        SigCardVector {
            name: "counter 42 with nonce",
            seed: [0x11; 32],
            message: "0000002a0102030405060708",
            expected_signature: "",
        },
        SigCardVector {
            name: "max counter",
            seed: [0x42; 32],
            message: "ffffffff",
            expected_signature: "",
        },
        SigCardVector {
            name: "single byte message",
            seed: [0x7f; 32],
            message: "00",
            expected_signature: "",
        },
    ]
}

/// Sign a vector's message with its card, emitting high s.
///
/// Returns `None` if the message is not hex.
pub fn generate_from_vector(vector: &SigCardVector) -> Option<GeneratedSigCard> {
    let message = hex::decode(vector.message).ok()?;
    let card = SignatureCard::from_seed(&vector.seed);
    let raw = card.sign_high_s(&message);
    let normalized = card.sign_low_s(&message);
    Some(GeneratedSigCard {
        name: vector.name.to_string(),
        signature_public_key: card.public_key_hex(),
        signature_message: vector.message.to_string(),
        raw_signature: hex::encode(raw.to_bytes()),
        normalized_signature: hex::encode(normalized.to_bytes()),
    })
}

/// Run every vector through [`Secp256k1LowS`].
///
/// A vector passes when the scheme normalizes the raw signature to the
/// expected one and accepts it. Returns `(name, passed, normalized_hex)`.
pub fn verify_all_vectors() -> Vec<(String, bool, String)> {
    let scheme = Secp256k1LowS;
    all_vectors()
        .iter()
        .map(|v| {
            let Some(generated) = generate_from_vector(v) else {
                return (v.name.to_string(), false, String::new());
            };
            let Some(normalized) = scheme.normalize(&generated.raw_signature) else {
                return (v.name.to_string(), false, String::new());
            };
            let expected = if v.expected_signature.is_empty() {
                generated.normalized_signature.as_str()
            } else {
                v.expected_signature
            };
            let passed = normalized == expected
                && scheme.verify(&generated.signature_public_key, v.message, &normalized);
            (v.name.to_string(), passed, normalized)
        })
        .collect()
}

/// All vectors as pretty JSON, for other implementations.
pub fn vectors_json() -> serde_json::Result<String> {
    let generated: Vec<_> = all_vectors().iter().filter_map(generate_from_vector).collect();
    serde_json::to_string_pretty(&generated)
}
