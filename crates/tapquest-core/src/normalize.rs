//! Signature-card schemes.
//!
//! Some card firmwares emit ECDSA signatures whose `s` scalar sits in the
//! upper half of the curve order. Both `s` and `n - s` verify mathematically,
//! but strict verifiers only accept the low form. A [`SigCardScheme`]
//! canonicalizes first and verifies second, so adding a new curve means adding
//! a new scheme rather than touching the verifier.

use k256::ecdsa::signature::Verifier;
use k256::ecdsa::{Signature, VerifyingKey};

/// A curve-specific normalization and verification strategy.
pub trait SigCardScheme: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Canonicalize a raw signature encoding. Returns `None` if it cannot be
    /// parsed at all.
    fn normalize(&self, raw_signature: &str) -> Option<String>;

    /// Verify a canonical signature over `message` with `public_key`.
    fn verify(&self, public_key: &str, message: &str, signature: &str) -> bool;
}

/// secp256k1 ECDSA over SHA-256, with low-s normalization.
///
/// Signatures may be 64-byte compact `r || s` or DER. Public keys are SEC1
/// (compressed or uncompressed). Messages are hex; the card signs the decoded
/// bytes.
#[derive(Clone, Copy, Debug, Default)]
pub struct Secp256k1LowS;

impl Secp256k1LowS {
    fn parse(raw: &str) -> Option<Signature> {
        let bytes = hex::decode(raw.trim().trim_start_matches("0x")).ok()?;
        if bytes.len() == 64 {
            Signature::from_slice(&bytes).ok()
        } else {
            Signature::from_der(&bytes).ok()
        }
    }
}

impl SigCardScheme for Secp256k1LowS {
    fn name(&self) -> &'static str {
        "secp256k1-low-s"
    }

    fn normalize(&self, raw_signature: &str) -> Option<String> {
        let sig = Self::parse(raw_signature)?;
        let low = sig.normalize_s().unwrap_or(sig);
        Some(hex::encode(low.to_bytes()))
    }

    fn verify(&self, public_key: &str, message: &str, signature: &str) -> bool {
        let Ok(key_bytes) = hex::decode(public_key.trim().trim_start_matches("0x")) else {
            return false;
        };
        let Ok(verifying_key) = VerifyingKey::from_sec1_bytes(&key_bytes) else {
            return false;
        };
        let Ok(message) = hex::decode(message.trim()) else {
            return false;
        };
        let Some(sig) = Self::parse(signature) else {
            return false;
        };
        verifying_key.verify(&message, &sig).is_ok()
    }
}
