//! Tap verification.
//!
//! ## Overview
//!
//! Every verifier is a pure function from a raw payload to a typed outcome.
//! Malformed input is an `Invalid` outcome, never an error or a panic, so
//! callers can match exhaustively without a failure path.
//!
//! | Payload | Scheme |
//! |---|---|
//! | CMAC chip | counter-based CMAC, recomputed by a [`ChipAuthenticator`] |
//! | Signature card | ECDSA via a pluggable [`SigCardScheme`] |
//! | Person / location | Ed25519 over the signed message |

use crate::crypto::{Ed25519PublicKey, Ed25519Signature};
use crate::normalize::SigCardScheme;
use crate::tap::{LocationTap, PersonTap, SigCardTap, TapIdentity, TapPayload};
use crate::types::ChipId;

/// Length of a chip uid in bytes.
pub const CHIP_UID_LEN: usize = 7;
/// Length of the chip counter in bytes.
pub const CHIP_COUNTER_LEN: usize = 3;
/// Length of a truncated chip CMAC in bytes.
pub const CHIP_CMAC_LEN: usize = 8;

/// Recomputes chip CMACs. Key material lives with the implementor.
pub trait ChipAuthenticator: Send + Sync {
    fn verify(&self, chip_id: &ChipId, counter: u32, cmac: &[u8; CHIP_CMAC_LEN]) -> bool;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CmacVerification {
    Valid {
        chip_id: ChipId,
        /// Hex CMAC; unique per counter value.
        nonce: String,
        counter: u32,
    },
    Invalid,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SigCardVerification {
    /// Carries the normalized signature hex.
    Valid { signature: String },
    Invalid,
}

/// Evidence a verified tap carries forward into classification.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TapProof {
    Cmac { nonce: String, counter: u32 },
    Signed { message: String, signature: String },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VerifiedTap {
    pub identity: TapIdentity,
    pub proof: TapProof,
}

/// Outcome of verifying any tap payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TapVerification {
    Valid(VerifiedTap),
    Invalid,
}

impl TapVerification {
    pub fn is_valid(&self) -> bool {
        matches!(self, TapVerification::Valid(_))
    }
}

struct CmacFields {
    uid: [u8; CHIP_UID_LEN],
    counter: u32,
    cmac: [u8; CHIP_CMAC_LEN],
}

fn parse_cmac_params(raw: &str) -> Option<CmacFields> {
    let (mut uid, mut ctr, mut cmac) = (None, None, None);
    let query = raw.trim().trim_start_matches('?');
    for pair in query.split('&') {
        let Some((key, value)) = pair.split_once('=') else {
            continue;
        };
        match key.to_ascii_lowercase().as_str() {
            "uid" => uid = Some(value),
            "ctr" => ctr = Some(value),
            "cmac" => cmac = Some(value),
            _ => {}
        }
    }

    let uid: [u8; CHIP_UID_LEN] = hex::decode(uid?).ok()?.try_into().ok()?;
    let ctr: [u8; CHIP_COUNTER_LEN] = hex::decode(ctr?).ok()?.try_into().ok()?;
    let cmac: [u8; CHIP_CMAC_LEN] = hex::decode(cmac?).ok()?.try_into().ok()?;
    let counter = u32::from_be_bytes([0, ctr[0], ctr[1], ctr[2]]);
    Some(CmacFields { uid, counter, cmac })
}

/// Verify a CMAC chip payload such as `uid=04a1..&ctr=00002a&cmac=..`.
pub fn verify_cmac_tap(raw_params: &str, authenticator: &dyn ChipAuthenticator) -> CmacVerification {
    let Some(fields) = parse_cmac_params(raw_params) else {
        return CmacVerification::Invalid;
    };
    let chip_id = ChipId::new(hex::encode(fields.uid));
    if !authenticator.verify(&chip_id, fields.counter, &fields.cmac) {
        return CmacVerification::Invalid;
    }
    CmacVerification::Valid {
        chip_id,
        nonce: hex::encode(fields.cmac),
        counter: fields.counter,
    }
}

/// Canonicalize and verify a signature-card tap.
pub fn verify_sig_card_tap(
    signature_public_key: &str,
    signature_message: &str,
    raw_signature: &str,
    scheme: &dyn SigCardScheme,
) -> SigCardVerification {
    let Some(signature) = scheme.normalize(raw_signature) else {
        return SigCardVerification::Invalid;
    };
    if scheme.verify(signature_public_key, signature_message, &signature) {
        SigCardVerification::Valid { signature }
    } else {
        SigCardVerification::Invalid
    }
}

fn verify_ed25519(public_key: &str, message: &str, signature: &str) -> Option<Ed25519PublicKey> {
    let key = Ed25519PublicKey::from_hex(public_key).ok()?;
    let sig = Ed25519Signature::from_hex(signature).ok()?;
    key.verify(message.as_bytes(), &sig).ok()?;
    Some(key)
}

/// Verify a person's signed counter message.
pub fn verify_person_tap(tap: &PersonTap) -> bool {
    verify_ed25519(&tap.signer_public_key, &tap.counter_message, &tap.signature).is_some()
}

/// Verify a location's signed visit message.
pub fn verify_location_tap(tap: &LocationTap) -> bool {
    verify_ed25519(&tap.signature_public_key, &tap.signature_message, &tap.signature).is_some()
}

/// Verify any payload and extract the identity it proves.
pub fn verify_tap(
    payload: &TapPayload,
    authenticator: &dyn ChipAuthenticator,
    scheme: &dyn SigCardScheme,
) -> TapVerification {
    let verified = match payload {
        TapPayload::Cmac(params) => match verify_cmac_tap(&params.raw, authenticator) {
            CmacVerification::Valid {
                chip_id,
                nonce,
                counter,
            } => VerifiedTap {
                identity: TapIdentity::Chip(chip_id),
                proof: TapProof::Cmac { nonce, counter },
            },
            CmacVerification::Invalid => return TapVerification::Invalid,
        },
        TapPayload::SigCard(SigCardTap {
            signature_public_key,
            signature_message,
            raw_signature,
        }) => match verify_sig_card_tap(signature_public_key, signature_message, raw_signature, scheme) {
            SigCardVerification::Valid { signature } => VerifiedTap {
                identity: TapIdentity::SigCard(signature_public_key.trim().to_ascii_lowercase()),
                proof: TapProof::Signed {
                    message: signature_message.clone(),
                    signature,
                },
            },
            SigCardVerification::Invalid => return TapVerification::Invalid,
        },
        TapPayload::Person(tap) => {
            match verify_ed25519(&tap.signer_public_key, &tap.counter_message, &tap.signature) {
                Some(key) => VerifiedTap {
                    identity: TapIdentity::Person(key),
                    proof: TapProof::Signed {
                        message: tap.counter_message.clone(),
                        signature: tap.signature.clone(),
                    },
                },
                None => return TapVerification::Invalid,
            }
        }
        TapPayload::Location(tap) => {
            if !verify_location_tap(tap) {
                return TapVerification::Invalid;
            }
            VerifiedTap {
                identity: TapIdentity::Location(tap.location_id.clone()),
                proof: TapProof::Signed {
                    message: tap.signature_message.clone(),
                    signature: tap.signature.clone(),
                },
            }
        }
    };
    TapVerification::Valid(verified)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::Keypair;
    use crate::normalize::Secp256k1LowS;
    use crate::tap::CmacParams;

    /// Accepts a CMAC equal to the first eight bytes of blake3(uid || ctr).
    struct HashAuthenticator;

    impl ChipAuthenticator for HashAuthenticator {
        fn verify(&self, chip_id: &ChipId, counter: u32, cmac: &[u8; CHIP_CMAC_LEN]) -> bool {
            expected_cmac(chip_id.as_str(), counter) == *cmac
        }
    }

    fn expected_cmac(uid_hex: &str, counter: u32) -> [u8; CHIP_CMAC_LEN] {
        let mut hasher = blake3::Hasher::new();
        hasher.update(uid_hex.as_bytes());
        hasher.update(&counter.to_be_bytes());
        let mut out = [0u8; CHIP_CMAC_LEN];
        out.copy_from_slice(&hasher.finalize().as_bytes()[..CHIP_CMAC_LEN]);
        out
    }

    fn params(uid: &str, counter: u32) -> String {
        let ctr = &hex::encode(counter.to_be_bytes())[2..];
        format!("uid={}&ctr={}&cmac={}", uid, ctr, hex::encode(expected_cmac(uid, counter)))
    }

    #[test]
    fn test_cmac_valid() {
        let raw = params("04a1b2c3d4e5f6", 42);
        match verify_cmac_tap(&raw, &HashAuthenticator) {
            CmacVerification::Valid {
                chip_id,
                nonce,
                counter,
            } => {
                assert_eq!(chip_id, ChipId::from("04a1b2c3d4e5f6"));
                assert_eq!(counter, 42);
                assert_eq!(nonce, hex::encode(expected_cmac("04a1b2c3d4e5f6", 42)));
            }
            CmacVerification::Invalid => panic!("expected valid"),
        }
    }

    #[test]
    fn test_cmac_param_order_and_extra_keys() {
        let uid = "04a1b2c3d4e5f6";
        let cmac = hex::encode(expected_cmac(uid, 7));
        let raw = format!("?cmac={}&foo=bar&ctr=000007&uid={}", cmac, uid);
        assert!(matches!(
            verify_cmac_tap(&raw, &HashAuthenticator),
            CmacVerification::Valid { counter: 7, .. }
        ));
    }

    #[test]
    fn test_cmac_invalid_cases() {
        let inputs = [
            String::new(),
            "uid=04a1b2c3d4e5f6&ctr=00002a".to_string(),
            "uid=zz&ctr=00002a&cmac=0000000000000000".to_string(),
            "uid=04a1b2c3d4e5f6&ctr=2a&cmac=0000000000000000".to_string(),
            "uid=04a1b2c3d4e5f6&ctr=00002a&cmac=0000000000000000".to_string(),
            // replayed cmac with a bumped counter
            params("04a1b2c3d4e5f6", 42).replace("ctr=00002a", "ctr=00002b"),
        ];
        for raw in inputs {
            assert_eq!(verify_cmac_tap(&raw, &HashAuthenticator), CmacVerification::Invalid, "{raw}");
        }
    }

    #[test]
    fn test_person_tap() {
        let keypair = Keypair::generate();
        let message = "0000000512345678";
        let mut tap = PersonTap {
            counter_message: message.into(),
            signature: keypair.sign(message.as_bytes()).to_hex(),
            signer_public_key: keypair.public_key().to_hex(),
        };
        assert!(verify_person_tap(&tap));

        tap.counter_message = "0000000612345678".into();
        assert!(!verify_person_tap(&tap));

        tap.signature = "xyz".into();
        assert!(!verify_person_tap(&tap));
    }

    #[test]
    fn test_verify_tap_location_identity() {
        let keypair = Keypair::generate();
        let message = "00000003";
        let tap = LocationTap {
            location_id: "loc-1".into(),
            name: "Library".into(),
            signature_public_key: keypair.public_key().to_hex(),
            signature_message: message.into(),
            signature: keypair.sign(message.as_bytes()).to_hex(),
        };
        let outcome = verify_tap(&TapPayload::Location(tap), &HashAuthenticator, &Secp256k1LowS);
        match outcome {
            TapVerification::Valid(v) => {
                assert_eq!(v.identity, TapIdentity::Location("loc-1".into()));
            }
            TapVerification::Invalid => panic!("expected valid"),
        }
    }

    #[test]
    fn test_verify_tap_malformed_cmac() {
        let payload = TapPayload::Cmac(CmacParams { raw: "%%%".into() });
        assert_eq!(
            verify_tap(&payload, &HashAuthenticator, &Secp256k1LowS),
            TapVerification::Invalid
        );
    }
}
