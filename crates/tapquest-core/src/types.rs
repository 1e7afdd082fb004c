//! Strong type definitions for tapquest.
//!
//! All identifiers are newtypes to prevent misuse at compile time.

use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::encoding::{decode_hex_array, hex_array};
use crate::error::CoreError;

/// Milliseconds since the Unix epoch.
pub type Timestamp = u64;

/// Current time in milliseconds.
pub fn now_millis() -> Timestamp {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as Timestamp)
        .unwrap_or(0)
}

/// A 16-byte random event identifier.
///
/// Ids are generated by the sender and never reused. Together with the event
/// timestamp they form the fold ordering key `(timestamp, id)`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EventId(#[serde(with = "hex_array")] pub [u8; 16]);

impl EventId {
    /// Generate a fresh random id.
    pub fn random() -> Self {
        let mut bytes = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    /// Convert to hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from hex string.
    pub fn from_hex(s: &str) -> Result<Self, CoreError> {
        decode_hex_array(s).map(Self)
    }
}

impl fmt::Debug for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EventId({})", &self.to_hex()[..16])
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", &self.to_hex()[..16])
    }
}

impl From<[u8; 16]> for EventId {
    fn from(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }
}

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }
    };
}

string_id!(
    /// Directory identifier of a physical location.
    LocationId
);
string_id!(
    /// Hardware id of an NFC chip, as reported in its CMAC payload.
    ChipId
);
string_id!(
    /// Identifier of a redeemable QR code.
    QrId
);

/// A bearer token issued by the account store.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthToken {
    pub value: String,
    pub expires_at: Timestamp,
}

impl AuthToken {
    /// True once `now` has reached the expiry instant.
    pub fn is_expired(&self, now: Timestamp) -> bool {
        now >= self.expires_at
    }
}

impl fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthToken")
            .field("value", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Position in the relay's per-user message sequence.
///
/// Event timestamps are sealed inside messages, so the relay numbers what it
/// stores and incremental fetches resume after the highest number applied.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LogCursor(pub u64);

impl LogCursor {
    pub fn advance(self, seq: u64) -> Self {
        Self(self.0.max(seq))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_id_hex_roundtrip() {
        let id = EventId::from_bytes([0x42; 16]);
        assert_eq!(EventId::from_hex(&id.to_hex()).unwrap(), id);
        assert!(EventId::from_hex("4242").is_err());
    }

    #[test]
    fn test_event_id_display() {
        let id = EventId::from_bytes([0xab; 16]);
        assert_eq!(format!("{}", id), "abababababababab");
    }

    #[test]
    fn test_random_ids_differ() {
        assert_ne!(EventId::random(), EventId::random());
    }

    #[test]
    fn test_auth_token_expiry() {
        let token = AuthToken {
            value: "secret".into(),
            expires_at: 1_000,
        };
        assert!(!token.is_expired(999));
        assert!(token.is_expired(1_000));
        assert!(!format!("{:?}", token).contains("secret"));
    }

    #[test]
    fn test_auth_token_wire_shape() {
        let token = AuthToken {
            value: "t".into(),
            expires_at: 5,
        };
        let json = serde_json::to_string(&token).unwrap();
        assert_eq!(json, r#"{"value":"t","expiresAt":5}"#);
    }

    #[test]
    fn test_cursor_never_moves_back() {
        assert_eq!(LogCursor(5).advance(3), LogCursor(5));
        assert_eq!(LogCursor(5).advance(9), LogCursor(9));
    }
}
