//! Encoding helpers shared by every tapquest crate.
//!
//! Keys and signatures cross the wire as lowercase hex strings; event bodies
//! are CBOR before they are sealed.

use serde::{de::DeserializeOwned, Serialize};

use crate::error::CoreError;

/// Serde adapter that renders fixed-size byte arrays as hex strings.
///
/// Use with `#[serde(with = "tapquest_core::encoding::hex_array")]`.
pub mod hex_array {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S, const N: usize>(bytes: &[u8; N], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D, const N: usize>(deserializer: D) -> Result<[u8; N], D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let bytes = hex::decode(&s).map_err(D::Error::custom)?;
        bytes
            .try_into()
            .map_err(|_| D::Error::custom(format!("expected {} bytes", N)))
    }
}

/// Serde adapter for variable-length byte strings as hex.
pub mod hex_bytes {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        hex::decode(&s).map_err(D::Error::custom)
    }
}

/// Decode a hex string into exactly `N` bytes.
pub fn decode_hex_array<const N: usize>(s: &str) -> Result<[u8; N], CoreError> {
    let bytes = hex::decode(s.trim()).map_err(|e| CoreError::DecodingError(e.to_string()))?;
    bytes
        .try_into()
        .map_err(|v: Vec<u8>| CoreError::DecodingError(format!("expected {} bytes, got {}", N, v.len())))
}

/// Encode a value to CBOR bytes.
pub fn to_cbor<T: Serialize>(value: &T) -> Result<Vec<u8>, CoreError> {
    let mut buf = Vec::new();
    ciborium::into_writer(value, &mut buf).map_err(|e| CoreError::EncodingError(e.to_string()))?;
    Ok(buf)
}

/// Decode a value from CBOR bytes.
pub fn from_cbor<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, CoreError> {
    ciborium::from_reader(bytes).map_err(|e| CoreError::DecodingError(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Wrapped(#[serde(with = "hex_array")] [u8; 4]);

    #[test]
    fn test_hex_array_json_shape() {
        let json = serde_json::to_string(&Wrapped([0xde, 0xad, 0xbe, 0xef])).unwrap();
        assert_eq!(json, "\"deadbeef\"");
        let back: Wrapped = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Wrapped([0xde, 0xad, 0xbe, 0xef]));
    }

    #[test]
    fn test_hex_array_wrong_length_rejected() {
        assert!(serde_json::from_str::<Wrapped>("\"dead\"").is_err());
    }

    #[test]
    fn test_decode_hex_array() {
        let arr: [u8; 2] = decode_hex_array("0a0b").unwrap();
        assert_eq!(arr, [0x0a, 0x0b]);
        assert!(decode_hex_array::<2>("0a").is_err());
        assert!(decode_hex_array::<2>("zz0b").is_err());
    }
}
