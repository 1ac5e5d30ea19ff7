//! 20-byte wallet address type.

use std::fmt;
use std::str::FromStr;

use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Length of a wallet address in bytes.
pub const ADDRESS_LEN: usize = 20;

/// Errors that can occur when parsing an address from text.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AddressParseError {
    /// The input did not start with the `0x` prefix.
    #[error("address missing 0x prefix: {input}")]
    MissingPrefix {
        /// The offending input.
        input: String,
    },

    /// The input was not 42 characters long.
    #[error("address has wrong length: expected 42 characters, got {len}")]
    WrongLength {
        /// The actual character count.
        len: usize,
    },

    /// The hex payload could not be decoded.
    #[error("address contains invalid hex: {input}")]
    InvalidHex {
        /// The offending input.
        input: String,
    },
}

/// A wallet address (20 bytes, rendered as `0x`-prefixed lowercase hex).
///
/// Addresses are compared byte-for-byte; parsing accepts mixed-case hex so
/// checksummed client input round-trips to the same value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address([u8; ADDRESS_LEN]);

impl Address {
    /// Creates an address from raw bytes.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; ADDRESS_LEN]) -> Self {
        Self(bytes)
    }

    /// Returns the raw address bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; ADDRESS_LEN] {
        &self.0
    }

    /// Derives an address from an uncompressed secp256k1 public key point.
    ///
    /// The address is the last 20 bytes of the Keccak-256 hash of the
    /// 64-byte point encoding (the leading `0x04` tag stripped). Signing
    /// clients use this to compute the wallet address for a verifying key.
    #[must_use]
    pub fn from_uncompressed_point(point: &[u8]) -> Self {
        use sha3::{Digest, Keccak256};

        debug_assert_eq!(point.len(), 65);
        let hash = Keccak256::digest(&point[1..]);
        let mut bytes = [0u8; ADDRESS_LEN];
        bytes.copy_from_slice(&hash[12..]);
        Self(bytes)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl FromStr for Address {
    type Err = AddressParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let Some(payload) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) else {
            return Err(AddressParseError::MissingPrefix {
                input: s.to_string(),
            });
        };
        if s.len() != 2 + ADDRESS_LEN * 2 {
            return Err(AddressParseError::WrongLength { len: s.len() });
        }
        let mut bytes = [0u8; ADDRESS_LEN];
        hex::decode_to_slice(payload, &mut bytes).map_err(|_| AddressParseError::InvalidHex {
            input: s.to_string(),
        })?;
        Ok(Self(bytes))
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod unit_tests {
    use super::*;

    #[test]
    fn test_roundtrip_lowercase() {
        let addr: Address = "0xd8da6bf26964af9d7eed9e03e53415d37aa96045"
            .parse()
            .unwrap();
        assert_eq!(addr.to_string(), "0xd8da6bf26964af9d7eed9e03e53415d37aa96045");
    }

    #[test]
    fn test_checksummed_input_parses_to_same_value() {
        let checksummed: Address = "0xd8dA6BF26964aF9D7eEd9e03E53415D37aA96045"
            .parse()
            .unwrap();
        let lowercase: Address = "0xd8da6bf26964af9d7eed9e03e53415d37aa96045"
            .parse()
            .unwrap();
        assert_eq!(checksummed, lowercase);
    }

    #[test]
    fn test_missing_prefix_rejected() {
        let result = "d8da6bf26964af9d7eed9e03e53415d37aa96045".parse::<Address>();
        assert!(matches!(result, Err(AddressParseError::MissingPrefix { .. })));
    }

    #[test]
    fn test_wrong_length_rejected() {
        let result = "0xd8da6bf2".parse::<Address>();
        assert!(matches!(result, Err(AddressParseError::WrongLength { len: 10 })));
    }

    #[test]
    fn test_invalid_hex_rejected() {
        let result = "0xzzda6bf26964af9d7eed9e03e53415d37aa96045".parse::<Address>();
        assert!(matches!(result, Err(AddressParseError::InvalidHex { .. })));
    }

    #[test]
    fn test_from_uncompressed_point_known_vector() {
        // The secp256k1 generator point is the public key of private key 1;
        // its wallet address is a fixed, widely published value.
        let point = hex::decode(
            "0479be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798\
             483ada7726a3c4655da4fbfc0e1108a8fd17b448a68554199c47d08ffb10d4b8",
        )
        .unwrap();
        let addr = Address::from_uncompressed_point(&point);
        assert_eq!(
            addr.to_string(),
            "0x7e5f4552091a69125d5dfcb7b8c2659029395bdf"
        );
    }

    #[test]
    fn test_serde_as_string() {
        let addr = Address::from_bytes([0x11; ADDRESS_LEN]);
        let json = serde_json::to_string(&addr).unwrap();
        assert_eq!(json, "\"0x1111111111111111111111111111111111111111\"");
        let back: Address = serde_json::from_str(&json).unwrap();
        assert_eq!(back, addr);
    }
}
