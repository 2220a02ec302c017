//! Strong identifier types for BlockArt.
//!
//! Block hashes and op ids are both 32-byte blake3 digests. They are kept as
//! distinct newtypes so a block hash can never be passed where an op id is
//! expected.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Parse exactly 32 bytes of hex.
fn decode_32(s: &str) -> Result<[u8; 32], hex::FromHexError> {
    let bytes = hex::decode(s)?;
    if bytes.len() != 32 {
        return Err(hex::FromHexError::InvalidStringLength);
    }
    let mut arr = [0u8; 32];
    arr.copy_from_slice(&bytes);
    Ok(arr)
}

/// A 32-byte block hash: the digest of a block's content.
///
/// Ordering is byte-wise, which is what the equal-height tie-break compares.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BlockHash(pub [u8; 32]);

impl BlockHash {
    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Convert to hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from hex string.
    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        decode_32(s).map(Self)
    }

    /// Number of trailing `'0'` characters in the hex form.
    ///
    /// This is the proof-of-work measure.
    pub fn trailing_zero_nibbles(&self) -> u32 {
        let mut count = 0;
        for byte in self.0.iter().rev() {
            if *byte == 0 {
                count += 2;
                continue;
            }
            if byte & 0x0f == 0 {
                count += 1;
            }
            break;
        }
        count
    }

    /// The zero hash.
    pub const ZERO: Self = Self([0u8; 32]);
}

impl fmt::Debug for BlockHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlockHash({})", &self.to_hex()[..16])
    }
}

impl fmt::Display for BlockHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", &self.to_hex()[..16])
    }
}

impl AsRef<[u8]> for BlockHash {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<[u8; 32]> for BlockHash {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

/// A 32-byte op identifier, computed as blake3 over the op's content.
///
/// Add ops double as shape identifiers, see [`ShapeId`].
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OpId(pub [u8; 32]);

impl OpId {
    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Convert to hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from hex string.
    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        decode_32(s).map(Self)
    }
}

impl fmt::Debug for OpId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OpId({})", &self.to_hex()[..16])
    }
}

impl fmt::Display for OpId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", &self.to_hex()[..16])
    }
}

impl AsRef<[u8]> for OpId {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<[u8; 32]> for OpId {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

/// A shape is identified by the id of the op that added it.
pub type ShapeId = OpId;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_hash_hex_roundtrip() {
        let hash = BlockHash::from_bytes([0x42; 32]);
        let recovered = BlockHash::from_hex(&hash.to_hex()).unwrap();
        assert_eq!(hash, recovered);
    }

    #[test]
    fn test_from_hex_rejects_wrong_length() {
        assert!(OpId::from_hex("abcd").is_err());
        assert!(BlockHash::from_hex("zz").is_err());
    }

    #[test]
    fn test_display_is_short_prefix() {
        let id = OpId::from_bytes([0xab; 32]);
        assert_eq!(format!("{}", id), "abababababababab");
        assert!(format!("{:?}", id).starts_with("OpId("));
    }

    #[test]
    fn test_trailing_zero_nibbles() {
        let mut bytes = [0xffu8; 32];
        assert_eq!(BlockHash(bytes).trailing_zero_nibbles(), 0);

        bytes[31] = 0x10;
        assert_eq!(BlockHash(bytes).trailing_zero_nibbles(), 1);

        bytes[31] = 0x00;
        bytes[30] = 0xa0;
        assert_eq!(BlockHash(bytes).trailing_zero_nibbles(), 3);

        assert_eq!(BlockHash::ZERO.trailing_zero_nibbles(), 64);
    }

    #[test]
    fn test_trailing_zero_nibbles_matches_hex() {
        let hash = BlockHash::from_bytes([0x12, 0x30, 0x00, 0x45].repeat(8).try_into().unwrap());
        let hex = hash.to_hex();
        let expected = hex.len() - hex.trim_end_matches('0').len();
        assert_eq!(hash.trailing_zero_nibbles() as usize, expected);
    }
}
