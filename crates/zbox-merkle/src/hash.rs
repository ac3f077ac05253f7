//! Hash utilities and digest types for the integrity trees.
//!
//! Two widths are in play: 20-byte SHA-1 digests for lane leaves of the
//! fixed tree, and 32-byte digests (SHA-256 or BLAKE3) everywhere else.
//! Both serialize as lowercase hex.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha1::Sha1;
use sha2::{Digest, Sha256};
use std::fmt;

use crate::{MerkleError, MerkleResult, HASH_LENGTH, SHORT_HASH_LENGTH};

/// A 256-bit digest used for tree nodes and validation leaves.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct HashValue([u8; HASH_LENGTH]);

impl HashValue {
    /// Create a new HashValue from a fixed-size array
    pub fn new(bytes: [u8; HASH_LENGTH]) -> Self {
        Self(bytes)
    }

    /// Create a HashValue from a slice
    pub fn from_slice(bytes: &[u8]) -> MerkleResult<Self> {
        if bytes.len() != HASH_LENGTH {
            return Err(MerkleError::InvalidHashLength {
                expected: HASH_LENGTH,
                got: bytes.len(),
            });
        }
        let mut arr = [0u8; HASH_LENGTH];
        arr.copy_from_slice(bytes);
        Ok(Self(arr))
    }

    /// Create a HashValue from hex string
    pub fn from_hex(hex_str: &str) -> MerkleResult<Self> {
        let hex_str = hex_str.strip_prefix("0x").unwrap_or(hex_str);
        let bytes = hex::decode(hex_str)
            .map_err(|e| MerkleError::InvalidInput(format!("Invalid hex: {}", e)))?;
        Self::from_slice(&bytes)
    }

    /// Lowercase hex form, without prefix
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Get the underlying bytes
    pub fn as_bytes(&self) -> &[u8; HASH_LENGTH] {
        &self.0
    }

    /// Convert to a Vec<u8>
    pub fn to_vec(&self) -> Vec<u8> {
        self.0.to_vec()
    }
}

impl fmt::Display for HashValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for HashValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HashValue({})", self)
    }
}

impl AsRef<[u8]> for HashValue {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<[u8; HASH_LENGTH]> for HashValue {
    fn from(bytes: [u8; HASH_LENGTH]) -> Self {
        Self(bytes)
    }
}

impl From<blake3::Hash> for HashValue {
    fn from(hash: blake3::Hash) -> Self {
        Self(*hash.as_bytes())
    }
}

impl Serialize for HashValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for HashValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        HashValue::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// A 160-bit digest: the lane leaf of the fixed tree.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ShortHash([u8; SHORT_HASH_LENGTH]);

impl ShortHash {
    /// Create a ShortHash from a fixed-size array
    pub fn new(bytes: [u8; SHORT_HASH_LENGTH]) -> Self {
        Self(bytes)
    }

    /// Create a ShortHash from a 20-byte slice
    pub fn from_slice(bytes: &[u8]) -> MerkleResult<Self> {
        if bytes.len() != SHORT_HASH_LENGTH {
            return Err(MerkleError::InvalidHashLength {
                expected: SHORT_HASH_LENGTH,
                got: bytes.len(),
            });
        }
        let mut arr = [0u8; SHORT_HASH_LENGTH];
        arr.copy_from_slice(bytes);
        Ok(Self(arr))
    }

    /// Create a ShortHash from hex string, with or without `0x`
    pub fn from_hex(hex_str: &str) -> MerkleResult<Self> {
        let hex_str = hex_str.strip_prefix("0x").unwrap_or(hex_str);
        let bytes = hex::decode(hex_str)
            .map_err(|e| MerkleError::InvalidInput(format!("Invalid hex: {}", e)))?;
        Self::from_slice(&bytes)
    }

    /// Lowercase hex form, without prefix
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Get the underlying bytes
    pub fn as_bytes(&self) -> &[u8; SHORT_HASH_LENGTH] {
        &self.0
    }
}

impl fmt::Display for ShortHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for ShortHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ShortHash({})", self)
    }
}

impl AsRef<[u8]> for ShortHash {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl Serialize for ShortHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for ShortHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        ShortHash::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// Hash data using SHA-256
pub fn sha256(data: &[u8]) -> HashValue {
    let mut hasher = Sha256::new();
    hasher.update(data);
    HashValue(hasher.finalize().into())
}

/// SHA-256 over the concatenation of two byte strings (parent of two children)
pub fn sha256_pair(left: &[u8], right: &[u8]) -> HashValue {
    let mut hasher = Sha256::new();
    hasher.update(left);
    hasher.update(right);
    HashValue(hasher.finalize().into())
}

/// Hash data using SHA-1 (lane leaves)
pub fn sha1(data: &[u8]) -> ShortHash {
    let mut hasher = Sha1::new();
    hasher.update(data);
    ShortHash(hasher.finalize().into())
}

/// SHA-1 over the concatenation of two lane nodes
pub fn sha1_pair(left: &ShortHash, right: &ShortHash) -> ShortHash {
    let mut hasher = Sha1::new();
    hasher.update(left.as_bytes());
    hasher.update(right.as_bytes());
    ShortHash(hasher.finalize().into())
}

/// Hash data using BLAKE3 (validation leaves)
pub fn blake3(data: &[u8]) -> HashValue {
    blake3::hash(data).into()
}

/// BLAKE3 over the concatenation of two validation-tree nodes
pub fn blake3_pair(left: &HashValue, right: &HashValue) -> HashValue {
    let mut hasher = blake3::Hasher::new();
    hasher.update(left.as_bytes());
    hasher.update(right.as_bytes());
    hasher.finalize().into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex_roundtrip_is_lowercase() {
        let hash = sha256(b"zbox");
        let hex = hash.to_hex();
        assert_eq!(hex, hex.to_lowercase());
        assert_eq!(HashValue::from_hex(&hex).unwrap(), hash);
        assert_eq!(HashValue::from_hex(&format!("0x{}", hex)).unwrap(), hash);

        let short = sha1(b"zbox");
        assert_eq!(ShortHash::from_hex(&short.to_hex()).unwrap(), short);
        assert_eq!(ShortHash::from_hex(&format!("0x{}", short.to_hex())).unwrap(), short);
        assert_eq!(ShortHash::new(*short.as_bytes()), short);
    }

    #[test]
    fn test_known_digests() {
        assert_eq!(
            sha256(b"abc").to_hex(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(sha1(b"abc").to_hex(), "a9993e364706816aba3e25717850c26c9cd0d89d");
        assert_eq!(blake3(b"").to_hex(), blake3::hash(b"").to_hex().to_string());
    }

    #[test]
    fn test_pair_is_concatenation() {
        let l = sha256(b"l");
        let r = sha256(b"r");
        let mut joined = l.to_vec();
        joined.extend_from_slice(r.as_bytes());
        assert_eq!(sha256_pair(l.as_bytes(), r.as_bytes()), sha256(&joined));
        assert_ne!(blake3_pair(&l, &r), blake3_pair(&r, &l));
    }

    #[test]
    fn test_invalid_lengths() {
        assert!(matches!(
            HashValue::from_slice(&[0u8; 20]),
            Err(MerkleError::InvalidHashLength { expected: 32, got: 20 })
        ));
        assert!(ShortHash::from_slice(&[0u8; 32]).is_err());
        assert!(HashValue::from_hex("zz").is_err());
    }

    #[test]
    fn test_serde_as_hex_string() {
        let hash = sha1(b"lane");
        let json = serde_json::to_string(&hash).unwrap();
        assert_eq!(json, format!("\"{}\"", hash.to_hex()));
        let back: ShortHash = serde_json::from_str(&json).unwrap();
        assert_eq!(back, hash);
    }
}
