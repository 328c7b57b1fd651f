//! Hashing utilities for the ledger
//!
//! Provides SHA-256 based hashing used for blockhashes, account
//! discriminators and program-derived addresses.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

/// Computes SHA-256 hash of the input data
pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Computes SHA-256 over several byte slices, as if they were concatenated
pub fn hashv(parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().into()
}

/// Computes SHA-256 hash and returns it as a hex string
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(sha256(data))
}

/// A 32-byte hash, used as the ledger's recent blockhash
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Hash(pub [u8; 32]);

impl Hash {
    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", bs58::encode(self.0).into_string())
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash({})", self)
    }
}

impl FromStr for Hash {
    type Err = super::KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = bs58::decode(s)
            .into_vec()
            .map_err(|_| super::KeyError::InvalidEncoding(s.to_string()))?;
        let array: [u8; 32] = bytes
            .try_into()
            .map_err(|_| super::KeyError::InvalidEncoding(s.to_string()))?;
        Ok(Self(array))
    }
}

impl Serialize for Hash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Hash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256() {
        let data = b"hello world";
        assert_eq!(
            sha256_hex(data),
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[test]
    fn test_hashv_matches_concatenation() {
        assert_eq!(hashv(&[b"hello", b" ", b"world"]), sha256(b"hello world"));
    }

    #[test]
    fn test_hash_text_form() {
        let hash = Hash::new(sha256(b"slot-1"));
        let parsed: Hash = hash.to_string().parse().unwrap();
        assert_eq!(parsed, hash);
        assert!("not-base58!".parse::<Hash>().is_err());
    }
}
