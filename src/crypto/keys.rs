//! Identity and signature management for the ledger
//!
//! Identities are secp256k1 key pairs; a `Pubkey` is the 33-byte compressed
//! public key. Program-derived addresses share the same width but carry a
//! `0x00` prefix, which no compressed point can have, so no private key can
//! ever sign for them.

use rand::rngs::OsRng;
use secp256k1::{ecdsa, Message, PublicKey, Secp256k1, SecretKey};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use super::hash::{hashv, sha256};

/// Width of an address in bytes
pub const PUBKEY_BYTES: usize = 33;

/// Width of a signature in bytes
pub const SIGNATURE_BYTES: usize = 64;

/// Leading byte of every program-derived address
const PDA_MARKER: u8 = 0x00;

const PDA_DOMAIN: &[u8] = b"ProgramDerivedAddress";

/// Errors that can occur during key operations
#[derive(Error, Debug)]
pub enum KeyError {
    #[error("Invalid private key")]
    InvalidPrivateKey,
    #[error("Invalid public key")]
    InvalidPublicKey,
    #[error("Invalid signature")]
    InvalidSignature,
    #[error("Invalid base58 encoding: {0}")]
    InvalidEncoding(String),
    #[error("Secp256k1 error: {0}")]
    Secp256k1Error(#[from] secp256k1::Error),
}

// =============================================================================
// Pubkey
// =============================================================================

/// An account address
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Pubkey(pub [u8; PUBKEY_BYTES]);

impl Pubkey {
    pub const fn new_from_array(bytes: [u8; PUBKEY_BYTES]) -> Self {
        Self(bytes)
    }

    /// Build a program id from a 32-byte seed
    pub const fn program_id(seed: [u8; 32]) -> Self {
        let mut bytes = [PDA_MARKER; PUBKEY_BYTES];
        let mut i = 0;
        while i < 32 {
            bytes[i + 1] = seed[i];
            i += 1;
        }
        Self(bytes)
    }

    /// Random off-curve address, useful as a placeholder account in tests
    pub fn new_unique() -> Self {
        let seed: [u8; 32] = rand::random();
        Self::program_id(seed)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// True for addresses that no key pair can sign for
    pub fn is_off_curve(&self) -> bool {
        self.0[0] == PDA_MARKER
    }
}

impl Default for Pubkey {
    fn default() -> Self {
        Self([0u8; PUBKEY_BYTES])
    }
}

impl AsRef<[u8]> for Pubkey {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for Pubkey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", bs58::encode(self.0).into_string())
    }
}

impl fmt::Debug for Pubkey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Pubkey({})", self)
    }
}

impl FromStr for Pubkey {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = bs58::decode(s)
            .into_vec()
            .map_err(|_| KeyError::InvalidEncoding(s.to_string()))?;
        let array: [u8; PUBKEY_BYTES] = bytes
            .try_into()
            .map_err(|_| KeyError::InvalidEncoding(s.to_string()))?;
        Ok(Self(array))
    }
}

impl Serialize for Pubkey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Pubkey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Derive a program-controlled address from seeds
///
/// Address = 0x00 || SHA256(seeds... || program_id || "ProgramDerivedAddress")
pub fn derive_address(seeds: &[&[u8]], program_id: &Pubkey) -> Pubkey {
    let mut parts: Vec<&[u8]> = seeds.to_vec();
    parts.push(program_id.as_bytes());
    parts.push(PDA_DOMAIN);
    Pubkey::program_id(hashv(&parts))
}

// =============================================================================
// Signature
// =============================================================================

/// A compact ECDSA signature over a transaction message
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Signature(pub [u8; SIGNATURE_BYTES]);

impl Signature {
    /// Verify this signature against a public key and message
    pub fn verify(&self, pubkey: &Pubkey, message: &[u8]) -> bool {
        if pubkey.is_off_curve() {
            return false;
        }
        let Ok(public_key) = PublicKey::from_slice(pubkey.as_bytes()) else {
            return false;
        };
        let Ok(sig) = ecdsa::Signature::from_compact(&self.0) else {
            return false;
        };
        let Ok(msg) = Message::from_digest_slice(&sha256(message)) else {
            return false;
        };
        Secp256k1::verification_only()
            .verify_ecdsa(&msg, &sig, &public_key)
            .is_ok()
    }
}

impl Default for Signature {
    fn default() -> Self {
        Self([0u8; SIGNATURE_BYTES])
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", bs58::encode(self.0).into_string())
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature({})", self)
    }
}

impl FromStr for Signature {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = bs58::decode(s)
            .into_vec()
            .map_err(|_| KeyError::InvalidEncoding(s.to_string()))?;
        let array: [u8; SIGNATURE_BYTES] =
            bytes.try_into().map_err(|_| KeyError::InvalidSignature)?;
        Ok(Self(array))
    }
}

impl Serialize for Signature {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Signature {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

// =============================================================================
// Keypair
// =============================================================================

/// A signing identity
#[derive(Clone)]
pub struct Keypair {
    secret_key: SecretKey,
    pubkey: Pubkey,
}

impl Keypair {
    /// Generate a new random key pair
    pub fn generate() -> Self {
        let secp = Secp256k1::new();
        let (secret_key, public_key) = secp.generate_keypair(&mut OsRng);
        Self {
            secret_key,
            pubkey: Pubkey(public_key.serialize()),
        }
    }

    /// Create a key pair from an existing secret key
    pub fn from_secret_key(secret_key: SecretKey) -> Self {
        let secp = Secp256k1::new();
        let public_key = PublicKey::from_secret_key(&secp, &secret_key);
        Self {
            secret_key,
            pubkey: Pubkey(public_key.serialize()),
        }
    }

    /// Create a key pair from a hex-encoded secret key
    pub fn from_secret_hex(hex_key: &str) -> Result<Self, KeyError> {
        let bytes = hex::decode(hex_key.trim()).map_err(|_| KeyError::InvalidPrivateKey)?;
        let secret_key = SecretKey::from_slice(&bytes).map_err(|_| KeyError::InvalidPrivateKey)?;
        Ok(Self::from_secret_key(secret_key))
    }

    /// Get the secret key as a hex string
    pub fn secret_hex(&self) -> String {
        hex::encode(self.secret_key.secret_bytes())
    }

    pub fn pubkey(&self) -> Pubkey {
        self.pubkey
    }

    /// Sign an arbitrary message; the message is hashed with SHA-256 first
    pub fn sign(&self, message: &[u8]) -> Signature {
        let secp = Secp256k1::signing_only();
        let msg = Message::from_digest(sha256(message));
        Signature(secp.sign_ecdsa(&msg, &self.secret_key).serialize_compact())
    }
}

impl fmt::Debug for Keypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Keypair").field("pubkey", &self.pubkey).finish()
    }
}
