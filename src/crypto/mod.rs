//! Cryptographic utilities for the ledger
//!
//! This module provides:
//! - SHA-256 hashing
//! - Identities, signatures and program-derived addresses (secp256k1)

pub mod hash;
pub mod keys;

pub use hash::{hashv, sha256, sha256_hex, Hash};
pub use keys::{derive_address, KeyError, Keypair, Pubkey, Signature, PUBKEY_BYTES};
