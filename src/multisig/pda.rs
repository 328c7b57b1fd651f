//! Program-derived addresses of the multisig program

use crate::crypto::{derive_address, Pubkey};
use crate::multisig::program::ID;

pub const SEED_PREFIX: &[u8] = b"multisig";
pub const SEED_PROGRAM_CONFIG: &[u8] = b"program_config";
pub const SEED_MULTISIG: &[u8] = b"multisig";
pub const SEED_VAULT: &[u8] = b"vault";
pub const SEED_TRANSACTION: &[u8] = b"transaction";
pub const SEED_PROPOSAL: &[u8] = b"proposal";
pub const SEED_EPHEMERAL_SIGNER: &[u8] = b"ephemeral_signer";

pub fn get_program_config_pda() -> Pubkey {
    derive_address(&[SEED_PREFIX, SEED_PROGRAM_CONFIG], &ID)
}

pub fn get_multisig_pda(create_key: &Pubkey) -> Pubkey {
    derive_address(&[SEED_PREFIX, SEED_MULTISIG, create_key.as_bytes()], &ID)
}

/// Funds-holding account of a multisig; owned by the system program
pub fn get_vault_pda(multisig: &Pubkey, vault_index: u8) -> Pubkey {
    derive_address(
        &[SEED_PREFIX, multisig.as_bytes(), SEED_VAULT, &[vault_index]],
        &ID,
    )
}

pub fn get_transaction_pda(multisig: &Pubkey, transaction_index: u64) -> Pubkey {
    derive_address(
        &[
            SEED_PREFIX,
            multisig.as_bytes(),
            SEED_TRANSACTION,
            &transaction_index.to_le_bytes(),
        ],
        &ID,
    )
}

pub fn get_proposal_pda(multisig: &Pubkey, transaction_index: u64) -> Pubkey {
    derive_address(
        &[
            SEED_PREFIX,
            multisig.as_bytes(),
            SEED_TRANSACTION,
            &transaction_index.to_le_bytes(),
            SEED_PROPOSAL,
        ],
        &ID,
    )
}

pub fn get_ephemeral_signer_pda(transaction: &Pubkey, signer_index: u8) -> Pubkey {
    derive_address(
        &[
            SEED_PREFIX,
            transaction.as_bytes(),
            SEED_EPHEMERAL_SIGNER,
            &[signer_index],
        ],
        &ID,
    )
}
