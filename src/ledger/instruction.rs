//! Instructions and instruction-level errors
//!
//! An instruction names the program to run, the accounts it touches and an
//! opaque payload the program decodes.

use crate::crypto::Pubkey;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors a program can raise while processing one instruction
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InstructionError {
    #[error("Insufficient funds in {account}: have {have}, need {need}")]
    InsufficientFunds { account: Pubkey, have: u64, need: u64 },
    #[error("Account {0} would not be rent-exempt")]
    InsufficientFundsForRent(Pubkey),
    #[error("Missing required signature for {0}")]
    MissingRequiredSignature(Pubkey),
    #[error("Account {0} already in use")]
    AccountAlreadyInUse(Pubkey),
    #[error("Account {0} does not exist")]
    UninitializedAccount(Pubkey),
    #[error("Account {0} is not owned by the executing program")]
    InvalidAccountOwner(Pubkey),
    #[error("Instruction spent lamports of an account it does not own: {0}")]
    ExternalAccountLamportSpend(Pubkey),
    #[error("Invalid instruction data: {0}")]
    InvalidInstructionData(String),
    #[error("Invalid account data for {0}")]
    InvalidAccountData(Pubkey),
    #[error("Not enough account keys")]
    NotEnoughAccountKeys,
    #[error("Unsupported program id: {0}")]
    UnsupportedProgramId(Pubkey),
    #[error("Cross-program invocation depth exceeded")]
    CallDepth,
    #[error("Custom program error: {0:#x}")]
    Custom(u32),
}

/// Account reference carried by an instruction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountMeta {
    pub pubkey: Pubkey,
    pub is_signer: bool,
    pub is_writable: bool,
}

impl AccountMeta {
    pub fn new(pubkey: Pubkey, is_signer: bool) -> Self {
        Self {
            pubkey,
            is_signer,
            is_writable: true,
        }
    }

    pub fn new_readonly(pubkey: Pubkey, is_signer: bool) -> Self {
        Self {
            pubkey,
            is_signer,
            is_writable: false,
        }
    }
}

/// A single program invocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instruction {
    pub program_id: Pubkey,
    pub accounts: Vec<AccountMeta>,
    pub data: Vec<u8>,
}

impl Instruction {
    pub fn new(program_id: Pubkey, accounts: Vec<AccountMeta>, data: Vec<u8>) -> Self {
        Self {
            program_id,
            accounts,
            data,
        }
    }

    /// Key of the account at `index`
    pub fn account_key(&self, index: usize) -> Result<Pubkey, InstructionError> {
        self.accounts
            .get(index)
            .map(|meta| meta.pubkey)
            .ok_or(InstructionError::NotEnoughAccountKeys)
    }
}
