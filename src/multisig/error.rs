//! Registry business-rule errors
//!
//! Raised by the multisig program as custom instruction errors. Each variant
//! has a stable numeric code so it survives the trip through the ledger and
//! can be turned back into a typed error on the client side.

use crate::ledger::{InstructionError, TransactionError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// First custom error code used by the multisig program
pub const ERROR_CODE_OFFSET: u32 = 6000;

/// Errors related to multisig operations
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MultisigError {
    #[error("Found multiple members with the same key")]
    DuplicateMember,
    #[error("Members array is empty")]
    EmptyMembers,
    #[error("Too many members, can be up to 65535")]
    TooManyMembers,
    #[error("Invalid threshold, must be between 1 and number of members with Vote permission")]
    InvalidThreshold,
    #[error("Attempted to perform an unauthorized action")]
    Unauthorized,
    #[error("Provided pubkey is not a member of multisig")]
    NotAMember,
    #[error("Member has unknown permission")]
    UnknownPermission,
    #[error("Multisig must have at least one member with Initiate permission")]
    NoProposers,
    #[error("Multisig must have at least one member with Vote permission")]
    NoVoters,
    #[error("Multisig must have at least one member with Execute permission")]
    NoExecutors,
    #[error("Time lock exceeds the maximum allowed (90 days)")]
    TimeLockExceedsMaxAllowed,
    #[error("Transaction index already used by another transaction")]
    DuplicateTransactionIndex,
    #[error("Invalid transaction index")]
    InvalidTransactionIndex,
    #[error("Transaction not found")]
    TransactionNotFound,
    #[error("Proposal not found")]
    ProposalNotFound,
    #[error("Proposal already exists for this transaction")]
    ProposalAlreadyExists,
    #[error("Proposal is not in Draft status")]
    ProposalNotDraft,
    #[error("Proposal is not in Active status")]
    ProposalNotActive,
    #[error("Proposal is not in Approved status")]
    ProposalNotApproved,
    #[error("Member already voted on this proposal")]
    DuplicateVote,
    #[error("Member does not have Vote permission")]
    UnauthorizedVoter,
    #[error("Transaction has already been executed")]
    AlreadyExecuted,
    #[error("Not all required signatures were provided")]
    InsufficientSignatures,
    #[error("Time lock has not been released yet")]
    TimeLockNotReleased,
    #[error("Wrong number of ephemeral signers")]
    InvalidEphemeralSigners,
    #[error("Account does not hold the expected multisig state")]
    InvalidAccountData,
    #[error("Account does not belong to this multisig")]
    InvalidAccount,
    #[error("Arithmetic overflow")]
    Overflow,
}

const ALL: [MultisigError; 28] = [
    MultisigError::DuplicateMember,
    MultisigError::EmptyMembers,
    MultisigError::TooManyMembers,
    MultisigError::InvalidThreshold,
    MultisigError::Unauthorized,
    MultisigError::NotAMember,
    MultisigError::UnknownPermission,
    MultisigError::NoProposers,
    MultisigError::NoVoters,
    MultisigError::NoExecutors,
    MultisigError::TimeLockExceedsMaxAllowed,
    MultisigError::DuplicateTransactionIndex,
    MultisigError::InvalidTransactionIndex,
    MultisigError::TransactionNotFound,
    MultisigError::ProposalNotFound,
    MultisigError::ProposalAlreadyExists,
    MultisigError::ProposalNotDraft,
    MultisigError::ProposalNotActive,
    MultisigError::ProposalNotApproved,
    MultisigError::DuplicateVote,
    MultisigError::UnauthorizedVoter,
    MultisigError::AlreadyExecuted,
    MultisigError::InsufficientSignatures,
    MultisigError::TimeLockNotReleased,
    MultisigError::InvalidEphemeralSigners,
    MultisigError::InvalidAccountData,
    MultisigError::InvalidAccount,
    MultisigError::Overflow,
];

impl MultisigError {
    /// Custom error code reported by the ledger
    pub fn code(&self) -> u32 {
        // ALL lists every variant, so the lookup always succeeds
        let position = ALL.iter().position(|e| e == self).unwrap_or(0);
        ERROR_CODE_OFFSET + position as u32
    }

    pub fn from_code(code: u32) -> Option<Self> {
        code.checked_sub(ERROR_CODE_OFFSET)
            .and_then(|i| ALL.get(i as usize))
            .copied()
    }

    /// Decode a registry error out of a failed transaction
    pub fn from_transaction_error(err: &TransactionError) -> Option<Self> {
        match err.instruction_error() {
            Some(InstructionError::Custom(code)) => Self::from_code(*code),
            _ => None,
        }
    }
}

impl From<MultisigError> for InstructionError {
    fn from(err: MultisigError) -> Self {
        InstructionError::Custom(err.code())
    }
}
