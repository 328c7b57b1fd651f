//! Workflow errors
//!
//! Every failure names the step it happened in and, where known, the
//! multisig and transaction index, so it can be followed up by inspecting
//! the ledger directly.

use crate::crypto::{Pubkey, Signature};
use crate::ledger::{ClientError, InstructionError, TransactionError};
use crate::multisig::{FetchError, MultisigError};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Workflow steps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Step {
    Airdrop,
    FundVault,
    ReadAccount,
    CreateMultisig,
    CreateTransaction,
    CreateProposal,
    ActivateProposal,
    Vote,
    Execute,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Step::Airdrop => "airdrop",
            Step::FundVault => "fund vault",
            Step::ReadAccount => "read account",
            Step::CreateMultisig => "create multisig",
            Step::CreateTransaction => "create transaction",
            Step::CreateProposal => "create proposal",
            Step::ActivateProposal => "activate proposal",
            Step::Vote => "vote",
            Step::Execute => "execute",
        };
        f.write_str(name)
    }
}

/// Where a failure happened
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepContext {
    pub step: Step,
    pub multisig: Option<Pubkey>,
    pub transaction_index: Option<u64>,
}

impl StepContext {
    pub fn new(step: Step) -> Self {
        Self {
            step,
            multisig: None,
            transaction_index: None,
        }
    }

    pub fn multisig(mut self, multisig: Pubkey) -> Self {
        self.multisig = Some(multisig);
        self
    }

    pub fn transaction(mut self, index: u64) -> Self {
        self.transaction_index = Some(index);
        self
    }
}

impl fmt::Display for StepContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.step)?;
        match (self.multisig, self.transaction_index) {
            (Some(multisig), Some(index)) => {
                write!(f, " (multisig {}, transaction {})", multisig, index)
            }
            (Some(multisig), None) => write!(f, " (multisig {})", multisig),
            (None, Some(index)) => write!(f, " (transaction {})", index),
            (None, None) => Ok(()),
        }
    }
}

/// Why the ledger refused a transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    /// A multisig business rule
    Registry(MultisigError),
    /// Any other ledger-level failure
    Ledger(TransactionError),
    /// Refused before reaching the ledger, e.g. the faucet limit
    Request(String),
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::Registry(err) => write!(f, "{}", err),
            Rejection::Ledger(err) => write!(f, "{}", err),
            Rejection::Request(reason) => f.write_str(reason),
        }
    }
}

fn outcome_unknown(signature: &Option<Signature>) -> String {
    match signature {
        Some(signature) => format!(" (transaction {} may have landed)", signature),
        None => String::new(),
    }
}

/// Errors surfaced to workflow callers
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WorkflowError {
    #[error("{context}: network failure: {error}{}", outcome_unknown(.signature))]
    NetworkFailure {
        context: StepContext,
        error: ClientError,
        /// Set when a signed transaction may or may not have landed
        signature: Option<Signature>,
    },

    #[error("{context}: transaction {signature} not confirmed within {timeout:?}")]
    ConfirmationTimeout {
        context: StepContext,
        signature: Signature,
        timeout: Duration,
    },

    #[error("{context}: rejected: {reason}")]
    RegistryRejection {
        context: StepContext,
        reason: Rejection,
    },

    #[error("{context}: insufficient funds in {account}")]
    InsufficientFunds {
        context: StepContext,
        account: Pubkey,
    },

    #[error("{context}: account {address} not found")]
    AccountNotFound {
        context: StepContext,
        address: Pubkey,
    },

    #[error("{context}: account {address} does not hold {expected} data")]
    InvalidAccountData {
        context: StepContext,
        address: Pubkey,
        expected: &'static str,
    },
}

impl WorkflowError {
    pub fn context(&self) -> &StepContext {
        match self {
            WorkflowError::NetworkFailure { context, .. }
            | WorkflowError::ConfirmationTimeout { context, .. }
            | WorkflowError::RegistryRejection { context, .. }
            | WorkflowError::InsufficientFunds { context, .. }
            | WorkflowError::AccountNotFound { context, .. }
            | WorkflowError::InvalidAccountData { context, .. } => context,
        }
    }

    /// The registry rule that was violated, if that is why the step failed
    pub fn registry_error(&self) -> Option<MultisigError> {
        match self {
            WorkflowError::RegistryRejection {
                reason: Rejection::Registry(err),
                ..
            } => Some(*err),
            _ => None,
        }
    }

    /// Signature to look up when the outcome of a submission is unknown
    pub fn unconfirmed_signature(&self) -> Option<Signature> {
        match self {
            WorkflowError::NetworkFailure { signature, .. } => *signature,
            WorkflowError::ConfirmationTimeout { signature, .. } => Some(*signature),
            _ => None,
        }
    }

    /// Whether repeating the step unchanged may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, WorkflowError::NetworkFailure { .. })
    }

    /// Classify a failed or refused transaction
    pub fn from_transaction(context: StepContext, err: TransactionError) -> Self {
        let underfunded = match &err {
            TransactionError::InsufficientFundsForFee(account) => Some(*account),
            TransactionError::InstructionError { error, .. } => match error {
                InstructionError::InsufficientFunds { account, .. }
                | InstructionError::InsufficientFundsForRent(account) => Some(*account),
                _ => None,
            },
            _ => None,
        };
        if let Some(account) = underfunded {
            return WorkflowError::InsufficientFunds { context, account };
        }

        let reason = match MultisigError::from_transaction_error(&err) {
            Some(registry) => Rejection::Registry(registry),
            None => Rejection::Ledger(err),
        };
        WorkflowError::RegistryRejection { context, reason }
    }

    pub fn from_client(context: StepContext, err: ClientError) -> Self {
        match err {
            ClientError::Network(_) => WorkflowError::NetworkFailure {
                context,
                error: err,
                signature: None,
            },
            ClientError::Transaction(tx_err) => Self::from_transaction(context, tx_err),
            ClientError::Airdrop(reason) | ClientError::InvalidRequest(reason) => {
                WorkflowError::RegistryRejection {
                    context,
                    reason: Rejection::Request(reason),
                }
            }
        }
    }

    pub fn from_fetch(context: StepContext, err: FetchError) -> Self {
        match err {
            FetchError::Client(client) => Self::from_client(context, client),
            FetchError::NotFound(address) => WorkflowError::AccountNotFound { context, address },
            FetchError::InvalidData { address, expected } => WorkflowError::InvalidAccountData {
                context,
                address,
                expected,
            },
        }
    }
}
