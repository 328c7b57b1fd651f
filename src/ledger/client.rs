//! Ledger RPC capability
//!
//! `LedgerClient` is the only way workflow code talks to the ledger. It is
//! implemented by the in-process `SimulatedLedger` and by the TCP
//! `RemoteLedger`, so the orchestrator can run against either.

use crate::crypto::{Hash, Pubkey, Signature};
use crate::ledger::account::Account;
use crate::ledger::transaction::{Transaction, TransactionError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;

/// Errors returned by a ledger client
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClientError {
    #[error("Network failure: {0}")]
    Network(String),
    #[error("Transaction rejected: {0}")]
    Transaction(#[from] TransactionError),
    #[error("Airdrop failed: {0}")]
    Airdrop(String),
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl ClientError {
    /// Whether retrying the same call may succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, ClientError::Network(_))
    }
}

/// How settled a landed transaction is
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Commitment {
    /// Landed in a slot, may still be rolled back
    Processed,
    /// Enough slots built on top to be considered confirmed
    #[default]
    Confirmed,
    /// Irreversible
    Finalized,
}

impl fmt::Display for Commitment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Commitment::Processed => "processed",
            Commitment::Confirmed => "confirmed",
            Commitment::Finalized => "finalized",
        };
        f.write_str(name)
    }
}

impl FromStr for Commitment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "processed" => Ok(Commitment::Processed),
            "confirmed" => Ok(Commitment::Confirmed),
            "finalized" => Ok(Commitment::Finalized),
            other => Err(format!("unknown commitment level: {}", other)),
        }
    }
}

/// Options for `send_transaction`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendOptions {
    /// Submit without simulating first
    pub skip_preflight: bool,
}

/// Status of a landed transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureStatus {
    pub slot: u64,
    /// Slots built on top; `None` once finalized
    pub confirmations: Option<u64>,
    pub confirmation_status: Commitment,
    /// Set when the transaction landed but failed
    pub err: Option<TransactionError>,
}

impl SignatureStatus {
    pub fn satisfies(&self, commitment: Commitment) -> bool {
        self.confirmation_status >= commitment
    }
}

/// Ledger RPC surface used by the workflow
#[allow(async_fn_in_trait)]
pub trait LedgerClient {
    /// Ask the faucet for lamports
    async fn request_airdrop(&self, to: &Pubkey, lamports: u64) -> Result<Signature, ClientError>;

    async fn get_latest_blockhash(&self) -> Result<Hash, ClientError>;

    /// Submit a signed transaction; returns once it is accepted, not confirmed
    async fn send_transaction(
        &self,
        tx: &Transaction,
        options: SendOptions,
    ) -> Result<Signature, ClientError>;

    /// `None` if the ledger has never seen the signature
    async fn get_signature_status(
        &self,
        signature: &Signature,
    ) -> Result<Option<SignatureStatus>, ClientError>;

    /// Raw account state; `None` if the account does not exist
    async fn get_account(&self, address: &Pubkey) -> Result<Option<Account>, ClientError>;

    async fn get_balance(&self, address: &Pubkey) -> Result<u64, ClientError> {
        Ok(self
            .get_account(address)
            .await?
            .map(|a| a.lamports)
            .unwrap_or(0))
    }

    async fn get_slot(&self) -> Result<u64, ClientError>;
}

impl<T: LedgerClient> LedgerClient for Arc<T> {
    async fn request_airdrop(&self, to: &Pubkey, lamports: u64) -> Result<Signature, ClientError> {
        (**self).request_airdrop(to, lamports).await
    }

    async fn get_latest_blockhash(&self) -> Result<Hash, ClientError> {
        (**self).get_latest_blockhash().await
    }

    async fn send_transaction(
        &self,
        tx: &Transaction,
        options: SendOptions,
    ) -> Result<Signature, ClientError> {
        (**self).send_transaction(tx, options).await
    }

    async fn get_signature_status(
        &self,
        signature: &Signature,
    ) -> Result<Option<SignatureStatus>, ClientError> {
        (**self).get_signature_status(signature).await
    }

    async fn get_account(&self, address: &Pubkey) -> Result<Option<Account>, ClientError> {
        (**self).get_account(address).await
    }

    async fn get_balance(&self, address: &Pubkey) -> Result<u64, ClientError> {
        (**self).get_balance(address).await
    }

    async fn get_slot(&self) -> Result<u64, ClientError> {
        (**self).get_slot().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commitment_ordering() {
        assert!(Commitment::Finalized > Commitment::Confirmed);
        assert!(Commitment::Confirmed > Commitment::Processed);
        assert_eq!("Finalized".parse::<Commitment>(), Ok(Commitment::Finalized));
        assert!("final".parse::<Commitment>().is_err());
    }

    #[test]
    fn test_status_satisfies() {
        let status = SignatureStatus {
            slot: 10,
            confirmations: Some(1),
            confirmation_status: Commitment::Confirmed,
            err: None,
        };
        assert!(status.satisfies(Commitment::Processed));
        assert!(status.satisfies(Commitment::Confirmed));
        assert!(!status.satisfies(Commitment::Finalized));
    }
}
