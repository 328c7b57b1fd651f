//! Typed account readers over a `LedgerClient`

use crate::crypto::Pubkey;
use crate::ledger::{ClientError, LedgerClient};
use crate::multisig::pda::{get_program_config_pda, get_proposal_pda, get_transaction_pda};
use crate::multisig::program::ID;
use crate::multisig::state::{AccountState, Multisig, ProgramConfig, Proposal, VaultTransaction};
use thiserror::Error;

/// Errors while reading program state
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error(transparent)]
    Client(#[from] ClientError),
    #[error("Account {0} not found")]
    NotFound(Pubkey),
    #[error("Account {address} does not hold {expected} data")]
    InvalidData {
        address: Pubkey,
        expected: &'static str,
    },
}

/// Read and decode a program-owned account
pub async fn fetch_account<T: AccountState, C: LedgerClient>(
    client: &C,
    address: &Pubkey,
) -> Result<T, FetchError> {
    let account = client
        .get_account(address)
        .await?
        .ok_or(FetchError::NotFound(*address))?;

    let invalid = FetchError::InvalidData {
        address: *address,
        expected: T::NAME,
    };
    if account.owner != ID {
        return Err(invalid);
    }
    T::try_from_account_data(&account.data).map_err(|_| invalid)
}

pub async fn fetch_program_config<C: LedgerClient>(
    client: &C,
) -> Result<ProgramConfig, FetchError> {
    fetch_account(client, &get_program_config_pda()).await
}

pub async fn fetch_multisig<C: LedgerClient>(
    client: &C,
    multisig: &Pubkey,
) -> Result<Multisig, FetchError> {
    fetch_account(client, multisig).await
}

pub async fn fetch_vault_transaction<C: LedgerClient>(
    client: &C,
    multisig: &Pubkey,
    transaction_index: u64,
) -> Result<VaultTransaction, FetchError> {
    fetch_account(client, &get_transaction_pda(multisig, transaction_index)).await
}

pub async fn fetch_proposal<C: LedgerClient>(
    client: &C,
    multisig: &Pubkey,
    transaction_index: u64,
) -> Result<Proposal, FetchError> {
    fetch_account(client, &get_proposal_pda(multisig, transaction_index)).await
}
