//! Multisig registry
//!
//! An on-ledger program that holds M-of-N multisig accounts, their vaults,
//! proposed vault transactions and the proposals members vote on. A vault
//! transaction only runs once its proposal has collected `threshold`
//! approvals, and it runs at most once.
//!
//! # Example
//!
//! ```ignore
//! use squads_quickstart::multisig::{instructions, pda, Member, Permissions};
//!
//! let multisig = pda::get_multisig_pda(&create_key.pubkey());
//! let ix = instructions::multisig_create_v2(
//!     &treasury,
//!     &create_key.pubkey(),
//!     &creator.pubkey(),
//!     args,
//! );
//!
//! // Funds live in the vault, not in the multisig account itself
//! let vault = pda::get_vault_pda(&multisig, 0);
//! ```

pub mod accounts;
pub mod error;
pub mod instructions;
pub mod pda;
pub mod program;
pub mod state;

pub use accounts::FetchError;
pub use error::MultisigError;
pub use program::{MultisigProgram, ID};
pub use state::{
    AccountState, Member, Multisig, Permissions, ProgramConfig, Proposal, ProposalStatus,
    VaultTransaction, VaultTransactionMessage, Vote, MAX_TIME_LOCK,
};
