//! Squads quickstart: an approval-gated multisig workflow in Rust
//!
//! This crate provides:
//! - A simulated ledger with accounts, signed transactions, fees and slots
//! - A multisig registry program (members, permissions, proposals, votes)
//! - Program-derived addresses for multisigs, vaults, transactions and proposals
//! - A length-prefixed JSON RPC server and client for remote ledgers
//! - A workflow orchestrator that confirms every step before the next
//!
//! # Example
//!
//! ```rust,no_run
//! use squads_quickstart::ledger::{LedgerConfig, SimulatedLedger};
//! use squads_quickstart::workflow::{run_quickstart, QuickstartParams, Workflow, WorkflowConfig};
//! use squads_quickstart::Keypair;
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let ledger = SimulatedLedger::new(LedgerConfig::default());
//! let workflow = Workflow::new(ledger, Keypair::generate(), WorkflowConfig::default());
//!
//! let report = run_quickstart(&workflow, &QuickstartParams::default()).await?;
//! println!("Multisig {} executed transaction {}", report.multisig, report.transaction_index);
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod crypto;
pub mod ledger;
pub mod multisig;
pub mod network;
pub mod workflow;

// Re-export commonly used types
pub use crypto::{Keypair, Pubkey, Signature};
pub use ledger::{
    Bank, ClientError, Commitment, LedgerClient, LedgerConfig, SimulatedLedger, LAMPORTS_PER_SOL,
};
pub use multisig::{
    Member, Multisig, MultisigError, Permissions, Proposal, ProposalStatus, VaultTransaction, Vote,
};
pub use network::{LedgerServer, RemoteLedger};
pub use workflow::{
    run_quickstart, Endpoint, QuickstartParams, QuickstartReport, Workflow, WorkflowConfig,
    WorkflowError,
};
