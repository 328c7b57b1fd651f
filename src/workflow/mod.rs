//! Client-side multisig workflow
//!
//! Airdrop, create a multisig, propose a vault transfer, collect votes and
//! execute, each step confirmed before the next one starts.

pub mod config;
pub mod confirm;
pub mod error;
pub mod orchestrator;
pub mod quickstart;

pub use config::{Endpoint, RetryPolicy, WorkflowConfig, ENDPOINT_ENV};
pub use confirm::{confirm_transaction, with_retry, Confirmation};
pub use error::{Rejection, Step, StepContext, WorkflowError};
pub use orchestrator::{CreateMultisigOptions, CreatedMultisig, VoteReceipt, VoteTally, Workflow};
pub use quickstart::{run_quickstart, QuickstartParams, QuickstartReport};
