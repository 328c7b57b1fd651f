//! Ledger layer
//!
//! A small account-based ledger: accounts and rent, signed transactions,
//! a bank that executes them through pluggable programs, and the
//! `LedgerClient` capability the workflow talks to.

pub mod account;
pub mod bank;
pub mod client;
pub mod instruction;
pub mod runtime;
pub mod simulated;
pub mod system;
pub mod transaction;

pub use account::{Account, Rent, LAMPORTS_PER_SOL};
pub use bank::{Bank, ProcessedTransaction};
pub use client::{ClientError, Commitment, LedgerClient, SendOptions, SignatureStatus};
pub use instruction::{AccountMeta, Instruction, InstructionError};
pub use runtime::{Clock, InvokeContext, Program};
pub use simulated::{Fault, LedgerConfig, SimulatedLedger};
pub use transaction::{Message, Transaction, TransactionError};
