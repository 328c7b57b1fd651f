//! Ledger networking
//!
//! A `LedgerServer` exposes a simulated ledger over TCP and `RemoteLedger`
//! is the matching `LedgerClient`, so the workflow can run against a ledger
//! in another process.

pub mod client;
pub mod message;
pub mod server;

pub use client::RemoteLedger;
pub use message::{RpcMethod, RpcRequest, RpcResponse, RpcResult, MAGIC, MAX_MESSAGE_SIZE};
pub use server::{ClientCodec, JsonCodec, LedgerServer, ServerCodec};
