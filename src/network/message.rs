//! Wire messages between the ledger server and remote clients
//!
//! Every `LedgerClient` call maps to one request/response pair. Requests
//! carry an id that the matching response echoes back.

use crate::crypto::{Hash, Pubkey, Signature};
use crate::ledger::{Account, ClientError, SendOptions, SignatureStatus, Transaction};
use serde::{Deserialize, Serialize};

/// Magic bytes for message framing
pub const MAGIC: [u8; 4] = [0x53, 0x51, 0x44, 0x53]; // "SQDS"

/// Largest frame either side will accept
pub const MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

/// Ledger RPC methods
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RpcMethod {
    RequestAirdrop { to: Pubkey, lamports: u64 },
    GetLatestBlockhash,
    SendTransaction {
        transaction: Transaction,
        options: SendOptions,
    },
    GetSignatureStatus { signature: Signature },
    GetAccount { address: Pubkey },
    GetBalance { address: Pubkey },
    GetSlot,
}

impl RpcMethod {
    /// Method name for logging
    pub fn name(&self) -> &'static str {
        match self {
            RpcMethod::RequestAirdrop { .. } => "requestAirdrop",
            RpcMethod::GetLatestBlockhash => "getLatestBlockhash",
            RpcMethod::SendTransaction { .. } => "sendTransaction",
            RpcMethod::GetSignatureStatus { .. } => "getSignatureStatus",
            RpcMethod::GetAccount { .. } => "getAccount",
            RpcMethod::GetBalance { .. } => "getBalance",
            RpcMethod::GetSlot => "getSlot",
        }
    }
}

/// Successful RPC results
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RpcResult {
    Signature(Signature),
    Blockhash(Hash),
    SignatureStatus(Option<SignatureStatus>),
    Account(Option<Account>),
    Balance(u64),
    Slot(u64),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcRequest {
    pub id: u64,
    pub method: RpcMethod,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcResponse {
    pub id: u64,
    pub result: Result<RpcResult, ClientError>,
}
