//! Remote ledger client
//!
//! Implements `LedgerClient` over one TCP connection to a `LedgerServer`.
//! The connection is opened on first use and reopened after any failure.

use crate::crypto::{Hash, Pubkey, Signature};
use crate::ledger::{Account, ClientError, LedgerClient, SendOptions, SignatureStatus, Transaction};
use crate::network::message::{RpcMethod, RpcRequest, RpcResponse, RpcResult};
use crate::network::server::ClientCodec;
use futures::sink::SinkExt;
use futures::stream::StreamExt;
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_util::codec::Framed;

type Connection = Framed<TcpStream, ClientCodec>;

/// `LedgerClient` talking to a ledger server
pub struct RemoteLedger {
    addr: String,
    timeout: Duration,
    connection: Mutex<Option<Connection>>,
    next_id: AtomicU64,
}

impl RemoteLedger {
    /// `timeout` bounds every call, including connecting
    pub fn new(addr: impl Into<String>, timeout: Duration) -> Self {
        Self {
            addr: addr.into(),
            timeout,
            connection: Mutex::new(None),
            next_id: AtomicU64::new(1),
        }
    }

    async fn call(&self, method: RpcMethod) -> Result<RpcResult, ClientError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let name = method.name();
        let mut connection = self.connection.lock().await;

        let pending = exchange(&self.addr, &mut connection, RpcRequest { id, method });
        match tokio::time::timeout(self.timeout, pending).await {
            Ok(Ok(response)) => response.result,
            Ok(Err(e)) => {
                *connection = None;
                log::debug!("{} to {} failed: {}", name, self.addr, e);
                Err(ClientError::Network(format!("{}: {}", name, e)))
            }
            Err(_) => {
                *connection = None;
                Err(ClientError::Network(format!(
                    "{} timed out after {:?}",
                    name, self.timeout
                )))
            }
        }
    }
}

async fn exchange(
    addr: &str,
    connection: &mut Option<Connection>,
    request: RpcRequest,
) -> Result<RpcResponse, io::Error> {
    if connection.is_none() {
        let stream = TcpStream::connect(addr).await?;
        log::debug!("Connected to ledger at {}", addr);
        *connection = Some(Framed::new(stream, ClientCodec::new()));
    }
    let Some(conn) = connection.as_mut() else {
        return Err(io::Error::new(io::ErrorKind::NotConnected, "no connection"));
    };

    let id = request.id;
    conn.send(request).await?;

    loop {
        match conn.next().await {
            Some(Ok(response)) if response.id == id => return Ok(response),
            Some(Ok(stale)) => log::debug!("Discarding stale response #{}", stale.id),
            Some(Err(e)) => return Err(e),
            None => {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "connection closed by server",
                ))
            }
        }
    }
}

fn unexpected(result: RpcResult) -> ClientError {
    ClientError::InvalidRequest(format!("unexpected response: {:?}", result))
}

impl LedgerClient for RemoteLedger {
    async fn request_airdrop(&self, to: &Pubkey, lamports: u64) -> Result<Signature, ClientError> {
        match self
            .call(RpcMethod::RequestAirdrop { to: *to, lamports })
            .await?
        {
            RpcResult::Signature(signature) => Ok(signature),
            other => Err(unexpected(other)),
        }
    }

    async fn get_latest_blockhash(&self) -> Result<Hash, ClientError> {
        match self.call(RpcMethod::GetLatestBlockhash).await? {
            RpcResult::Blockhash(hash) => Ok(hash),
            other => Err(unexpected(other)),
        }
    }

    async fn send_transaction(
        &self,
        tx: &Transaction,
        options: SendOptions,
    ) -> Result<Signature, ClientError> {
        let method = RpcMethod::SendTransaction {
            transaction: tx.clone(),
            options,
        };
        match self.call(method).await? {
            RpcResult::Signature(signature) => Ok(signature),
            other => Err(unexpected(other)),
        }
    }

    async fn get_signature_status(
        &self,
        signature: &Signature,
    ) -> Result<Option<SignatureStatus>, ClientError> {
        match self
            .call(RpcMethod::GetSignatureStatus {
                signature: *signature,
            })
            .await?
        {
            RpcResult::SignatureStatus(status) => Ok(status),
            other => Err(unexpected(other)),
        }
    }

    async fn get_account(&self, address: &Pubkey) -> Result<Option<Account>, ClientError> {
        match self
            .call(RpcMethod::GetAccount { address: *address })
            .await?
        {
            RpcResult::Account(account) => Ok(account),
            other => Err(unexpected(other)),
        }
    }

    async fn get_balance(&self, address: &Pubkey) -> Result<u64, ClientError> {
        match self
            .call(RpcMethod::GetBalance { address: *address })
            .await?
        {
            RpcResult::Balance(lamports) => Ok(lamports),
            other => Err(unexpected(other)),
        }
    }

    async fn get_slot(&self) -> Result<u64, ClientError> {
        match self.call(RpcMethod::GetSlot).await? {
            RpcResult::Slot(slot) => Ok(slot),
            other => Err(unexpected(other)),
        }
    }
}
