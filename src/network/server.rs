//! Ledger server and frame codec
//!
//! Serves a `SimulatedLedger` over TCP. Frames are a 4-byte magic, a
//! big-endian u32 length and a JSON body.

use crate::ledger::{LedgerClient, SimulatedLedger};
use crate::network::message::{
    RpcMethod, RpcRequest, RpcResponse, RpcResult, MAGIC, MAX_MESSAGE_SIZE,
};
use bytes::{Buf, BufMut, BytesMut};
use futures::sink::SinkExt;
use futures::stream::StreamExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io;
use std::marker::PhantomData;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_util::codec::{Decoder, Encoder, Framed};

/// Length-prefixed JSON codec decoding `In` and encoding `Out`
pub struct JsonCodec<In, Out> {
    _marker: PhantomData<fn(Out) -> In>,
}

impl<In, Out> JsonCodec<In, Out> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<In, Out> Default for JsonCodec<In, Out> {
    fn default() -> Self {
        Self::new()
    }
}

/// Codec used by the server side of a connection
pub type ServerCodec = JsonCodec<RpcRequest, RpcResponse>;

/// Codec used by the client side of a connection
pub type ClientCodec = JsonCodec<RpcResponse, RpcRequest>;

impl<In, Out: Serialize> Encoder<Out> for JsonCodec<In, Out> {
    type Error = io::Error;

    fn encode(&mut self, item: Out, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let data = serde_json::to_vec(&item)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))?;
        if data.len() > MAX_MESSAGE_SIZE {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "Message too large",
            ));
        }

        // Magic (4) + Length (4) + Data
        dst.reserve(8 + data.len());
        dst.put_slice(&MAGIC);
        dst.put_u32(data.len() as u32);
        dst.put_slice(&data);

        Ok(())
    }
}

impl<In: DeserializeOwned, Out> Decoder for JsonCodec<In, Out> {
    type Item = In;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < 8 {
            return Ok(None);
        }

        if src[..4] != MAGIC {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "Invalid magic bytes",
            ));
        }

        let len = u32::from_be_bytes([src[4], src[5], src[6], src[7]]) as usize;
        if len > MAX_MESSAGE_SIZE {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "Message too large",
            ));
        }

        if src.len() < 8 + len {
            src.reserve(8 + len - src.len());
            return Ok(None);
        }

        src.advance(8);
        let data = src.split_to(len);

        let item = serde_json::from_slice(&data)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))?;

        Ok(Some(item))
    }
}

/// TCP server exposing a simulated ledger
pub struct LedgerServer {
    listener: TcpListener,
    ledger: Arc<SimulatedLedger>,
}

impl LedgerServer {
    /// Bind to an address such as `127.0.0.1:8899`
    pub async fn bind(addr: &str, ledger: Arc<SimulatedLedger>) -> Result<Self, io::Error> {
        let listener = TcpListener::bind(addr).await?;
        log::info!("Ledger server listening on {}", listener.local_addr()?);
        Ok(Self { listener, ledger })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, io::Error> {
        self.listener.local_addr()
    }

    /// Accept connections until the listener fails
    pub async fn run(self) -> Result<(), io::Error> {
        loop {
            let (stream, addr) = self.listener.accept().await?;
            log::debug!("Client {} connected", addr);
            let ledger = self.ledger.clone();
            tokio::spawn(async move {
                if let Err(e) = handle_connection(stream, addr, ledger).await {
                    log::warn!("Connection {} closed with error: {}", addr, e);
                }
            });
        }
    }
}

/// Serve one client connection
///
/// Requests are handled concurrently; responses are written in completion
/// order and matched by id on the client side.
pub async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    ledger: Arc<SimulatedLedger>,
) -> Result<(), io::Error> {
    let framed = Framed::new(stream, ServerCodec::new());
    let (mut writer, mut reader) = framed.split();

    let (tx, mut rx) = mpsc::channel::<RpcResponse>(100);

    let write_handle = tokio::spawn(async move {
        while let Some(response) = rx.recv().await {
            if writer.send(response).await.is_err() {
                break;
            }
        }
    });

    let result = loop {
        match reader.next().await {
            Some(Ok(request)) => {
                let ledger = ledger.clone();
                let tx = tx.clone();
                tokio::spawn(async move {
                    let response = dispatch(&ledger, request).await;
                    let _ = tx.send(response).await;
                });
            }
            Some(Err(e)) => {
                log::warn!("Error reading from {}: {}", addr, e);
                break Err(e);
            }
            None => {
                log::debug!("Client {} disconnected", addr);
                break Ok(());
            }
        }
    };

    drop(tx);
    // Let in-flight responses drain before the writer goes away
    let _ = write_handle.await;
    result
}

/// Run one request against the ledger
pub async fn dispatch(ledger: &SimulatedLedger, request: RpcRequest) -> RpcResponse {
    log::debug!("RPC {} #{}", request.method.name(), request.id);
    let result = match request.method {
        RpcMethod::RequestAirdrop { to, lamports } => ledger
            .request_airdrop(&to, lamports)
            .await
            .map(RpcResult::Signature),
        RpcMethod::GetLatestBlockhash => ledger
            .get_latest_blockhash()
            .await
            .map(RpcResult::Blockhash),
        RpcMethod::SendTransaction {
            transaction,
            options,
        } => ledger
            .send_transaction(&transaction, options)
            .await
            .map(RpcResult::Signature),
        RpcMethod::GetSignatureStatus { signature } => ledger
            .get_signature_status(&signature)
            .await
            .map(RpcResult::SignatureStatus),
        RpcMethod::GetAccount { address } => ledger
            .get_account(&address)
            .await
            .map(RpcResult::Account),
        RpcMethod::GetBalance { address } => ledger
            .get_balance(&address)
            .await
            .map(RpcResult::Balance),
        RpcMethod::GetSlot => ledger.get_slot().await.map(RpcResult::Slot),
    };
    RpcResponse {
        id: request.id,
        result,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::Pubkey;

    #[test]
    fn test_codec_frames_requests() {
        let mut client = ClientCodec::new();
        let mut server = ServerCodec::new();
        let request = RpcRequest {
            id: 1,
            method: RpcMethod::GetBalance {
                address: Pubkey::new_unique(),
            },
        };

        let mut buf = BytesMut::new();
        client.encode(request.clone(), &mut buf).unwrap();
        assert_eq!(&buf[..4], &MAGIC);

        // A partial frame yields nothing yet
        let mut partial = buf.split_to(10);
        assert!(server.decode(&mut partial).unwrap().is_none());
        partial.unsplit(buf);
        assert_eq!(server.decode(&mut partial).unwrap(), Some(request));
    }

    #[test]
    fn test_codec_rejects_bad_magic() {
        let mut codec = ServerCodec::new();
        let mut buf = BytesMut::from(&b"HTTP/1.1 200 OK\r\n"[..]);
        assert!(codec.decode(&mut buf).is_err());
    }
}
