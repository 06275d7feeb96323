// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! JSON-RPC collaborator.
//!
//! Every component talks to the chain through [`EthRpc`]. [`AlloyRpc`] is the
//! HTTP implementation; tests substitute a scripted double.

use std::future::Future;
use std::time::Duration;

use alloy::{
    eips::BlockNumberOrTag,
    primitives::{Address, Bytes, U256},
    providers::{DynProvider, PendingTransactionBuilder, Provider, ProviderBuilder},
    rpc::{
        client::{BatchRequest, Waiter},
        types::TransactionRequest,
    },
};
use async_trait::async_trait;
use futures::{
    channel::mpsc::{self, UnboundedSender},
    stream::BoxStream,
    StreamExt,
};

use super::types::TxReceipt;
use crate::error::{PaymentsError, PaymentsResult};

/// Default number of confirmations tracked after the receipt.
pub const DEFAULT_CONFIRMATION_BLOCKS: u64 = 12;

/// Default interval between confirmation polls.
pub const DEFAULT_CONFIRMATION_POLL_INTERVAL: Duration = Duration::from_secs(4);

/// Give up waiting for a receipt after this long.
pub const RECEIPT_TIMEOUT: Duration = Duration::from_secs(600);

/// One read-only request of a JSON-RPC batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadRequest {
    /// `eth_getBalance(address, "latest")`
    Balance(Address),
    /// `eth_call({to, data}, "latest")`
    Call { to: Address, data: Bytes },
}

/// Answer to a [`ReadRequest`], same variant as the request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadResponse {
    Balance(U256),
    Call(Bytes),
}

/// Lifecycle event of a broadcast transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BroadcastEvent {
    /// The node accepted the transaction.
    TransactionHash(String),
    /// The transaction was included in a block.
    Receipt(TxReceipt),
    /// A new block was built on top of the inclusion block.
    Confirmation { confirmations: u64, receipt: TxReceipt },
    /// Broadcast, inclusion or tracking failed.
    Error(String),
}

/// Ordered stream of broadcast events.
pub type BroadcastEvents = BoxStream<'static, BroadcastEvent>;

/// Minimal JSON-RPC surface needed by the payments engine.
#[async_trait]
pub trait EthRpc: Send + Sync {
    /// Native balance in wei at the latest block.
    async fn get_balance(&self, address: Address) -> PaymentsResult<U256>;

    /// Read-only contract call (`eth_call`).
    async fn call(&self, to: Address, data: Bytes) -> PaymentsResult<Bytes>;

    async fn get_gas_price(&self) -> PaymentsResult<U256>;

    async fn estimate_gas(&self, tx: &TransactionRequest) -> PaymentsResult<u64>;

    /// Send `requests` as one JSON-RPC batch.
    ///
    /// The outer error is a failure of the whole batch. Inner results are in
    /// request order; one failed entry does not fail the others.
    async fn batch_read(
        &self,
        requests: &[ReadRequest],
    ) -> PaymentsResult<Vec<PaymentsResult<ReadResponse>>>;

    /// Transaction count including pending transactions.
    async fn get_transaction_count(&self, address: Address) -> PaymentsResult<u64>;

    async fn get_chain_id(&self) -> PaymentsResult<u64>;

    /// Broadcast a signed, serialized transaction.
    async fn send_raw_transaction(&self, raw: Bytes) -> PaymentsResult<BroadcastEvents>;
}

/// [`EthRpc`] over an alloy HTTP provider.
#[derive(Clone)]
pub struct AlloyRpc {
    provider: DynProvider,
    confirmation_blocks: u64,
    poll_interval: Duration,
}

impl AlloyRpc {
    /// Connect to an HTTP JSON-RPC endpoint.
    pub fn connect(rpc_url: &str) -> PaymentsResult<Self> {
        let url: url::Url = rpc_url
            .parse()
            .map_err(|e: url::ParseError| PaymentsError::InvalidRpcUrl(e.to_string()))?;

        let provider = ProviderBuilder::new().connect_http(url).erased();

        Ok(Self {
            provider,
            confirmation_blocks: DEFAULT_CONFIRMATION_BLOCKS,
            poll_interval: DEFAULT_CONFIRMATION_POLL_INTERVAL,
        })
    }

    /// Number of confirmation events emitted after the receipt.
    pub fn with_confirmation_blocks(mut self, confirmation_blocks: u64) -> Self {
        self.confirmation_blocks = confirmation_blocks;
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Get the current block number.
    pub async fn get_block_number(&self) -> PaymentsResult<u64> {
        self.provider.get_block_number().await.map_err(PaymentsError::rpc)
    }
}

#[async_trait]
impl EthRpc for AlloyRpc {
    async fn get_balance(&self, address: Address) -> PaymentsResult<U256> {
        self.provider.get_balance(address).await.map_err(PaymentsError::rpc)
    }

    async fn call(&self, to: Address, data: Bytes) -> PaymentsResult<Bytes> {
        let tx = TransactionRequest::default().to(to).input(data.into());
        self.provider.call(tx).await.map_err(PaymentsError::rpc)
    }

    async fn get_gas_price(&self) -> PaymentsResult<U256> {
        let price = self.provider.get_gas_price().await.map_err(PaymentsError::rpc)?;
        Ok(U256::from(price))
    }

    async fn estimate_gas(&self, tx: &TransactionRequest) -> PaymentsResult<u64> {
        self.provider.estimate_gas(tx.clone()).await.map_err(PaymentsError::rpc)
    }

    async fn batch_read(
        &self,
        requests: &[ReadRequest],
    ) -> PaymentsResult<Vec<PaymentsResult<ReadResponse>>> {
        if requests.is_empty() {
            return Ok(Vec::new());
        }

        let mut batch = BatchRequest::new(self.provider.client());
        let mut waiters = Vec::with_capacity(requests.len());
        for request in requests {
            let waiter = match request {
                ReadRequest::Balance(address) => batch
                    .add_call("eth_getBalance", &(*address, BlockNumberOrTag::Latest))
                    .map(PendingRead::Balance),
                ReadRequest::Call { to, data } => {
                    let tx = TransactionRequest::default().to(*to).input(data.clone().into());
                    batch
                        .add_call("eth_call", &(tx, BlockNumberOrTag::Latest))
                        .map(PendingRead::Call)
                }
            }
            .map_err(PaymentsError::rpc)?;
            waiters.push(waiter);
        }

        batch.send().await.map_err(PaymentsError::rpc)?;

        let mut responses = Vec::with_capacity(waiters.len());
        for waiter in waiters {
            let response = match waiter {
                PendingRead::Balance(waiter) => waiter.await.map(ReadResponse::Balance),
                PendingRead::Call(waiter) => waiter.await.map(ReadResponse::Call),
            };
            responses.push(response.map_err(PaymentsError::rpc));
        }
        Ok(responses)
    }

    async fn get_transaction_count(&self, address: Address) -> PaymentsResult<u64> {
        self.provider
            .get_transaction_count(address)
            .pending()
            .await
            .map_err(PaymentsError::rpc)
    }

    async fn get_chain_id(&self) -> PaymentsResult<u64> {
        self.provider.get_chain_id().await.map_err(PaymentsError::rpc)
    }

    async fn send_raw_transaction(&self, raw: Bytes) -> PaymentsResult<BroadcastEvents> {
        let pending = self
            .provider
            .send_raw_transaction(&raw)
            .await
            .map_err(|e| PaymentsError::Rpc(format!("Failed to send: {}", e)))?;

        let (events, stream) = mpsc::unbounded();
        let tx_hash = format!("{:?}", pending.tx_hash());
        // Receiver is alive: the stream is returned below.
        let _ = events.unbounded_send(BroadcastEvent::TransactionHash(tx_hash.clone()));

        tokio::spawn(track_transaction(self.clone(), pending, tx_hash, events));

        Ok(stream.boxed())
    }
}

/// Response slot of a queued batch entry.
enum PendingRead {
    Balance(Waiter<U256>),
    Call(Waiter<Bytes>),
}

/// Run `work` until it completes or the event receiver is dropped, checking
/// every `poll_interval`. `None` when nobody is listening anymore.
async fn while_listening<F: Future>(
    events: &UnboundedSender<BroadcastEvent>,
    poll_interval: Duration,
    work: F,
) -> Option<F::Output> {
    let closed = async {
        while !events.is_closed() {
            tokio::time::sleep(poll_interval).await;
        }
    };
    tokio::select! {
        output = work => Some(output),
        () = closed => None,
    }
}

/// Follow a broadcast transaction to its receipt and then through
/// `confirmation_blocks` confirmations. Stops early once the event receiver
/// is dropped or the receipt does not arrive within [`RECEIPT_TIMEOUT`].
async fn track_transaction(
    rpc: AlloyRpc,
    pending: PendingTransactionBuilder<alloy::network::Ethereum>,
    tx_hash: String,
    events: UnboundedSender<BroadcastEvent>,
) {
    let receipt_wait = pending.with_timeout(Some(RECEIPT_TIMEOUT)).get_receipt();
    let Some(receipt) = while_listening(&events, rpc.poll_interval, receipt_wait).await else {
        tracing::debug!(tx_hash = %tx_hash, "Broadcast listener gone, stopped tracking");
        return;
    };
    let receipt = match receipt {
        Ok(r) => TxReceipt {
            tx_hash: tx_hash.clone(),
            block_number: r.block_number.unwrap_or(0),
            gas_used: r.gas_used as u64,
            success: r.status(),
        },
        Err(e) => {
            tracing::warn!(tx_hash = %tx_hash, error = %e, "Failed to get receipt");
            let _ = events.unbounded_send(BroadcastEvent::Error(format!(
                "Failed to get receipt: {}",
                e
            )));
            return;
        }
    };

    if events
        .unbounded_send(BroadcastEvent::Receipt(receipt.clone()))
        .is_err()
    {
        return;
    }
    if !receipt.success {
        let _ = events.unbounded_send(BroadcastEvent::Error(format!(
            "Transaction reverted in block {}",
            receipt.block_number
        )));
        return;
    }

    let mut confirmed = 0u64;
    while confirmed < rpc.confirmation_blocks {
        let Some(head) = while_listening(&events, rpc.poll_interval, rpc.get_block_number()).await
        else {
            return;
        };
        match head {
            Ok(head) => {
                let depth = head
                    .saturating_sub(receipt.block_number)
                    .saturating_add(1)
                    .min(rpc.confirmation_blocks);
                while confirmed < depth {
                    confirmed += 1;
                    let event = BroadcastEvent::Confirmation {
                        confirmations: confirmed,
                        receipt: receipt.clone(),
                    };
                    if events.unbounded_send(event).is_err() {
                        return;
                    }
                }
            }
            Err(e) => {
                tracing::warn!(tx_hash = %tx_hash, error = %e, "Confirmation polling failed");
                let _ = events.unbounded_send(BroadcastEvent::Error(e.to_string()));
                return;
            }
        }
        if confirmed < rpc.confirmation_blocks {
            tokio::time::sleep(rpc.poll_interval).await;
        }
    }
}
