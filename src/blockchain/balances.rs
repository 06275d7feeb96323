// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Balance aggregation
//!
//! Resolves native and ERC-20 balances for one wallet across any number of
//! assets.
//!
//! ## Strategy
//!
//! 1. Every asset becomes a [`BalanceRequest`]: `eth_getBalance` for the
//!    native coin, `eth_call(balanceOf)` for tokens. Addresses are validated
//!    before anything is sent.
//! 2. Requests are split into batches of at most `batch_size` (500 by
//!    default) to stay inside provider limits.
//! 3. Each batch is sent as one JSON-RPC batch ([`EthRpc::batch_read`]), so
//!    the node sees at most `batch_size` requests per round trip. All
//!    batches are in flight at the same time.
//! 4. Once everything has completed, results are merged by symbol. The
//!    native asset is always kept; tokens only when their balance is > 0.
//!
//! A single failed request fails the whole call. Partial results are never
//! returned.

use std::sync::Arc;

use alloy::primitives::{Address, U256};
use futures::future::try_join_all;

use super::address::parse_address;
use super::erc20::{balance_of_call_data, decode_balance};
use super::rpc::{EthRpc, ReadRequest, ReadResponse};
use super::types::{Asset, BalanceResult};
use crate::error::{PaymentsError, PaymentsResult};
use crate::numeric::{to_main_denomination, AmountValue};

/// Maximum number of requests dispatched in one batch.
pub const GET_BALANCES_BATCH_SIZE: usize = 500;

/// What to ask the node for one asset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BalanceQuery {
    Native,
    Token { contract: Address },
}

/// One balance lookup, tagged with the asset it resolves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BalanceRequest {
    pub symbol: String,
    pub decimals: u8,
    pub query: BalanceQuery,
}

impl BalanceRequest {
    fn for_asset(asset: &Asset) -> PaymentsResult<Self> {
        let query = match &asset.contract_address {
            None => BalanceQuery::Native,
            Some(contract) => BalanceQuery::Token {
                contract: parse_address(contract)?,
            },
        };
        Ok(Self {
            symbol: asset.symbol.clone(),
            decimals: asset.decimals,
            query,
        })
    }

    fn is_native(&self) -> bool {
        self.query == BalanceQuery::Native
    }

    fn read_request(&self, wallet: Address) -> ReadRequest {
        match &self.query {
            BalanceQuery::Native => ReadRequest::Balance(wallet),
            BalanceQuery::Token { contract } => ReadRequest::Call {
                to: *contract,
                data: balance_of_call_data(&wallet),
            },
        }
    }

    fn failed(&self, cause: impl std::fmt::Display) -> PaymentsError {
        PaymentsError::Aggregation(format!("error retrieving {} balance: {}", self.symbol, cause))
    }
}

/// Split requests into consecutive batches of at most `batch_size`.
pub fn plan_batches(requests: Vec<BalanceRequest>, batch_size: usize) -> Vec<Vec<BalanceRequest>> {
    let batch_size = batch_size.max(1);
    requests
        .chunks(batch_size)
        .map(|chunk| chunk.to_vec())
        .collect()
}

/// Batched, concurrent balance lookups.
#[derive(Clone)]
pub struct BalanceAggregator {
    rpc: Arc<dyn EthRpc>,
    batch_size: usize,
}

impl BalanceAggregator {
    pub fn new(rpc: Arc<dyn EthRpc>) -> Self {
        Self::with_batch_size(rpc, GET_BALANCES_BATCH_SIZE)
    }

    pub fn with_batch_size(rpc: Arc<dyn EthRpc>, batch_size: usize) -> Self {
        Self {
            rpc,
            batch_size: batch_size.max(1),
        }
    }

    /// Balances of `address` for every asset, in main denomination.
    pub async fn get_balances(&self, address: &str, assets: &[Asset]) -> PaymentsResult<BalanceResult> {
        let wallet = parse_address(address)?;
        let requests = assets
            .iter()
            .map(BalanceRequest::for_asset)
            .collect::<PaymentsResult<Vec<_>>>()?;

        let batches = plan_batches(requests, self.batch_size);
        tracing::debug!(
            address = %wallet,
            assets = assets.len(),
            batches = batches.len(),
            "Querying balances"
        );

        let resolved = try_join_all(batches.iter().map(|batch| self.dispatch(wallet, batch))).await?;

        let mut result = BalanceResult::new();
        for (request, balance) in resolved.into_iter().flatten() {
            if request.is_native() || balance.is_positive() {
                result.insert(request.symbol.clone(), balance);
            }
        }
        Ok(result)
    }

    /// Balance of `address` for one asset, kept even when zero.
    pub async fn get_balance(&self, address: &str, asset: &Asset) -> PaymentsResult<AmountValue> {
        let wallet = parse_address(address)?;
        let request = BalanceRequest::for_asset(asset)?;
        let raw = self
            .fetch(wallet, &request.query)
            .await
            .map_err(|e| request.failed(e))?;
        Ok(to_main_denomination(raw, u32::from(request.decimals)))
    }

    /// Send one batch and decode every entry. Any failure fails the batch.
    async fn dispatch<'a>(
        &self,
        wallet: Address,
        batch: &'a [BalanceRequest],
    ) -> PaymentsResult<Vec<(&'a BalanceRequest, AmountValue)>> {
        let reads: Vec<ReadRequest> = batch.iter().map(|request| request.read_request(wallet)).collect();
        let responses = self.rpc.batch_read(&reads).await.map_err(|e| {
            PaymentsError::Aggregation(format!("error retrieving balances: {e}"))
        })?;
        if responses.len() != batch.len() {
            return Err(PaymentsError::Aggregation(format!(
                "batch of {} requests answered with {} responses",
                batch.len(),
                responses.len()
            )));
        }

        batch
            .iter()
            .zip(responses)
            .map(|(request, response)| {
                let raw = response
                    .and_then(|response| match response {
                        ReadResponse::Balance(balance) => Ok(balance),
                        ReadResponse::Call(output) => decode_balance(&output),
                    })
                    .map_err(|e| request.failed(e))?;
                Ok((request, to_main_denomination(raw, u32::from(request.decimals))))
            })
            .collect()
    }

    async fn fetch(&self, wallet: Address, query: &BalanceQuery) -> PaymentsResult<U256> {
        match query {
            BalanceQuery::Native => self.rpc.get_balance(wallet).await,
            BalanceQuery::Token { contract } => {
                let output = self.rpc.call(*contract, balance_of_call_data(&wallet)).await?;
                decode_balance(&output)
            }
        }
    }
}
