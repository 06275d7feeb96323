// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Gas price and gas limit estimation.
//!
//! Neither lookup ever fails the caller: when the node cannot answer, the
//! configured defaults are used and the degradation is logged.

use std::sync::Arc;

use alloy::{primitives::U256, rpc::types::TransactionRequest};

use super::rpc::EthRpc;
use super::types::{Asset, FeeQuote, FEE_UNIT};
use crate::numeric::{to_tx_fee, AmountValue};

/// 21 gwei.
pub const DEFAULT_GAS_PRICE: u64 = 21_000_000_000;

/// Gas for a plain value transfer.
pub const DEFAULT_GAS_LIMIT_NATIVE: u64 = 21_000;

/// Gas budget for an ERC-20 transfer.
pub const DEFAULT_GAS_LIMIT_TOKEN: u64 = 100_000;

/// Gas constants used when the node's answer is missing or too low.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeeConfig {
    /// Gas price used when `eth_gasPrice` fails
    pub default_gas_price: U256,
    /// Gas limit used for plain transfers when `eth_estimateGas` fails
    pub default_gas_limit_native: u64,
    /// Gas limit used for contract calls when `eth_estimateGas` fails
    pub default_gas_limit_token: u64,
    /// Lowest gas limit accepted for plain transfers
    pub min_gas_limit_native: u64,
    /// Lowest gas limit accepted for contract calls
    pub min_gas_limit_token: u64,
}

impl Default for FeeConfig {
    fn default() -> Self {
        Self {
            default_gas_price: U256::from(DEFAULT_GAS_PRICE),
            default_gas_limit_native: DEFAULT_GAS_LIMIT_NATIVE,
            default_gas_limit_token: DEFAULT_GAS_LIMIT_TOKEN,
            min_gas_limit_native: DEFAULT_GAS_LIMIT_NATIVE,
            min_gas_limit_token: DEFAULT_GAS_LIMIT_TOKEN,
        }
    }
}

impl FeeConfig {
    fn floor(&self, contract_call: bool) -> u64 {
        if contract_call {
            self.min_gas_limit_token
        } else {
            self.min_gas_limit_native
        }
    }

    fn fallback(&self, contract_call: bool) -> u64 {
        if contract_call {
            self.default_gas_limit_token
        } else {
            self.default_gas_limit_native
        }
    }
}

/// Whether a request carries contract call data.
fn is_contract_call(tx: &TransactionRequest) -> bool {
    tx.input.input().is_some_and(|data| !data.is_empty())
}

/// Resolves gas price and gas limit.
#[derive(Clone)]
pub struct FeeEstimator {
    rpc: Arc<dyn EthRpc>,
    config: FeeConfig,
}

impl FeeEstimator {
    pub fn new(rpc: Arc<dyn EthRpc>, config: FeeConfig) -> Self {
        Self { rpc, config }
    }

    pub fn config(&self) -> &FeeConfig {
        &self.config
    }

    /// Current gas price, or the default price when the node cannot answer.
    pub async fn get_fee_rate(&self) -> FeeQuote {
        let rate = match self.rpc.get_gas_price().await {
            Ok(price) => price,
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    default_wei = %self.config.default_gas_price,
                    "Failed to get dynamic gas price, using default"
                );
                self.config.default_gas_price
            }
        };

        FeeQuote {
            rate: AmountValue::from(rate),
            unit: FEE_UNIT,
        }
    }

    /// Gas limit for a transaction, never below the floor for its shape.
    pub async fn estimate_gas_limit(&self, tx: &TransactionRequest) -> u64 {
        let contract_call = is_contract_call(tx);
        match self.rpc.estimate_gas(tx).await {
            Ok(estimate) => estimate.max(self.config.floor(contract_call)),
            Err(e) => {
                let fallback = self.config.fallback(contract_call);
                tracing::warn!(
                    error = %e,
                    fallback,
                    "Gas estimation failed, falling back to fixed limit"
                );
                fallback
            }
        }
    }

    /// Fee in ether for sending `asset` at the minimum gas limit and the
    /// default gas price. Needs no network access.
    pub fn static_fee(&self, asset: &Asset) -> AmountValue {
        let gas_limit = self.config.floor(!asset.is_native());
        to_tx_fee(gas_limit, self.config.default_gas_price)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::rpc::stub::StubRpc;
    use alloy::primitives::{Address, Bytes};

    fn estimator(rpc: StubRpc) -> FeeEstimator {
        FeeEstimator::new(Arc::new(rpc), FeeConfig::default())
    }

    fn native_tx() -> TransactionRequest {
        TransactionRequest::default()
            .to(Address::repeat_byte(0x11))
            .value(U256::from(1u64))
    }

    fn token_tx() -> TransactionRequest {
        TransactionRequest::default()
            .to(Address::repeat_byte(0x22))
            .input(Bytes::from(vec![0xa9, 0x05, 0x9c, 0xbb, 0x00]).into())
    }

    #[tokio::test]
    async fn test_fee_rate_from_network() {
        let fees = estimator(StubRpc::healthy());
        let quote = fees.get_fee_rate().await;
        assert_eq!(quote.rate, AmountValue::from(30_000_000_000u64));
        assert_eq!(quote.unit, "wei/gas");
    }

    #[tokio::test]
    async fn test_fee_rate_falls_back_to_default() {
        let fees = estimator(StubRpc::default());
        let quote = fees.get_fee_rate().await;
        assert_eq!(quote.rate, AmountValue::from(DEFAULT_GAS_PRICE));
        assert_eq!(quote.unit, FEE_UNIT);
    }

    #[tokio::test]
    async fn test_gas_limit_is_clamped_to_floor() {
        let rpc = StubRpc {
            gas_estimate: Some(15_000),
            ..StubRpc::healthy()
        };
        let fees = estimator(rpc);
        assert_eq!(fees.estimate_gas_limit(&native_tx()).await, 21_000);
        assert_eq!(fees.estimate_gas_limit(&token_tx()).await, 100_000);
    }

    #[tokio::test]
    async fn test_gas_limit_keeps_higher_estimate() {
        let rpc = StubRpc {
            gas_estimate: Some(250_000),
            ..StubRpc::healthy()
        };
        let fees = estimator(rpc);
        assert_eq!(fees.estimate_gas_limit(&native_tx()).await, 250_000);
        assert_eq!(fees.estimate_gas_limit(&token_tx()).await, 250_000);
    }

    #[tokio::test]
    async fn test_gas_limit_falls_back_by_shape() {
        let fees = estimator(StubRpc::default());
        assert_eq!(fees.estimate_gas_limit(&native_tx()).await, DEFAULT_GAS_LIMIT_NATIVE);
        assert_eq!(fees.estimate_gas_limit(&token_tx()).await, DEFAULT_GAS_LIMIT_TOKEN);
    }

    #[tokio::test]
    async fn test_empty_input_counts_as_plain_transfer() {
        let rpc = StubRpc {
            gas_estimate: Some(1),
            ..StubRpc::healthy()
        };
        let fees = estimator(rpc);
        let tx = native_tx().input(Bytes::new().into());
        assert_eq!(fees.estimate_gas_limit(&tx).await, 21_000);
    }

    #[test]
    fn test_static_fee() {
        let fees = estimator(StubRpc::default());
        // 21000 * 21 gwei and 100000 * 21 gwei
        assert_eq!(fees.static_fee(&Asset::ether()).to_string(), "0.000441");
        let token = Asset::token("USDC", "0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48", 6);
        assert_eq!(fees.static_fee(&token).to_string(), "0.0021");
    }
}
