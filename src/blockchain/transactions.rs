// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Transaction building for native and ERC-20 transfers.
//!
//! [`TransactionBuilder::build`] turns a credential, a recipient, an amount and
//! an asset into a fully-resolved [`UnsignedTransaction`]. Cheap validation
//! runs first; nonce, gas price, gas limit and chain id are then resolved
//! concurrently.
//!
//! ## Nonces
//!
//! Without an explicit `nonce` or a `previous_tx` from the same sender, the
//! nonce is the node's pending transaction count. Two builds for the same
//! sender running at the same time will therefore get the same nonce: callers
//! must build one transaction per sender at a time, or chain builds through
//! [`TransactionOptions::previous_tx`].

use std::fmt;
use std::sync::Arc;

use alloy::{
    primitives::{Bytes, U256},
    rpc::types::TransactionRequest,
};

use super::address::{derive_address, derive_raw_address, parse_address, Credential};
use super::erc20::{token_units, transfer_call_data};
use super::fees::FeeEstimator;
use super::rpc::EthRpc;
use super::submit::TxHooks;
use super::types::{Asset, UnsignedTransaction};
use crate::error::{PaymentsError, PaymentsResult};
use crate::numeric::{u256_to_hex, AmountValue};

/// Overrides for [`TransactionBuilder::build`]. Unset fields are resolved from
/// the network.
#[derive(Clone, Default)]
pub struct TransactionOptions {
    /// Explicit nonce
    pub nonce: Option<u64>,
    /// Explicit gas price in wei
    pub gas_price: Option<U256>,
    /// Explicit gas limit
    pub gas_limit: Option<u64>,
    /// Transaction built just before this one; its nonce + 1 is used when it
    /// comes from the same sender
    pub previous_tx: Option<UnsignedTransaction>,
    /// Lifecycle hooks used when the transaction is submitted
    pub hooks: TxHooks,
}

impl fmt::Debug for TransactionOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionOptions")
            .field("nonce", &self.nonce)
            .field("gas_price", &self.gas_price)
            .field("gas_limit", &self.gas_limit)
            .field("previous_tx", &self.previous_tx)
            .finish_non_exhaustive()
    }
}

/// Builds unsigned transactions.
#[derive(Clone)]
pub struct TransactionBuilder {
    rpc: Arc<dyn EthRpc>,
    fees: FeeEstimator,
    /// Chain id used when the node cannot report one
    default_chain_id: u64,
}

impl TransactionBuilder {
    pub fn new(rpc: Arc<dyn EthRpc>, fees: FeeEstimator, default_chain_id: u64) -> Self {
        Self {
            rpc,
            fees,
            default_chain_id,
        }
    }

    /// Build a fully-resolved transaction sending `amount` of `asset` to `to`.
    ///
    /// Fails with [`PaymentsError::InvalidParameter`] before any network call
    /// when the recipient, the amount or the token contract is invalid.
    pub async fn build(
        &self,
        credential: &Credential,
        to: &str,
        amount: &AmountValue,
        asset: &Asset,
        options: &TransactionOptions,
    ) -> PaymentsResult<UnsignedTransaction> {
        let recipient = parse_address(to)?;
        if amount.is_negative() {
            return Err(PaymentsError::invalid_parameter(format!("invalid amount: {amount}")));
        }

        let from = derive_address(credential);
        let (target, value, data) = match &asset.contract_address {
            None => (recipient, token_units(amount, asset.decimals)?, None),
            Some(contract) => {
                let contract = parse_address(contract)?;
                let data = transfer_call_data(to, amount, asset.decimals)?;
                (contract, U256::ZERO, Some(data))
            }
        };

        let mut request = TransactionRequest::default()
            .from(derive_raw_address(credential))
            .to(target)
            .value(value);
        if let Some(data) = &data {
            request = request.input(data.clone().into());
        }

        let (nonce, gas_price, gas_limit, chain_id) = tokio::join!(
            self.resolve_nonce(&from, options),
            self.resolve_gas_price(options),
            self.resolve_gas_limit(&request, options),
            self.chain_id(),
        );
        let nonce = nonce?;
        let gas_price = gas_price?;

        tracing::debug!(
            from = %from,
            to = %target,
            asset = %asset.symbol,
            nonce,
            gas_limit,
            "Built transaction"
        );

        Ok(UnsignedTransaction {
            chain_id,
            from,
            to: target.to_checksum(None),
            value: u256_to_hex(value),
            data: data.as_ref().map(Bytes::to_string),
            gas_price: u256_to_hex(gas_price),
            gas_limit: u256_to_hex(U256::from(gas_limit)),
            nonce: u256_to_hex(U256::from(nonce)),
        })
    }

    async fn resolve_nonce(&self, from: &str, options: &TransactionOptions) -> PaymentsResult<u64> {
        if let Some(nonce) = options.nonce {
            return Ok(nonce);
        }
        if let Some(previous) = &options.previous_tx {
            if previous.from.eq_ignore_ascii_case(from) {
                let previous_nonce = previous.nonce_value()?;
                return previous_nonce.checked_add(1).ok_or_else(|| {
                    PaymentsError::invalid_parameter("previous transaction nonce overflows")
                });
            }
        }
        let address = parse_address(from)?;
        self.rpc.get_transaction_count(address).await
    }

    async fn resolve_gas_price(&self, options: &TransactionOptions) -> PaymentsResult<U256> {
        if let Some(gas_price) = options.gas_price {
            return Ok(gas_price);
        }
        let quote = self.fees.get_fee_rate().await;
        quote
            .rate
            .to_u256()
            .ok_or_else(|| PaymentsError::rpc(format!("invalid gas price: {}", quote.rate)))
    }

    async fn resolve_gas_limit(&self, request: &TransactionRequest, options: &TransactionOptions) -> u64 {
        match options.gas_limit {
            Some(gas_limit) => gas_limit,
            None => self.fees.estimate_gas_limit(request).await,
        }
    }

    /// Chain id reported by the node, or the configured default.
    pub async fn chain_id(&self) -> u64 {
        match self.rpc.get_chain_id().await {
            Ok(chain_id) => chain_id,
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    default_chain_id = self.default_chain_id,
                    "Failed to get chain id, using default"
                );
                self.default_chain_id
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use super::*;
    use crate::blockchain::fees::FeeConfig;
    use crate::blockchain::rpc::stub::StubRpc;

    const TEST_KEY: &str = "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
    const SENDER: &str = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266";
    const RECIPIENT: &str = "0x70997970C51812dc3A010C7d01b50e0d17dc79C8";
    const USDC: &str = "0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48";

    fn builder(rpc: Arc<StubRpc>) -> TransactionBuilder {
        let fees = FeeEstimator::new(rpc.clone(), FeeConfig::default());
        TransactionBuilder::new(rpc, fees, 1)
    }

    fn credential() -> Credential {
        Credential::from_hex(TEST_KEY).unwrap()
    }

    fn amount(s: &str) -> AmountValue {
        s.parse().unwrap()
    }

    #[tokio::test]
    async fn test_build_native_transfer() {
        let rpc = Arc::new(StubRpc {
            transaction_count: Some(7),
            ..StubRpc::healthy()
        });
        let tx = builder(rpc)
            .build(&credential(), RECIPIENT, &amount("1.5"), &Asset::ether(), &TransactionOptions::default())
            .await
            .unwrap();

        assert_eq!(tx.chain_id, 1);
        assert_eq!(tx.from, SENDER);
        assert_eq!(tx.to, RECIPIENT);
        assert_eq!(tx.value, "0x14d1120d7b160000");
        assert_eq!(tx.data, None);
        assert_eq!(tx.gas_price, "0x6fc23ac00");
        assert_eq!(tx.gas_limit, "0x5208");
        assert_eq!(tx.nonce, "0x7");
    }

    #[tokio::test]
    async fn test_build_token_transfer() {
        let rpc = Arc::new(StubRpc {
            gas_estimate: Some(52_000),
            ..StubRpc::healthy()
        });
        let usdc = Asset::token("USDC", USDC, 6);
        let tx = builder(rpc)
            .build(&credential(), RECIPIENT, &amount("2.5"), &usdc, &TransactionOptions::default())
            .await
            .unwrap();

        assert_eq!(tx.to, USDC);
        assert_eq!(tx.value, "0x0");
        let data = tx.data.as_deref().unwrap();
        assert!(data.starts_with("0xa9059cbb"));
        assert!(data.contains(&RECIPIENT[2..].to_lowercase()));
        // 2.5 * 10^6 = 0x2625a0
        assert!(data.ends_with("2625a0"));
        // Token floor applies over the lower estimate.
        assert_eq!(tx.gas_limit, "0x186a0");
        assert!(tx.is_contract_call());
    }

    #[tokio::test]
    async fn test_explicit_overrides_skip_network() {
        let rpc = Arc::new(StubRpc::healthy());
        let options = TransactionOptions {
            nonce: Some(0),
            gas_price: Some(U256::from(1_000_000_000u64)),
            gas_limit: Some(30_000),
            ..Default::default()
        };
        let tx = builder(rpc.clone())
            .build(&credential(), RECIPIENT, &amount("0"), &Asset::ether(), &options)
            .await
            .unwrap();

        assert_eq!(tx.nonce, "0x0");
        assert_eq!(tx.gas_price, "0x3b9aca00");
        assert_eq!(tx.gas_limit, "0x7530");
        assert_eq!(tx.value, "0x0");
        assert_eq!(rpc.nonce_calls.load(Ordering::SeqCst), 0);
        // Only the chain id query.
        assert_eq!(rpc.network_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_nonce_chains_from_previous_tx() {
        let rpc = Arc::new(StubRpc {
            transaction_count: Some(2),
            ..StubRpc::healthy()
        });
        let builder = builder(rpc.clone());

        let mut previous = builder
            .build(&credential(), RECIPIENT, &amount("1"), &Asset::ether(), &TransactionOptions::default())
            .await
            .unwrap();
        previous.from = SENDER.to_uppercase().replacen("0X", "0x", 1);
        previous.nonce = "0x5".to_string();

        let options = TransactionOptions {
            previous_tx: Some(previous),
            ..Default::default()
        };
        let next = builder
            .build(&credential(), RECIPIENT, &amount("1"), &Asset::ether(), &options)
            .await
            .unwrap();

        assert_eq!(next.nonce_value().unwrap(), 6);
        assert_eq!(next.nonce, "0x6");
        // Only the first build asked the node.
        assert_eq!(rpc.nonce_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_previous_tx_from_other_sender_is_ignored() {
        let rpc = Arc::new(StubRpc {
            transaction_count: Some(9),
            ..StubRpc::healthy()
        });
        let previous = UnsignedTransaction {
            chain_id: 1,
            from: RECIPIENT.to_string(),
            to: SENDER.to_string(),
            value: "0x0".into(),
            data: None,
            gas_price: "0x1".into(),
            gas_limit: "0x5208".into(),
            nonce: "0x5".into(),
        };
        let options = TransactionOptions {
            previous_tx: Some(previous),
            ..Default::default()
        };
        let tx = builder(rpc)
            .build(&credential(), RECIPIENT, &amount("1"), &Asset::ether(), &options)
            .await
            .unwrap();
        assert_eq!(tx.nonce, "0x9");
    }

    #[tokio::test]
    async fn test_explicit_nonce_wins_over_previous_tx() {
        let rpc = Arc::new(StubRpc::healthy());
        let previous = UnsignedTransaction {
            chain_id: 1,
            from: SENDER.to_string(),
            to: RECIPIENT.to_string(),
            value: "0x0".into(),
            data: None,
            gas_price: "0x1".into(),
            gas_limit: "0x5208".into(),
            nonce: "0x5".into(),
        };
        let options = TransactionOptions {
            nonce: Some(42),
            previous_tx: Some(previous),
            ..Default::default()
        };
        let tx = builder(rpc)
            .build(&credential(), RECIPIENT, &amount("1"), &Asset::ether(), &options)
            .await
            .unwrap();
        assert_eq!(tx.nonce, "0x2a");
    }

    #[tokio::test]
    async fn test_degraded_network_uses_defaults() {
        let rpc = Arc::new(StubRpc {
            transaction_count: Some(3),
            ..StubRpc::default()
        });
        let usdc = Asset::token("USDC", USDC, 6);
        let tx = builder(rpc)
            .build(&credential(), RECIPIENT, &amount("1"), &usdc, &TransactionOptions::default())
            .await
            .unwrap();

        assert_eq!(tx.chain_id, 1);
        assert_eq!(tx.gas_price, "0x4e3b29200");
        assert_eq!(tx.gas_limit, "0x186a0");
        assert_eq!(tx.nonce, "0x3");
    }

    #[tokio::test]
    async fn test_nonce_failure_propagates() {
        let rpc = Arc::new(StubRpc {
            transaction_count: None,
            ..StubRpc::healthy()
        });
        let err = builder(rpc)
            .build(&credential(), RECIPIENT, &amount("1"), &Asset::ether(), &TransactionOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, PaymentsError::Rpc(_)));
    }

    #[tokio::test]
    async fn test_invalid_parameters_fail_before_network() {
        let rpc = Arc::new(StubRpc::healthy());
        let builder = builder(rpc.clone());
        let options = TransactionOptions::default();

        let bad_recipient = builder
            .build(&credential(), "0xnotanaddress", &amount("1"), &Asset::ether(), &options)
            .await;
        assert!(matches!(bad_recipient, Err(PaymentsError::InvalidParameter(_))));

        let negative = builder
            .build(&credential(), RECIPIENT, &amount("-1"), &Asset::ether(), &options)
            .await;
        assert!(matches!(negative, Err(PaymentsError::InvalidParameter(_))));

        let bad_contract = builder
            .build(&credential(), RECIPIENT, &amount("1"), &Asset::token("BAD", "0x12", 6), &options)
            .await;
        assert!(matches!(bad_contract, Err(PaymentsError::InvalidParameter(_))));

        let too_precise = builder
            .build(&credential(), RECIPIENT, &amount("0.0000001"), &Asset::token("USDC", USDC, 6), &options)
            .await;
        assert!(matches!(too_precise, Err(PaymentsError::InvalidParameter(_))));

        assert_eq!(rpc.total_calls(), 0);
    }
}
