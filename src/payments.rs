// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! One handle over every payments component.
//!
//! [`EthPayments`] wires the fee estimator, balance aggregator, transaction
//! builder, submitter and explorer from a [`PaymentsConfig`] around a single
//! shared RPC connection. It holds no key material: every signing operation
//! takes the [`Credential`] explicitly.

use std::sync::Arc;

use serde_json::Value;

use crate::blockchain::{
    derive_address, AlloyRpc, Asset, BalanceAggregator, BalanceResult, Credential, EthRpc,
    FeeEstimator, FeeQuote, TransactionBuilder, TransactionOptions, TransactionSubmitter, TxHooks,
    UnsignedTransaction,
};
use crate::config::PaymentsConfig;
use crate::error::{PaymentsError, PaymentsResult};
use crate::explorer::ExplorerClient;
use crate::numeric::AmountValue;

/// Ethereum payments handle.
#[derive(Clone)]
pub struct EthPayments {
    config: PaymentsConfig,
    fees: FeeEstimator,
    balances: BalanceAggregator,
    builder: TransactionBuilder,
    submitter: TransactionSubmitter,
    explorer: Option<ExplorerClient>,
}

impl EthPayments {
    /// Connect to the configured JSON-RPC endpoint and block explorer.
    pub fn connect(config: PaymentsConfig) -> PaymentsResult<Self> {
        if config.uses_default_provider() {
            tracing::warn!(
                network = config.network.name,
                rpc_url = config.network.rpc_url,
                "No RPC URL configured, using the public endpoint. Expect rate limits."
            );
        }

        let rpc = AlloyRpc::connect(config.effective_rpc_url())?
            .with_confirmation_blocks(config.confirmation_blocks);
        let explorer = ExplorerClient::new(
            config.network.explorer_api_url,
            config.explorer_api_key.clone(),
        )?;

        tracing::info!(
            network = config.network.name,
            chain_id = config.network.chain_id,
            "Payments client ready"
        );

        Ok(Self::with_rpc(config, Arc::new(rpc)).with_explorer(explorer))
    }

    /// Build a handle over an existing RPC implementation. No explorer is
    /// attached.
    pub fn with_rpc(config: PaymentsConfig, rpc: Arc<dyn EthRpc>) -> Self {
        let fees = FeeEstimator::new(rpc.clone(), config.fees.clone());
        let balances = BalanceAggregator::with_batch_size(rpc.clone(), config.batch_size);
        let builder = TransactionBuilder::new(rpc.clone(), fees.clone(), config.network.chain_id);
        let submitter = TransactionSubmitter::new(rpc);

        Self {
            config,
            fees,
            balances,
            builder,
            submitter,
            explorer: None,
        }
    }

    pub fn with_explorer(mut self, explorer: ExplorerClient) -> Self {
        self.explorer = Some(explorer);
        self
    }

    pub fn config(&self) -> &PaymentsConfig {
        &self.config
    }

    /// Checksummed address controlled by `credential`.
    pub fn address(&self, credential: &Credential) -> String {
        derive_address(credential)
    }

    pub async fn balance(&self, address: &str, asset: &Asset) -> PaymentsResult<AmountValue> {
        self.balances.get_balance(address, asset).await
    }

    pub async fn balances(&self, address: &str, assets: &[Asset]) -> PaymentsResult<BalanceResult> {
        self.balances.get_balances(address, assets).await
    }

    pub async fn fee_rate(&self) -> FeeQuote {
        self.fees.get_fee_rate().await
    }

    pub fn static_fee(&self, asset: &Asset) -> AmountValue {
        self.fees.static_fee(asset)
    }

    pub async fn chain_id(&self) -> u64 {
        self.builder.chain_id().await
    }

    pub async fn build_transaction(
        &self,
        credential: &Credential,
        to: &str,
        amount: impl Into<AmountValue>,
        asset: &Asset,
        options: &TransactionOptions,
    ) -> PaymentsResult<UnsignedTransaction> {
        self.builder
            .build(credential, to, &amount.into(), asset, options)
            .await
    }

    /// Sign and broadcast a built transaction. Resolves with its hash.
    pub async fn send_transaction(
        &self,
        credential: &Credential,
        tx: &UnsignedTransaction,
        hooks: TxHooks,
    ) -> PaymentsResult<String> {
        self.submitter.submit(credential, tx, hooks).await
    }

    /// Build, sign and broadcast in one step, using `options.hooks`.
    pub async fn transfer(
        &self,
        credential: &Credential,
        to: &str,
        amount: impl Into<AmountValue>,
        asset: &Asset,
        options: TransactionOptions,
    ) -> PaymentsResult<String> {
        let tx = self
            .build_transaction(credential, to, amount, asset, &options)
            .await?;
        self.send_transaction(credential, &tx, options.hooks).await
    }

    /// Native and token transfer history of `address`, oldest first.
    pub async fn previous_transactions(&self, address: &str) -> PaymentsResult<Vec<Value>> {
        match &self.explorer {
            Some(explorer) => explorer.get_transactions(address).await,
            None => Err(PaymentsError::Explorer(
                "no block explorer configured".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use alloy::primitives::U256;

    use super::*;
    use crate::blockchain::rpc::stub::StubRpc;
    use crate::blockchain::{BroadcastEvent, ETH_SEPOLIA};

    const TEST_KEY: &str = "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
    const SENDER: &str = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266";
    const RECIPIENT: &str = "0x70997970C51812dc3A010C7d01b50e0d17dc79C8";

    fn credential() -> Credential {
        Credential::from_hex(TEST_KEY).unwrap()
    }

    fn payments(rpc: Arc<StubRpc>) -> EthPayments {
        EthPayments::with_rpc(PaymentsConfig::default(), rpc)
    }

    #[tokio::test]
    async fn test_read_operations() {
        let mut rpc = StubRpc::healthy();
        rpc.native_balance = U256::from(2_000_000_000_000_000_000u128);
        let payments = payments(Arc::new(rpc));

        assert_eq!(payments.address(&credential()), SENDER);
        assert_eq!(
            payments.balance(SENDER, &Asset::ether()).await.unwrap().to_string(),
            "2"
        );
        let balances = payments.balances(SENDER, &[Asset::ether()]).await.unwrap();
        assert_eq!(balances.get("ETH").unwrap().to_string(), "2");
        assert_eq!(payments.fee_rate().await.rate, AmountValue::from(30_000_000_000u64));
        assert_eq!(payments.static_fee(&Asset::ether()).to_string(), "0.000441");
        assert_eq!(payments.chain_id().await, 1);
    }

    #[tokio::test]
    async fn test_chain_id_falls_back_to_configured_network() {
        let rpc = Arc::new(StubRpc {
            chain_id: None,
            ..StubRpc::healthy()
        });
        let payments = EthPayments::with_rpc(PaymentsConfig::for_network(ETH_SEPOLIA), rpc);
        assert_eq!(payments.chain_id().await, 11_155_111);
    }

    #[tokio::test]
    async fn test_transfer_builds_signs_and_broadcasts() {
        let rpc = StubRpc::healthy();
        *rpc.broadcast.lock().unwrap() = Some(vec![BroadcastEvent::TransactionHash("0xfeed".into())]);
        let rpc = Arc::new(rpc);
        let payments = payments(rpc.clone());

        let hash = payments
            .transfer(&credential(), RECIPIENT, "0.25", &Asset::ether(), TransactionOptions::default())
            .await
            .unwrap();

        assert_eq!(hash, "0xfeed");
        assert_eq!(rpc.sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_transfer_validates_before_broadcast() {
        let rpc = Arc::new(StubRpc::healthy());
        let payments = payments(rpc.clone());

        let err = payments
            .transfer(&credential(), "0xnot-an-address", 1u64, &Asset::ether(), TransactionOptions::default())
            .await
            .unwrap_err();

        assert!(matches!(err, PaymentsError::InvalidParameter(_)));
        assert!(rpc.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_history_requires_explorer() {
        let payments = payments(Arc::new(StubRpc::healthy()));
        assert!(matches!(
            payments.previous_transactions(SENDER).await,
            Err(PaymentsError::Explorer(_))
        ));
    }

    #[test]
    fn test_connect() {
        let payments = EthPayments::connect(PaymentsConfig::default()).unwrap();
        assert!(payments.explorer.is_some());

        let err = EthPayments::connect(PaymentsConfig::default().with_rpc_url("not a url"))
            .err()
            .unwrap();
        assert!(matches!(err, PaymentsError::InvalidRpcUrl(_)));
    }
}
