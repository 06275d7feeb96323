// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Blockchain types and constants.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{PaymentsError, PaymentsResult};
use crate::numeric::{parse_hex_quantity, AmountValue, NATIVE_DECIMALS};

/// Ethereum network configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkConfig {
    /// Network name for display
    pub name: &'static str,
    /// Chain ID
    pub chain_id: u64,
    /// Public RPC endpoint, used when no provider URL is configured
    pub rpc_url: &'static str,
    /// Etherscan-compatible explorer API endpoint
    pub explorer_api_url: &'static str,
}

/// Ethereum Mainnet configuration.
pub const ETH_MAINNET: NetworkConfig = NetworkConfig {
    name: "Ethereum Mainnet",
    chain_id: 1,
    rpc_url: "https://ethereum-rpc.publicnode.com",
    explorer_api_url: "https://api.etherscan.io/api",
};

/// Ethereum Sepolia Testnet configuration.
pub const ETH_SEPOLIA: NetworkConfig = NetworkConfig {
    name: "Ethereum Sepolia Testnet",
    chain_id: 11_155_111,
    rpc_url: "https://ethereum-sepolia-rpc.publicnode.com",
    explorer_api_url: "https://api-sepolia.etherscan.io/api",
};

pub const NETWORK_MAINNET: &str = "mainnet";
pub const NETWORK_SEPOLIA: &str = "sepolia";

/// Resolve a network by name. `None` selects mainnet.
pub fn network_by_name(raw: Option<&str>) -> PaymentsResult<NetworkConfig> {
    let value = raw.unwrap_or(NETWORK_MAINNET).trim().to_ascii_lowercase();
    match value.as_str() {
        NETWORK_MAINNET => Ok(ETH_MAINNET),
        NETWORK_SEPOLIA | "testnet" => Ok(ETH_SEPOLIA),
        other => Err(PaymentsError::invalid_parameter(format!(
            "Invalid network provided: {other}"
        ))),
    }
}

/// An asset the wallet can hold: the native coin or an ERC-20 token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Asset {
    /// Symbol used as the key in balance results (e.g., "ETH", "USDC")
    pub symbol: String,
    /// Token contract address (None for the native coin)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contract_address: Option<String>,
    /// Number of decimals
    pub decimals: u8,
}

impl Asset {
    /// Native coin with 18 decimals.
    pub fn native(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            contract_address: None,
            decimals: NATIVE_DECIMALS as u8,
        }
    }

    /// Ether on any Ethereum network.
    pub fn ether() -> Self {
        Self::native("ETH")
    }

    pub fn token(symbol: impl Into<String>, contract_address: impl Into<String>, decimals: u8) -> Self {
        Self {
            symbol: symbol.into(),
            contract_address: Some(contract_address.into()),
            decimals,
        }
    }

    pub fn is_native(&self) -> bool {
        self.contract_address.is_none()
    }
}

/// Current fee rate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeeQuote {
    /// Gas price in wei
    pub rate: AmountValue,
    /// Always `wei/gas`
    pub unit: &'static str,
}

pub const FEE_UNIT: &str = "wei/gas";

/// Balances keyed by asset symbol, in main denomination.
///
/// The native asset is always present; tokens only when their balance is
/// non-zero.
pub type BalanceResult = BTreeMap<String, AmountValue>;

/// A fully-resolved, unsigned legacy transaction.
///
/// All quantities are `0x`-prefixed lowercase hex. Either `value` carries a
/// plain transfer and `data` is absent, or `value` is `0x0` and `data` carries
/// an ERC-20 `transfer` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnsignedTransaction {
    pub chain_id: u64,
    /// Checksummed sender address
    pub from: String,
    /// Recipient, or the token contract for ERC-20 transfers
    pub to: String,
    /// Amount in wei
    pub value: String,
    /// Contract call data
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    /// Gas price in wei
    pub gas_price: String,
    pub gas_limit: String,
    pub nonce: String,
}

impl UnsignedTransaction {
    /// Decoded nonce.
    pub fn nonce_value(&self) -> PaymentsResult<u64> {
        let nonce = parse_hex_quantity(&self.nonce)?;
        u64::try_from(nonce)
            .map_err(|_| PaymentsError::invalid_parameter(format!("nonce out of range: {}", self.nonce)))
    }

    /// Whether this is a contract call rather than a plain value transfer.
    pub fn is_contract_call(&self) -> bool {
        self.data.as_deref().is_some_and(|d| d.len() > 2)
    }
}

/// Transaction receipt after inclusion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxReceipt {
    /// Transaction hash
    pub tx_hash: String,
    /// Block number where transaction was included
    pub block_number: u64,
    /// Gas actually used
    pub gas_used: u64,
    /// Whether the transaction was successful
    pub success: bool,
}
