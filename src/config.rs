// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! This module defines environment variable names and default values used
//! throughout the crate. [`PaymentsConfig::from_env`] loads them at startup;
//! library users can also build a [`PaymentsConfig`] directly.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `ETH_NETWORK` | Network name (`mainnet` or `sepolia`) | `mainnet` |
//! | `ETH_RPC_URL` | JSON-RPC endpoint | Network's public endpoint |
//! | `ETHERSCAN_API_KEY` | Block explorer API key | None |
//! | `CONFIRMATION_BLOCKS` | Confirmations tracked after a receipt | `12` |
//! | `ETH_PRIVATE_KEY` | Signing key for the command runner | Required for `address` |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info` |

use crate::blockchain::balances::GET_BALANCES_BATCH_SIZE;
use crate::blockchain::fees::FeeConfig;
use crate::blockchain::rpc::DEFAULT_CONFIRMATION_BLOCKS;
use crate::blockchain::types::{network_by_name, NetworkConfig, ETH_MAINNET};
use crate::error::{PaymentsError, PaymentsResult};

/// Environment variable name for the network selection.
///
/// # Values
/// `mainnet`, `sepolia` (`testnet` is accepted as an alias)
pub const ETH_NETWORK_ENV: &str = "ETH_NETWORK";

/// Environment variable name for the JSON-RPC endpoint.
///
/// When unset, the network's public endpoint is used and a warning is
/// logged: public endpoints are rate limited.
pub const ETH_RPC_URL_ENV: &str = "ETH_RPC_URL";

/// Environment variable name for the block explorer API key.
pub const ETHERSCAN_API_KEY_ENV: &str = "ETHERSCAN_API_KEY";

/// Environment variable name for the number of confirmations reported to
/// `on_confirmation` hooks after a transaction is mined.
pub const CONFIRMATION_BLOCKS_ENV: &str = "CONFIRMATION_BLOCKS";

/// Environment variable name for the hex-encoded signing key.
///
/// Keys are only ever read from the environment, never from arguments.
pub const ETH_PRIVATE_KEY_ENV: &str = "ETH_PRIVATE_KEY";

/// Environment variable name for the log output format.
///
/// # Values
/// `json` for structured output, anything else for human-readable output.
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";

/// Default log filter when `RUST_LOG` is unset.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Everything needed to wire an [`EthPayments`](crate::EthPayments) handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentsConfig {
    pub network: NetworkConfig,
    /// JSON-RPC endpoint override
    pub rpc_url: Option<String>,
    pub explorer_api_key: Option<String>,
    pub fees: FeeConfig,
    /// Maximum balance requests per batch
    pub batch_size: usize,
    pub confirmation_blocks: u64,
}

impl Default for PaymentsConfig {
    fn default() -> Self {
        Self::for_network(ETH_MAINNET)
    }
}

impl PaymentsConfig {
    pub fn for_network(network: NetworkConfig) -> Self {
        Self {
            network,
            rpc_url: None,
            explorer_api_key: None,
            fees: FeeConfig::default(),
            batch_size: GET_BALANCES_BATCH_SIZE,
            confirmation_blocks: DEFAULT_CONFIRMATION_BLOCKS,
        }
    }

    pub fn with_rpc_url(mut self, rpc_url: impl Into<String>) -> Self {
        self.rpc_url = Some(rpc_url.into());
        self
    }

    /// Load configuration from the process environment.
    pub fn from_env() -> PaymentsResult<Self> {
        Self::from_lookup(env_optional)
    }

    /// Load configuration through `lookup`, which returns a variable's
    /// trimmed, non-empty value.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> PaymentsResult<Self> {
        let network = network_by_name(lookup(ETH_NETWORK_ENV).as_deref())?;
        let mut config = Self::for_network(network);

        config.rpc_url = lookup(ETH_RPC_URL_ENV);
        config.explorer_api_key = lookup(ETHERSCAN_API_KEY_ENV);

        if let Some(raw) = lookup(CONFIRMATION_BLOCKS_ENV) {
            config.confirmation_blocks = raw.parse().map_err(|_| {
                PaymentsError::invalid_parameter(format!(
                    "{CONFIRMATION_BLOCKS_ENV} must be a non-negative integer, got {raw}"
                ))
            })?;
        }

        Ok(config)
    }

    /// Configured endpoint, or the network's public one.
    pub fn effective_rpc_url(&self) -> &str {
        self.rpc_url.as_deref().unwrap_or(self.network.rpc_url)
    }

    pub fn uses_default_provider(&self) -> bool {
        self.rpc_url.is_none()
    }
}

/// Read an environment variable, treating blank values as unset.
pub fn env_optional(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
