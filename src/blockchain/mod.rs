// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Blockchain integration for Ethereum and EVM-compatible chains.
//!
//! This module provides functionality for:
//! - Deriving and validating addresses
//! - Querying native ETH and ERC-20 token balances in batches
//! - Gas price and gas limit estimation
//! - Building, signing and broadcasting legacy transactions

pub mod address;
pub mod balances;
pub mod erc20;
pub mod fees;
pub mod rpc;
pub mod submit;
pub mod transactions;
pub mod types;

pub use address::{checksum_address, derive_address, parse_address, Credential};
pub use balances::{BalanceAggregator, GET_BALANCES_BATCH_SIZE};
pub use fees::{FeeConfig, FeeEstimator};
pub use rpc::{AlloyRpc, BroadcastEvent, BroadcastEvents, EthRpc};
pub use submit::{sign_transaction, TransactionSubmitter, TxHooks};
pub use transactions::{TransactionBuilder, TransactionOptions};
pub use types::*;
