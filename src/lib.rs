// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Ethereum wallet payments.
//!
//! Derives addresses, aggregates native and ERC-20 balances, estimates fees,
//! and builds, signs and broadcasts legacy transactions on Ethereum and
//! EVM-compatible chains.
//!
//! ## Modules
//!
//! - `numeric` - Arbitrary-precision amounts and denomination conversion
//! - `blockchain` - Addresses, ERC-20 encoding, fees, balances, transactions
//! - `explorer` - Etherscan-compatible transaction history
//! - `payments` - `EthPayments`, one handle over all of the above
//! - `config` - Environment-driven configuration
//! - `telemetry` - Tracing subscriber setup for binaries

pub mod blockchain;
pub mod config;
pub mod error;
pub mod explorer;
pub mod numeric;
pub mod payments;
pub mod telemetry;

pub use config::PaymentsConfig;
pub use error::{PaymentsError, PaymentsResult};
pub use numeric::AmountValue;
pub use payments::EthPayments;
