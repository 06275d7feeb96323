// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Command runner over [`EthPayments`].
//!
//! ```text
//! eth-payments address
//! eth-payments balance <address> [SYMBOL:CONTRACT:DECIMALS ...]
//! eth-payments fee [SYMBOL:CONTRACT:DECIMALS]
//! eth-payments history <address>
//! ```
//!
//! The signing key is read from `ETH_PRIVATE_KEY` only.

use std::process::ExitCode;

use serde_json::{json, Value};

use eth_payments::blockchain::{derive_address, Asset, Credential};
use eth_payments::config::{env_optional, ETH_PRIVATE_KEY_ENV};
use eth_payments::{telemetry, EthPayments, PaymentsConfig, PaymentsError, PaymentsResult};

const USAGE: &str = "usage: eth-payments <address | balance <address> [assets..] | fee [asset] | history <address>>
assets are written SYMBOL:CONTRACT:DECIMALS";

#[tokio::main]
async fn main() -> ExitCode {
    if let Err(e) = telemetry::init_tracing() {
        eprintln!("{e}");
    }

    let args: Vec<String> = std::env::args().skip(1).collect();
    match run(&args).await {
        Ok(output) => {
            println!("{output:#}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %e, "Command failed");
            eprintln!("{e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: &[String]) -> PaymentsResult<Value> {
    let (command, rest) = args
        .split_first()
        .ok_or_else(|| PaymentsError::invalid_parameter(USAGE))?;

    match command.as_str() {
        "address" => {
            let key = env_optional(ETH_PRIVATE_KEY_ENV).ok_or_else(|| {
                PaymentsError::InvalidKey(format!("{ETH_PRIVATE_KEY_ENV} is not set"))
            })?;
            let credential = Credential::from_hex(&key)?;
            Ok(json!({ "address": derive_address(&credential) }))
        }
        "balance" => {
            let (address, asset_args) = rest
                .split_first()
                .ok_or_else(|| PaymentsError::invalid_parameter(USAGE))?;
            let mut assets = vec![Asset::ether()];
            for arg in asset_args {
                assets.push(parse_asset(arg)?);
            }
            let payments = connect()?;
            let balances = payments.balances(address, &assets).await?;
            Ok(serde_json::to_value(balances)?)
        }
        "fee" => {
            let asset = match rest.first() {
                Some(arg) => parse_asset(arg)?,
                None => Asset::ether(),
            };
            let payments = connect()?;
            let quote = payments.fee_rate().await;
            Ok(json!({
                "rate": quote.rate.to_string(),
                "unit": quote.unit,
                "staticFee": payments.static_fee(&asset).to_string(),
                "chainId": payments.chain_id().await,
            }))
        }
        "history" => {
            let address = rest
                .first()
                .ok_or_else(|| PaymentsError::invalid_parameter(USAGE))?;
            let payments = connect()?;
            Ok(Value::Array(payments.previous_transactions(address).await?))
        }
        other => Err(PaymentsError::invalid_parameter(format!(
            "unknown command {other}\n{USAGE}"
        ))),
    }
}

fn connect() -> PaymentsResult<EthPayments> {
    EthPayments::connect(PaymentsConfig::from_env()?)
}

/// Parse `SYMBOL:CONTRACT:DECIMALS`.
fn parse_asset(arg: &str) -> PaymentsResult<Asset> {
    let parts: Vec<&str> = arg.split(':').collect();
    match parts.as_slice() {
        [symbol, contract, decimals] => {
            let decimals = decimals.parse::<u8>().map_err(|_| {
                PaymentsError::invalid_parameter(format!("invalid decimals in {arg}"))
            })?;
            Ok(Asset::token(*symbol, *contract, decimals))
        }
        _ => Err(PaymentsError::invalid_parameter(format!(
            "invalid asset {arg}, expected SYMBOL:CONTRACT:DECIMALS"
        ))),
    }
}
