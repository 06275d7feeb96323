// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Etherscan-compatible block explorer client for address history.

use std::time::Duration;

use reqwest::Client;
use serde_json::Value;
use url::Url;

use crate::blockchain::parse_address;
use crate::error::{PaymentsError, PaymentsResult};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);
const NO_TRANSACTIONS: &str = "No transactions found";

const ACTION_TXLIST: &str = "txlist";
const ACTION_TOKENTX: &str = "tokentx";

/// Read-only history client.
#[derive(Debug, Clone)]
pub struct ExplorerClient {
    api_url: Url,
    api_key: Option<String>,
    http: Client,
}

impl ExplorerClient {
    pub fn new(api_url: &str, api_key: Option<String>) -> PaymentsResult<Self> {
        let api_url = Url::parse(api_url)
            .map_err(|e| PaymentsError::Explorer(format!("invalid explorer URL {api_url}: {e}")))?;
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| PaymentsError::Explorer(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            api_url,
            api_key,
            http,
        })
    }

    /// Native and token transfers of `address`, oldest first.
    ///
    /// Records are returned as the explorer sends them.
    pub async fn get_transactions(&self, address: &str) -> PaymentsResult<Vec<Value>> {
        let address = parse_address(address)?.to_checksum(None);

        let (native, tokens) = tokio::try_join!(
            self.fetch(ACTION_TXLIST, &address),
            self.fetch(ACTION_TOKENTX, &address),
        )?;

        let mut merged = native;
        merged.extend(tokens);
        merged.sort_by_key(block_number);

        tracing::debug!(address = %address, count = merged.len(), "Fetched transaction history");
        Ok(merged)
    }

    fn request_url(&self, action: &str, address: &str) -> Url {
        let mut url = self.api_url.clone();
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("module", "account")
                .append_pair("action", action)
                .append_pair("address", address)
                .append_pair("sort", "asc");
            if let Some(key) = &self.api_key {
                query.append_pair("apikey", key);
            }
        }
        url
    }

    async fn fetch(&self, action: &str, address: &str) -> PaymentsResult<Vec<Value>> {
        let response = self
            .http
            .get(self.request_url(action, address))
            .send()
            .await
            .map_err(|e| PaymentsError::Explorer(format!("{action} request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(PaymentsError::Explorer(format!(
                "{action} returned {status}: {body}"
            )));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| PaymentsError::Explorer(format!("{action} invalid JSON: {e}")))?;

        parse_explorer_response(body)
    }
}

/// Unwrap an explorer `{status, message, result}` envelope.
pub fn parse_explorer_response(body: Value) -> PaymentsResult<Vec<Value>> {
    let status = body.get("status").and_then(Value::as_str).unwrap_or_default();
    let message = body.get("message").and_then(Value::as_str).unwrap_or_default();

    match (status, body.get("result")) {
        ("1", Some(Value::Array(records))) => Ok(records.clone()),
        ("0", _) if message.starts_with(NO_TRANSACTIONS) => Ok(Vec::new()),
        (_, Some(Value::String(detail))) => Err(PaymentsError::Explorer(format!("{message}: {detail}"))),
        _ => Err(PaymentsError::Explorer(format!(
            "unexpected explorer response: {body}"
        ))),
    }
}

fn block_number(record: &Value) -> u64 {
    record
        .get("blockNumber")
        .and_then(Value::as_str)
        .and_then(|n| n.parse().ok())
        .unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const ADDRESS: &str = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266";

    #[test]
    fn test_parse_records() {
        let body = json!({
            "status": "1",
            "message": "OK",
            "result": [{"hash": "0x1", "blockNumber": "10"}]
        });
        let records = parse_explorer_response(body).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["hash"], "0x1");
    }

    #[test]
    fn test_no_transactions_is_empty() {
        let body = json!({"status": "0", "message": "No transactions found", "result": []});
        assert!(parse_explorer_response(body).unwrap().is_empty());
    }

    #[test]
    fn test_explorer_errors() {
        let body = json!({"status": "0", "message": "NOTOK", "result": "Invalid API Key"});
        assert_eq!(
            parse_explorer_response(body).unwrap_err(),
            PaymentsError::Explorer("NOTOK: Invalid API Key".into())
        );

        let body = json!({"unexpected": true});
        assert!(matches!(
            parse_explorer_response(body),
            Err(PaymentsError::Explorer(_))
        ));
    }

    #[test]
    fn test_request_url() {
        let client =
            ExplorerClient::new("https://api.etherscan.io/api", Some("KEY".into())).unwrap();
        let url = client.request_url(ACTION_TOKENTX, ADDRESS);
        assert_eq!(
            url.as_str(),
            format!(
                "https://api.etherscan.io/api?module=account&action=tokentx&address={ADDRESS}&sort=asc&apikey=KEY"
            )
        );

        let client = ExplorerClient::new("https://api.etherscan.io/api", None).unwrap();
        assert!(!client.request_url(ACTION_TXLIST, ADDRESS).as_str().contains("apikey"));
    }

    #[test]
    fn test_invalid_url_rejected() {
        assert!(matches!(
            ExplorerClient::new("not a url", None),
            Err(PaymentsError::Explorer(_))
        ));
    }

    #[test]
    fn test_block_number_ordering_key() {
        assert_eq!(block_number(&json!({"blockNumber": "42"})), 42);
        assert_eq!(block_number(&json!({})), u64::MAX);
    }

    #[tokio::test]
    async fn test_invalid_address_rejected_before_request() {
        let client = ExplorerClient::new("http://127.0.0.1:9/api", None).unwrap();
        let err = client.get_transactions("0x1234").await.unwrap_err();
        assert!(matches!(err, PaymentsError::InvalidParameter(_)));
    }
}
