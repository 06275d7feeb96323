// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Error types shared by every payments component.
//!
//! Fee-rate, gas-limit and chain-id lookups never produce an error: they
//! degrade to configured defaults and log a warning instead.

/// Result alias used throughout the crate.
pub type PaymentsResult<T> = Result<T, PaymentsError>;

/// Errors that can occur during payments operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PaymentsError {
    /// Malformed address, negative amount, unrepresentable value or unknown
    /// network. Raised before any network call is made.
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Invalid private key: {0}")]
    InvalidKey(String),

    #[error("Invalid RPC URL: {0}")]
    InvalidRpcUrl(String),

    #[error("RPC error: {0}")]
    Rpc(String),

    /// A balance sub-request failed; the whole aggregation is discarded.
    #[error("Balance aggregation failed: {0}")]
    Aggregation(String),

    /// Signing or broadcasting failed before a transaction hash was observed.
    #[error("Transaction submission failed: {0}")]
    Submission(String),

    /// Broadcast error reported after the transaction hash was accepted.
    /// Only ever delivered to the `on_error` hook.
    #[error("Transaction failed after acceptance: {0}")]
    PostAcceptance(String),

    #[error("Block explorer error: {0}")]
    Explorer(String),

    /// A result could not be encoded as JSON.
    #[error("Serialization failed: {0}")]
    Serialization(String),
}

impl PaymentsError {
    pub fn invalid_parameter(message: impl Into<String>) -> Self {
        Self::InvalidParameter(message.into())
    }

    pub fn rpc(message: impl std::fmt::Display) -> Self {
        Self::Rpc(message.to_string())
    }
}

impl From<serde_json::Error> for PaymentsError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
