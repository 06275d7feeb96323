// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Transaction signing and broadcasting.
//!
//! [`TransactionSubmitter::submit`] settles exactly once: with the first
//! transaction hash the node reports, or with the first error if it comes
//! before any hash. Everything the broadcast reports afterwards (receipt,
//! confirmations, late errors) is delivered to the optional [`TxHooks`] only.

use std::fmt;
use std::sync::Arc;

use alloy::{
    consensus::{SignableTransaction, TxEnvelope, TxLegacy},
    eips::eip2718::Encodable2718,
    network::TxSignerSync,
    primitives::{Bytes, TxHash, TxKind},
};
use futures::StreamExt;
use tokio::sync::oneshot;

use super::address::{derive_address, parse_address, Credential};
use super::rpc::{BroadcastEvent, BroadcastEvents, EthRpc};
use super::types::{TxReceipt, UnsignedTransaction};
use crate::error::{PaymentsError, PaymentsResult};
use crate::numeric::parse_hex_quantity;

type TxHashHook = Arc<dyn Fn(&str) + Send + Sync>;
type ReceiptHook = Arc<dyn Fn(&TxReceipt) + Send + Sync>;
type ConfirmationHook = Arc<dyn Fn(u64, &TxReceipt) + Send + Sync>;
type ErrorHook = Arc<dyn Fn(&PaymentsError) + Send + Sync>;

/// Optional observers of a broadcast transaction's lifecycle.
///
/// `on_tx_hash` and `on_receipt` fire at most once; `on_confirmation` fires
/// for every new confirmation; `on_error` for every error, including errors
/// reported after the hash was accepted.
#[derive(Clone, Default)]
pub struct TxHooks {
    on_tx_hash: Option<TxHashHook>,
    on_receipt: Option<ReceiptHook>,
    on_confirmation: Option<ConfirmationHook>,
    on_error: Option<ErrorHook>,
}

impl TxHooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_tx_hash(mut self, hook: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_tx_hash = Some(Arc::new(hook));
        self
    }

    pub fn on_receipt(mut self, hook: impl Fn(&TxReceipt) + Send + Sync + 'static) -> Self {
        self.on_receipt = Some(Arc::new(hook));
        self
    }

    pub fn on_confirmation(mut self, hook: impl Fn(u64, &TxReceipt) + Send + Sync + 'static) -> Self {
        self.on_confirmation = Some(Arc::new(hook));
        self
    }

    pub fn on_error(mut self, hook: impl Fn(&PaymentsError) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Arc::new(hook));
        self
    }

    fn is_empty(&self) -> bool {
        self.on_tx_hash.is_none()
            && self.on_receipt.is_none()
            && self.on_confirmation.is_none()
            && self.on_error.is_none()
    }

    fn error(&self, error: &PaymentsError) {
        if let Some(hook) = &self.on_error {
            hook(error);
        }
    }
}

impl fmt::Debug for TxHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TxHooks")
            .field("on_tx_hash", &self.on_tx_hash.is_some())
            .field("on_receipt", &self.on_receipt.is_some())
            .field("on_confirmation", &self.on_confirmation.is_some())
            .field("on_error", &self.on_error.is_some())
            .finish()
    }
}

/// Signs and broadcasts transactions.
#[derive(Clone)]
pub struct TransactionSubmitter {
    rpc: Arc<dyn EthRpc>,
}

impl TransactionSubmitter {
    pub fn new(rpc: Arc<dyn EthRpc>) -> Self {
        Self { rpc }
    }

    /// Sign `tx` with `credential`, broadcast it and return the transaction
    /// hash reported by the node.
    pub async fn submit(
        &self,
        credential: &Credential,
        tx: &UnsignedTransaction,
        hooks: TxHooks,
    ) -> PaymentsResult<String> {
        let (raw, local_hash) = match sign_transaction(credential, tx) {
            Ok(signed) => signed,
            Err(e) => {
                hooks.error(&e);
                return Err(e);
            }
        };

        tracing::info!(
            tx_hash = %local_hash,
            from = %tx.from,
            nonce = %tx.nonce,
            "Broadcasting transaction"
        );

        let events = match self.rpc.send_raw_transaction(raw).await {
            Ok(events) => events,
            Err(e) => {
                let error = PaymentsError::Submission(e.to_string());
                hooks.error(&error);
                return Err(error);
            }
        };

        let (settle, settled) = oneshot::channel();
        tokio::spawn(drive_broadcast(events, hooks, settle));

        settled.await.map_err(|_| {
            PaymentsError::Submission(
                "broadcast ended before a transaction hash was observed".to_string(),
            )
        })?
    }
}

/// Consume broadcast events: settle the caller once, feed hooks throughout.
async fn drive_broadcast(
    mut events: BroadcastEvents,
    hooks: TxHooks,
    settle: oneshot::Sender<PaymentsResult<String>>,
) {
    let mut settle = Some(settle);
    let mut hash_seen = false;
    let mut receipt_seen = false;

    while let Some(event) = events.next().await {
        match event {
            BroadcastEvent::TransactionHash(hash) => {
                if let Some(settle) = settle.take() {
                    let _ = settle.send(Ok(hash.clone()));
                }
                if !hash_seen {
                    hash_seen = true;
                    if let Some(hook) = &hooks.on_tx_hash {
                        hook(&hash);
                    }
                }
            }
            BroadcastEvent::Receipt(receipt) => {
                if !receipt_seen {
                    receipt_seen = true;
                    if let Some(hook) = &hooks.on_receipt {
                        hook(&receipt);
                    }
                }
            }
            BroadcastEvent::Confirmation {
                confirmations,
                receipt,
            } => {
                if let Some(hook) = &hooks.on_confirmation {
                    hook(confirmations, &receipt);
                }
            }
            BroadcastEvent::Error(message) => {
                // Only an observed hash makes an error post-acceptance.
                let error = if hash_seen {
                    tracing::warn!(error = %message, "Broadcast error after acceptance");
                    PaymentsError::PostAcceptance(message)
                } else {
                    PaymentsError::Submission(message)
                };
                if let Some(settle) = settle.take() {
                    let _ = settle.send(Err(error.clone()));
                }
                hooks.error(&error);
            }
        }

        if settle.is_none() && hooks.is_empty() {
            break;
        }
    }
}

/// Sign an unsigned transaction as an EIP-155 legacy transaction.
///
/// Returns the RLP-encoded signed transaction and its hash.
pub fn sign_transaction(
    credential: &Credential,
    tx: &UnsignedTransaction,
) -> PaymentsResult<(Bytes, TxHash)> {
    let invalid = |field: &str, e: PaymentsError| {
        PaymentsError::Submission(format!("invalid {field}: {e}"))
    };

    let signer_address = derive_address(credential);
    if !signer_address.eq_ignore_ascii_case(&tx.from) {
        return Err(PaymentsError::Submission(format!(
            "credential controls {signer_address}, not {}",
            tx.from
        )));
    }

    let to = parse_address(&tx.to).map_err(|e| invalid("to", e))?;
    let value = parse_hex_quantity(&tx.value).map_err(|e| invalid("value", e))?;
    let gas_price = parse_hex_quantity(&tx.gas_price)
        .map_err(|e| invalid("gasPrice", e))
        .and_then(|v| {
            u128::try_from(v)
                .map_err(|_| PaymentsError::Submission(format!("gasPrice out of range: {v}")))
        })?;
    let gas_limit = parse_hex_quantity(&tx.gas_limit)
        .map_err(|e| invalid("gasLimit", e))
        .and_then(|v| {
            u64::try_from(v)
                .map_err(|_| PaymentsError::Submission(format!("gasLimit out of range: {v}")))
        })?;
    let nonce = tx.nonce_value().map_err(|e| invalid("nonce", e))?;
    let input = match &tx.data {
        Some(data) => alloy::hex::decode(data)
            .map(Bytes::from)
            .map_err(|e| PaymentsError::Submission(format!("invalid data: {e}")))?,
        None => Bytes::new(),
    };

    let mut legacy = TxLegacy {
        chain_id: Some(tx.chain_id),
        nonce,
        gas_price,
        gas_limit,
        to: TxKind::Call(to),
        value,
        input,
    };

    let signature = credential
        .signer()
        .sign_transaction_sync(&mut legacy)
        .map_err(|e| PaymentsError::Submission(format!("signing failed: {e}")))?;

    let signed = legacy.into_signed(signature);
    let hash = *signed.hash();
    let envelope = TxEnvelope::from(signed);

    Ok((envelope.encoded_2718().into(), hash))
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use alloy::eips::eip2718::Decodable2718;
    use tokio::sync::mpsc;

    use super::*;
    use crate::blockchain::rpc::stub::StubRpc;

    const TEST_KEY: &str = "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
    const SENDER: &str = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266";
    const RECIPIENT: &str = "0x70997970C51812dc3A010C7d01b50e0d17dc79C8";

    fn credential() -> Credential {
        Credential::from_hex(TEST_KEY).unwrap()
    }

    fn unsigned() -> UnsignedTransaction {
        UnsignedTransaction {
            chain_id: 1,
            from: SENDER.to_string(),
            to: RECIPIENT.to_string(),
            value: "0xde0b6b3a7640000".into(),
            data: None,
            gas_price: "0x4e3b29200".into(),
            gas_limit: "0x5208".into(),
            nonce: "0x5".into(),
        }
    }

    fn receipt() -> TxReceipt {
        TxReceipt {
            tx_hash: "0xabc".into(),
            block_number: 100,
            gas_used: 21_000,
            success: true,
        }
    }

    fn stub_with(events: Vec<BroadcastEvent>) -> Arc<StubRpc> {
        let rpc = StubRpc::healthy();
        *rpc.broadcast.lock().unwrap() = Some(events);
        Arc::new(rpc)
    }

    #[test]
    fn test_sign_transaction_round_trip() {
        let (raw, hash) = sign_transaction(&credential(), &unsigned()).unwrap();

        let envelope = TxEnvelope::decode_2718(&mut raw.as_ref()).unwrap();
        let signed = envelope.as_legacy().expect("legacy transaction");
        assert_eq!(*signed.hash(), hash);
        assert_eq!(signed.tx().nonce, 5);
        assert_eq!(signed.tx().gas_limit, 21_000);
        assert_eq!(signed.tx().chain_id, Some(1));
        let signer = signed
            .signature()
            .recover_address_from_prehash(&signed.tx().signature_hash())
            .unwrap();
        assert_eq!(signer.to_checksum(None), SENDER);
    }

    #[test]
    fn test_sign_transaction_with_call_data() {
        let mut tx = unsigned();
        tx.value = "0x0".into();
        tx.data = Some(format!("0xa9059cbb{}", "00".repeat(64)));
        let (raw, _) = sign_transaction(&credential(), &tx).unwrap();

        let envelope = TxEnvelope::decode_2718(&mut raw.as_ref()).unwrap();
        let signed = envelope.as_legacy().unwrap();
        assert_eq!(signed.tx().input.len(), 68);
    }

    #[test]
    fn test_sign_rejects_foreign_sender_and_bad_fields() {
        let mut tx = unsigned();
        tx.from = RECIPIENT.to_string();
        assert!(matches!(sign_transaction(&credential(), &tx), Err(PaymentsError::Submission(_))));

        let mut tx = unsigned();
        tx.gas_price = "21000000000".into();
        assert!(matches!(sign_transaction(&credential(), &tx), Err(PaymentsError::Submission(_))));

        let mut tx = unsigned();
        tx.data = Some("0xzz".into());
        assert!(matches!(sign_transaction(&credential(), &tx), Err(PaymentsError::Submission(_))));
    }

    #[tokio::test]
    async fn test_resolves_on_hash_and_routes_late_error_to_hook() {
        let rpc = stub_with(vec![
            BroadcastEvent::TransactionHash("0xabc".into()),
            BroadcastEvent::Error("replacement transaction underpriced".into()),
        ]);
        let submitter = TransactionSubmitter::new(rpc.clone());

        let (errors_tx, mut errors_rx) = mpsc::unbounded_channel();
        let hooks = TxHooks::new().on_error(move |e| {
            let _ = errors_tx.send(e.clone());
        });

        let hash = submitter.submit(&credential(), &unsigned(), hooks).await.unwrap();
        assert_eq!(hash, "0xabc");

        let late = tokio::time::timeout(Duration::from_secs(1), errors_rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            late,
            PaymentsError::PostAcceptance("replacement transaction underpriced".into())
        );
        assert_eq!(rpc.sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_rejects_on_error_before_hash() {
        let rpc = stub_with(vec![
            BroadcastEvent::Error("nonce too low".into()),
            BroadcastEvent::TransactionHash("0xabc".into()),
        ]);
        let submitter = TransactionSubmitter::new(rpc);

        let err = submitter
            .submit(&credential(), &unsigned(), TxHooks::new())
            .await
            .unwrap_err();
        assert_eq!(err, PaymentsError::Submission("nonce too low".into()));
    }

    #[tokio::test]
    async fn test_errors_without_hash_are_never_post_acceptance() {
        let rpc = stub_with(vec![
            BroadcastEvent::Error("first".into()),
            BroadcastEvent::Error("second".into()),
        ]);
        let submitter = TransactionSubmitter::new(rpc);

        let (errors_tx, mut errors_rx) = mpsc::unbounded_channel();
        let hooks = TxHooks::new().on_error(move |e| {
            let _ = errors_tx.send(e.clone());
        });

        let err = submitter.submit(&credential(), &unsigned(), hooks).await.unwrap_err();
        assert_eq!(err, PaymentsError::Submission("first".into()));

        let mut seen = Vec::new();
        while let Ok(Some(e)) = tokio::time::timeout(Duration::from_secs(1), errors_rx.recv()).await {
            seen.push(e);
        }
        assert_eq!(
            seen,
            vec![
                PaymentsError::Submission("first".into()),
                PaymentsError::Submission("second".into()),
            ]
        );
    }

    #[tokio::test]
    async fn test_stream_without_hash_is_submission_error() {
        let rpc = stub_with(vec![]);
        let submitter = TransactionSubmitter::new(rpc);

        let err = submitter
            .submit(&credential(), &unsigned(), TxHooks::new())
            .await
            .unwrap_err();
        assert!(matches!(err, PaymentsError::Submission(_)));
    }

    #[tokio::test]
    async fn test_broadcast_rejection_reaches_caller_and_hook() {
        let rpc = Arc::new(StubRpc::healthy());
        let submitter = TransactionSubmitter::new(rpc);

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let hooks = TxHooks::new().on_error(move |e| sink.lock().unwrap().push(e.clone()));

        let err = submitter.submit(&credential(), &unsigned(), hooks).await.unwrap_err();
        assert!(matches!(err, PaymentsError::Submission(_)));
        assert_eq!(seen.lock().unwrap().as_slice(), &[err]);
    }

    #[tokio::test]
    async fn test_lifecycle_hooks_fire_in_order() {
        let rpc = stub_with(vec![
            BroadcastEvent::TransactionHash("0xabc".into()),
            BroadcastEvent::TransactionHash("0xabc".into()),
            BroadcastEvent::Receipt(receipt()),
            BroadcastEvent::Confirmation {
                confirmations: 1,
                receipt: receipt(),
            },
            BroadcastEvent::Confirmation {
                confirmations: 2,
                receipt: receipt(),
            },
        ]);
        let submitter = TransactionSubmitter::new(rpc);

        let (log_tx, mut log_rx) = mpsc::unbounded_channel::<String>();
        let (hash_log, receipt_log, confirmation_log) = (log_tx.clone(), log_tx.clone(), log_tx);
        let hooks = TxHooks::new()
            .on_tx_hash(move |hash| {
                let _ = hash_log.send(format!("hash:{hash}"));
            })
            .on_receipt(move |r| {
                let _ = receipt_log.send(format!("receipt:{}", r.block_number));
            })
            .on_confirmation(move |n, _| {
                let _ = confirmation_log.send(format!("confirmation:{n}"));
            });

        let hash = submitter.submit(&credential(), &unsigned(), hooks).await.unwrap();
        assert_eq!(hash, "0xabc");

        // Senders are owned by the hooks; the channel closes once the driver
        // finishes the stream and drops them.
        let mut log = Vec::new();
        while let Ok(Some(entry)) = tokio::time::timeout(Duration::from_secs(1), log_rx.recv()).await {
            log.push(entry);
        }
        assert_eq!(
            log,
            vec!["hash:0xabc", "receipt:100", "confirmation:1", "confirmation:2"]
        );
    }
}
