use serde::Serialize;
use thiserror::Error;

use crate::domain::EventKind;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
#[serde(tag = "type", content = "detail", rename_all = "snake_case")]
pub enum RpcErrorKind {
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("request timed out")]
    Timeout,
    #[error("node returned error {code}: {message}")]
    Node { code: i64, message: String },
    #[error("failed to decode response: {0}")]
    Decode(String),
}

/// A failed read or log query, tagged with the contract method or event
/// signature it was issued for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
#[error("{method}: {kind}")]
pub struct RpcError {
    pub method: &'static str,
    pub kind: RpcErrorKind,
}

impl RpcError {
    pub fn new(method: &'static str, kind: RpcErrorKind) -> Self {
        Self { method, kind }
    }

    pub fn transport(method: &'static str, message: impl Into<String>) -> Self {
        Self::new(method, RpcErrorKind::Transport(message.into()))
    }

    pub fn timeout(method: &'static str) -> Self {
        Self::new(method, RpcErrorKind::Timeout)
    }

    pub fn node(method: &'static str, code: i64, message: impl Into<String>) -> Self {
        Self::new(
            method,
            RpcErrorKind::Node {
                code,
                message: message.into(),
            },
        )
    }

    pub fn decode(method: &'static str, message: impl Into<String>) -> Self {
        Self::new(method, RpcErrorKind::Decode(message.into()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
#[serde(tag = "type", content = "detail", rename_all = "snake_case")]
pub enum RejectionReason {
    #[error("no wallet connected")]
    NotConnected,
    #[error("action is not permitted for this session in the current phase")]
    NotPermitted,
    #[error("rejected before confirmation: {0}")]
    Rejected(String),
    #[error("transaction {tx_hash} reverted")]
    Reverted { tx_hash: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
#[error("{method} rejected: {reason}")]
pub struct TransactionRejectedError {
    pub method: &'static str,
    pub reason: RejectionReason,
}

impl TransactionRejectedError {
    pub fn new(method: &'static str, reason: RejectionReason) -> Self {
        Self { method, reason }
    }
}

/// Result type of a write: either the wallet/contract said no, or the node
/// could not be reached while sending or waiting for the receipt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
#[serde(tag = "type", content = "detail", rename_all = "snake_case")]
pub enum SubmitError {
    #[error(transparent)]
    Rejected(#[from] TransactionRejectedError),
    #[error(transparent)]
    Rpc(#[from] RpcError),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AggregationFailure {
    pub kind: EventKind,
    pub error: RpcError,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
#[error(
    "event aggregation failed for {} of 4 sources: {}",
    .failures.len(),
    describe_failures(.failures)
)]
pub struct PartialAggregationError {
    pub failures: Vec<AggregationFailure>,
}

impl PartialAggregationError {
    pub fn failed_kinds(&self) -> Vec<EventKind> {
        self.failures.iter().map(|failure| failure.kind).collect()
    }
}

fn describe_failures(failures: &[AggregationFailure]) -> String {
    failures
        .iter()
        .map(|failure| format!("{:?} ({})", failure.kind, failure.error))
        .collect::<Vec<_>>()
        .join(", ")
}
