//! Error Taxonomy
//!
//! Typed errors for every layer of a node, plus the mapping of `NodeError`
//! onto HTTP responses.
//!
//! Two outcomes that look like failures are deliberately absent here: a
//! replication message that loses conflict resolution and a message that was
//! already applied. Both are reported as `ApplyReason` values by the apply
//! engine.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::topology::types::NodeRole;

/// Failures raised by the relational store. Any of them aborts the enclosing
/// transaction as a whole.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("lock wait timeout on user {key}")]
    LockTimeout { key: i64 },

    #[error("could not serialize access to user {key} due to concurrent update")]
    SerializationFailure { key: i64 },

    #[error("duplicate key {key} violates unique constraint on {table}")]
    UniqueViolation { table: &'static str, key: String },

    #[error("transaction is no longer open")]
    TransactionClosed,
}

impl StorageError {
    /// Conflicts caused by concurrent transactions; the caller may retry.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            StorageError::LockTimeout { .. }
                | StorageError::SerializationFailure { .. }
                | StorageError::UniqueViolation { .. }
        )
    }
}

/// Failures delivering a replication message to a peer.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DeliveryError {
    /// The peer answered with a non-success status.
    #[error("peer rejected replication with HTTP {status}: {body}")]
    Rejected { status: u16, body: String },

    /// Connect failure, timeout or an unreadable response.
    #[error("transport error: {0}")]
    Transport(String),
}

/// Topology and routing misconfiguration. Always fatal at startup.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("topology must contain exactly one CENTRAL node, found {0}")]
    CentralCount(usize),

    #[error("duplicate node id {0}")]
    DuplicateNode(String),

    #[error("local node {0} is not part of the topology")]
    UnknownLocalNode(String),

    #[error("node {0} referenced by routing is not part of the topology")]
    UnknownNode(String),

    #[error("no {0} nodes available for routing")]
    EmptyRole(NodeRole),

    #[error("routing node {0} is not a FRAGMENT node")]
    NotAFragment(String),

    #[error("parity routing needs two distinct FRAGMENT nodes")]
    ParityNodesNotDistinct,

    #[error("invalid id allocation: {0}")]
    InvalidIdAllocation(String),
}

/// Request-level errors surfaced by node operations.
#[derive(Debug, Error)]
pub enum NodeError {
    /// Malformed request, rejected before any transaction opens.
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl NodeError {
    pub fn validation(message: impl Into<String>) -> Self {
        NodeError::Validation(message.into())
    }

    pub fn kind(&self) -> &'static str {
        match self {
            NodeError::Validation(_) => "validation_error",
            NodeError::NotFound(_) => "not_found",
            NodeError::Storage(e) if e.is_conflict() => "storage_conflict",
            NodeError::Storage(_) => "storage_fatal",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            NodeError::Validation(_) => StatusCode::BAD_REQUEST,
            NodeError::NotFound(_) => StatusCode::NOT_FOUND,
            NodeError::Storage(e) if e.is_conflict() => StatusCode::CONFLICT,
            NodeError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// JSON body returned for every failed request.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
}

impl IntoResponse for NodeError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!("Request failed: {}", self);
        } else {
            tracing::debug!("Request rejected: {}", self);
        }

        let body = ErrorBody {
            error: self.kind().to_string(),
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            NodeError::validation("bad").status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            NodeError::NotFound("user 1".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            NodeError::from(StorageError::SerializationFailure { key: 3 }).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            NodeError::from(StorageError::TransactionClosed).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_kind_distinguishes_conflicts_from_fatal() {
        let conflict = NodeError::from(StorageError::LockTimeout { key: 1 });
        let fatal = NodeError::from(StorageError::TransactionClosed);

        assert_eq!(conflict.kind(), "storage_conflict");
        assert_eq!(fatal.kind(), "storage_fatal");
    }
}
