use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::replication::types::{ReplicationMessage, ReplicationPayload};
use crate::storage::types::IsolationLevel;
use crate::topology::types::NodeId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Operation {
    Upsert,
    Delete,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Upsert => f.write_str("UPSERT"),
            Operation::Delete => f.write_str("DELETE"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OutboxStatus {
    Pending,
    Applied,
    Failed,
}

impl OutboxStatus {
    /// PENDING and FAILED entries are both picked up by Recovery.
    pub fn is_retryable(self) -> bool {
        !matches!(self, OutboxStatus::Applied)
    }
}

impl fmt::Display for OutboxStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutboxStatus::Pending => f.write_str("PENDING"),
            OutboxStatus::Applied => f.write_str("APPLIED"),
            OutboxStatus::Failed => f.write_str("FAILED"),
        }
    }
}

impl FromStr for OutboxStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "PENDING" => Ok(OutboxStatus::Pending),
            "APPLIED" => Ok(OutboxStatus::Applied),
            "FAILED" => Ok(OutboxStatus::Failed),
            other => Err(format!("unknown outbox status: {}", other)),
        }
    }
}

/// One outgoing replication intent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboxEntry {
    pub global_tx_id: Uuid,
    pub source_node: NodeId,
    pub target_node: NodeId,
    pub operation: Operation,
    pub entity_key: i64,
    pub payload: ReplicationPayload,
    pub status: OutboxStatus,
    pub created_at: DateTime<Utc>,
    pub attempts: u32,
    pub last_error: Option<String>,
}

impl OutboxEntry {
    pub fn pending(
        source_node: NodeId,
        target_node: NodeId,
        operation: Operation,
        entity_key: i64,
        payload: ReplicationPayload,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            global_tx_id: Uuid::new_v4(),
            source_node,
            target_node,
            operation,
            entity_key,
            payload,
            status: OutboxStatus::Pending,
            created_at,
            attempts: 0,
            last_error: None,
        }
    }

    /// Rebuilds the wire message. The isolation level is not part of the log.
    pub fn to_message(&self, isolation: IsolationLevel) -> ReplicationMessage {
        ReplicationMessage {
            global_tx_id: self.global_tx_id,
            source_node: self.source_node.clone(),
            target_node: self.target_node.clone(),
            operation: self.operation,
            entity_key: self.entity_key,
            isolation,
            payload: self.payload.clone(),
        }
    }

    pub fn summary(&self) -> OutboxSummary {
        OutboxSummary {
            global_tx_id: self.global_tx_id,
            target_node: self.target_node.clone(),
            operation: self.operation,
            entity_key: self.entity_key,
            status: self.status,
        }
    }
}

/// Short form of an entry, embedded in transaction traces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboxSummary {
    pub global_tx_id: Uuid,
    pub target_node: NodeId,
    pub operation: Operation,
    pub entity_key: i64,
    pub status: OutboxStatus,
}

/// Entry counts by status, reported by partition stats.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboxCounts {
    pub pending: usize,
    pub applied: usize,
    pub failed: usize,
}
