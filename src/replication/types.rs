use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::error::NodeError;
use crate::outbox::types::Operation;
use crate::storage::types::{IsolationLevel, UserPatch, UserRow};
use crate::topology::types::NodeId;

/// Snapshot of the mutated fields plus the conflict clock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplicationPayload {
    #[serde(flatten)]
    pub fields: UserPatch,
    #[serde(rename = "updatedAt")]
    pub updated_at: DateTime<Utc>,
}

impl ReplicationPayload {
    pub fn from_row(row: &UserRow) -> Self {
        Self {
            fields: UserPatch::from_row(row),
            updated_at: row.updated_at,
        }
    }

    /// Payload of a DELETE: no fields, only the time of the delete.
    pub fn tombstone(updated_at: DateTime<Utc>) -> Self {
        Self {
            fields: UserPatch::default(),
            updated_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplicationMessage {
    pub global_tx_id: Uuid,
    pub source_node: NodeId,
    pub target_node: NodeId,
    pub operation: Operation,
    pub entity_key: i64,
    #[serde(default)]
    pub isolation: IsolationLevel,
    pub payload: ReplicationPayload,
}

impl ReplicationMessage {
    pub fn validate(&self) -> Result<(), NodeError> {
        if self.source_node.as_str().is_empty() {
            return Err(NodeError::validation("sourceNode must not be empty"));
        }
        if self.target_node.as_str().is_empty() {
            return Err(NodeError::validation("targetNode must not be empty"));
        }
        if self.entity_key <= 0 {
            return Err(NodeError::validation(format!(
                "entityKey must be positive, got {}",
                self.entity_key
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplyReason {
    AlreadyApplied,
    OlderTimestamp,
    TieKeptLocalOrCentral,
    NewerOrTieAccept,
}

impl fmt::Display for ApplyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ApplyReason::AlreadyApplied => "already_applied",
            ApplyReason::OlderTimestamp => "older_timestamp",
            ApplyReason::TieKeptLocalOrCentral => "tie_kept_local_or_central",
            ApplyReason::NewerOrTieAccept => "newer_or_tie_accept",
        };
        f.write_str(s)
    }
}

/// Response of the Apply Engine, returned to the sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplyOutcome {
    pub applied: bool,
    pub skipped: bool,
    pub reason: ApplyReason,
}

impl ApplyOutcome {
    pub fn applied() -> Self {
        Self {
            applied: true,
            skipped: false,
            reason: ApplyReason::NewerOrTieAccept,
        }
    }

    pub fn skipped(reason: ApplyReason) -> Self {
        Self {
            applied: false,
            skipped: true,
            reason,
        }
    }
}

/// Result of conflict resolution for one incoming message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Apply,
    Reject(ApplyReason),
}
