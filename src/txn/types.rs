use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::outbox::types::OutboxSummary;
use crate::replication::dispatcher::DispatchState;
use crate::storage::types::{IsolationLevel, UserPatch, UserRow};
use crate::topology::types::{NodeId, NodeRole};

/// One step of a scripted transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "UPPERCASE")]
pub enum TxnStep {
    Read,
    Insert {
        #[serde(default)]
        data: UserPatch,
    },
    Update {
        #[serde(default)]
        data: UserPatch,
    },
    Delete,
    Sleep {
        #[serde(rename = "delayMs", default)]
        delay_ms: u64,
    },
}

impl TxnStep {
    pub fn is_mutation(&self) -> bool {
        matches!(
            self,
            TxnStep::Insert { .. } | TxnStep::Update { .. } | TxnStep::Delete
        )
    }

    /// Trace label, e.g. `READ_0`, `SLEEP_1`.
    pub fn label(&self, index: usize) -> String {
        let kind = match self {
            TxnStep::Read => "READ",
            TxnStep::Insert { .. } => "INSERT",
            TxnStep::Update { .. } => "UPDATE",
            TxnStep::Delete => "DELETE",
            TxnStep::Sleep { .. } => "SLEEP",
        };
        format!("{}_{}", kind, index)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InsertRequest {
    #[serde(default)]
    pub isolation: IsolationLevel,
    #[serde(flatten)]
    pub fields: UserPatch,
    #[serde(default, alias = "simReplicationError")]
    pub simulate_replication_failure: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptRequest {
    #[serde(default)]
    pub isolation: IsolationLevel,
    pub user_id: i64,
    pub steps: Vec<TxnStep>,
    #[serde(default, alias = "simReplicationError")]
    pub simulate_replication_failure: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceStep {
    pub label: String,
    pub at: DateTime<Utc>,
    pub row: Option<UserRow>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TraceOperation {
    Insert,
    Scripted,
}

/// Per-request trace of a local transaction. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptedTrace {
    pub node: NodeId,
    pub role: NodeRole,
    pub isolation: IsolationLevel,
    pub operation: TraceOperation,
    pub user_id: i64,
    pub before: Option<UserRow>,
    pub after: Option<UserRow>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub steps: Vec<TraceStep>,
    pub outbox: Option<OutboxSummary>,
    pub delivery: Option<DispatchState>,
}
