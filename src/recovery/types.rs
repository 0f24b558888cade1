use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::outbox::types::OutboxStatus;
use crate::replication::types::ApplyReason;
use crate::topology::types::NodeId;

pub const DEFAULT_RECOVERY_LIMIT: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecoveryDetail {
    pub global_tx_id: Uuid,
    pub target_node: NodeId,
    pub entity_key: i64,
    pub status: OutboxStatus,
    pub applied_on_target: bool,
    pub reason_on_target: Option<ApplyReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Summary of one sweep. `failed` counts every attempt that did not end APPLIED.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecoveryResult {
    pub source_node: NodeId,
    pub total_pending: usize,
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub details: Vec<RecoveryDetail>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RecoveryQuery {
    pub limit: Option<usize>,
}
