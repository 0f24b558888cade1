use serde::{Deserialize, Serialize};

use crate::outbox::types::OutboxCounts;
use crate::storage::types::SeedRow;
use crate::topology::types::{NodeId, NodeRef, NodeRole};

pub const DISTRIBUTION_CHUNK_SIZE: usize = 1000;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BulkInsertRequest {
    #[serde(default)]
    pub users: Vec<SeedRow>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkInsertResponse {
    pub count: usize,
}

/// Outcome of pushing one fragment's share during distribution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResult {
    pub node_id: NodeId,
    pub success: bool,
    pub records_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartitionStats {
    pub node: NodeId,
    pub role: NodeRole,
    pub central_node: NodeRef,
    pub fragment_nodes: Vec<NodeRef>,
    pub routing: String,
    pub local_rows: usize,
    pub applied_incoming: usize,
    pub outbox: OutboxCounts,
}
