use std::collections::BTreeMap;
use std::sync::Arc;

use super::types::{
    BulkInsertRequest, BulkInsertResponse, DISTRIBUTION_CHUNK_SIZE, PartitionStats, SyncResult,
};
use crate::error::NodeError;
use crate::outbox::log::Outbox;
use crate::replication::protocol::ENDPOINT_BULK_INSERT;
use crate::replication::transport::PeerClient;
use crate::storage::memory::MemoryStore;
use crate::storage::types::{SeedRow, UserRow};
use crate::topology::router::PartitionRouter;
use crate::topology::types::{NodeId, NodeRef, NodeRole};

pub struct DistributedSync {
    store: Arc<MemoryStore>,
    router: Arc<PartitionRouter>,
    outbox: Arc<Outbox>,
    client: PeerClient,
}

impl DistributedSync {
    pub fn new(
        store: Arc<MemoryStore>,
        router: Arc<PartitionRouter>,
        outbox: Arc<Outbox>,
        client: PeerClient,
    ) -> Self {
        Self {
            store,
            router,
            outbox,
            client,
        }
    }

    /// Upserts seed rows. Rows already present are overwritten.
    pub async fn bulk_load(&self, rows: Vec<SeedRow>) -> Result<usize, NodeError> {
        if let Some(bad) = rows.iter().find(|r| r.user_id <= 0) {
            return Err(NodeError::validation(format!(
                "user_id must be positive, got {}",
                bad.user_id
            )));
        }
        if rows.is_empty() {
            return Ok(0);
        }

        let count = self.store.bulk_upsert(rows).await?;
        tracing::info!("Bulk loaded {} users", count);
        Ok(count)
    }

    /// Groups rows by owning fragment, keyed by node id.
    pub fn partition_rows(&self, rows: Vec<UserRow>) -> BTreeMap<NodeId, Vec<UserRow>> {
        let mut partitions: BTreeMap<NodeId, Vec<UserRow>> = self
            .router
            .targets()
            .iter()
            .map(|n| (n.id.clone(), Vec::new()))
            .collect();
        for row in rows {
            let owner = self.router.target_node(row.user_id).id.clone();
            partitions.entry(owner).or_default().push(row);
        }
        partitions
    }

    /// Pushes every local row to its owning fragment. CENTRAL only.
    pub async fn distribute(&self) -> Result<Vec<SyncResult>, NodeError> {
        let topology = self.router.topology();
        if topology.local_role() != NodeRole::Central {
            return Err(NodeError::validation(format!(
                "distribution runs on the CENTRAL node only, {} is a FRAGMENT",
                topology.local_id()
            )));
        }

        let rows = self.store.list_users(None);
        if rows.is_empty() {
            tracing::warn!("No users to distribute");
            return Ok(Vec::new());
        }
        tracing::info!("Distributing {} users: {}", rows.len(), self.router.describe());

        let mut partitions = self.partition_rows(rows);
        let mut results = Vec::with_capacity(partitions.len());
        for node in self.router.targets() {
            let share = partitions.remove(&node.id).unwrap_or_default();
            results.push(self.sync_to_node(node, share).await);
        }
        Ok(results)
    }

    async fn sync_to_node(&self, node: &NodeRef, rows: Vec<UserRow>) -> SyncResult {
        let total = rows.len();
        if total == 0 {
            tracing::info!("No users to sync to {}", node.id);
            return SyncResult {
                node_id: node.id.clone(),
                success: true,
                records_count: 0,
                error: None,
            };
        }

        let url = node.url(ENDPOINT_BULK_INSERT);
        let chunks = total.div_ceil(DISTRIBUTION_CHUNK_SIZE);
        let mut inserted = 0;

        for (i, chunk) in rows.chunks(DISTRIBUTION_CHUNK_SIZE).enumerate() {
            let request = BulkInsertRequest {
                users: chunk.iter().cloned().map(SeedRow::from).collect(),
            };
            tracing::debug!(
                "Sending chunk {}/{} ({} users) to {}",
                i + 1,
                chunks,
                chunk.len(),
                node.id
            );

            match self
                .client
                .post_json::<_, BulkInsertResponse>(&url, &request)
                .await
            {
                Ok(response) => inserted += response.count,
                Err(e) => {
                    tracing::error!("Failed to sync to {}: {}", node.id, e);
                    return SyncResult {
                        node_id: node.id.clone(),
                        success: false,
                        records_count: inserted,
                        error: Some(e.to_string()),
                    };
                }
            }
        }

        tracing::info!("Synced {} users to {}", inserted, node.id);
        SyncResult {
            node_id: node.id.clone(),
            success: true,
            records_count: inserted,
            error: None,
        }
    }

    pub fn stats(&self) -> PartitionStats {
        let topology = self.router.topology();
        PartitionStats {
            node: topology.local_id().clone(),
            role: topology.local_role(),
            central_node: topology.central().clone(),
            fragment_nodes: self.router.nodes_with_role(NodeRole::Fragment),
            routing: self.router.describe(),
            local_rows: self.store.user_count(),
            applied_incoming: self.store.applied_count(),
            outbox: self.outbox.counts(),
        }
    }
}
