use std::sync::Arc;
use uuid::Uuid;

use super::types::{OutboxCounts, OutboxEntry, OutboxStatus};
use crate::error::StorageError;
use crate::storage::memory::{MemoryStore, Transaction};
use crate::topology::types::NodeId;

/// Facade over the outbox table of the local store.
pub struct Outbox {
    store: Arc<MemoryStore>,
    local: NodeId,
}

impl Outbox {
    pub fn new(store: Arc<MemoryStore>, local: NodeId) -> Self {
        Self { store, local }
    }

    pub fn local_node(&self) -> &NodeId {
        &self.local
    }

    /// Stages `entry` inside `tx`, next to the mutation it describes.
    pub fn append_pending(&self, tx: &mut Transaction, entry: OutboxEntry) -> Result<(), StorageError> {
        tracing::debug!(
            "Outbox append {} ({} key={} -> {})",
            entry.global_tx_id,
            entry.operation,
            entry.entity_key,
            entry.target_node
        );
        tx.append_outbox(entry)
    }

    /// Idempotent. Returns `false` for an unknown id.
    pub fn mark_applied(&self, global_tx_id: &Uuid) -> bool {
        self.store
            .update_outbox(global_tx_id, |entry| {
                if entry.status != OutboxStatus::Applied {
                    entry.status = OutboxStatus::Applied;
                    entry.attempts += 1;
                    entry.last_error = None;
                }
            })
            .is_some()
    }

    /// Records a rejected delivery. An APPLIED entry never regresses.
    pub fn flag_failed(&self, global_tx_id: &Uuid, error: &str) {
        self.store.update_outbox(global_tx_id, |entry| {
            if entry.status != OutboxStatus::Applied {
                entry.status = OutboxStatus::Failed;
                entry.attempts += 1;
                entry.last_error = Some(error.to_string());
            }
        });
    }

    /// Records a transport failure. Status is left as is.
    pub fn record_transport_error(&self, global_tx_id: &Uuid, error: &str) {
        self.store.update_outbox(global_tx_id, |entry| {
            if entry.status != OutboxStatus::Applied {
                entry.attempts += 1;
                entry.last_error = Some(error.to_string());
            }
        });
    }

    /// Oldest-first retryable entries authored by this node.
    pub fn list_pending(&self, limit: usize) -> Vec<OutboxEntry> {
        self.store.list_pending_outbox(&self.local, limit)
    }

    pub fn total_pending(&self) -> usize {
        self.store.count_outbox(&self.local)
    }

    pub fn entry(&self, global_tx_id: &Uuid) -> Option<OutboxEntry> {
        self.store.outbox_entry(global_tx_id)
    }

    pub fn entries(&self, status: Option<OutboxStatus>, limit: Option<usize>) -> Vec<OutboxEntry> {
        self.store.outbox_entries(status, limit)
    }

    pub fn counts(&self) -> OutboxCounts {
        let mut counts = OutboxCounts::default();
        for entry in self.store.outbox_entries(None, None) {
            match entry.status {
                OutboxStatus::Pending => counts.pending += 1,
                OutboxStatus::Applied => counts.applied += 1,
                OutboxStatus::Failed => counts.failed += 1,
            }
        }
        counts
    }
}
