use chrono::{DateTime, Utc};
use std::sync::Arc;

use super::types::{ApplyOutcome, ApplyReason, Decision, ReplicationMessage};
use crate::error::{NodeError, StorageError};
use crate::outbox::types::Operation;
use crate::storage::memory::MemoryStore;
use crate::storage::types::UserRow;
use crate::topology::types::{NodeId, NodeRef, NodeRole, Topology};

/// Conflict resolution for one incoming write.
///
/// Newer `updatedAt` wins. On an exact tie the CENTRAL copy wins, and between
/// two non-central nodes the lexicographically greater node id wins, so every
/// node reaches the same verdict for the same pair without talking to anyone.
pub fn should_apply(
    local: &NodeRef,
    central: &NodeId,
    current: Option<&UserRow>,
    incoming: DateTime<Utc>,
    source: &NodeId,
) -> Decision {
    let Some(current) = current else {
        return Decision::Apply;
    };

    if incoming > current.updated_at {
        return Decision::Apply;
    }
    if incoming < current.updated_at {
        return Decision::Reject(ApplyReason::OlderTimestamp);
    }

    match local.role {
        NodeRole::Central if source != central => {
            Decision::Reject(ApplyReason::TieKeptLocalOrCentral)
        }
        NodeRole::Fragment if source == central => Decision::Apply,
        _ if source > &local.id => Decision::Apply,
        _ => Decision::Reject(ApplyReason::TieKeptLocalOrCentral),
    }
}

/// Receiver side of replication.
pub struct ApplyEngine {
    store: Arc<MemoryStore>,
    topology: Arc<Topology>,
}

impl ApplyEngine {
    pub fn new(store: Arc<MemoryStore>, topology: Arc<Topology>) -> Self {
        Self { store, topology }
    }

    pub fn local_id(&self) -> &NodeId {
        self.topology.local_id()
    }

    /// Validates an inbound message and applies it.
    pub async fn receive(&self, message: &ReplicationMessage) -> Result<ApplyOutcome, NodeError> {
        message.validate()?;
        if &message.target_node != self.topology.local_id() {
            return Err(NodeError::validation(format!(
                "message {} targets {}, this node is {}",
                message.global_tx_id,
                message.target_node,
                self.topology.local_id()
            )));
        }
        Ok(self.apply(message).await?)
    }

    /// Applies one message in a single transaction at the message's isolation level.
    ///
    /// The marker is written together with the data change (or alone, when the
    /// message loses conflict resolution). A storage error aborts both, so the
    /// message can be redelivered safely.
    pub async fn apply(&self, message: &ReplicationMessage) -> Result<ApplyOutcome, StorageError> {
        let id = message.global_tx_id;
        let key = message.entity_key;
        let mut tx = self.store.begin(message.isolation);

        if tx.has_applied(&id)? {
            tracing::debug!("Replication {} already applied, skipping", id);
            return Ok(ApplyOutcome::skipped(ApplyReason::AlreadyApplied));
        }

        let current = tx.get_user_for_update(key).await?;

        // A concurrent delivery of the same message may have committed while we waited.
        if tx.has_applied(&id)? {
            tracing::debug!("Replication {} applied concurrently, skipping", id);
            return Ok(ApplyOutcome::skipped(ApplyReason::AlreadyApplied));
        }

        let decision = should_apply(
            self.topology.local(),
            &self.topology.central().id,
            current.as_ref(),
            message.payload.updated_at,
            &message.source_node,
        );
        tracing::debug!(
            "Replication {} {} key={} from {}: {:?}",
            id,
            message.operation,
            key,
            message.source_node,
            decision
        );

        let outcome = match decision {
            Decision::Reject(reason) => {
                tracing::info!(
                    "Rejected replication {} for key {} from {}: {}",
                    id,
                    key,
                    message.source_node,
                    reason
                );
                tx.mark_applied_incoming(id)?;
                ApplyOutcome::skipped(reason)
            }
            Decision::Apply => {
                match message.operation {
                    Operation::Upsert => {
                        let row = message.payload.fields.merge(
                            key,
                            current.as_ref(),
                            message.payload.updated_at,
                        );
                        tx.put_user(row).await?;
                    }
                    Operation::Delete => {
                        if current.is_some() {
                            tx.delete_user(key).await?;
                        }
                    }
                }
                tx.mark_applied_incoming(id)?;
                ApplyOutcome::applied()
            }
        };

        match tx.commit() {
            Ok(_) => Ok(outcome),
            Err(StorageError::UniqueViolation {
                table: "applied_incoming",
                ..
            }) => Ok(ApplyOutcome::skipped(ApplyReason::AlreadyApplied)),
            Err(e) => Err(e),
        }
    }
}
