use chrono::{DateTime, Utc};
use std::sync::Arc;

use super::ids::IdAllocator;
use super::types::{InsertRequest, ScriptedTrace, TraceOperation};
use crate::error::{NodeError, StorageError};
use crate::outbox::log::Outbox;
use crate::outbox::types::{Operation, OutboxEntry, OutboxSummary};
use crate::replication::dispatcher::{DispatchState, Dispatcher};
use crate::replication::types::ReplicationPayload;
use crate::storage::memory::{MemoryStore, Transaction};
use crate::storage::types::{IsolationLevel, UserRow, utc_now};
use crate::topology::router::PartitionRouter;
use crate::topology::types::{NodeRef, NodeRole, Topology};

/// Result of a commit: the outbox entry it carried and what the dispatcher did with it.
pub struct Committed {
    pub outbox: Option<OutboxSummary>,
    pub delivery: Option<DispatchState>,
}

pub struct TransactionOrchestrator {
    store: Arc<MemoryStore>,
    topology: Arc<Topology>,
    router: Arc<PartitionRouter>,
    outbox: Arc<Outbox>,
    dispatcher: Arc<Dispatcher>,
    ids: IdAllocator,
}

impl TransactionOrchestrator {
    pub fn new(
        store: Arc<MemoryStore>,
        router: Arc<PartitionRouter>,
        outbox: Arc<Outbox>,
        dispatcher: Arc<Dispatcher>,
        ids: IdAllocator,
    ) -> Self {
        Self {
            store,
            topology: router.topology().clone(),
            router,
            outbox,
            dispatcher,
            ids,
        }
    }

    pub fn topology(&self) -> &Arc<Topology> {
        &self.topology
    }

    pub fn router(&self) -> &Arc<PartitionRouter> {
        &self.router
    }

    /// FRAGMENT nodes replicate up to CENTRAL; CENTRAL replicates down to the owning fragment.
    pub fn choose_target(&self, key: i64) -> Option<NodeRef> {
        let local = self.topology.local();
        let target = match local.role {
            NodeRole::Fragment => self.topology.central(),
            NodeRole::Central => self.router.target_node(key),
        };
        (target.id != local.id).then(|| target.clone())
    }

    pub fn begin(&self, isolation: IsolationLevel) -> Transaction {
        self.store.begin(isolation)
    }

    /// Stages one outbox entry describing `final_row` (None means the row is gone).
    pub fn stage_replication(
        &self,
        tx: &mut Transaction,
        key: i64,
        final_row: Option<&UserRow>,
        now: DateTime<Utc>,
    ) -> Result<Option<OutboxEntry>, StorageError> {
        let Some(target) = self.choose_target(key) else {
            return Ok(None);
        };

        let (operation, payload) = match final_row {
            Some(row) => (Operation::Upsert, ReplicationPayload::from_row(row)),
            None => (Operation::Delete, ReplicationPayload::tombstone(now)),
        };
        let entry = OutboxEntry::pending(
            self.topology.local_id().clone(),
            target.id,
            operation,
            key,
            payload,
            now,
        );
        self.outbox.append_pending(tx, entry.clone())?;
        Ok(Some(entry))
    }

    /// Commits, then hands the staged message to the dispatcher.
    ///
    /// Delivery never runs inside the transaction; its outcome cannot undo the commit.
    pub fn commit_and_dispatch(
        &self,
        tx: Transaction,
        staged: Option<OutboxEntry>,
        isolation: IsolationLevel,
        simulate_failure: bool,
    ) -> Result<Committed, StorageError> {
        tx.commit()?;

        let Some(entry) = staged else {
            return Ok(Committed {
                outbox: None,
                delivery: None,
            });
        };

        let delivery = if simulate_failure {
            tracing::info!(
                "Simulated replication failure, {} left pending",
                entry.global_tx_id
            );
            DispatchState::Skipped
        } else {
            self.dispatcher.enqueue(entry.to_message(isolation))
        };

        Ok(Committed {
            outbox: Some(entry.summary()),
            delivery: Some(delivery),
        })
    }

    /// Inserts a row under a freshly allocated key and replicates it.
    pub async fn perform_insert(&self, request: InsertRequest) -> Result<ScriptedTrace, NodeError> {
        let isolation = request.isolation;
        let floor = self.store.max_user_id().unwrap_or(0);
        let key = self.ids.next(floor);
        let now = utc_now();

        let mut tx = self.begin(isolation);
        let before = tx.get_user_for_update(key).await?;
        let row = request.fields.merge(key, before.as_ref(), now);
        tx.put_user(row.clone()).await?;
        let staged = self.stage_replication(&mut tx, key, Some(&row), now)?;
        let committed =
            self.commit_and_dispatch(tx, staged, isolation, request.simulate_replication_failure)?;

        tracing::info!(
            "Inserted user {} on {} ({})",
            key,
            self.topology.local_id(),
            isolation
        );

        Ok(ScriptedTrace {
            node: self.topology.local_id().clone(),
            role: self.topology.local_role(),
            isolation,
            operation: TraceOperation::Insert,
            user_id: key,
            before,
            after: Some(row),
            steps: Vec::new(),
            outbox: committed.outbox,
            delivery: committed.delivery,
        })
    }
}
