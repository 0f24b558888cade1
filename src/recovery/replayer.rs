use std::sync::Arc;
use std::time::Duration;

use super::types::{RecoveryDetail, RecoveryResult};
use crate::outbox::log::Outbox;
use crate::outbox::types::OutboxStatus;
use crate::replication::dispatcher::deliver_and_record;
use crate::replication::transport::ReplicationTransport;
use crate::storage::types::IsolationLevel;
use crate::topology::types::Topology;

pub struct RecoveryReplayer {
    outbox: Arc<Outbox>,
    topology: Arc<Topology>,
    transport: Arc<dyn ReplicationTransport>,
    baseline_isolation: IsolationLevel,
}

impl RecoveryReplayer {
    pub fn new(
        outbox: Arc<Outbox>,
        topology: Arc<Topology>,
        transport: Arc<dyn ReplicationTransport>,
        baseline_isolation: IsolationLevel,
    ) -> Self {
        Self {
            outbox,
            topology,
            transport,
            baseline_isolation,
        }
    }

    /// One sweep over at most `limit` retryable entries, oldest first.
    ///
    /// Messages are rebuilt at the baseline isolation level; the level used by
    /// the original transaction is not kept in the log.
    pub async fn replay_pending_outgoing(&self, limit: usize) -> RecoveryResult {
        let pending = self.outbox.list_pending(limit);
        let total_pending = pending.len();
        let mut details = Vec::with_capacity(total_pending);

        for entry in pending {
            let message = entry.to_message(self.baseline_isolation);
            let report = deliver_and_record(
                &self.outbox,
                &self.topology,
                self.transport.as_ref(),
                &message,
            )
            .await;

            details.push(RecoveryDetail {
                global_tx_id: entry.global_tx_id,
                target_node: entry.target_node,
                entity_key: entry.entity_key,
                status: report.status,
                applied_on_target: report.applied_on_target,
                reason_on_target: report.reason_on_target,
                error: report.error,
            });
        }

        let succeeded = details
            .iter()
            .filter(|d| d.status == OutboxStatus::Applied)
            .count();
        let result = RecoveryResult {
            source_node: self.topology.local_id().clone(),
            total_pending,
            attempted: details.len(),
            succeeded,
            failed: details.len() - succeeded,
            details,
        };

        if result.attempted > 0 {
            tracing::info!(
                "Recovery sweep on {}: attempted={} succeeded={} failed={}",
                result.source_node,
                result.attempted,
                result.succeeded,
                result.failed
            );
        }
        result
    }

    /// Runs a sweep every `interval` for the lifetime of the process.
    pub fn spawn_sweeper(self: Arc<Self>, interval: Duration, limit: usize) {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick completes immediately.
            ticker.tick().await;

            loop {
                ticker.tick().await;
                let result = self.replay_pending_outgoing(limit).await;
                tracing::debug!(
                    "Periodic recovery: {} pending, {} delivered",
                    result.total_pending,
                    result.succeeded
                );
            }
        });
    }
}
