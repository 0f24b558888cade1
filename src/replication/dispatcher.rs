use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;

use super::transport::ReplicationTransport;
use super::types::{ApplyReason, ReplicationMessage};
use crate::error::DeliveryError;
use crate::outbox::log::Outbox;
use crate::outbox::types::OutboxStatus;
use crate::topology::types::Topology;

/// What happened to the post-commit delivery request of one transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchState {
    /// Handed to the sender task.
    Queued,
    /// Not sent on purpose; the entry waits for Recovery.
    Skipped,
    /// Queue saturated; the entry waits for Recovery.
    QueueFull,
}

/// Outcome of one delivery attempt, as recorded in the outbox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryReport {
    pub status: OutboxStatus,
    pub applied_on_target: bool,
    pub reason_on_target: Option<ApplyReason>,
    pub error: Option<String>,
}

/// Sends `message` to its target and records the result on the outbox entry.
///
/// Success marks the entry APPLIED. A rejection flags it FAILED. A transport
/// error leaves its status alone. The entry stays retryable in both failure cases.
pub async fn deliver_and_record(
    outbox: &Outbox,
    topology: &Topology,
    transport: &dyn ReplicationTransport,
    message: &ReplicationMessage,
) -> DeliveryReport {
    let id = message.global_tx_id;

    let Some(peer) = topology.node(&message.target_node) else {
        let error = format!("unknown target node {}", message.target_node);
        tracing::warn!("Replication {}: {}", id, error);
        outbox.flag_failed(&id, &error);
        return DeliveryReport {
            status: OutboxStatus::Failed,
            applied_on_target: false,
            reason_on_target: None,
            error: Some(error),
        };
    };

    match transport.deliver(peer, message).await {
        Ok(outcome) => {
            outbox.mark_applied(&id);
            tracing::debug!(
                "Replication {} delivered to {} (applied={}, reason={})",
                id,
                peer.id,
                outcome.applied,
                outcome.reason
            );
            DeliveryReport {
                status: OutboxStatus::Applied,
                applied_on_target: outcome.applied,
                reason_on_target: Some(outcome.reason),
                error: None,
            }
        }
        Err(e @ DeliveryError::Rejected { .. }) => {
            let error = e.to_string();
            tracing::warn!("Replication {} rejected by {}: {}", id, peer.id, error);
            outbox.flag_failed(&id, &error);
            DeliveryReport {
                status: OutboxStatus::Failed,
                applied_on_target: false,
                reason_on_target: None,
                error: Some(error),
            }
        }
        Err(e @ DeliveryError::Transport(_)) => {
            let error = e.to_string();
            tracing::warn!("Replication {} to {} failed: {}", id, peer.id, error);
            outbox.record_transport_error(&id, &error);
            DeliveryReport {
                status: OutboxStatus::Pending,
                applied_on_target: false,
                reason_on_target: None,
                error: Some(error),
            }
        }
    }
}

/// Post-commit delivery hook.
///
/// Committed transactions enqueue their replication message; one sender task
/// drains the bounded queue. Nothing here can fail a transaction: an entry that
/// is never delivered stays in the outbox for Recovery.
pub struct Dispatcher {
    queue: mpsc::Sender<ReplicationMessage>,
}

impl Dispatcher {
    pub fn start(
        outbox: Arc<Outbox>,
        topology: Arc<Topology>,
        transport: Arc<dyn ReplicationTransport>,
        capacity: usize,
    ) -> Arc<Self> {
        let (queue, mut rx) = mpsc::channel::<ReplicationMessage>(capacity.max(1));

        tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                deliver_and_record(&outbox, &topology, transport.as_ref(), &message).await;
            }
            tracing::debug!("Replication dispatcher stopped");
        });

        Arc::new(Self { queue })
    }

    pub fn enqueue(&self, message: ReplicationMessage) -> DispatchState {
        let id = message.global_tx_id;
        match self.queue.try_send(message) {
            Ok(()) => DispatchState::Queued,
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!("Replication queue full, {} left for recovery", id);
                DispatchState::QueueFull
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::warn!("Replication dispatcher closed, {} left for recovery", id);
                DispatchState::QueueFull
            }
        }
    }
}
