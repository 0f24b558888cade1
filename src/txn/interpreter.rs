use std::sync::Arc;
use std::time::Duration;

use super::orchestrator::TransactionOrchestrator;
use super::types::{ScriptRequest, ScriptedTrace, TraceOperation, TraceStep, TxnStep};
use crate::error::NodeError;
use crate::storage::memory::Transaction;
use crate::storage::types::{UserRow, utc_now};
use crate::topology::types::NodeRole;

/// Executes scripted transactions on a single key.
pub struct ScriptedInterpreter {
    orchestrator: Arc<TransactionOrchestrator>,
    max_sleep: Duration,
}

impl ScriptedInterpreter {
    pub fn new(orchestrator: Arc<TransactionOrchestrator>, max_sleep: Duration) -> Self {
        Self {
            orchestrator,
            max_sleep,
        }
    }

    fn validate(&self, request: &ScriptRequest) -> Result<(), NodeError> {
        if request.steps.is_empty() {
            return Err(NodeError::validation("steps must not be empty"));
        }
        if request.user_id <= 0 {
            return Err(NodeError::validation(format!(
                "userId must be positive, got {}",
                request.user_id
            )));
        }
        for (i, step) in request.steps.iter().enumerate() {
            if let TxnStep::Sleep { delay_ms } = step
                && Duration::from_millis(*delay_ms) > self.max_sleep
            {
                return Err(NodeError::validation(format!(
                    "step {}: delayMs {} exceeds the limit of {}ms",
                    i,
                    delay_ms,
                    self.max_sleep.as_millis()
                )));
            }
        }

        // A fragment only runs scripts for keys in its own shard.
        let router = self.orchestrator.router();
        let local = self.orchestrator.topology().local();
        if local.role == NodeRole::Fragment
            && router.targets().iter().any(|n| n.id == local.id)
            && !router.owns(&local.id, request.user_id)
        {
            return Err(NodeError::validation(format!(
                "key_not_in_fragment: user {} is not stored on {}",
                request.user_id, local.id
            )));
        }
        Ok(())
    }

    /// Runs every step inside one transaction and commits with at most one outbox entry.
    ///
    /// Any failing step drops the transaction, which rolls back every write of the script.
    pub async fn run_scripted(&self, request: ScriptRequest) -> Result<ScriptedTrace, NodeError> {
        self.validate(&request)?;

        let key = request.user_id;
        let isolation = request.isolation;
        let mut tx = self.orchestrator.begin(isolation);

        let (before, last, steps) = match self.execute(&mut tx, key, &request.steps).await {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!(
                    "Scripted transaction on user {} aborted ({}): {}",
                    key,
                    isolation,
                    e
                );
                return Err(e);
            }
        };

        let staged = if request.steps.iter().any(TxnStep::is_mutation) {
            self.orchestrator
                .stage_replication(&mut tx, key, last.as_ref(), utc_now())?
        } else {
            None
        };

        let committed = self
            .orchestrator
            .commit_and_dispatch(tx, staged, isolation, request.simulate_replication_failure)
            .inspect_err(|e| {
                tracing::warn!(
                    "Scripted transaction on user {} failed to commit ({}): {}",
                    key,
                    isolation,
                    e
                )
            })?;

        let topology = self.orchestrator.topology();
        Ok(ScriptedTrace {
            node: topology.local_id().clone(),
            role: topology.local_role(),
            isolation,
            operation: TraceOperation::Scripted,
            user_id: key,
            before,
            after: last,
            steps,
            outbox: committed.outbox,
            delivery: committed.delivery,
        })
    }

    async fn execute(
        &self,
        tx: &mut Transaction,
        key: i64,
        steps: &[TxnStep],
    ) -> Result<(Option<UserRow>, Option<UserRow>, Vec<TraceStep>), NodeError> {
        let before = tx.get_user(key)?;
        let mut last = before.clone();
        let mut trace = Vec::with_capacity(steps.len());

        for (i, step) in steps.iter().enumerate() {
            match step {
                TxnStep::Read => {
                    last = tx.get_user(key)?;
                }
                TxnStep::Insert { data } => {
                    let current = tx.get_user_for_update(key).await?;
                    let row = data.merge(key, current.as_ref(), utc_now());
                    tx.put_user(row.clone()).await?;
                    last = Some(row);
                }
                TxnStep::Update { data } => {
                    let current = tx.get_user_for_update(key).await?;
                    if current.is_none() {
                        return Err(NodeError::NotFound(format!(
                            "user {} does not exist (step {})",
                            key, i
                        )));
                    }
                    // Merge over what this transaction last saw, which may be stale.
                    let base = last.as_ref().or(current.as_ref());
                    let row = data.merge(key, base, utc_now());
                    tx.put_user(row.clone()).await?;
                    last = Some(row);
                }
                TxnStep::Delete => {
                    tx.delete_user(key).await?;
                    last = None;
                }
                TxnStep::Sleep { delay_ms } => {
                    tokio::time::sleep(Duration::from_millis(*delay_ms)).await;
                }
            }

            trace.push(TraceStep {
                label: step.label(i),
                at: utc_now(),
                row: last.clone(),
            });
        }

        Ok((before, last, trace))
    }
}
