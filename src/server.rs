//! Node Assembly
//!
//! Wires the components of one node together and exposes them over axum.
//! Used by the binary and by the in-process cluster tests alike.

use axum::{
    Json, Router,
    extract::Extension,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::error::ConfigError;
use crate::outbox::handlers::handle_list_outbox;
use crate::outbox::log::Outbox;
use crate::partition::handlers::{handle_bulk_insert, handle_distribute, handle_partition_stats};
use crate::partition::sync::DistributedSync;
use crate::recovery::handlers::handle_recovery_run;
use crate::recovery::replayer::RecoveryReplayer;
use crate::replication::apply::ApplyEngine;
use crate::replication::dispatcher::Dispatcher;
use crate::replication::handlers::handle_apply;
use crate::replication::protocol::*;
use crate::replication::transport::{PeerClient, ReplicationTransport};
use crate::storage::handlers::{handle_get_user, handle_list_users};
use crate::storage::memory::{DEFAULT_LOCK_TIMEOUT, MemoryStore};
use crate::storage::types::IsolationLevel;
use crate::topology::router::{PartitionRouter, RoutingPolicy};
use crate::topology::types::{NodeId, NodeRole, Topology};
use crate::txn::handlers::{handle_insert_auto, handle_scripted};
use crate::txn::ids::IdAllocator;
use crate::txn::interpreter::ScriptedInterpreter;
use crate::txn::orchestrator::TransactionOrchestrator;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdAllocation {
    pub modulus: i64,
    pub residues: Vec<i64>,
}

/// Runtime settings of one node, resolved from configuration.
#[derive(Debug, Clone)]
pub struct NodeOptions {
    pub routing: RoutingPolicy,
    pub delivery_timeout: Duration,
    pub delivery_attempts: usize,
    pub queue_capacity: usize,
    pub baseline_isolation: IsolationLevel,
    pub lock_timeout: Duration,
    pub max_sleep: Duration,
    pub id_allocation: Option<IdAllocation>,
}

impl Default for NodeOptions {
    fn default() -> Self {
        Self {
            routing: RoutingPolicy::ModuloHash,
            delivery_timeout: Duration::from_millis(2000),
            delivery_attempts: 3,
            queue_capacity: 1024,
            baseline_isolation: IsolationLevel::ReadCommitted,
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
            max_sleep: Duration::from_secs(30),
            id_allocation: None,
        }
    }
}

/// Every component of a running node.
pub struct Node {
    pub topology: Arc<Topology>,
    pub router: Arc<PartitionRouter>,
    pub store: Arc<MemoryStore>,
    pub outbox: Arc<Outbox>,
    pub engine: Arc<ApplyEngine>,
    pub dispatcher: Arc<Dispatcher>,
    pub orchestrator: Arc<TransactionOrchestrator>,
    pub interpreter: Arc<ScriptedInterpreter>,
    pub replayer: Arc<RecoveryReplayer>,
    pub sync: Arc<DistributedSync>,
}

impl Node {
    /// Builds the node and starts its dispatcher task. Must run inside a tokio runtime.
    pub fn build(
        topology: Arc<Topology>,
        options: &NodeOptions,
        transport: Arc<dyn ReplicationTransport>,
    ) -> Result<Self, ConfigError> {
        let router = Arc::new(PartitionRouter::new(
            topology.clone(),
            options.routing.clone(),
        )?);
        let ids = match &options.id_allocation {
            Some(ids) => IdAllocator::new(ids.modulus, ids.residues.clone())?,
            None => IdAllocator::for_node(&topology, &options.routing)?,
        };

        let store = MemoryStore::with_lock_timeout(options.lock_timeout);
        let outbox = Arc::new(Outbox::new(store.clone(), topology.local_id().clone()));
        let engine = Arc::new(ApplyEngine::new(store.clone(), topology.clone()));
        let dispatcher = Dispatcher::start(
            outbox.clone(),
            topology.clone(),
            transport.clone(),
            options.queue_capacity,
        );
        let orchestrator = Arc::new(TransactionOrchestrator::new(
            store.clone(),
            router.clone(),
            outbox.clone(),
            dispatcher.clone(),
            ids,
        ));
        let interpreter = Arc::new(ScriptedInterpreter::new(
            orchestrator.clone(),
            options.max_sleep,
        ));
        let replayer = Arc::new(RecoveryReplayer::new(
            outbox.clone(),
            topology.clone(),
            transport,
            options.baseline_isolation,
        ));
        let sync = Arc::new(DistributedSync::new(
            store.clone(),
            router.clone(),
            outbox.clone(),
            PeerClient::new(options.delivery_timeout, options.delivery_attempts),
        ));

        tracing::info!(
            "Node {} ({}) ready, routing: {}",
            topology.local_id(),
            topology.local_role(),
            router.describe()
        );

        Ok(Self {
            topology,
            router,
            store,
            outbox,
            engine,
            dispatcher,
            orchestrator,
            interpreter,
            replayer,
            sync,
        })
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route(ENDPOINT_APPLY, post(handle_apply))
            .route(ENDPOINT_RECOVERY_RUN, post(handle_recovery_run))
            .route(ENDPOINT_BULK_INSERT, post(handle_bulk_insert))
            .route(ENDPOINT_DISTRIBUTE, post(handle_distribute))
            .route(ENDPOINT_PARTITION_STATS, get(handle_partition_stats))
            .route(ENDPOINT_INSERT_AUTO, post(handle_insert_auto))
            .route(ENDPOINT_SCRIPTED, post(handle_scripted))
            .route(ENDPOINT_USERS, get(handle_list_users))
            .route(ENDPOINT_USER, get(handle_get_user))
            .route(ENDPOINT_OUTBOX, get(handle_list_outbox))
            .route(ENDPOINT_HEALTH, get(handle_health))
            .layer(Extension(self.topology.clone()))
            .layer(Extension(self.store.clone()))
            .layer(Extension(self.outbox.clone()))
            .layer(Extension(self.engine.clone()))
            .layer(Extension(self.orchestrator.clone()))
            .layer(Extension(self.interpreter.clone()))
            .layer(Extension(self.replayer.clone()))
            .layer(Extension(self.sync.clone()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub node: NodeId,
    pub role: NodeRole,
    pub status: String,
}

async fn handle_health(Extension(topology): Extension<Arc<Topology>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        node: topology.local_id().clone(),
        role: topology.local_role(),
        status: "ok".to_string(),
    })
}
