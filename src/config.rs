//! Node Configuration
//!
//! A node is configured from one TOML file plus a few CLI overrides.
//! The file describes the local node, every peer, the routing policy and the
//! tuning knobs of replication, recovery, storage and scripted transactions.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::server::{IdAllocation, NodeOptions};
use crate::storage::types::IsolationLevel;
use crate::topology::router::{PartitionRouter, RoutingPolicy};
use crate::topology::types::{NodeId, NodeRef, NodeRole, Topology};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    pub node: LocalNodeConfig,

    #[serde(default)]
    pub peers: Vec<PeerConfig>,

    #[serde(default)]
    pub routing: RoutingConfig,

    #[serde(default)]
    pub replication: ReplicationConfig,

    #[serde(default)]
    pub recovery: RecoveryConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub scripted: ScriptedConfig,

    /// Overrides the default id residue classes.
    #[serde(default)]
    pub ids: Option<IdsConfig>,

    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalNodeConfig {
    pub id: String,
    pub role: NodeRole,
    /// Socket address the HTTP server binds to.
    pub bind: String,
    /// Base URL peers use to reach this node. Defaults to `http://{bind}`.
    #[serde(default)]
    pub address: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerConfig {
    pub id: String,
    pub role: NodeRole,
    pub address: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutingPolicyKind {
    #[default]
    Parity,
    ModuloHash,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoutingConfig {
    #[serde(default)]
    pub policy: RoutingPolicyKind,
    /// Parity only. Defaults to the first FRAGMENT by id.
    #[serde(default)]
    pub even_node: Option<String>,
    /// Parity only. Defaults to the second FRAGMENT by id.
    #[serde(default)]
    pub odd_node: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplicationConfig {
    #[serde(default = "default_delivery_timeout_ms")]
    pub delivery_timeout_ms: u64,
    #[serde(default = "default_delivery_attempts")]
    pub delivery_attempts: usize,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Isolation level used when Recovery rebuilds a message.
    #[serde(default)]
    pub baseline_isolation: IsolationLevel,
}

fn default_delivery_timeout_ms() -> u64 {
    2000
}

fn default_delivery_attempts() -> usize {
    3
}

fn default_queue_capacity() -> usize {
    1024
}

impl Default for ReplicationConfig {
    fn default() -> Self {
        Self {
            delivery_timeout_ms: default_delivery_timeout_ms(),
            delivery_attempts: default_delivery_attempts(),
            queue_capacity: default_queue_capacity(),
            baseline_isolation: IsolationLevel::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoveryConfig {
    /// 0 disables the periodic sweeper.
    #[serde(default = "default_recovery_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_batch_limit")]
    pub batch_limit: usize,
    #[serde(default = "default_true")]
    pub on_startup: bool,
}

fn default_recovery_interval_secs() -> u64 {
    30
}

fn default_batch_limit() -> usize {
    100
}

fn default_true() -> bool {
    true
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_recovery_interval_secs(),
            batch_limit: default_batch_limit(),
            on_startup: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,
}

fn default_lock_timeout_ms() -> u64 {
    5000
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            lock_timeout_ms: default_lock_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptedConfig {
    #[serde(default = "default_max_sleep_ms")]
    pub max_sleep_ms: u64,
}

fn default_max_sleep_ms() -> u64 {
    30_000
}

impl Default for ScriptedConfig {
    fn default() -> Self {
        Self {
            max_sleep_ms: default_max_sleep_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdsConfig {
    pub modulus: i64,
    pub residues: Vec<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

/// Values given on the command line win over the file.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub bind: Option<String>,
    pub log_level: Option<String>,
}

impl NodeConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        Self::from_toml(&content)
            .with_context(|| format!("invalid config file: {}", path.display()))
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: NodeConfig = toml::from_str(content).context("failed to parse config")?;
        config.validate()?;
        Ok(config)
    }

    pub fn apply_overrides(&mut self, overrides: &ConfigOverrides) {
        if let Some(ref bind) = overrides.bind {
            self.node.bind = bind.clone();
        }
        if let Some(ref log_level) = overrides.log_level {
            self.telemetry.log_level = log_level.clone();
        }
    }

    /// Checks everything that would otherwise fail at startup.
    pub fn validate(&self) -> Result<()> {
        if self.node.id.trim().is_empty() {
            anyhow::bail!("node.id must not be empty");
        }
        if self.replication.delivery_attempts == 0 {
            anyhow::bail!("replication.delivery_attempts must be at least 1");
        }
        if self.replication.delivery_timeout_ms == 0 {
            anyhow::bail!("replication.delivery_timeout_ms must be positive");
        }
        if self.replication.queue_capacity == 0 {
            anyhow::bail!("replication.queue_capacity must be at least 1");
        }
        if self.recovery.batch_limit == 0 {
            anyhow::bail!("recovery.batch_limit must be at least 1");
        }
        self.log_level()?;

        let topology = Arc::new(self.topology()?);
        let policy = self.routing_policy(&topology)?;
        PartitionRouter::new(topology, policy).context("invalid routing configuration")?;
        Ok(())
    }

    pub fn log_level(&self) -> Result<tracing::Level> {
        self.telemetry
            .log_level
            .parse::<tracing::Level>()
            .map_err(|_| {
                anyhow::anyhow!(
                    "telemetry.log_level must be one of trace, debug, info, warn, error; got: {}",
                    self.telemetry.log_level
                )
            })
    }

    pub fn local_address(&self) -> String {
        self.node
            .address
            .clone()
            .unwrap_or_else(|| format!("http://{}", self.node.bind))
    }

    pub fn topology(&self) -> Result<Topology> {
        let mut nodes = vec![NodeRef::new(
            self.node.id.clone(),
            self.node.role,
            self.local_address(),
        )];
        nodes.extend(
            self.peers
                .iter()
                .map(|p| NodeRef::new(p.id.clone(), p.role, p.address.clone())),
        );
        Topology::new(&NodeId::new(self.node.id.clone()), nodes).context("invalid topology")
    }

    pub fn routing_policy(&self, topology: &Topology) -> Result<RoutingPolicy> {
        match self.routing.policy {
            RoutingPolicyKind::ModuloHash => Ok(RoutingPolicy::ModuloHash),
            RoutingPolicyKind::Parity => {
                let fragments = topology.nodes_with_role(NodeRole::Fragment);
                let pick = |configured: &Option<String>, idx: usize, name: &str| {
                    configured
                        .clone()
                        .or_else(|| fragments.get(idx).map(|n| n.id.to_string()))
                        .map(NodeId::new)
                        .ok_or_else(|| {
                            anyhow::anyhow!("routing.{} is required for parity routing", name)
                        })
                };
                Ok(RoutingPolicy::Parity {
                    even_node: pick(&self.routing.even_node, 0, "even_node")?,
                    odd_node: pick(&self.routing.odd_node, 1, "odd_node")?,
                })
            }
        }
    }

    pub fn node_options(&self, topology: &Topology) -> Result<NodeOptions> {
        Ok(NodeOptions {
            routing: self.routing_policy(topology)?,
            delivery_timeout: Duration::from_millis(self.replication.delivery_timeout_ms),
            delivery_attempts: self.replication.delivery_attempts,
            queue_capacity: self.replication.queue_capacity,
            baseline_isolation: self.replication.baseline_isolation,
            lock_timeout: Duration::from_millis(self.storage.lock_timeout_ms),
            max_sleep: Duration::from_millis(self.scripted.max_sleep_ms),
            id_allocation: self.ids.as_ref().map(|ids| IdAllocation {
                modulus: ids.modulus,
                residues: ids.residues.clone(),
            }),
        })
    }
}
