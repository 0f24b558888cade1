use serde::{Deserialize, Serialize};
use std::hash::Hasher;
use std::sync::Arc;
use twox_hash::XxHash64;

use super::types::{NodeId, NodeRef, NodeRole, Topology};
use crate::error::ConfigError;

/// How a key is mapped onto the FRAGMENT set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum RoutingPolicy {
    /// `key % 2` picks between exactly two fragments.
    Parity { even_node: NodeId, odd_node: NodeId },
    /// `xxhash64(key) % |fragments|` over the id-sorted fragment set.
    ModuloHash,
}

pub struct PartitionRouter {
    topology: Arc<Topology>,
    policy: RoutingPolicy,
    targets: Vec<NodeRef>,
}

impl PartitionRouter {
    /// Builds the router and validates the policy against the topology.
    ///
    /// An empty fragment set or a parity rule naming unknown, non-fragment or
    /// identical nodes is a startup error, never a per-request one.
    pub fn new(topology: Arc<Topology>, policy: RoutingPolicy) -> Result<Self, ConfigError> {
        let fragments = topology.nodes_with_role(NodeRole::Fragment);
        if fragments.is_empty() {
            return Err(ConfigError::EmptyRole(NodeRole::Fragment));
        }

        let targets = match &policy {
            RoutingPolicy::Parity {
                even_node,
                odd_node,
            } => {
                if even_node == odd_node {
                    return Err(ConfigError::ParityNodesNotDistinct);
                }
                let mut pair = Vec::with_capacity(2);
                for id in [even_node, odd_node] {
                    let node = topology
                        .node(id)
                        .ok_or_else(|| ConfigError::UnknownNode(id.to_string()))?;
                    if node.role != NodeRole::Fragment {
                        return Err(ConfigError::NotAFragment(id.to_string()));
                    }
                    pair.push(node.clone());
                }
                pair
            }
            RoutingPolicy::ModuloHash => fragments,
        };

        Ok(Self {
            topology,
            policy,
            targets,
        })
    }

    /// The FRAGMENT owning `key`. Pure function of the key and the topology.
    pub fn target_node(&self, key: i64) -> &NodeRef {
        let idx = match self.policy {
            RoutingPolicy::Parity { .. } => key.rem_euclid(2) as usize,
            RoutingPolicy::ModuloHash => {
                let mut hasher = XxHash64::with_seed(0);
                hasher.write(&key.to_le_bytes());
                (hasher.finish() % self.targets.len() as u64) as usize
            }
        };
        &self.targets[idx]
    }

    pub fn owns(&self, node: &NodeId, key: i64) -> bool {
        &self.target_node(key).id == node
    }

    pub fn nodes_with_role(&self, role: NodeRole) -> Vec<NodeRef> {
        self.topology.nodes_with_role(role)
    }

    pub fn all_nodes(&self) -> Vec<NodeRef> {
        self.topology.nodes().to_vec()
    }

    /// Fragments that can be returned by `target_node`.
    pub fn targets(&self) -> &[NodeRef] {
        &self.targets
    }

    pub fn topology(&self) -> &Arc<Topology> {
        &self.topology
    }

    pub fn describe(&self) -> String {
        match &self.policy {
            RoutingPolicy::Parity {
                even_node,
                odd_node,
            } => format!("parity (even -> {}, odd -> {})", even_node, odd_node),
            RoutingPolicy::ModuloHash => {
                let ids: Vec<&str> = self.targets.iter().map(|n| n.id.as_str()).collect();
                format!("modulo_hash over [{}]", ids.join(", "))
            }
        }
    }
}
