use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use crate::error::ConfigError;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct NodeId(pub String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum NodeRole {
    Central,
    Fragment,
}

impl fmt::Display for NodeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeRole::Central => f.write_str("CENTRAL"),
            NodeRole::Fragment => f.write_str("FRAGMENT"),
        }
    }
}

impl FromStr for NodeRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "CENTRAL" => Ok(NodeRole::Central),
            "FRAGMENT" => Ok(NodeRole::Fragment),
            other => Err(format!("unknown node role: {}", other)),
        }
    }
}

/// A member of the cluster as seen by every other member.
///
/// `address` is the HTTP base URL of the node (for example `http://127.0.0.1:3001`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NodeRef {
    pub id: NodeId,
    pub role: NodeRole,
    pub address: String,
}

impl NodeRef {
    pub fn new(id: impl Into<String>, role: NodeRole, address: impl Into<String>) -> Self {
        Self {
            id: NodeId::new(id),
            role,
            address: address.into(),
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.address.trim_end_matches('/'), path)
    }
}

/// Immutable cluster description: the local node plus every node (local included).
///
/// Nodes are kept sorted by id so that indices are identical on every member.
#[derive(Debug, Clone)]
pub struct Topology {
    local: usize,
    central: usize,
    nodes: Vec<NodeRef>,
}

impl Topology {
    pub fn new(local_id: &NodeId, mut nodes: Vec<NodeRef>) -> Result<Self, ConfigError> {
        nodes.sort_by(|a, b| a.id.cmp(&b.id));

        let mut seen = HashSet::new();
        for node in &nodes {
            if !seen.insert(node.id.clone()) {
                return Err(ConfigError::DuplicateNode(node.id.to_string()));
            }
        }

        let centrals: Vec<usize> = nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| n.role == NodeRole::Central)
            .map(|(i, _)| i)
            .collect();
        if centrals.len() != 1 {
            return Err(ConfigError::CentralCount(centrals.len()));
        }

        let local = nodes
            .iter()
            .position(|n| &n.id == local_id)
            .ok_or_else(|| ConfigError::UnknownLocalNode(local_id.to_string()))?;

        Ok(Self {
            local,
            central: centrals[0],
            nodes,
        })
    }

    pub fn local(&self) -> &NodeRef {
        &self.nodes[self.local]
    }

    pub fn local_id(&self) -> &NodeId {
        &self.local().id
    }

    pub fn local_role(&self) -> NodeRole {
        self.local().role
    }

    /// Position of the local node in the id-sorted node list.
    pub fn local_index(&self) -> usize {
        self.local
    }

    pub fn central(&self) -> &NodeRef {
        &self.nodes[self.central]
    }

    pub fn is_central(&self, id: &NodeId) -> bool {
        &self.central().id == id
    }

    pub fn node(&self, id: &NodeId) -> Option<&NodeRef> {
        self.nodes.iter().find(|n| &n.id == id)
    }

    pub fn nodes(&self) -> &[NodeRef] {
        &self.nodes
    }

    pub fn nodes_with_role(&self, role: NodeRole) -> Vec<NodeRef> {
        self.nodes
            .iter()
            .filter(|n| n.role == role)
            .cloned()
            .collect()
    }

    pub fn peers(&self) -> impl Iterator<Item = &NodeRef> {
        let local = self.local;
        self.nodes
            .iter()
            .enumerate()
            .filter(move |(i, _)| *i != local)
            .map(|(_, n)| n)
    }
}
