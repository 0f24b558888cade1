use std::sync::atomic::{AtomicI64, Ordering};

use crate::error::ConfigError;
use crate::topology::router::RoutingPolicy;
use crate::topology::types::Topology;

/// Hands out keys `k` with `k mod modulus` in this node's residue set.
///
/// Disjoint residue sets keep nodes from colliding with each other; the atomic
/// high-water mark keeps concurrent inserts on one node apart.
#[derive(Debug)]
pub struct IdAllocator {
    modulus: i64,
    residues: Vec<i64>,
    high_water: AtomicI64,
}

impl IdAllocator {
    pub fn new(modulus: i64, mut residues: Vec<i64>) -> Result<Self, ConfigError> {
        if modulus <= 0 {
            return Err(ConfigError::InvalidIdAllocation(format!(
                "modulus must be positive, got {}",
                modulus
            )));
        }
        residues.sort_unstable();
        residues.dedup();
        if residues.is_empty() {
            return Err(ConfigError::InvalidIdAllocation(
                "at least one residue is required".to_string(),
            ));
        }
        if let Some(bad) = residues.iter().find(|r| **r < 0 || **r >= modulus) {
            return Err(ConfigError::InvalidIdAllocation(format!(
                "residue {} outside 0..{}",
                bad, modulus
            )));
        }

        Ok(Self {
            modulus,
            residues,
            high_water: AtomicI64::new(0),
        })
    }

    /// Default classes: modulus `2 * |nodes|`, node at sorted index `i` owns `2i` and `2i + 1`.
    /// Under parity routing each parity fragment keeps only the class matching its parity.
    pub fn for_node(topology: &Topology, policy: &RoutingPolicy) -> Result<Self, ConfigError> {
        let modulus = 2 * topology.nodes().len() as i64;
        let base = 2 * topology.local_index() as i64;
        let local = topology.local_id();

        let residues = match policy {
            RoutingPolicy::Parity { even_node, .. } if even_node == local => vec![base],
            RoutingPolicy::Parity { odd_node, .. } if odd_node == local => vec![base + 1],
            _ => vec![base, base + 1],
        };
        Self::new(modulus, residues)
    }

    pub fn modulus(&self) -> i64 {
        self.modulus
    }

    pub fn residues(&self) -> &[i64] {
        &self.residues
    }

    pub fn owns(&self, key: i64) -> bool {
        self.residues.contains(&key.rem_euclid(self.modulus))
    }

    /// Next free key strictly above both the high-water mark and `floor`.
    pub fn next(&self, floor: i64) -> i64 {
        let mut current = self.high_water.load(Ordering::SeqCst);
        loop {
            let candidate = self.next_after(current.max(floor).max(0));
            match self.high_water.compare_exchange(
                current,
                candidate,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => return candidate,
                Err(actual) => current = actual,
            }
        }
    }

    fn next_after(&self, base: i64) -> i64 {
        let start = base + 1;
        let block = start - start.rem_euclid(self.modulus);
        for residue in &self.residues {
            if block + residue >= start {
                return block + residue;
            }
        }
        block + self.modulus + self.residues[0]
    }
}
