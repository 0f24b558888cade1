//! Cluster Topology
//!
//! Static description of the cluster: one CENTRAL node and N FRAGMENT nodes.
//!
//! ## Core Concepts
//! - **Topology**: loaded once at startup and shared by `Arc`. Nothing mutates it.
//! - **Routing**: `PartitionRouter` maps an integer key to the FRAGMENT that owns it,
//!   using either the parity rule or a modulo-hash over the fragment set.
//!   Every node runs the same function over the same input, so routing needs no coordination.

pub mod router;
pub mod types;
