//! Node HTTP Protocol
//!
//! Endpoint paths shared by the server router and the peer clients.

/// Inbound replication (Apply Engine).
pub const ENDPOINT_APPLY: &str = "/replication/apply";
/// One Recovery sweep over this node's outbox.
pub const ENDPOINT_RECOVERY_RUN: &str = "/recovery/run";
/// Seeding of pre-partitioned rows.
pub const ENDPOINT_BULK_INSERT: &str = "/partition/bulk-insert";
/// CENTRAL pushes its rows to the owning fragments.
pub const ENDPOINT_DISTRIBUTE: &str = "/partition/distribute";
pub const ENDPOINT_PARTITION_STATS: &str = "/partition/stats";
pub const ENDPOINT_INSERT_AUTO: &str = "/txn/insert-auto";
pub const ENDPOINT_SCRIPTED: &str = "/txn/scripted";
pub const ENDPOINT_USERS: &str = "/users";
pub const ENDPOINT_USER: &str = "/users/:id";
pub const ENDPOINT_OUTBOX: &str = "/outbox";
pub const ENDPOINT_HEALTH: &str = "/health";
