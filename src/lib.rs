//! Distributed Relational Store Library
//!
//! Replication, partitioning and recovery core of a small cluster made of one
//! CENTRAL node and N FRAGMENT nodes, each holding its own copy of the `users`
//! relation. The binary (`main.rs`) runs one node; tests assemble whole clusters
//! in-process through `server::Node`.
//!
//! ## Architecture Modules
//! - **`topology`**: static cluster description and the `PartitionRouter` (parity or modulo-hash).
//! - **`storage`**: in-memory transactional store with per-transaction isolation levels.
//! - **`outbox`**: replication intents written atomically with the mutation they describe.
//! - **`replication`**: the Apply Engine (idempotency + conflict resolution), transports and
//!   the post-commit dispatcher.
//! - **`recovery`**: replays undelivered outbox entries.
//! - **`txn`**: the Transaction Orchestrator and the Scripted Interpreter.
//! - **`partition`**: bulk seeding, CENTRAL to FRAGMENT distribution, stats.
//! - **`config`** / **`server`**: TOML configuration and axum wiring.

pub mod config;
pub mod error;
pub mod outbox;
pub mod partition;
pub mod recovery;
pub mod replication;
pub mod server;
pub mod storage;
pub mod topology;
pub mod txn;
