//! Local Transactions
//!
//! Client-facing writes of a node.
//!
//! ## Core Concepts
//! - **Orchestrator**: one local transaction writes the row and its outbox entry, commits,
//!   then hands the replication message to the post-commit dispatcher.
//! - **Scripted Interpreter**: runs READ / INSERT / UPDATE / DELETE / SLEEP steps inside one
//!   transaction, to provoke isolation anomalies under controlled interleavings.
//! - **Id allocation**: each node draws new keys from its own residue classes, so nodes
//!   never hand out the same key.

pub mod handlers;
pub mod ids;
pub mod interpreter;
pub mod orchestrator;
pub mod types;
