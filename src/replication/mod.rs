//! Replication
//!
//! Moves committed mutations between nodes.
//!
//! ## Core Concepts
//! - **Apply Engine**: receiver side. Consults the applied-incoming markers, resolves
//!   conflicts with `updatedAt` plus a deterministic tie-break, then mutates or skips.
//! - **Transport**: how a message reaches a peer (`HttpTransport` in production,
//!   `LoopbackTransport` for in-process clusters).
//! - **Dispatcher**: post-commit hook. A bounded queue drained by a dedicated sender task,
//!   so network latency never holds a transaction open.

pub mod apply;
pub mod dispatcher;
pub mod handlers;
pub mod protocol;
pub mod transport;
pub mod types;
