//! Relational Storage
//!
//! In-memory transactional store holding the `users` relation, the outbox and
//! the applied-incoming markers of one node.
//!
//! ## Core Concepts
//! - **Isolation**: chosen per transaction (`IsolationLevel`), enforced with row locks
//!   held until commit plus multi-version rows for snapshot reads.
//! - **Atomic commit**: row versions, outbox entries and markers written by a transaction
//!   become visible together or not at all.
//! - **Rollback on drop**: a `Transaction` that is dropped while open leaves no trace.

pub mod handlers;
pub mod memory;
pub mod types;
