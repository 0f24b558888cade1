//! Partition Loading
//!
//! Initial seeding of fragment nodes and partition reporting.
//!
//! - **Bulk load**: any node accepts pre-partitioned rows (upsert, duplicate-tolerant).
//! - **Distribution**: CENTRAL splits its rows with the `PartitionRouter` and pushes each
//!   fragment's share in chunks to that fragment's bulk-load endpoint.
//! - **Stats**: routing layout plus local row and outbox counts.

pub mod handlers;
pub mod sync;
pub mod types;

#[cfg(test)]
mod tests;
