//! Replication Outbox
//!
//! Append-only log of outgoing replication intents (`replication_log`).
//!
//! An entry is staged in the same transaction as the row mutation it describes,
//! so an intent exists if and only if the mutation committed. Entries are never
//! deleted. Delivery acknowledgements move them to APPLIED; failed deliveries
//! flag them FAILED, which keeps them eligible for Recovery.

pub mod handlers;
pub mod log;
pub mod types;
