//! Recovery Replayer
//!
//! Re-sends outbox entries that were never acknowledged by their target.
//!
//! A sweep can be triggered over HTTP, at startup, or on a timer. Sweeps need no
//! mutual exclusion: receivers deduplicate by `globalTxId`, so overlapping sweeps
//! and live traffic only cost duplicate deliveries.

pub mod handlers;
pub mod replayer;
pub mod types;
