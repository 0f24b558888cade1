use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use super::types::{IsolationLevel, SeedRow, UserRow, utc_now};
use crate::error::StorageError;
use crate::outbox::types::{OutboxEntry, OutboxStatus};
use crate::topology::types::NodeId;

pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

/// One committed version of a row. `row == None` records a delete.
#[derive(Debug, Clone)]
struct RowVersion {
    commit_seq: u64,
    row: Option<UserRow>,
}

#[derive(Debug, Default)]
struct Tables {
    commit_seq: u64,
    users: BTreeMap<i64, Vec<RowVersion>>,
    outbox: Vec<OutboxEntry>,
    outbox_index: HashMap<Uuid, usize>,
    applied_incoming: HashMap<Uuid, DateTime<Utc>>,
}

impl Tables {
    fn latest(&self, key: i64) -> Option<&RowVersion> {
        self.users.get(&key).and_then(|versions| versions.last())
    }

    fn latest_seq(&self, key: i64) -> u64 {
        self.latest(key).map(|v| v.commit_seq).unwrap_or(0)
    }

    fn visible_at(&self, key: i64, snapshot: u64) -> Option<UserRow> {
        self.users.get(&key).and_then(|versions| {
            versions
                .iter()
                .rev()
                .find(|v| v.commit_seq <= snapshot)
                .and_then(|v| v.row.clone())
        })
    }

    fn latest_row(&self, key: i64) -> Option<UserRow> {
        self.latest(key).and_then(|v| v.row.clone())
    }

    /// Drops versions no open snapshot can observe any more.
    fn prune(&mut self, key: i64, horizon: u64) {
        let Some(versions) = self.users.get_mut(&key) else {
            return;
        };
        if let Some(keep_from) = versions.iter().rposition(|v| v.commit_seq <= horizon) {
            versions.drain(..keep_from);
        }
        if versions.len() == 1 && versions[0].row.is_none() && versions[0].commit_seq <= horizon {
            self.users.remove(&key);
        }
    }
}

#[derive(Debug)]
struct DirtyWrite {
    txn_id: u64,
    row: Option<UserRow>,
}

/// The node-local relational store.
///
/// Committed state lives behind one `RwLock`; uncommitted writes are published
/// to `uncommitted` so READ UNCOMMITTED readers can observe them.
pub struct MemoryStore {
    tables: RwLock<Tables>,
    uncommitted: DashMap<i64, DirtyWrite>,
    row_locks: DashMap<i64, Arc<Mutex<()>>>,
    snapshots: DashMap<u64, u64>,
    next_txn_id: AtomicU64,
    lock_timeout: Duration,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Self::with_lock_timeout(DEFAULT_LOCK_TIMEOUT)
    }

    pub fn with_lock_timeout(lock_timeout: Duration) -> Arc<Self> {
        Arc::new(Self {
            tables: RwLock::new(Tables::default()),
            uncommitted: DashMap::new(),
            row_locks: DashMap::new(),
            snapshots: DashMap::new(),
            next_txn_id: AtomicU64::new(1),
            lock_timeout,
        })
    }

    pub fn begin(self: &Arc<Self>, isolation: IsolationLevel) -> Transaction {
        let id = self.next_txn_id.fetch_add(1, Ordering::SeqCst);
        tracing::trace!("BEGIN txn {} ({})", id, isolation);
        Transaction {
            store: self.clone(),
            id,
            isolation,
            state: TxnState::Open,
            snapshot: None,
            writes: BTreeMap::new(),
            reads: HashSet::new(),
            locks: HashMap::new(),
            outbox: Vec::new(),
            applied: Vec::new(),
        }
    }

    // --- committed reads ---

    pub fn get_user(&self, key: i64) -> Option<UserRow> {
        self.tables.read().latest_row(key)
    }

    pub fn list_users(&self, limit: Option<usize>) -> Vec<UserRow> {
        let tables = self.tables.read();
        tables
            .users
            .keys()
            .filter_map(|key| tables.latest_row(*key))
            .take(limit.unwrap_or(usize::MAX))
            .collect()
    }

    pub fn user_count(&self) -> usize {
        let tables = self.tables.read();
        tables
            .users
            .values()
            .filter(|versions| versions.last().is_some_and(|v| v.row.is_some()))
            .count()
    }

    pub fn max_user_id(&self) -> Option<i64> {
        let tables = self.tables.read();
        tables
            .users
            .iter()
            .rev()
            .find(|(_, versions)| versions.last().is_some_and(|v| v.row.is_some()))
            .map(|(key, _)| *key)
    }

    // --- applied-incoming markers ---

    pub fn has_applied(&self, global_tx_id: &Uuid) -> bool {
        self.tables
            .read()
            .applied_incoming
            .contains_key(global_tx_id)
    }

    pub fn applied_count(&self) -> usize {
        self.tables.read().applied_incoming.len()
    }

    // --- outbox ---

    pub fn outbox_entry(&self, global_tx_id: &Uuid) -> Option<OutboxEntry> {
        let tables = self.tables.read();
        tables
            .outbox_index
            .get(global_tx_id)
            .map(|idx| tables.outbox[*idx].clone())
    }

    pub fn outbox_entries(&self, status: Option<OutboxStatus>, limit: Option<usize>) -> Vec<OutboxEntry> {
        self.tables
            .read()
            .outbox
            .iter()
            .filter(|e| status.is_none_or(|s| e.status == s))
            .take(limit.unwrap_or(usize::MAX))
            .cloned()
            .collect()
    }

    /// Retryable entries authored by `source`, oldest first.
    pub fn list_pending_outbox(&self, source: &NodeId, limit: usize) -> Vec<OutboxEntry> {
        self.tables
            .read()
            .outbox
            .iter()
            .filter(|e| &e.source_node == source && e.status.is_retryable())
            .take(limit)
            .cloned()
            .collect()
    }

    pub fn count_outbox(&self, source: &NodeId) -> usize {
        self.tables
            .read()
            .outbox
            .iter()
            .filter(|e| &e.source_node == source && e.status.is_retryable())
            .count()
    }

    /// Mutates one outbox entry in place and returns the updated copy.
    pub fn update_outbox<F>(&self, global_tx_id: &Uuid, update: F) -> Option<OutboxEntry>
    where
        F: FnOnce(&mut OutboxEntry),
    {
        let mut tables = self.tables.write();
        let idx = *tables.outbox_index.get(global_tx_id)?;
        let entry = &mut tables.outbox[idx];
        update(entry);
        Some(entry.clone())
    }

    /// Upserts every row in one READ COMMITTED transaction, overwriting existing rows.
    pub async fn bulk_upsert(self: &Arc<Self>, rows: Vec<SeedRow>) -> Result<usize, StorageError> {
        let now = utc_now();
        let mut tx = self.begin(IsolationLevel::ReadCommitted);
        let count = rows.len();
        for seed in rows {
            tx.put_user(seed.into_row(now)).await?;
        }
        tx.commit()?;
        Ok(count)
    }

    async fn lock_row(&self, key: i64) -> Result<OwnedMutexGuard<()>, StorageError> {
        let mutex = self
            .row_locks
            .entry(key)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();

        match tokio::time::timeout(self.lock_timeout, mutex.lock_owned()).await {
            Ok(guard) => Ok(guard),
            Err(_) => {
                self.forget_lock(key);
                Err(StorageError::LockTimeout { key })
            }
        }
    }

    fn forget_lock(&self, key: i64) {
        self.row_locks
            .remove_if(&key, |_, mutex| Arc::strong_count(mutex) == 1);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxnState {
    Open,
    Committed,
    Aborted,
}

/// An open unit of work against a `MemoryStore`.
///
/// Row writes take a row lock that is held until `commit`, `rollback` or drop.
pub struct Transaction {
    store: Arc<MemoryStore>,
    id: u64,
    isolation: IsolationLevel,
    state: TxnState,
    snapshot: Option<u64>,
    writes: BTreeMap<i64, Option<UserRow>>,
    reads: HashSet<i64>,
    locks: HashMap<i64, OwnedMutexGuard<()>>,
    outbox: Vec<OutboxEntry>,
    applied: Vec<Uuid>,
}

impl Transaction {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn isolation(&self) -> IsolationLevel {
        self.isolation
    }

    pub fn state(&self) -> TxnState {
        self.state
    }

    fn ensure_open(&self) -> Result<(), StorageError> {
        if self.state == TxnState::Open {
            Ok(())
        } else {
            Err(StorageError::TransactionClosed)
        }
    }

    /// Fixes the snapshot at the first statement for snapshot isolation levels.
    fn touch_snapshot(&mut self) {
        if !self.isolation.uses_snapshot() || self.snapshot.is_some() {
            return;
        }
        let tables = self.store.tables.read();
        self.store.snapshots.insert(self.id, tables.commit_seq);
        self.snapshot = Some(tables.commit_seq);
    }

    fn read_visible(&self, key: i64) -> Option<UserRow> {
        if let Some(own) = self.writes.get(&key) {
            return own.clone();
        }

        if self.isolation == IsolationLevel::ReadUncommitted
            && let Some(dirty) = self.store.uncommitted.get(&key)
        {
            return dirty.row.clone();
        }

        let tables = self.store.tables.read();
        match self.snapshot {
            Some(snapshot) => tables.visible_at(key, snapshot),
            None => tables.latest_row(key),
        }
    }

    pub fn get_user(&mut self, key: i64) -> Result<Option<UserRow>, StorageError> {
        self.ensure_open()?;
        self.touch_snapshot();
        self.reads.insert(key);
        Ok(self.read_visible(key))
    }

    /// Locks the row (present or not) and reads it.
    ///
    /// As the first statement of a snapshot transaction the snapshot is fixed
    /// after the lock is granted, so it includes the commit of the previous
    /// lock holder.
    pub async fn get_user_for_update(&mut self, key: i64) -> Result<Option<UserRow>, StorageError> {
        self.ensure_open()?;
        self.acquire(key).await?;
        self.touch_snapshot();
        self.reads.insert(key);
        Ok(self.read_visible(key))
    }

    pub async fn put_user(&mut self, row: UserRow) -> Result<(), StorageError> {
        let key = row.user_id;
        self.write(key, Some(row)).await
    }

    pub async fn delete_user(&mut self, key: i64) -> Result<(), StorageError> {
        self.write(key, None).await
    }

    async fn write(&mut self, key: i64, row: Option<UserRow>) -> Result<(), StorageError> {
        self.ensure_open()?;
        self.touch_snapshot();
        self.acquire(key).await?;

        self.store.uncommitted.insert(
            key,
            DirtyWrite {
                txn_id: self.id,
                row: row.clone(),
            },
        );
        self.writes.insert(key, row);
        Ok(())
    }

    async fn acquire(&mut self, key: i64) -> Result<(), StorageError> {
        if self.locks.contains_key(&key) {
            return Ok(());
        }
        let guard = self.store.lock_row(key).await?;
        self.locks.insert(key, guard);

        // First-updater-wins under snapshot isolation.
        if let Some(snapshot) = self.snapshot
            && self.store.tables.read().latest_seq(key) > snapshot
        {
            return Err(StorageError::SerializationFailure { key });
        }
        Ok(())
    }

    /// Stages an outbox entry; it becomes visible only on commit.
    pub fn append_outbox(&mut self, entry: OutboxEntry) -> Result<(), StorageError> {
        self.ensure_open()?;
        self.outbox.push(entry);
        Ok(())
    }

    pub fn has_applied(&mut self, global_tx_id: &Uuid) -> Result<bool, StorageError> {
        self.ensure_open()?;
        if self.applied.contains(global_tx_id) {
            return Ok(true);
        }
        Ok(self.store.has_applied(global_tx_id))
    }

    pub fn mark_applied_incoming(&mut self, global_tx_id: Uuid) -> Result<(), StorageError> {
        self.ensure_open()?;
        self.applied.push(global_tx_id);
        Ok(())
    }

    /// Publishes every staged effect atomically. Returns the commit sequence number.
    pub fn commit(mut self) -> Result<u64, StorageError> {
        self.ensure_open()?;
        let result = self.publish();
        self.state = match result {
            Ok(_) => TxnState::Committed,
            Err(_) => TxnState::Aborted,
        };
        self.release();
        result
    }

    fn publish(&mut self) -> Result<u64, StorageError> {
        let mut tables = self.store.tables.write();

        if self.isolation == IsolationLevel::Serializable
            && let Some(snapshot) = self.snapshot
        {
            for key in &self.reads {
                if !self.writes.contains_key(key) && tables.latest_seq(*key) > snapshot {
                    return Err(StorageError::SerializationFailure { key: *key });
                }
            }
        }

        let mut markers = HashSet::new();
        for id in &self.applied {
            if tables.applied_incoming.contains_key(id) || !markers.insert(*id) {
                return Err(StorageError::UniqueViolation {
                    table: "applied_incoming",
                    key: id.to_string(),
                });
            }
        }

        let mut outbox_ids = HashSet::new();
        for entry in &self.outbox {
            let id = entry.global_tx_id;
            if tables.outbox_index.contains_key(&id) || !outbox_ids.insert(id) {
                return Err(StorageError::UniqueViolation {
                    table: "replication_log",
                    key: id.to_string(),
                });
            }
        }

        if self.writes.is_empty() && self.outbox.is_empty() && self.applied.is_empty() {
            return Ok(tables.commit_seq);
        }

        tables.commit_seq += 1;
        let seq = tables.commit_seq;

        for (key, row) in &self.writes {
            tables.users.entry(*key).or_default().push(RowVersion {
                commit_seq: seq,
                row: row.clone(),
            });
        }

        let now = utc_now();
        for id in self.applied.drain(..) {
            tables.applied_incoming.insert(id, now);
        }

        for entry in self.outbox.drain(..) {
            let idx = tables.outbox.len();
            tables.outbox_index.insert(entry.global_tx_id, idx);
            tables.outbox.push(entry);
        }

        let horizon = self
            .store
            .snapshots
            .iter()
            .filter(|s| *s.key() != self.id)
            .map(|s| *s.value())
            .min()
            .unwrap_or(seq);
        for key in self.writes.keys() {
            tables.prune(*key, horizon);
        }

        tracing::trace!("COMMIT txn {} at seq {}", self.id, seq);
        Ok(seq)
    }

    pub fn rollback(mut self) {
        if self.state == TxnState::Open {
            tracing::trace!("ROLLBACK txn {}", self.id);
            self.state = TxnState::Aborted;
            self.release();
        }
    }

    fn release(&mut self) {
        let id = self.id;
        for key in self.writes.keys() {
            self.store
                .uncommitted
                .remove_if(key, |_, dirty| dirty.txn_id == id);
        }
        let keys: Vec<i64> = self.locks.keys().copied().collect();
        self.locks.clear();
        for key in keys {
            self.store.forget_lock(key);
        }
        self.store.snapshots.remove(&id);
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if self.state == TxnState::Open {
            tracing::debug!("Transaction {} dropped while open, rolling back", self.id);
            self.state = TxnState::Aborted;
            self.release();
        }
    }
}
