//! Shared database handle
//!
//! [`Database`] owns the [`Store`] and the [`Journal`] behind a single mutex.
//! Client commands, the snapshot task and the expiry sweep all go through it,
//! so at most one of them touches the store at a time, and each operation's
//! journal records are written before the operation returns.

use crate::config::Config;
use crate::persistence::{self, CommitClock, Journal, PersistenceError, Snapshot};
use crate::storage::{Store, StoreStats, Ttl};
use bytes::Bytes;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{error, info, warn};

#[derive(Debug)]
struct Inner {
    store: Store,
    journal: Option<Journal>,
    clock: CommitClock,
    last_snapshot: u64,
}

impl Inner {
    /// Writes everything the store queued since the last commit, stamped
    /// with the commit time the operation ran at.
    fn commit(&mut self, ts: u64) -> Result<(), PersistenceError> {
        let mutations = self.store.take_mutations();
        let Some(journal) = self.journal.as_mut() else {
            return Ok(());
        };
        if mutations.is_empty() {
            return Ok(());
        }

        let records: Vec<_> = mutations.into_iter().map(|m| (m, ts)).collect();
        journal.append(&records)
    }

    /// Like [`Inner::commit`], for operations whose caller only reads.
    fn commit_logged(&mut self, ts: u64) {
        if let Err(e) = self.commit(ts) {
            error!(error = %e, "Failed to journal expired keys");
        }
    }
}

/// Result of a snapshot run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnapshotInfo {
    pub keys: usize,
    pub timestamp: u64,
}

/// Counters reported by INFO.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DatabaseStats {
    pub store: StoreStats,
    pub used_memory: usize,
    pub persistence: bool,
    /// Unix milliseconds of the last snapshot, 0 if none
    pub last_snapshot: u64,
}

/// The store and its durability machinery, shared by all connections.
#[derive(Debug)]
pub struct Database {
    inner: Mutex<Inner>,
    rdb_path: Option<PathBuf>,
}

impl Database {
    /// Creates a database with no persistence.
    pub fn in_memory(max_entries: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                store: Store::new(max_entries),
                journal: None,
                clock: CommitClock::default(),
                last_snapshot: 0,
            }),
            rdb_path: None,
        }
    }

    /// Recovers from the snapshot and journal named by `config` and opens the
    /// journal for appending.
    ///
    /// Persistence problems are logged; the database always opens.
    pub fn open(config: &Config) -> Self {
        if !config.persistence {
            info!("Persistence disabled, running in memory");
            return Self::in_memory(config.max_entries);
        }

        let rdb_path = config.rdb_path();
        let aof_path = config.aof_path();

        let mut store = Store::new(config.max_entries);
        let report = persistence::recover(&mut store, &rdb_path, &aof_path);
        if store.len() > config.max_entries {
            warn!(
                keys = store.len(),
                max_entries = config.max_entries,
                "Recovered more keys than the configured capacity"
            );
        }

        let journal = match Journal::open(&aof_path, config.fsync) {
            Ok(journal) => Some(journal),
            Err(e) => {
                error!(path = %aof_path.display(), error = %e, "Failed to open journal, writes will not be durable");
                None
            }
        };

        Self {
            inner: Mutex::new(Inner {
                store,
                journal,
                clock: report.clock(),
                last_snapshot: report.horizon,
            }),
            rdb_path: Some(rdb_path),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Locks the database and takes the commit time for one operation.
    ///
    /// The store computes TTL deadlines from the same instant that is written
    /// to the journal, so replay rebuilds identical deadlines.
    fn begin(&self) -> (MutexGuard<'_, Inner>, u64) {
        let mut inner = self.lock();
        let now = inner.clock.stamp();
        (inner, now)
    }

    /// SET key value [EX|PX]
    pub fn set(&self, key: Bytes, value: Bytes, ttl: Option<Ttl>) -> Result<(), PersistenceError> {
        let (mut inner, now) = self.begin();
        inner.store.set(key, value, ttl, now);
        inner.commit(now)
    }

    pub fn get(&self, key: &Bytes) -> Option<Bytes> {
        let (mut inner, now) = self.begin();
        let value = inner.store.get(key, now);
        inner.commit_logged(now);
        value
    }

    pub fn del(&self, keys: &[Bytes]) -> Result<usize, PersistenceError> {
        let (mut inner, now) = self.begin();
        let removed = inner.store.del(keys, now);
        inner.commit(now)?;
        Ok(removed)
    }

    pub fn expire(&self, key: &Bytes, seconds: i64) -> Result<bool, PersistenceError> {
        let (mut inner, now) = self.begin();
        let found = inner.store.expire(key, seconds, now);
        inner.commit(now)?;
        Ok(found)
    }

    pub fn ttl(&self, key: &Bytes) -> i64 {
        let (mut inner, now) = self.begin();
        let ttl = inner.store.ttl(key, now);
        inner.commit_logged(now);
        ttl
    }

    pub fn len(&self) -> usize {
        self.lock().store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> DatabaseStats {
        let inner = self.lock();
        DatabaseStats {
            store: inner.store.stats(),
            used_memory: inner.store.used_memory(),
            persistence: self.rdb_path.is_some(),
            last_snapshot: inner.last_snapshot,
        }
    }

    /// Removes every expired key and journals the removals.
    pub fn sweep_expired(&self) -> Result<usize, PersistenceError> {
        let (mut inner, now) = self.begin();
        let removed = inner.store.sweep_expired(now);
        inner.commit(now)?;
        Ok(removed)
    }

    /// Writes a snapshot of the current store.
    ///
    /// The journal is left untouched: recovery skips records the snapshot
    /// already covers, and falls back to a full replay if the snapshot is
    /// unreadable. Returns `Ok(None)` when persistence is disabled.
    pub fn snapshot(&self) -> Result<Option<SnapshotInfo>, PersistenceError> {
        let Some(rdb_path) = &self.rdb_path else {
            return Ok(None);
        };

        let snapshot = {
            let mut inner = self.lock();
            let timestamp = inner.clock.seal();
            Snapshot::capture(&inner.store, timestamp)
        };
        snapshot.save(rdb_path)?;

        let mut inner = self.lock();
        inner.last_snapshot = inner.last_snapshot.max(snapshot.timestamp);

        Ok(Some(SnapshotInfo {
            keys: snapshot.len(),
            timestamp: snapshot.timestamp,
        }))
    }

    /// Flushes the journal to disk.
    pub fn sync(&self) -> Result<(), PersistenceError> {
        match self.lock().journal.as_mut() {
            Some(journal) => journal.sync(),
            None => Ok(()),
        }
    }
}
