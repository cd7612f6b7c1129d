//! Durability: append-only journal + periodic snapshot
//!
//! ```text
//!   client write ──> Store ──> Journal (one line per mutation, flushed before reply)
//!
//!   every N seconds: Store ──> Snapshot file (timestamp = replay horizon)
//!
//!   startup: Snapshot ──> Store ──> replay Journal records newer than horizon
//! ```
//!
//! The journal is never truncated, so recovery stays possible without the
//! snapshot: an unreadable snapshot leaves the store empty and the whole
//! journal is replayed on top of it. A journal line that cannot be parsed is
//! skipped and logged. A line with an unreadable timestamp is replayed
//! unconditionally, which is safe because SET, DEL and EXPIRE give the same
//! result when reapplied.

pub mod journal;
pub mod snapshot;

pub use journal::{now_millis, CommitClock, Journal, JournalError, JournalRecord};
pub use snapshot::Snapshot;

use crate::storage::Store;
use std::fs;
use std::path::Path;
use thiserror::Error;
use tracing::{error, info, warn};

/// Errors reading or writing persisted files.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("snapshot encoding error: {0}")]
    Snapshot(#[from] serde_json::Error),

    #[error("corrupt snapshot: {0}")]
    CorruptSnapshot(String),
}

/// Summary of a startup recovery.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Keys loaded from the snapshot
    pub snapshot_keys: usize,
    /// Snapshot timestamp, 0 if none was loaded
    pub horizon: u64,
    /// Journal records applied
    pub replayed: usize,
    /// Journal records already covered by the snapshot
    pub skipped: usize,
    /// Journal lines that could not be parsed
    pub malformed: usize,
    /// Newest journal timestamp seen
    pub newest: u64,
}

impl RecoveryReport {
    /// A commit clock that continues after everything recovered.
    pub fn clock(&self) -> CommitClock {
        CommitClock::resume(self.horizon, self.newest)
    }
}

/// Loads the snapshot into `store`, falling back to an empty store.
///
/// Returns the snapshot's key count and timestamp.
pub fn load_snapshot(store: &mut Store, path: &Path) -> (usize, u64) {
    let snapshot = match Snapshot::load(path) {
        Ok(Some(snapshot)) => snapshot,
        Ok(None) => {
            info!(path = %path.display(), "No snapshot found, starting empty");
            return (0, 0);
        }
        Err(e) => {
            error!(path = %path.display(), error = %e, "Failed to read snapshot, starting empty");
            return (0, 0);
        }
    };

    let timestamp = snapshot.timestamp;
    match snapshot.restore_into(store) {
        Ok(keys) => (keys, timestamp),
        Err(e) => {
            error!(path = %path.display(), error = %e, "Failed to restore snapshot, starting empty");
            (0, 0)
        }
    }
}

/// Applies journal records newer than `horizon` to `store`.
///
/// `now` is the commit time assumed for records whose timestamp is unreadable.
pub fn replay_journal(store: &mut Store, path: &Path, horizon: u64, now: u64) -> RecoveryReport {
    let mut report = RecoveryReport {
        horizon,
        ..Default::default()
    };

    let contents = match fs::read(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return report,
        Err(e) => {
            error!(path = %path.display(), error = %e, "Failed to read journal");
            return report;
        }
    };

    for (lineno, line) in journal::lines(&contents).enumerate() {
        let record = match JournalRecord::parse(line) {
            Ok(record) => record,
            Err(e) => {
                warn!(line = lineno + 1, error = %e, "Skipping malformed journal line");
                report.malformed += 1;
                continue;
            }
        };

        let commit_time = match record.timestamp {
            Some(ts) if ts <= horizon => {
                report.skipped += 1;
                continue;
            }
            Some(ts) => {
                report.newest = report.newest.max(ts);
                ts
            }
            None => {
                warn!(line = lineno + 1, "Journal line has no readable timestamp, replaying");
                now
            }
        };

        store.apply(record.mutation, commit_time);
        report.replayed += 1;
    }

    report
}

/// Rebuilds `store` from the snapshot at `rdb` and the journal at `aof`.
pub fn recover(store: &mut Store, rdb: &Path, aof: &Path) -> RecoveryReport {
    let (snapshot_keys, horizon) = load_snapshot(store, rdb);
    let mut report = replay_journal(store, aof, horizon, now_millis());
    report.snapshot_keys = snapshot_keys;

    info!(
        snapshot_keys = report.snapshot_keys,
        horizon = report.horizon,
        replayed = report.replayed,
        skipped = report.skipped,
        malformed = report.malformed,
        keys = store.len(),
        "Recovery complete"
    );
    report
}
