//! Point-in-time snapshot (RDB)
//!
//! The whole store is written as one JSON document:
//!
//! ```text
//! {
//!   "timestamp": 1718000000000,
//!   "data": {
//!     "6e616d65": { "value": "4172697a", "expire_at": null, "last_accessed": 1717999999000 }
//!   }
//! }
//! ```
//!
//! Keys and values are hex encoded so arbitrary bytes survive JSON. The file
//! is written to a temporary sibling and renamed into place.

use crate::persistence::PersistenceError;
use crate::storage::Store;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotEntry {
    pub value: String,
    pub expire_at: Option<u64>,
    pub last_accessed: u64,
}

/// A full copy of the store and the commit time it reflects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Journal records at or before this instant are already included
    pub timestamp: u64,
    pub data: BTreeMap<String, SnapshotEntry>,
}

impl Snapshot {
    /// Copies every entry of `store`.
    pub fn capture(store: &Store, timestamp: u64) -> Self {
        let data = store
            .iter()
            .map(|(key, entry)| {
                (
                    hex::encode(key),
                    SnapshotEntry {
                        value: hex::encode(&entry.value),
                        expire_at: entry.expire_at,
                        last_accessed: entry.last_accessed,
                    },
                )
            })
            .collect();

        Self { timestamp, data }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Decodes every entry and replaces the contents of `store`.
    ///
    /// Nothing is loaded if any entry is corrupt.
    pub fn restore_into(self, store: &mut Store) -> Result<usize, PersistenceError> {
        let mut entries = Vec::with_capacity(self.data.len());
        for (key, entry) in self.data {
            let key = hex::decode(&key)
                .map_err(|e| PersistenceError::CorruptSnapshot(format!("key {:?}: {}", key, e)))?;
            let value = hex::decode(&entry.value).map_err(|e| {
                PersistenceError::CorruptSnapshot(format!("value of {:?}: {}", key, e))
            })?;
            entries.push((
                Bytes::from(key),
                Bytes::from(value),
                entry.expire_at,
                entry.last_accessed,
            ));
        }

        let count = entries.len();
        store.load(entries);
        Ok(count)
    }

    /// Reads a snapshot file. Returns `Ok(None)` if it does not exist.
    pub fn load(path: &Path) -> Result<Option<Self>, PersistenceError> {
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let snapshot = serde_json::from_slice(&bytes)?;
        Ok(Some(snapshot))
    }

    /// Atomically replaces the snapshot file at `path`.
    pub fn save(&self, path: &Path) -> Result<(), PersistenceError> {
        let tmp = path.with_extension("tmp");
        {
            let mut file = File::create(&tmp)?;
            serde_json::to_writer(&mut file, self)?;
            file.flush()?;
            file.sync_all()?;
        }
        fs::rename(&tmp, path)?;
        Ok(())
    }
}
