//! Bounded LRU Store with Expiry Support
//!
//! This module implements the core storage engine for lodekv: a capacity-bounded
//! map of string keys to string values, with least-recently-used eviction and
//! per-key TTLs.
//!
//! ## Design Decisions
//!
//! 1. **Explicit time**: every operation takes `now` (Unix milliseconds) from the
//!    caller, so the commit time written to the journal and the time used for
//!    expiry arithmetic are the same number.
//! 2. **Proactive eviction**: SET makes room *before* inserting, so the map never
//!    holds more than `max_entries` keys after a client write.
//! 3. **Lazy + active expiry**: GET and TTL drop expired keys on access, and the
//!    background maintainer calls [`Store::sweep_expired`] for the rest.
//! 4. **Mutation log**: every change that must reach the journal (client writes,
//!    evictions, expirations) is queued as a [`Mutation`] and drained by the
//!    owner with [`Store::take_mutations`]. The store never touches files.
//!
//! ## Recency
//!
//! Each entry carries a wall-clock `last_accessed` plus a process-local access
//! sequence number. Eviction scans for the smallest sequence number, so two
//! entries touched in the same millisecond still have a strict order.
//!
//! The store is not internally synchronized; [`crate::Database`] wraps it in a
//! mutex together with the journal.

use bytes::Bytes;
use std::collections::HashMap;
use tracing::debug;

/// Approximate per-entry bookkeeping overhead used by [`Store::used_memory`].
const ENTRY_OVERHEAD: usize = 64;

/// A relative time-to-live as given on the SET command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ttl {
    /// `EX <seconds>`
    Seconds(u64),
    /// `PX <milliseconds>`
    Millis(u64),
}

impl Ttl {
    pub fn as_millis(&self) -> u64 {
        match *self {
            Ttl::Seconds(s) => s.saturating_mul(1000),
            Ttl::Millis(ms) => ms,
        }
    }

    /// The absolute expiry instant for a write committed at `now`.
    pub fn deadline(&self, now: u64) -> u64 {
        now.saturating_add(self.as_millis())
    }
}

/// A stored value with its expiry and recency metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// The stored payload
    pub value: Bytes,
    /// When this entry expires in Unix milliseconds (None = never)
    pub expire_at: Option<u64>,
    /// Last successful read or write in Unix milliseconds
    pub last_accessed: u64,
    /// Process-local recency order; larger is more recent
    pub(crate) access_seq: u64,
}

impl Entry {
    /// Checks if this entry has expired at `now`.
    #[inline]
    pub fn is_expired(&self, now: u64) -> bool {
        self.expire_at.is_some_and(|exp| exp <= now)
    }
}

/// A state change that must be recorded in the journal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    Set {
        key: Bytes,
        value: Bytes,
        ttl: Option<Ttl>,
    },
    Del {
        key: Bytes,
    },
    Expire {
        key: Bytes,
        seconds: i64,
    },
}

/// Read-only counters exposed to INFO.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreStats {
    /// Number of keys currently stored
    pub keys: usize,
    /// Configured capacity
    pub max_entries: usize,
    /// Keys removed to make room for new writes
    pub evicted: u64,
    /// Keys removed because their TTL passed
    pub expired: u64,
}

/// The bounded key-value store.
///
/// # Example
///
/// ```
/// use lodekv::storage::Store;
/// use bytes::Bytes;
///
/// let mut store = Store::new(2);
/// store.set(Bytes::from("a"), Bytes::from("1"), None, 1_000);
/// store.set(Bytes::from("b"), Bytes::from("2"), None, 1_001);
/// store.get(&Bytes::from("a"), 1_002);
/// store.set(Bytes::from("c"), Bytes::from("3"), None, 1_003);
///
/// // "b" was the least recently used
/// assert_eq!(store.get(&Bytes::from("b"), 1_004), None);
/// assert_eq!(store.stats().evicted, 1);
/// ```
#[derive(Debug)]
pub struct Store {
    data: HashMap<Bytes, Entry>,
    max_entries: usize,
    next_seq: u64,
    evicted: u64,
    expired: u64,
    pending: Vec<Mutation>,
}

impl Store {
    /// Creates an empty store holding at most `max_entries` keys.
    pub fn new(max_entries: usize) -> Self {
        Self {
            data: HashMap::new(),
            max_entries,
            next_seq: 0,
            evicted: 0,
            expired: 0,
            pending: Vec::new(),
        }
    }

    #[inline]
    fn bump_seq(&mut self) -> u64 {
        self.next_seq += 1;
        self.next_seq
    }

    /// Stores `value` under `key`, replacing any existing entry.
    ///
    /// When the store is at capacity, least-recently-used entries are evicted
    /// first, even if `key` is already present.
    pub fn set(&mut self, key: Bytes, value: Bytes, ttl: Option<Ttl>, now: u64) {
        while self.data.len() >= self.max_entries && !self.data.is_empty() {
            self.evict_one();
        }

        self.insert(key.clone(), value.clone(), ttl.map(|t| t.deadline(now)), now);
        self.pending.push(Mutation::Set { key, value, ttl });
    }

    fn insert(&mut self, key: Bytes, value: Bytes, expire_at: Option<u64>, now: u64) {
        let access_seq = self.bump_seq();
        self.data.insert(
            key,
            Entry {
                value,
                expire_at,
                last_accessed: now,
                access_seq,
            },
        );
    }

    /// Removes the least-recently-used entry.
    fn evict_one(&mut self) {
        let victim = self
            .data
            .iter()
            .min_by_key(|(_, entry)| entry.access_seq)
            .map(|(key, _)| key.clone());

        if let Some(key) = victim {
            self.data.remove(&key);
            self.evicted += 1;
            debug!(key = %String::from_utf8_lossy(&key), "Evicted least recently used key");
            self.pending.push(Mutation::Del { key });
        }
    }

    /// Removes `key` because its TTL passed.
    fn expire_now(&mut self, key: &Bytes) {
        if self.data.remove(key).is_some() {
            self.expired += 1;
            self.pending.push(Mutation::Del { key: key.clone() });
        }
    }

    /// Returns the value for `key`, refreshing its recency.
    ///
    /// An entry whose TTL has passed is removed and counted as expired.
    pub fn get(&mut self, key: &Bytes, now: u64) -> Option<Bytes> {
        let expired = self.data.get(key)?.is_expired(now);
        if expired {
            self.expire_now(key);
            return None;
        }

        let seq = self.bump_seq();
        let entry = self.data.get_mut(key)?;
        entry.last_accessed = now;
        entry.access_seq = seq;
        Some(entry.value.clone())
    }

    /// Deletes each key, returning how many live keys were removed.
    pub fn del(&mut self, keys: &[Bytes], now: u64) -> usize {
        let mut removed = 0;
        for key in keys {
            match self.data.get(key).map(|entry| entry.is_expired(now)) {
                Some(true) => self.expire_now(key),
                Some(false) => {
                    self.data.remove(key);
                    self.pending.push(Mutation::Del { key: key.clone() });
                    removed += 1;
                }
                None => {}
            }
        }
        removed
    }

    /// Sets the TTL of an existing key to `seconds` from `now`.
    ///
    /// Returns `false` if the key does not exist. Recency is left unchanged.
    pub fn expire(&mut self, key: &Bytes, seconds: i64, now: u64) -> bool {
        match self.data.get(key).map(|entry| entry.is_expired(now)) {
            None => false,
            Some(true) => {
                self.expire_now(key);
                false
            }
            Some(false) => {
                if let Some(entry) = self.data.get_mut(key) {
                    entry.expire_at = Some(offset_millis(now, seconds));
                }
                self.pending.push(Mutation::Expire {
                    key: key.clone(),
                    seconds,
                });
                true
            }
        }
    }

    /// Remaining time to live in whole seconds (rounded up).
    ///
    /// Returns `-1` for a key without a TTL and `-2` for an absent key. A key
    /// whose TTL has run out is removed and reported as absent.
    pub fn ttl(&mut self, key: &Bytes, now: u64) -> i64 {
        let Some(entry) = self.data.get(key) else {
            return -2;
        };
        let Some(expire_at) = entry.expire_at else {
            return -1;
        };

        if expire_at <= now {
            self.expire_now(key);
            return -2;
        }

        let remaining = expire_at - now;
        remaining.div_ceil(1000) as i64
    }

    /// Removes every entry whose TTL has passed at `now`.
    ///
    /// Returns the number of keys removed.
    pub fn sweep_expired(&mut self, now: u64) -> usize {
        let expired: Vec<Bytes> = self
            .data
            .iter()
            .filter(|(_, entry)| entry.is_expired(now))
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired {
            self.expire_now(key);
        }
        expired.len()
    }

    /// Drains the mutations queued since the last call, in the order they happened.
    pub fn take_mutations(&mut self) -> Vec<Mutation> {
        std::mem::take(&mut self.pending)
    }

    // ========================================================================
    // Recovery
    // ========================================================================

    /// Applies a journaled mutation committed at `commit_time`.
    ///
    /// Replay neither evicts nor queues mutations, and TTLs are measured from
    /// the commit time so applying the same record twice gives the same entry.
    pub fn apply(&mut self, mutation: Mutation, commit_time: u64) {
        match mutation {
            Mutation::Set { key, value, ttl } => {
                self.insert(key, value, ttl.map(|t| t.deadline(commit_time)), commit_time);
            }
            Mutation::Del { key } => {
                self.data.remove(&key);
            }
            Mutation::Expire { key, seconds } => {
                if let Some(entry) = self.data.get_mut(&key) {
                    entry.expire_at = Some(offset_millis(commit_time, seconds));
                }
            }
        }
    }

    /// Replaces the contents with entries loaded from a snapshot.
    ///
    /// Recency order is rebuilt from `last_accessed`.
    pub fn load<I>(&mut self, entries: I)
    where
        I: IntoIterator<Item = (Bytes, Bytes, Option<u64>, u64)>,
    {
        let mut entries: Vec<_> = entries.into_iter().collect();
        entries.sort_by_key(|(_, _, _, last_accessed)| *last_accessed);

        self.data.clear();
        self.data.reserve(entries.len());
        for (key, value, expire_at, last_accessed) in entries {
            self.insert(key, value, expire_at, last_accessed);
        }
    }

    /// Iterates over every stored entry, including ones not yet swept.
    pub fn iter(&self) -> impl Iterator<Item = (&Bytes, &Entry)> {
        self.data.iter()
    }

    // ========================================================================
    // Introspection
    // ========================================================================

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    pub fn stats(&self) -> StoreStats {
        StoreStats {
            keys: self.data.len(),
            max_entries: self.max_entries,
            evicted: self.evicted,
            expired: self.expired,
        }
    }

    /// Approximate bytes held by keys and values.
    pub fn used_memory(&self) -> usize {
        self.data
            .iter()
            .map(|(key, entry)| key.len() + entry.value.len() + ENTRY_OVERHEAD)
            .sum()
    }
}

/// `now + seconds`, clamped to the representable range.
fn offset_millis(now: u64, seconds: i64) -> u64 {
    let delta = seconds.saturating_mul(1000);
    if delta >= 0 {
        now.saturating_add(delta as u64)
    } else {
        now.saturating_sub(delta.unsigned_abs())
    }
}
