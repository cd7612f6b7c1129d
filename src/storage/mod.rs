//! Storage Engine Module
//!
//! The in-memory half of lodekv: a capacity-bounded map with LRU eviction
//! and per-key TTLs. It knows nothing about files; changes that must be made
//! durable are handed to the caller as [`Mutation`]s.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         Store                               │
//! │   HashMap<Bytes, Entry>        max_entries                  │
//! │   Entry { value, expire_at, last_accessed, access_seq }     │
//! │                                                             │
//! │   set ──> evict LRU while full ──> insert ──> Mutation::Set │
//! │   get ──> expired? drop (Mutation::Del) : bump recency      │
//! └─────────────────────────────────────────────────────────────┘
//!                            ▲
//!                            │ sweep_expired()
//!              ┌─────────────┴─────────────┐
//!              │       Maintainer          │
//!              │  (Background Tokio Task)  │
//!              └───────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```
//! use lodekv::storage::{Store, Ttl};
//! use bytes::Bytes;
//!
//! let mut store = Store::new(100);
//! store.set(Bytes::from("session"), Bytes::from("token123"), Some(Ttl::Seconds(60)), 0);
//!
//! assert_eq!(store.ttl(&Bytes::from("session"), 0), 60);
//! assert_eq!(store.get(&Bytes::from("session"), 60_000), None);
//! ```

pub mod engine;

pub use engine::{Entry, Mutation, Store, StoreStats, Ttl};
