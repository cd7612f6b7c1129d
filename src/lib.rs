//! # lodekv - A Bounded, Persistent, Redis-Compatible Cache
//!
//! lodekv is an in-memory key-value cache that speaks RESP. It holds at most
//! a configured number of keys, evicting the least recently used one when
//! full, expires keys by TTL, and survives restarts by replaying an
//! append-only journal on top of periodic snapshots.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                              lodekv                                     │
//! │                                                                         │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐                  │
//! │  │ TCP Server  │───>│ Connection  │───>│  Command    │                  │
//! │  │ (Listener)  │    │  Handler    │    │  Handler    │                  │
//! │  └─────────────┘    └─────────────┘    └──────┬──────┘                  │
//! │                                               │                         │
//! │                                               ▼                         │
//! │  ┌─────────────┐    ┌──────────────────────────────────────────────┐   │
//! │  │   RESP      │    │           Database (one Mutex)               │   │
//! │  │   Codec     │    │   ┌──────────────┐      ┌────────────────┐   │   │
//! │  └─────────────┘    │   │ Store (LRU + │─────>│ Journal (AOF)  │   │   │
//! │                     │   │   TTL)       │      └────────────────┘   │   │
//! │                     │   └──────────────┘      ┌────────────────┐   │   │
//! │                     │                         │ Snapshot (RDB) │   │   │
//! │                     │                         └────────────────┘   │   │
//! │                     └──────────────────────────────────────────────┘   │
//! │                                               ▲                         │
//! │                     ┌─────────────────────────┴───────────────────────┐ │
//! │                     │   Maintainer: snapshot every 10s, sweep every 5s│ │
//! │                     └─────────────────────────────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```ignore
//! use lodekv::{accept_loop, CommandHandler, Config, Database};
//! use lodekv::maintenance::{MaintenanceConfig, Maintainer};
//! use std::sync::Arc;
//! use tokio::net::TcpListener;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::default();
//!     let db = Arc::new(Database::open(&config));
//!     let _maintainer = Maintainer::start(Arc::clone(&db), MaintenanceConfig::from(&config));
//!
//!     let listener = TcpListener::bind(config.bind_address()).await?;
//!     accept_loop(listener, CommandHandler::new(db)).await;
//!     Ok(())
//! }
//! ```
//!
//! ## Supported Commands
//!
//! - `PING [message]`
//! - `SET key value [EX seconds | PX milliseconds]`
//! - `GET key`
//! - `DEL key [key ...]`
//! - `EXPIRE key seconds`
//! - `TTL key`
//! - `INFO [section]`
//! - `QUIT`
//!
//! ## Module Overview
//!
//! - [`protocol`]: RESP request parser and reply encoder
//! - [`storage`]: Bounded LRU store with TTL support
//! - [`persistence`]: Journal, snapshot and startup recovery
//! - [`database`]: The shared handle tying store and persistence together
//! - [`maintenance`]: Periodic snapshot and expiry sweep
//! - [`commands`]: Command dispatch
//! - [`connection`]: Client connection management
//! - [`config`]: Command-line configuration
//!
//! ## Durability
//!
//! Every SET, DEL and EXPIRE, and every key removed by eviction or expiry,
//! is appended to the journal before the client sees a reply. A snapshot
//! records its own timestamp; on startup only journal records newer than
//! that timestamp are replayed, so a DEL issued after the last snapshot is
//! never undone.

pub mod commands;
pub mod config;
pub mod connection;
pub mod database;
pub mod maintenance;
pub mod persistence;
pub mod protocol;
pub mod storage;

pub use commands::{CommandHandler, Outcome};
pub use config::{Config, ConfigAction, ConfigError};
pub use connection::{accept_loop, handle_connection, ConnectionStats};
pub use database::Database;
pub use maintenance::{MaintenanceConfig, Maintainer};
pub use protocol::{ParseError, Reply, RequestParser};
pub use storage::Store;

/// The default port lodekv listens on (same as Redis)
pub const DEFAULT_PORT: u16 = 6379;

/// The default host lodekv binds to
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Version of lodekv
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
