//! Connection Handler Module
//!
//! Each client connection is handled by its own async task, so one slow
//! client never stalls the others. Commands from all connections meet at the
//! shared [`crate::Database`], which serializes them.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     TCP Listener                            │
//! │                    (main.rs)                                │
//! └──────────────────────┬──────────────────────────────────────┘
//!                        │
//!                        │ accept() + spawn task
//!                        ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 ConnectionHandler                           │
//! │                                                             │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐     │
//! │  │ Read bytes  │───>│ Frame RESP  │───>│ Execute cmd │     │
//! │  └─────────────┘    └─────────────┘    └─────────────┘     │
//! │                                               │             │
//! │                                               ▼             │
//! │                                      ┌─────────────┐        │
//! │                                      │ Send reply  │        │
//! │                                      └─────────────┘        │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use lodekv::connection::handle_connection;
//! use lodekv::commands::CommandHandler;
//! use lodekv::Database;
//! use std::sync::Arc;
//!
//! let db = Arc::new(Database::in_memory(1000));
//! let handler = CommandHandler::new(db);
//!
//! let (stream, addr) = listener.accept().await?;
//! tokio::spawn(handle_connection(stream, addr, handler.clone()));
//! ```

pub mod handler;

pub use handler::{
    accept_loop, handle_connection, ConnectionError, ConnectionHandler, ConnectionStats,
};
