//! Command Handler Module
//!
//! Receives decoded requests, executes them against the database, and
//! returns the reply plus whether the connection should stay open.
//!
//! ```text
//! Client Request
//!       │
//!       ▼
//! ┌─────────────────┐
//! │  RESP Parser    │  (protocol module)
//! └────────┬────────┘
//!          │ Vec<Bytes>
//!          ▼
//! ┌─────────────────┐
//! │ CommandHandler  │  (this module)
//! │  - Dispatch     │
//! │  - Validate     │
//! │  - Execute      │
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │    Database     │  store + journal
//! └─────────────────┘
//! ```

pub mod handler;

pub use handler::{CommandHandler, Outcome};
