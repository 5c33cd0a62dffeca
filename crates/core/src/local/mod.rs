//! SQLite-backed local-device key/value store.
//!
//! This module provides the device-resident store used as the exclusive home
//! of UI-state categories and as the fallback mirror whenever the remote
//! document store cannot be reached. Access is async via tokio-rusqlite.
//!
//! - Plain string values keyed by storage key
//! - Automatic schema migrations
//! - WAL mode so background mirrors do not block readers

pub mod connection;
pub mod kv;
pub mod migrations;

pub use crate::Error;

pub use connection::LocalDb;
