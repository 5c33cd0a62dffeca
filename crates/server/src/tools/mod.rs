//! MCP tool implementations.
//!
//! This module contains all tools exposed by the quotesync server.

pub mod storage;

pub use storage::{StorageCancelParams, StorageLoadParams, StorageRemoveParams, StorageSaveParams};
