//! Core types and shared functionality for quotesync.
//!
//! This crate provides:
//! - Storage categories and the persisted record/chunk layout
//! - In-memory TTL cache and record lifecycle helpers
//! - SQLite-backed local-device key/value store and visitor identity
//! - Unified error types
//! - Configuration structures

pub mod cache;
pub mod category;
pub mod config;
pub mod error;
pub mod identity;
pub mod lifecycle;
pub mod local;
pub mod record;

pub use cache::{CacheEntry, MemoryCache};
pub use category::{Category, StorageKey, TtlClass};
pub use config::{AppConfig, ConfigError};
pub use error::Error;
pub use identity::VisitorId;
pub use local::LocalDb;
pub use record::{ChunkRecord, StoredRecord};
