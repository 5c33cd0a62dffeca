//! Remote document store seam.
//!
//! Every visitor owns one partition; inside it each category has a named
//! sub-collection of JSON documents. The store offers four primitives, all
//! asynchronous and all able to fail transiently. There is no transaction
//! spanning several documents.

pub mod error;
pub mod http;
pub mod memory;

pub use error::RemoteError;
pub use http::{HttpDocumentStore, HttpStoreConfig};
pub use memory::{MemoryDocumentStore, StoreCall};

use serde_json::Value;

/// Per-visitor document store.
#[async_trait::async_trait]
pub trait DocumentStore: Send + Sync {
    /// Fetch one document, `None` if absent.
    async fn get_document(&self, partition: &str, collection: &str, id: &str) -> Result<Option<Value>, RemoteError>;

    /// Create or replace one document.
    async fn set_document(&self, partition: &str, collection: &str, id: &str, document: Value)
    -> Result<(), RemoteError>;

    /// Delete one document. Deleting an absent document succeeds.
    async fn delete_document(&self, partition: &str, collection: &str, id: &str) -> Result<(), RemoteError>;

    /// All documents in the collection whose top-level `field` equals `equals`.
    async fn query_documents(
        &self, partition: &str, collection: &str, field: &str, equals: &Value,
    ) -> Result<Vec<Value>, RemoteError>;
}
