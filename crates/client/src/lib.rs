//! Remote synchronization for quotesync.
//!
//! This crate provides the remote document store seam and its HTTP and
//! in-process implementations, together with the retry helper, write queue,
//! request tracker and chunk codec that sit behind the [`StorageClient`]
//! facade.

pub mod cancel;
pub mod codec;
pub mod error;
pub mod queue;
pub mod remote;
pub mod retry;
pub mod storage;
pub mod throttle;
pub mod tracker;

pub use cancel::CancelToken;
pub use codec::{ChunkCodec, CodecSettings, WriteSummary};
pub use error::LoadError;
pub use queue::{OperationQueue, QueueConfig};
pub use remote::{DocumentStore, HttpDocumentStore, HttpStoreConfig, MemoryDocumentStore, RemoteError, StoreCall};
pub use retry::{RetryPolicy, with_retry};
pub use storage::StorageClient;
pub use throttle::Throttle;
pub use tracker::{RequestGuard, RequestId, RequestTracker};
