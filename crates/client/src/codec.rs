//! Chunked persistence of values in the remote store.
//!
//! ### Layout
//!
//! Inside collection `category.collection()` of the visitor partition a key
//! is stored either as
//!
//! - one [`StoredRecord`] with document id `key`, or
//! - N [`ChunkRecord`]s with ids `key__chunk_i` (or `key__group__chunk_i`),
//!   all carrying `originatingKey = key`.
//!
//! Arrays in quote categories use the chunked form when they exceed the chunk
//! size or when a group tag is given. Everything else is a single record.
//!
//! ### Reads
//!
//! The single record is tried first. When it is absent, or its fetch times
//! out, the chunks are queried and only the set written by the most recent
//! save of each group is kept. Expired chunks are dropped and the rest
//! reassembled in order. A partially expired chunk set yields a partial
//! collection.
//!
//! Expired documents and leftovers of earlier saves are pruned through the
//! [`OperationQueue`], and only while the stored document still carries the
//! `savedAt` it was read with.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use serde_json::Value;

use quotesync_core::lifecycle::RecordLifetime;
use quotesync_core::record::{self, ORIGINATING_KEY_FIELD, SAVED_AT_FIELD};
use quotesync_core::{AppConfig, Category, ChunkRecord, StoredRecord};

use crate::error::LoadError;
use crate::queue::OperationQueue;
use crate::remote::{DocumentStore, RemoteError};
use crate::retry::{RetryPolicy, with_retry};
use crate::throttle::Throttle;
use crate::tracker::RequestGuard;

/// Tunables of the chunk codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodecSettings {
    pub chunk_size: usize,
    pub lifetime: RecordLifetime,
    pub retry: RetryPolicy,
    /// Minimum spacing between consecutive chunk writes.
    pub chunk_write_delay: Duration,
    pub delete_batch_size: usize,
    pub delete_batch_delay: Duration,
    pub get_timeout: Duration,
    pub query_timeout: Duration,
}

impl Default for CodecSettings {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

impl CodecSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            chunk_size: config.chunk_size,
            lifetime: RecordLifetime::new(config.record_ttl()),
            retry: RetryPolicy::from_config(config),
            chunk_write_delay: config.chunk_write_delay(),
            delete_batch_size: config.delete_batch_size,
            delete_batch_delay: config.delete_batch_delay(),
            get_timeout: config.get_timeout(),
            query_timeout: config.query_timeout(),
        }
    }
}

/// Outcome of a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WriteSummary {
    /// Whether the chunked layout was used.
    pub chunked: bool,
    pub chunks_written: usize,
    pub chunks_failed: usize,
}

impl WriteSummary {
    pub fn is_partial(&self) -> bool {
        self.chunks_failed > 0
    }
}

/// A document to remove, as long as it still holds the save it was read with.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Leftover {
    id: String,
    saved_at: DateTime<Utc>,
}

impl From<ChunkRecord> for Leftover {
    fn from(chunk: ChunkRecord) -> Self {
        Self { id: chunk.chunk_key, saved_at: chunk.saved_at }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct BatchOutcome {
    done: usize,
    failed: usize,
}

/// Reads and writes values in the chunked layout.
///
/// Writes and deletes are expected to run on `queue`; background cleanup
/// started by reads is submitted to it.
pub struct ChunkCodec {
    store: Arc<dyn DocumentStore>,
    settings: CodecSettings,
    throttle: Throttle,
    queue: OperationQueue,
}

impl std::fmt::Debug for ChunkCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkCodec").field("settings", &self.settings).finish_non_exhaustive()
    }
}

impl ChunkCodec {
    pub fn new(store: Arc<dyn DocumentStore>, settings: CodecSettings, queue: OperationQueue) -> Self {
        let throttle = Throttle::new(settings.chunk_write_delay);
        Self { store, settings, throttle, queue }
    }

    pub fn settings(&self) -> &CodecSettings {
        &self.settings
    }

    /// Whether `value` is stored as chunks.
    pub fn should_chunk(&self, category: Category, value: &Value, group: Option<&str>) -> bool {
        category.is_quote_like()
            && value
                .as_array()
                .is_some_and(|items| group.is_some() || items.len() > self.settings.chunk_size)
    }

    /// Persist `value` under `key`.
    ///
    /// In the chunked layout only the first chunk is mandatory: later chunk
    /// failures are logged and counted in the summary.
    pub async fn write(
        &self, partition: &str, category: Category, key: &str, value: &Value, group: Option<&str>,
    ) -> Result<WriteSummary, RemoteError> {
        let collection = category.collection();
        let (saved_at, expires_at) = self.settings.lifetime.stamp();

        let items = match value.as_array() {
            Some(items) if self.should_chunk(category, value, group) => items,
            _ => {
                if group.is_some() {
                    tracing::debug!(key, %category, "group tag ignored for single-record value");
                }
                let document = serde_json::to_value(StoredRecord::new(key, value.clone(), saved_at, expires_at))?;
                let store = &*self.store;
                with_retry(&self.settings.retry, "set", || {
                    store.set_document(partition, collection, key, document.clone())
                })
                .await?;

                if category.is_quote_like()
                    && let Err(e) = self.delete_chunks(partition, category, key, None).await
                {
                    tracing::warn!(key, %category, error = %e, "failed to clear stale chunks");
                }
                return Ok(WriteSummary::default());
            }
        };

        let store = &*self.store;
        let cleared =
            with_retry(&self.settings.retry, "delete", || store.delete_document(partition, collection, key)).await;
        if let Err(e) = cleared {
            tracing::warn!(key, %category, error = %e, "failed to clear single-record form");
        }
        // leftovers are ignored by reads and pruned later
        if let Err(e) = self.delete_chunks(partition, category, key, group).await {
            tracing::warn!(key, %category, error = %e, "failed to clear previous chunks");
        }

        let chunks = record::split_into_chunks(key, items, self.settings.chunk_size, group, saved_at, expires_at);
        let total = chunks.len();
        let mut summary = WriteSummary { chunked: true, ..Default::default() };

        for chunk in chunks {
            let index = chunk.chunk_index;
            let id = chunk.chunk_key.clone();
            let document = serde_json::to_value(&chunk)?;

            self.throttle.acquire().await;
            let result = with_retry(&self.settings.retry, "set_chunk", || {
                store.set_document(partition, collection, &id, document.clone())
            })
            .await;

            match result {
                Ok(()) => summary.chunks_written += 1,
                Err(e) if index == 0 => return Err(e),
                Err(e) => {
                    tracing::warn!(key, chunk_index = index, total_chunks = total, error = %e, "chunk write failed");
                    summary.chunks_failed += 1;
                }
            }
        }

        if summary.is_partial() {
            tracing::warn!(
                key,
                written = summary.chunks_written,
                failed = summary.chunks_failed,
                "partial chunked save"
            );
        } else {
            tracing::debug!(key, chunks = summary.chunks_written, "chunked save completed");
        }
        Ok(summary)
    }

    /// Load the value stored under `key`.
    ///
    /// `guard` is re-checked after every remote round trip; a superseded or
    /// cancelled request fails with [`LoadError::Cancelled`].
    pub async fn read(
        &self, partition: &str, category: Category, key: &str, guard: &RequestGuard,
    ) -> Result<Option<Value>, LoadError> {
        let collection = category.collection();
        let store = &*self.store;
        guard.check()?;

        let fetched = tokio::time::timeout(
            self.settings.get_timeout,
            with_retry(&self.settings.retry, "get", || store.get_document(partition, collection, key)),
        )
        .await;

        match fetched {
            Ok(Ok(Some(document))) => {
                guard.check()?;
                return Ok(self.open_record(partition, collection, key, document).await?);
            }
            Ok(Ok(None)) => {}
            Ok(Err(e)) => return Err(e.into()),
            Err(_) if category.is_quote_like() => {
                tracing::warn!(key, %category, "single-record get timed out, trying chunks");
            }
            Err(_) => return Err(RemoteError::DeadlineExceeded.into()),
        }

        if !category.is_quote_like() {
            return Ok(None);
        }

        guard.check()?;
        let documents = self.query_chunks(partition, collection, key).await?;
        guard.check()?;

        let now = Utc::now();
        let (current, superseded) = record::partition_current(parse_chunks(key, documents));
        let (expired, live): (Vec<ChunkRecord>, Vec<ChunkRecord>) =
            current.into_iter().partition(|c| c.is_expired_at(now));

        if !expired.is_empty() || !superseded.is_empty() {
            tracing::debug!(
                key,
                expired = expired.len(),
                superseded = superseded.len(),
                live = live.len(),
                "dropping stale chunks"
            );
            let leftovers = expired.into_iter().chain(superseded).map(Leftover::from).collect();
            self.schedule_prune(partition, collection, leftovers);
        }

        guard.check()?;
        if live.is_empty() {
            return Ok(None);
        }

        let values = record::reassemble(live);
        tracing::debug!(key, %category, items = values.len(), "chunks reassembled");
        Ok(Some(Value::Array(values)))
    }

    /// Delete every stored form of `key`.
    pub async fn delete(&self, partition: &str, category: Category, key: &str) -> Result<(), RemoteError> {
        let collection = category.collection();
        let store = &*self.store;
        with_retry(&self.settings.retry, "delete", || store.delete_document(partition, collection, key)).await?;

        if category.is_quote_like() {
            self.delete_chunks(partition, category, key, None).await?;
        }
        Ok(())
    }

    /// Delete the chunks of `key`, only those tagged `group` when given.
    /// Returns how many were deleted.
    pub async fn delete_chunks(
        &self, partition: &str, category: Category, key: &str, group: Option<&str>,
    ) -> Result<usize, RemoteError> {
        let collection = category.collection();
        let documents = self.query_chunks(partition, collection, key).await?;

        let ids: Vec<String> = parse_chunks(key, documents)
            .into_iter()
            .filter(|c| group.is_none_or(|g| c.has_group(g)))
            .map(|c| c.chunk_key)
            .collect();
        if ids.is_empty() {
            return Ok(0);
        }

        let outcome = delete_batched(&*self.store, &self.settings, partition, collection, &ids).await;
        if outcome.failed > 0 {
            return Err(RemoteError::Other(format!("{} of {} chunk deletes failed", outcome.failed, ids.len())));
        }
        Ok(outcome.done)
    }

    async fn query_chunks(&self, partition: &str, collection: &str, key: &str) -> Result<Vec<Value>, RemoteError> {
        let store = &*self.store;
        let origin = Value::String(key.to_string());
        tokio::time::timeout(
            self.settings.query_timeout,
            with_retry(&self.settings.retry, "query", || {
                store.query_documents(partition, collection, ORIGINATING_KEY_FIELD, &origin)
            }),
        )
        .await
        .map_err(|_| RemoteError::DeadlineExceeded)?
    }

    async fn open_record(
        &self, partition: &str, collection: &'static str, key: &str, document: Value,
    ) -> Result<Option<Value>, RemoteError> {
        let stored: StoredRecord =
            serde_json::from_value(document).map_err(|e| RemoteError::Parse(format!("record {key}: {e}")))?;

        if stored.is_expired_at(Utc::now()) {
            tracing::debug!(key, expires_at = %stored.expires_at, "dropping expired record");
            let leftover = Leftover { id: key.to_string(), saved_at: stored.saved_at };
            self.prune_queued(partition, collection, vec![leftover]).await;
            return Ok(None);
        }
        Ok(Some(stored.payload))
    }

    /// Remove `leftovers` through the queue and wait for it.
    async fn prune_queued(&self, partition: &str, collection: &'static str, leftovers: Vec<Leftover>) {
        run_prune(&self.queue, self.store.clone(), self.settings, partition.to_string(), collection, leftovers).await;
    }

    /// Queue removal of `leftovers` without waiting for it.
    fn schedule_prune(&self, partition: &str, collection: &'static str, leftovers: Vec<Leftover>) {
        let (queue, store, settings) = (self.queue.clone(), self.store.clone(), self.settings);
        let partition = partition.to_string();
        tokio::spawn(async move { run_prune(&queue, store, settings, partition, collection, leftovers).await });
    }
}

async fn run_prune(
    queue: &OperationQueue, store: Arc<dyn DocumentStore>, settings: CodecSettings, partition: String,
    collection: &'static str, leftovers: Vec<Leftover>,
) {
    let pruned = queue
        .enqueue(move || async move {
            Ok::<_, RemoteError>(prune(&*store, &settings, &partition, collection, &leftovers).await)
        })
        .await;

    match pruned {
        Ok(outcome) if outcome.failed > 0 => {
            tracing::warn!(collection, pruned = outcome.done, failed = outcome.failed, "prune incomplete");
        }
        Ok(outcome) => tracing::debug!(collection, pruned = outcome.done, "pruned"),
        Err(e) => tracing::warn!(collection, error = %e, "prune not run"),
    }
}

fn parse_chunks(key: &str, documents: Vec<Value>) -> Vec<ChunkRecord> {
    documents
        .into_iter()
        .filter_map(|document| match serde_json::from_value::<ChunkRecord>(document) {
            Ok(chunk) => Some(chunk),
            Err(e) => {
                tracing::warn!(key, error = %e, "skipping malformed chunk");
                None
            }
        })
        .collect()
}

/// Run `op` over `items` in concurrent batches of `delete_batch_size`,
/// pausing `delete_batch_delay` between batches.
async fn in_batches<'a, T, F, Fut>(settings: &CodecSettings, items: &'a [T], op: F) -> BatchOutcome
where
    F: Fn(&'a T) -> Fut,
    Fut: Future<Output = Result<bool, RemoteError>>,
{
    let mut outcome = BatchOutcome::default();
    let mut batches = items.chunks(settings.delete_batch_size.max(1)).peekable();

    while let Some(batch) = batches.next() {
        for result in join_all(batch.iter().map(&op)).await {
            match result {
                Ok(true) => outcome.done += 1,
                Ok(false) => {}
                Err(_) => outcome.failed += 1,
            }
        }

        if batches.peek().is_some() {
            tokio::time::sleep(settings.delete_batch_delay).await;
        }
    }
    outcome
}

/// Delete `ids` unconditionally. Failures are logged and counted.
async fn delete_batched(
    store: &dyn DocumentStore, settings: &CodecSettings, partition: &str, collection: &str, ids: &[String],
) -> BatchOutcome {
    in_batches(settings, ids, move |id| async move {
        with_retry(&settings.retry, "delete_chunk", || store.delete_document(partition, collection, id))
            .await
            .map(|()| true)
            .inspect_err(|e| tracing::warn!(chunk = %id, error = %e, "chunk delete failed"))
    })
    .await
}

/// Delete each leftover whose stored document still carries its `savedAt`.
/// Documents rewritten since, or already gone, are left alone.
async fn prune(
    store: &dyn DocumentStore, settings: &CodecSettings, partition: &str, collection: &str, leftovers: &[Leftover],
) -> BatchOutcome {
    in_batches(settings, leftovers, move |leftover| async move {
        let id = leftover.id.as_str();
        let stored = with_retry(&settings.retry, "get", || store.get_document(partition, collection, id)).await?;
        if stored.as_ref().and_then(saved_at_of) != Some(leftover.saved_at) {
            tracing::debug!(id, "document rewritten since read, keeping");
            return Ok(false);
        }
        with_retry(&settings.retry, "delete", || store.delete_document(partition, collection, id)).await?;
        Ok::<_, RemoteError>(true)
    })
    .await
}

fn saved_at_of(document: &Value) -> Option<DateTime<Utc>> {
    document.get(SAVED_AT_FIELD).and_then(|v| serde_json::from_value(v.clone()).ok())
}
