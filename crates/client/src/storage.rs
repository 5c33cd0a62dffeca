//! The storage facade.
//!
//! [`StorageClient`] is the only entry point callers need. It classifies each
//! key, serves UI state from the local-device store, and routes everything
//! else through the cache, the request tracker, the write queue and the chunk
//! codec. Storage failures never reach the caller: `save` and `remove` log
//! and degrade to the local store, `load` falls back to the cache, the local
//! store and finally the caller's default.

use std::sync::Arc;

use serde_json::Value;
use tokio::task::JoinHandle;

use quotesync_core::lifecycle::spawn_cache_sweeper;
use quotesync_core::record;
use quotesync_core::{AppConfig, Category, Error, LocalDb, MemoryCache, StorageKey, VisitorId};

use crate::cancel::CancelToken;
use crate::codec::{ChunkCodec, CodecSettings, WriteSummary};
use crate::error::LoadError;
use crate::queue::{OperationQueue, QueueConfig};
use crate::remote::{DocumentStore, HttpDocumentStore, HttpStoreConfig, RemoteError};
use crate::tracker::RequestTracker;

struct Remote {
    codec: Arc<ChunkCodec>,
    queue: OperationQueue,
}

struct Inner {
    visitor: VisitorId,
    local: LocalDb,
    remote: Option<Remote>,
    cache: Arc<MemoryCache>,
    tracker: RequestTracker,
    sweeper: JoinHandle<()>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.sweeper.abort();
    }
}

/// Save/load/remove facade over the cache, the remote store and the local
/// store.
///
/// Cheap to clone; clones share all state. Must be created inside a tokio
/// runtime.
#[derive(Clone)]
pub struct StorageClient {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for StorageClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageClient")
            .field("visitor", &self.inner.visitor)
            .field("remote", &self.inner.remote.is_some())
            .finish_non_exhaustive()
    }
}

impl StorageClient {
    /// Build a client over an opened local store and an optional remote store.
    pub async fn new(
        config: &AppConfig, local: LocalDb, remote: Option<Arc<dyn DocumentStore>>,
    ) -> Result<Self, Error> {
        let visitor = VisitorId::load_or_create(&local).await?;

        let cache = Arc::new(MemoryCache::new(config.cache_ttl(), config.quote_cache_ttl()));
        let sweeper = spawn_cache_sweeper(cache.clone(), config.cache_sweep_interval());

        let remote = match remote {
            Some(store) => {
                let queue = OperationQueue::new(QueueConfig::from_config(config));
                let codec = Arc::new(ChunkCodec::new(store, CodecSettings::from_config(config), queue.clone()));
                Some(Remote { codec, queue })
            }
            None => {
                tracing::warn!("remote store not configured, serving every category locally");
                None
            }
        };

        tracing::info!(visitor = %visitor, remote = remote.is_some(), "storage client ready");
        Ok(Self { inner: Arc::new(Inner { visitor, local, remote, cache, tracker: RequestTracker::new(), sweeper }) })
    }

    /// Open the local store at `config.db_path` and, when `remote_url` is
    /// set, connect the HTTP document store.
    pub async fn connect(config: &AppConfig) -> Result<Self, Error> {
        let local = LocalDb::open(&config.db_path).await?;
        let remote = match HttpStoreConfig::from_app_config(config) {
            Some(http) => {
                let store = HttpDocumentStore::new(http).map_err(|e| Error::InvalidInput(e.to_string()))?;
                Some(Arc::new(store) as Arc<dyn DocumentStore>)
            }
            None => None,
        };
        Self::new(config, local, remote).await
    }

    pub fn visitor_id(&self) -> &VisitorId {
        &self.inner.visitor
    }

    pub fn cache(&self) -> &MemoryCache {
        &self.inner.cache
    }

    pub fn is_remote_configured(&self) -> bool {
        self.inner.remote.is_some()
    }

    /// Remote writes queued or running.
    pub fn pending_writes(&self) -> usize {
        self.inner.remote.as_ref().map_or(0, |r| r.queue.pending())
    }

    fn remote_for(&self, key: &StorageKey) -> Option<&Remote> {
        if key.category().is_local_only() {
            return None;
        }
        if key.is_reserved() {
            tracing::warn!(key = key.name(), "key contains the chunk id separator, keeping it local");
            return None;
        }
        self.inner.remote.as_ref()
    }

    /// Make in-flight loads of `name` stale and drop its cached value.
    fn forget(&self, name: &str) {
        let superseded = self.inner.tracker.supersede_key(name);
        if superseded > 0 {
            tracing::debug!(key = name, superseded, "in-flight loads superseded");
        }
        self.inner.cache.invalidate(name);
    }

    /// Persist `value` under `key`.
    pub async fn save(&self, key: impl Into<StorageKey>, value: Value) {
        self.save_inner(key.into(), value, None).await;
    }

    /// Persist a collection as the chunks tagged `group`, replacing only the
    /// previous chunks of that group.
    pub async fn save_group(&self, key: impl Into<StorageKey>, value: Value, group: &str) {
        self.save_inner(key.into(), value, Some(group)).await;
    }

    async fn save_inner(&self, key: StorageKey, value: Value, group: Option<&str>) {
        let category = key.category();
        let name = key.name();
        self.forget(name);

        let remote = match self.remote_for(&key) {
            Some(_) if group.is_some_and(record::is_reserved) => {
                tracing::warn!(key = name, group, "group contains the chunk id separator, keeping it local");
                None
            }
            remote => remote,
        };
        let Some(remote) = remote else {
            self.mirror_local(name, &value).await;
            return;
        };

        let written = self.write_remote(remote, category, name, value.clone(), group).await;
        // loads that started while the write was queued read the old value
        self.forget(name);
        match written {
            Ok(summary) => {
                tracing::debug!(key = name, %category, chunked = summary.chunked, "saved");
                if let Err(e) = self.inner.local.remove(name).await {
                    tracing::debug!(key = name, error = %e, "failed to drop local mirror");
                }
            }
            Err(e) => {
                tracing::warn!(key = name, %category, error = %e, "remote save failed, mirroring locally");
                self.mirror_local(name, &value).await;
            }
        }
    }

    async fn write_remote(
        &self, remote: &Remote, category: Category, name: &str, value: Value, group: Option<&str>,
    ) -> Result<WriteSummary, RemoteError> {
        let codec = remote.codec.clone();
        let partition = self.inner.visitor.as_str().to_string();
        let name = name.to_string();
        let group = group.map(str::to_string);

        remote
            .queue
            .enqueue(move || async move { codec.write(&partition, category, &name, &value, group.as_deref()).await })
            .await
    }

    async fn mirror_local(&self, name: &str, value: &Value) {
        if let Err(e) = self.inner.local.set_json(name, value).await {
            tracing::error!(key = name, error = %e, "failed to write local store");
        }
    }

    /// Load the value stored under `key`, or `default` when there is none.
    pub async fn load(&self, key: impl Into<StorageKey>, default: Value) -> Value {
        self.load_with_cancel(key, default, &CancelToken::new()).await
    }

    /// Like [`load`](Self::load), abandoning the remote read once `cancel`
    /// fires.
    pub async fn load_with_cancel(&self, key: impl Into<StorageKey>, default: Value, cancel: &CancelToken) -> Value {
        let key = key.into();
        let category = key.category();
        let name = key.name();

        let Some(remote) = self.remote_for(&key) else {
            return self.load_local(name).await.unwrap_or(default);
        };

        if let Some(value) = self.inner.cache.get(name) {
            tracing::debug!(key = name, %category, "cache hit");
            return value;
        }
        tracing::debug!(key = name, %category, "cache miss");

        let guard = self.inner.tracker.begin(category, name);
        let partition = self.inner.visitor.as_str();
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(LoadError::Cancelled),
            _ = guard.token().cancelled() => Err(LoadError::Cancelled),
            result = remote.codec.read(partition, category, name, &guard) => result,
        };
        // a write may have superseded the request between the read and now
        let outcome = outcome.and_then(|value| match value {
            Some(value) => guard.commit(|| {
                self.inner.cache.set(name, value.clone(), category.ttl_class());
                Some(value)
            }),
            None => guard.check().map(|()| None),
        });

        match outcome {
            Ok(Some(value)) => value,
            Ok(None) => self.load_local(name).await.unwrap_or(default),
            Err(LoadError::Cancelled) => {
                tracing::debug!(key = name, %category, request_id = %guard.id(), "load cancelled");
                match self.inner.cache.get(name) {
                    Some(value) => value,
                    None => self.load_local(name).await.unwrap_or(default),
                }
            }
            Err(LoadError::Remote(e)) => {
                tracing::warn!(key = name, %category, error = %e, "remote load failed, using local store");
                self.load_local(name).await.unwrap_or(default)
            }
        }
    }

    /// Read the local-device copy of `key` only.
    pub async fn load_local(&self, key: &str) -> Option<Value> {
        match self.inner.local.get_json::<Value>(key).await {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(key, error = %e, "failed to read local store");
                None
            }
        }
    }

    /// Delete every stored form of `key`.
    pub async fn remove(&self, key: impl Into<StorageKey>) {
        let key = key.into();
        let category = key.category();
        let name = key.name();

        self.forget(name);
        if let Err(e) = self.inner.local.remove(name).await {
            tracing::warn!(key = name, error = %e, "failed to clear local store");
        }

        if let Some(remote) = self.remote_for(&key) {
            let deleted = self.delete_remote(remote, category, name).await;
            self.forget(name);
            if let Err(e) = deleted {
                tracing::warn!(key = name, %category, error = %e, "remote delete failed");
            }
        }
    }

    async fn delete_remote(&self, remote: &Remote, category: Category, name: &str) -> Result<(), RemoteError> {
        let codec = remote.codec.clone();
        let partition = self.inner.visitor.as_str().to_string();
        let name = name.to_string();
        remote
            .queue
            .enqueue(move || async move { codec.delete(&partition, category, &name).await })
            .await
    }

    /// Write `value` to the local store now and mirror it to the remote
    /// store in the background.
    ///
    /// Returns the background task, if one was started.
    pub async fn save_detached(&self, key: impl Into<StorageKey>, value: Value) -> Option<JoinHandle<()>> {
        let key = key.into();
        let category = key.category();
        self.forget(key.name());
        self.mirror_local(key.name(), &value).await;

        self.remote_for(&key)?;
        let client = self.clone();
        Some(tokio::spawn(async move {
            let Some(remote) = client.remote_for(&key) else { return };
            let written = client.write_remote(remote, category, key.name(), value, None).await;
            client.forget(key.name());
            if let Err(e) = written {
                tracing::warn!(key = key.name(), %category, error = %e, "background save failed");
            }
        }))
    }

    /// Clear the local copy of `key` now and delete the remote copy in the
    /// background.
    pub async fn remove_detached(&self, key: impl Into<StorageKey>) -> Option<JoinHandle<()>> {
        let key = key.into();
        let category = key.category();
        self.forget(key.name());
        if let Err(e) = self.inner.local.remove(key.name()).await {
            tracing::warn!(key = key.name(), error = %e, "failed to clear local store");
        }

        self.remote_for(&key)?;
        let client = self.clone();
        Some(tokio::spawn(async move {
            let Some(remote) = client.remote_for(&key) else { return };
            let deleted = client.delete_remote(remote, category, key.name()).await;
            client.forget(key.name());
            if let Err(e) = deleted {
                tracing::warn!(key = key.name(), %category, error = %e, "background delete failed");
            }
        }))
    }

    /// Abandon every pending load in `category`.
    pub fn cancel_category(&self, category: Category) -> usize {
        let cancelled = self.inner.tracker.cancel_category(category);
        tracing::debug!(%category, cancelled, "category cancelled");
        cancelled
    }

    /// Abandon every pending load.
    pub fn cancel_all(&self) -> usize {
        let cancelled = self.inner.tracker.cancel_all();
        tracing::debug!(cancelled, "all requests cancelled");
        cancelled
    }
}
