//! In-process document store.
//!
//! Used for local development and tests. Failures and response latency can
//! be scripted per call so retry, backoff and out-of-order response paths
//! are reproducible.

use std::collections::{BTreeMap, VecDeque};
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;

use super::{DocumentStore, RemoteError};

type DocPath = (String, String, String);

/// A primitive invocation recorded by [`MemoryDocumentStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreCall {
    Get { collection: String, id: String },
    Set { collection: String, id: String },
    Delete { collection: String, id: String },
    Query { collection: String, field: String },
}

impl StoreCall {
    pub fn is_delete(&self) -> bool {
        matches!(self, StoreCall::Delete { .. })
    }

    pub fn is_set(&self) -> bool {
        matches!(self, StoreCall::Set { .. })
    }
}

#[derive(Debug, Default)]
struct Script {
    failures: VecDeque<RemoteError>,
    persistent_failure: Option<RemoteError>,
    latencies: VecDeque<Duration>,
}

/// Document store held entirely in memory.
#[derive(Debug, Default)]
pub struct MemoryDocumentStore {
    docs: Mutex<BTreeMap<DocPath, Value>>,
    script: Mutex<Script>,
    calls: Mutex<Vec<StoreCall>>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next call with `err`. Queued failures are consumed in order.
    pub fn fail_next(&self, err: RemoteError) {
        self.script.lock().failures.push_back(err);
    }

    /// Fail every call with `err` until [`clear_failures`](Self::clear_failures).
    pub fn fail_always(&self, err: RemoteError) {
        self.script.lock().persistent_failure = Some(err);
    }

    pub fn clear_failures(&self) {
        let mut script = self.script.lock();
        script.failures.clear();
        script.persistent_failure = None;
    }

    /// Delay the response of the next call by `latency`.
    ///
    /// The call observes the store as it is when issued; only its completion
    /// is delayed, like a response still in flight.
    pub fn delay_next(&self, latency: Duration) {
        self.script.lock().latencies.push_back(latency);
    }

    /// Insert a document directly, bypassing scripting and the call log.
    pub fn insert(&self, partition: &str, collection: &str, id: &str, document: Value) {
        self.docs.lock().insert(path(partition, collection, id), document);
    }

    pub fn document(&self, partition: &str, collection: &str, id: &str) -> Option<Value> {
        self.docs.lock().get(&path(partition, collection, id)).cloned()
    }

    /// Ids of every document in a collection, sorted.
    pub fn ids(&self, partition: &str, collection: &str) -> Vec<String> {
        self.docs
            .lock()
            .keys()
            .filter(|(p, c, _)| p == partition && c == collection)
            .map(|(_, _, id)| id.clone())
            .collect()
    }

    pub fn calls(&self) -> Vec<StoreCall> {
        self.calls.lock().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().clear();
    }

    fn begin(&self, call: StoreCall) -> (Option<RemoteError>, Option<Duration>) {
        self.calls.lock().push(call);
        let mut script = self.script.lock();
        let failure = script.failures.pop_front().or_else(|| script.persistent_failure.clone());
        (failure, script.latencies.pop_front())
    }
}

fn path(partition: &str, collection: &str, id: &str) -> DocPath {
    (partition.to_string(), collection.to_string(), id.to_string())
}

async fn respond<T>(result: Result<T, RemoteError>, latency: Option<Duration>) -> Result<T, RemoteError> {
    if let Some(latency) = latency {
        tokio::time::sleep(latency).await;
    }
    result
}

#[async_trait::async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn get_document(&self, partition: &str, collection: &str, id: &str) -> Result<Option<Value>, RemoteError> {
        let (failure, latency) =
            self.begin(StoreCall::Get { collection: collection.to_string(), id: id.to_string() });
        let result = match failure {
            Some(err) => Err(err),
            None => Ok(self.document(partition, collection, id)),
        };
        respond(result, latency).await
    }

    async fn set_document(
        &self, partition: &str, collection: &str, id: &str, document: Value,
    ) -> Result<(), RemoteError> {
        let (failure, latency) =
            self.begin(StoreCall::Set { collection: collection.to_string(), id: id.to_string() });
        let result = match failure {
            Some(err) => Err(err),
            None => {
                self.insert(partition, collection, id, document);
                Ok(())
            }
        };
        respond(result, latency).await
    }

    async fn delete_document(&self, partition: &str, collection: &str, id: &str) -> Result<(), RemoteError> {
        let (failure, latency) =
            self.begin(StoreCall::Delete { collection: collection.to_string(), id: id.to_string() });
        let result = match failure {
            Some(err) => Err(err),
            None => {
                self.docs.lock().remove(&path(partition, collection, id));
                Ok(())
            }
        };
        respond(result, latency).await
    }

    async fn query_documents(
        &self, partition: &str, collection: &str, field: &str, equals: &Value,
    ) -> Result<Vec<Value>, RemoteError> {
        let (failure, latency) =
            self.begin(StoreCall::Query { collection: collection.to_string(), field: field.to_string() });
        let result = match failure {
            Some(err) => Err(err),
            None => Ok(self
                .docs
                .lock()
                .iter()
                .filter(|((p, c, _), doc)| p == partition && c == collection && doc.get(field) == Some(equals))
                .map(|(_, doc)| doc.clone())
                .collect()),
        };
        respond(result, latency).await
    }
}
