//! Persisted document layout.
//!
//! A key is stored either as one [`StoredRecord`] whose document id is the
//! key itself, or, for oversized quote collections, as a set of
//! [`ChunkRecord`]s sharing `originatingKey`. Field names are camelCase on
//! the wire.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::lifecycle;

/// Field the chunk query filters on.
pub const ORIGINATING_KEY_FIELD: &str = "originatingKey";

/// Timestamp shared by every document written by one save.
pub const SAVED_AT_FIELD: &str = "savedAt";

/// Single-document form of a stored value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredRecord {
    pub key: String,
    pub payload: Value,
    pub saved_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl StoredRecord {
    pub fn new(key: &str, payload: Value, saved_at: DateTime<Utc>, expires_at: DateTime<Utc>) -> Self {
        Self { key: key.to_string(), payload, saved_at, expires_at }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        lifecycle::is_expired(self.expires_at, now)
    }
}

/// One bounded slice of an oversized collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkRecord {
    pub chunk_key: String,
    pub payload: Vec<Value>,
    pub chunk_index: usize,
    pub total_chunks: usize,
    pub originating_key: String,
    pub saved_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_tags: Option<Vec<String>>,
}

impl ChunkRecord {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        lifecycle::is_expired(self.expires_at, now)
    }

    pub fn has_group(&self, group: &str) -> bool {
        self.group_tags
            .as_ref()
            .is_some_and(|tags| tags.iter().any(|t| t == group))
    }

    fn sort_group(&self) -> &str {
        self.group_tags
            .as_ref()
            .and_then(|tags| tags.first())
            .map(String::as_str)
            .unwrap_or("")
    }
}

/// Joins key, group and chunk index in chunk document ids. Keys and group
/// names containing it never reach the remote store.
pub const ID_SEPARATOR: &str = "__";

/// Whether `name` cannot be used as a remote key or group name.
pub fn is_reserved(name: &str) -> bool {
    name.contains(ID_SEPARATOR)
}

/// Document id of chunk `index` for `key`, scoped by group when present.
pub fn chunk_id(key: &str, group: Option<&str>, index: usize) -> String {
    match group {
        Some(group) => format!("{key}{ID_SEPARATOR}{group}{ID_SEPARATOR}chunk_{index}"),
        None => format!("{key}{ID_SEPARATOR}chunk_{index}"),
    }
}

/// Split `items` into consecutive slices of at most `chunk_size` elements.
///
/// An empty collection yields a single empty chunk so a grouped save can
/// still record that the group exists.
pub fn split_into_chunks(
    key: &str, items: &[Value], chunk_size: usize, group: Option<&str>, saved_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
) -> Vec<ChunkRecord> {
    let chunk_size = chunk_size.max(1);
    let slices: Vec<&[Value]> = if items.is_empty() { vec![items] } else { items.chunks(chunk_size).collect() };
    let total_chunks = slices.len();
    let group_tags = group.map(|g| vec![g.to_string()]);

    slices
        .into_iter()
        .enumerate()
        .map(|(chunk_index, slice)| ChunkRecord {
            chunk_key: chunk_id(key, group, chunk_index),
            payload: slice.to_vec(),
            chunk_index,
            total_chunks,
            originating_key: key.to_string(),
            saved_at,
            expires_at,
            group_tags: group_tags.clone(),
        })
        .collect()
}

/// Split `chunks` into the chunks of the most recent save and the leftovers
/// of earlier saves.
///
/// Every group keeps only the chunks stamped with its newest `savedAt` and an
/// index below that save's `totalChunks`. An ungrouped save replaces all
/// groups, so group sets older than the newest ungrouped set are leftovers
/// too.
pub fn partition_current(chunks: Vec<ChunkRecord>) -> (Vec<ChunkRecord>, Vec<ChunkRecord>) {
    let mut newest: HashMap<String, DateTime<Utc>> = HashMap::new();
    for chunk in &chunks {
        let saved_at = newest.entry(chunk.sort_group().to_string()).or_insert(chunk.saved_at);
        *saved_at = (*saved_at).max(chunk.saved_at);
    }
    let ungrouped = newest.get("").copied();

    chunks.into_iter().partition(|chunk| {
        let group = chunk.sort_group();
        newest.get(group) == Some(&chunk.saved_at)
            && chunk.chunk_index < chunk.total_chunks
            && (group.is_empty() || ungrouped.is_none_or(|at| chunk.saved_at > at))
    })
}

/// Concatenate chunk payloads in order, regardless of the order received.
///
/// Chunks are ordered by group (ungrouped first) and then by `chunkIndex`,
/// so every group keeps its original element order.
pub fn reassemble(mut chunks: Vec<ChunkRecord>) -> Vec<Value> {
    chunks.sort_by(|a, b| {
        a.sort_group()
            .cmp(b.sort_group())
            .then(a.chunk_index.cmp(&b.chunk_index))
    });
    chunks.into_iter().flat_map(|c| c.payload).collect()
}
