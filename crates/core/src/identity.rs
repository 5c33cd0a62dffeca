//! Stable per-device visitor identity.
//!
//! The visitor id is the partition key of every remote document. It is
//! generated once, persisted in the local-device store, and reused for the
//! lifetime of that store.

use std::fmt;

use rand::Rng;
use rand::distributions::Alphanumeric;

use crate::{Error, LocalDb};

/// Local store key holding the visitor id.
pub const VISITOR_ID_KEY: &str = "quotesync_visitor_id";

const PREFIX: &str = "visitor_";
const RANDOM_LEN: usize = 9;

/// Opaque visitor token, `visitor_<unix millis>_<random>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VisitorId(String);

impl VisitorId {
    pub fn generate() -> Self {
        let millis = chrono::Utc::now().timestamp_millis();
        let random: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(RANDOM_LEN)
            .map(|b| char::from(b).to_ascii_lowercase())
            .collect();
        Self(format!("{PREFIX}{millis}_{random}"))
    }

    /// Accept a previously issued id, rejecting anything not in the issued shape.
    pub fn parse(raw: &str) -> Option<Self> {
        let rest = raw.strip_prefix(PREFIX)?;
        let (millis, random) = rest.split_once('_')?;
        let valid = !millis.is_empty()
            && millis.chars().all(|c| c.is_ascii_digit())
            && !random.is_empty()
            && random.chars().all(|c| c.is_ascii_alphanumeric());
        valid.then(|| Self(raw.to_string()))
    }

    /// Load the persisted id, creating and persisting one if missing or malformed.
    pub async fn load_or_create(local: &LocalDb) -> Result<Self, Error> {
        if let Some(raw) = local.get(VISITOR_ID_KEY).await? {
            if let Some(id) = Self::parse(&raw) {
                return Ok(id);
            }
            tracing::warn!(stored = %raw, "discarding malformed visitor id");
        }

        let id = Self::generate();
        local.set(VISITOR_ID_KEY, id.as_str()).await?;
        tracing::info!(visitor_id = %id, "issued new visitor id");
        Ok(id)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VisitorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
