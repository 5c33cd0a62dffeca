//! storage_save tool implementation.
//!
//! Persists a JSON value through the storage facade.

use quotesync_client::StorageClient;
use quotesync_core::{Category, Error, record};
use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{json_result, resolve_key};

/// Parameters for the storage_save tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct StorageSaveParams {
    /// Logical storage key, e.g. `drug_plan_quotes`.
    pub key: String,

    /// Value to persist.
    pub value: Value,

    /// Group tag; the value replaces only the chunks previously saved under
    /// the same group for this key.
    pub group: Option<String>,

    /// Category override. Derived from the key when absent.
    pub category: Option<Category>,
}

/// Output from the storage_save tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct StorageSaveOutput {
    pub key: String,
    pub category: Category,
    /// Whether the value was sent to the remote store (otherwise local only).
    pub remote: bool,
}

/// Implementation of the storage_save tool.
pub async fn save_impl(storage: &StorageClient, params: StorageSaveParams) -> Result<CallToolResult, McpError> {
    let key = resolve_key(&params.key, params.category)?;
    if let Some(group) = params.group.as_deref().map(str::trim) {
        if group.is_empty() {
            return Err(Error::InvalidInput("group must not be empty".to_string()).into());
        }
        if record::is_reserved(group) {
            return Err(Error::InvalidInput(format!("group must not contain '{}'", record::ID_SEPARATOR)).into());
        }
    }

    let category = key.category();
    let output = StorageSaveOutput {
        key: key.name().to_string(),
        category,
        remote: storage.is_remote_configured() && !category.is_local_only(),
    };

    match params.group {
        Some(group) => storage.save_group(key, params.value, group.trim()).await,
        None => storage.save(key, params.value).await,
    }

    Ok(json_result(&output)?)
}
