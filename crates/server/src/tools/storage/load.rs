//! storage_load tool implementation.

use quotesync_client::StorageClient;
use quotesync_core::Category;
use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{json_result, resolve_key};

/// Parameters for the storage_load tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct StorageLoadParams {
    /// Logical storage key.
    pub key: String,

    /// Returned when nothing is stored (default: null).
    pub default: Option<Value>,

    /// Category override. Derived from the key when absent.
    pub category: Option<Category>,
}

/// Output from the storage_load tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct StorageLoadOutput {
    pub key: String,
    pub category: Category,
    pub value: Value,
}

/// Implementation of the storage_load tool.
pub async fn load_impl(storage: &StorageClient, params: StorageLoadParams) -> Result<CallToolResult, McpError> {
    let key = resolve_key(&params.key, params.category)?;
    let name = key.name().to_string();
    let category = key.category();

    let value = storage.load(key, params.default.unwrap_or(Value::Null)).await;

    Ok(json_result(&StorageLoadOutput { key: name, category, value })?)
}
