//! storage_remove tool implementation.

use quotesync_client::StorageClient;
use quotesync_core::Category;
use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::{json_result, resolve_key};

/// Parameters for the storage_remove tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct StorageRemoveParams {
    /// Logical storage key.
    pub key: String,

    /// Category override. Derived from the key when absent.
    pub category: Option<Category>,
}

/// Output from the storage_remove tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct StorageRemoveOutput {
    pub key: String,
    pub category: Category,
}

/// Implementation of the storage_remove tool.
pub async fn remove_impl(storage: &StorageClient, params: StorageRemoveParams) -> Result<CallToolResult, McpError> {
    let key = resolve_key(&params.key, params.category)?;
    let output = StorageRemoveOutput { key: key.name().to_string(), category: key.category() };

    storage.remove(key).await;

    Ok(json_result(&output)?)
}
