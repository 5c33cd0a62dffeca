//! storage_cancel tool implementation.
//!
//! Abandons pending loads for one category, or for all of them.

use quotesync_client::StorageClient;
use quotesync_core::Category;
use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::json_result;

/// Parameters for the storage_cancel tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct StorageCancelParams {
    /// Category to cancel. Every category when absent.
    pub category: Option<Category>,
}

/// Output from the storage_cancel tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct StorageCancelOutput {
    /// Number of pending loads cancelled.
    pub cancelled: usize,
}

/// Implementation of the storage_cancel tool.
pub async fn cancel_impl(storage: &StorageClient, params: StorageCancelParams) -> Result<CallToolResult, McpError> {
    let cancelled = match params.category {
        Some(category) => storage.cancel_category(category),
        None => storage.cancel_all(),
    };

    Ok(json_result(&StorageCancelOutput { cancelled })?)
}
