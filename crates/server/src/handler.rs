//! MCP server handler implementation.
//!
//! This module defines the main server handler that
//! routes tool calls to the storage tool implementations.
use crate::tools::storage::{cancel_impl, load_impl, remove_impl, save_impl};
use crate::tools::{StorageCancelParams, StorageLoadParams, StorageRemoveParams, StorageSaveParams};

use quotesync_client::StorageClient;
use rmcp::{
    ErrorData as McpError, ServerHandler,
    handler::server::{
        tool::{ToolCallContext, ToolRouter},
        wrapper::Parameters,
    },
    model::{
        CallToolRequestParam, CallToolResult, Implementation, ListToolsResult, PaginatedRequestParam, ProtocolVersion,
        ServerCapabilities, ServerInfo,
    },
    service::{RequestContext, RoleServer},
    tool, tool_router,
};

/// The main MCP server handler for quotesync.
#[derive(Clone)]
pub struct QuoteSyncServer {
    storage: StorageClient,
    tool_router: ToolRouter<Self>,
}

#[tool_router]
impl QuoteSyncServer {
    /// Create a new server handler over `storage`.
    pub fn new(storage: StorageClient) -> Self {
        Self { storage, tool_router: Self::tool_router() }
    }

    #[tool(
        description = "Save a JSON value under a storage key. Large quote collections are chunked; an optional group replaces only that group's chunks."
    )]
    async fn storage_save(&self, params: Parameters<StorageSaveParams>) -> Result<CallToolResult, McpError> {
        save_impl(&self.storage, params.0).await
    }

    #[tool(description = "Load the value stored under a key, or the given default when nothing is stored.")]
    async fn storage_load(&self, params: Parameters<StorageLoadParams>) -> Result<CallToolResult, McpError> {
        load_impl(&self.storage, params.0).await
    }

    #[tool(description = "Remove a key from the cache, the local store and the remote store.")]
    async fn storage_remove(&self, params: Parameters<StorageRemoveParams>) -> Result<CallToolResult, McpError> {
        remove_impl(&self.storage, params.0).await
    }

    #[tool(description = "Cancel pending loads for one category, or for every category when none is given.")]
    async fn storage_cancel(&self, params: Parameters<StorageCancelParams>) -> Result<CallToolResult, McpError> {
        cancel_impl(&self.storage, params.0).await
    }
}

impl ServerHandler for QuoteSyncServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            server_info: Implementation {
                name: "quotesync-mcp".into(),
                version: env!("CARGO_PKG_VERSION").into(),
                ..Default::default()
            },
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }

    async fn list_tools(
        &self, _request: Option<PaginatedRequestParam>, _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, rmcp::model::ErrorData> {
        Ok(ListToolsResult { meta: None, tools: self.tool_router.list_all(), next_cursor: None })
    }

    async fn call_tool(
        &self, request: CallToolRequestParam, context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, rmcp::model::ErrorData> {
        self.tool_router
            .call(ToolCallContext::new(self, request, context))
            .await
    }
}
