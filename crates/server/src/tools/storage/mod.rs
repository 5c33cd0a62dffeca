//! Storage MCP tools.
//!
//! Each tool is a thin adapter over [`StorageClient`]: it validates the key,
//! resolves the category and reports what the facade did as pretty JSON.

pub mod cancel;
pub mod load;
pub mod remove;
pub mod save;

pub use cancel::{StorageCancelParams, cancel_impl};
pub use load::{StorageLoadParams, load_impl};
pub use remove::{StorageRemoveParams, remove_impl};
pub use save::{StorageSaveParams, save_impl};

use quotesync_core::record::{ID_SEPARATOR, is_reserved};
use quotesync_core::{Category, Error, StorageKey};
use rmcp::model::{CallToolResult, Content};
use serde::Serialize;

/// Validate `key` and apply an explicit category override when given.
pub(crate) fn resolve_key(key: &str, category: Option<Category>) -> Result<StorageKey, Error> {
    let key = key.trim();
    if key.is_empty() {
        return Err(Error::InvalidInput("key must not be empty".to_string()));
    }
    if is_reserved(key) {
        return Err(Error::InvalidInput(format!("key must not contain '{ID_SEPARATOR}'")));
    }
    Ok(match category {
        Some(category) => StorageKey::with_category(key, category),
        None => StorageKey::new(key),
    })
}

pub(crate) fn json_result<T: Serialize>(output: &T) -> Result<CallToolResult, Error> {
    let json = serde_json::to_string_pretty(output)?;
    Ok(CallToolResult::success(vec![Content::text(json)]))
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_key_classifies() {
        let key = resolve_key("  drug_plan_quotes ", None).unwrap();
        assert_eq!(key.name(), "drug_plan_quotes");
        assert_eq!(key.category(), Category::DrugPlanQuotes);
    }

    #[test]
    fn test_resolve_key_override() {
        let key = resolve_key("results", Some(Category::MedigapQuotes)).unwrap();
        assert_eq!(key.category(), Category::MedigapQuotes);
    }

    #[test]
    fn test_resolve_key_rejects_blank() {
        assert!(matches!(resolve_key("   ", None), Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_resolve_key_rejects_chunk_separator() {
        assert!(matches!(resolve_key("drug_plan_quotes__chunk_0", None), Err(Error::InvalidInput(_))));
    }
}
