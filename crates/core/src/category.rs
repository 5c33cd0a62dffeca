//! Storage categories and key classification.
//!
//! A category decides, for every key, whether the remote store is used at
//! all, which cache TTL class applies, whether loads take part in request
//! lifecycle tracking, and whether oversized collections are chunked.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::Error;

/// Persistence policy class of a storage key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    /// Prescription drug plan quote collections.
    DrugPlanQuotes,
    /// Medicare supplement (medigap) quote collections.
    MedigapQuotes,
    /// Medicare Advantage quote collections.
    AdvantageQuotes,
    /// Saved plan builder configuration.
    PlanConfiguration,
    /// Transient UI and form state; never leaves the device.
    UiState,
    /// Anything else.
    General,
}

/// Cache lifetime class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TtlClass {
    Default,
    Quote,
}

impl Category {
    pub const ALL: [Category; 6] = [
        Category::DrugPlanQuotes,
        Category::MedigapQuotes,
        Category::AdvantageQuotes,
        Category::PlanConfiguration,
        Category::UiState,
        Category::General,
    ];

    /// Derive the category of a key from its name.
    ///
    /// Rules are checked in order; the first match wins:
    /// - `ui_` / `form_` prefix → [`Category::UiState`]
    /// - `drug_plan` or `pdp_` → [`Category::DrugPlanQuotes`]
    /// - `medigap` or `supplement` → [`Category::MedigapQuotes`]
    /// - `advantage` or `mapd_` → [`Category::AdvantageQuotes`]
    /// - `plan_config` or `plan_builder` → [`Category::PlanConfiguration`]
    pub fn classify(key: &str) -> Self {
        let key = key.to_ascii_lowercase();
        if key.starts_with("ui_") || key.starts_with("form_") {
            Category::UiState
        } else if key.contains("drug_plan") || key.starts_with("pdp_") {
            Category::DrugPlanQuotes
        } else if key.contains("medigap") || key.contains("supplement") {
            Category::MedigapQuotes
        } else if key.contains("advantage") || key.starts_with("mapd_") {
            Category::AdvantageQuotes
        } else if key.contains("plan_config") || key.contains("plan_builder") {
            Category::PlanConfiguration
        } else {
            Category::General
        }
    }

    /// Name of the sub-collection inside the visitor partition.
    pub fn collection(self) -> &'static str {
        match self {
            Category::DrugPlanQuotes => "drug_plan_quotes",
            Category::MedigapQuotes => "medigap_quotes",
            Category::AdvantageQuotes => "advantage_quotes",
            Category::PlanConfiguration => "plan_configuration",
            Category::UiState => "ui_state",
            Category::General => "general",
        }
    }

    pub fn ttl_class(self) -> TtlClass {
        match self {
            Category::DrugPlanQuotes | Category::MedigapQuotes | Category::AdvantageQuotes => TtlClass::Quote,
            Category::PlanConfiguration | Category::UiState | Category::General => TtlClass::Default,
        }
    }

    /// Whether this category bypasses the remote store entirely.
    pub fn is_local_only(self) -> bool {
        match self {
            Category::UiState => true,
            Category::DrugPlanQuotes
            | Category::MedigapQuotes
            | Category::AdvantageQuotes
            | Category::PlanConfiguration
            | Category::General => false,
        }
    }

    /// Whether loads in this category are tracked so that only the latest wins.
    pub fn is_tracked(self) -> bool {
        self.is_quote_like()
    }

    /// Whether oversized array payloads in this category are stored as chunks.
    pub fn is_quote_like(self) -> bool {
        match self {
            Category::DrugPlanQuotes | Category::MedigapQuotes | Category::AdvantageQuotes => true,
            Category::PlanConfiguration | Category::UiState | Category::General => false,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.collection())
    }
}

impl FromStr for Category {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::ALL
            .into_iter()
            .find(|c| c.collection() == s)
            .ok_or_else(|| Error::InvalidCategory(s.to_string()))
    }
}

/// A storage key together with its category.
///
/// Built from a plain string the category is classified from the name;
/// [`StorageKey::with_category`] overrides the classifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StorageKey {
    name: String,
    category: Category,
}

impl StorageKey {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let category = Category::classify(&name);
        Self { name, category }
    }

    pub fn with_category(name: impl Into<String>, category: Category) -> Self {
        Self { name: name.into(), category }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn category(&self) -> Category {
        self.category
    }

    /// Whether the name contains the chunk id separator and would alias a
    /// chunk document in the remote store.
    pub fn is_reserved(&self) -> bool {
        crate::record::is_reserved(&self.name)
    }
}

impl From<&str> for StorageKey {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for StorageKey {
    fn from(name: String) -> Self {
        Self::new(name)
    }
}

impl From<&String> for StorageKey {
    fn from(name: &String) -> Self {
        Self::new(name.as_str())
    }
}

impl fmt::Display for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}
