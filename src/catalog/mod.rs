//! Travel-pass catalog
//!
//! The catalog is a static, validated list of [`TravelPass`] records. It is
//! loaded once at startup (built-in data or a JSON file) and never mutated.

mod data;

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use thiserror::Error;

/// A purchasable travel pass
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TravelPass {
    pub id: String,
    pub name: String,
    pub description: String,
    /// Area label (広島, 関西, ...)
    pub area: String,
    /// Price in JPY, tax included
    pub price: u32,
    pub valid_days: u32,
    pub features: Vec<String>,
    /// Product detail page
    pub url: String,
    /// Extra search terms
    pub keywords: Vec<String>,
}

impl TravelPass {
    /// Whether the case-folded query is a substring of any searchable field
    pub fn matches(&self, normalized_query: &str) -> bool {
        std::iter::once(&self.name)
            .chain(std::iter::once(&self.area))
            .chain(std::iter::once(&self.description))
            .chain(self.keywords.iter())
            .any(|target| target.to_lowercase().contains(normalized_query))
    }
}

/// Result of a catalog search
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    pub results: Vec<TravelPass>,
    pub total_count: usize,
}

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Duplicate travel pass id: {0}")]
    DuplicateId(String),

    #[error("Travel pass '{id}' has invalid url '{url}': {reason}")]
    InvalidUrl {
        id: String,
        url: String,
        reason: String,
    },

    #[error("Travel pass '{0}' must be valid for at least one day")]
    InvalidValidDays(String),

    #[error("Travel pass has an empty id")]
    EmptyId,

    #[error("Failed to read catalog file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse catalog file: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Immutable, validated collection of travel passes
#[derive(Debug, Clone)]
pub struct Catalog {
    passes: Vec<TravelPass>,
}

impl Catalog {
    /// Validate and wrap a list of passes
    pub fn new(passes: Vec<TravelPass>) -> Result<Self, CatalogError> {
        let mut seen = HashSet::new();
        for pass in &passes {
            if pass.id.trim().is_empty() {
                return Err(CatalogError::EmptyId);
            }
            if !seen.insert(pass.id.as_str()) {
                return Err(CatalogError::DuplicateId(pass.id.clone()));
            }
            if pass.valid_days == 0 {
                return Err(CatalogError::InvalidValidDays(pass.id.clone()));
            }
            validate_absolute_url(&pass.url).map_err(|reason| CatalogError::InvalidUrl {
                id: pass.id.clone(),
                url: pass.url.clone(),
                reason,
            })?;
        }
        Ok(Self { passes })
    }

    /// The catalog shipped with the binary
    pub fn builtin() -> Self {
        Self {
            passes: data::builtin_passes(),
        }
    }

    /// Load a catalog from a JSON array of passes
    pub fn from_json_file(path: &Path) -> Result<Self, CatalogError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    pub fn from_json_str(json: &str) -> Result<Self, CatalogError> {
        let passes: Vec<TravelPass> = serde_json::from_str(json)?;
        Self::new(passes)
    }

    /// The configured catalog file, or the built-in one
    pub fn from_config(config: &crate::config::CatalogConfig) -> Result<Self, CatalogError> {
        match &config.path {
            Some(path) => {
                let catalog = Self::from_json_file(path)?;
                tracing::info!(passes = catalog.len(), "Loaded catalog from {}", path.display());
                Ok(catalog)
            }
            None => Ok(Self::builtin()),
        }
    }

    /// All passes in insertion order
    pub fn passes(&self) -> &[TravelPass] {
        &self.passes
    }

    pub fn len(&self) -> usize {
        self.passes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.passes.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&TravelPass> {
        self.passes.iter().find(|p| p.id == id)
    }

    /// Substring search over name, area, description and keywords.
    ///
    /// Matching is case-insensitive and insertion order is preserved. An empty
    /// query matches every pass.
    pub fn search(&self, query: &str) -> SearchResult {
        let normalized = query.to_lowercase();
        let results: Vec<TravelPass> = self
            .passes
            .iter()
            .filter(|pass| pass.matches(&normalized))
            .cloned()
            .collect();
        SearchResult {
            total_count: results.len(),
            results,
        }
    }
}

fn validate_absolute_url(raw: &str) -> Result<(), String> {
    let parsed = url::Url::parse(raw).map_err(|e| e.to_string())?;
    if parsed.cannot_be_a_base() || parsed.host_str().is_none() {
        return Err("not an absolute URL".to_string());
    }
    Ok(())
}
