//! Tunables passed to the index accessor compiler.

use serde::Deserialize;

use crate::query::catalog::IndexHint;
use crate::types::Result;

/// Options forwarded to the index catalog for every (collection, direction)
/// pair of a traversal.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CompilerOptions {
    /// Item count the catalog assumes when costing candidate indexes.
    pub estimated_items: usize,
    /// Index the caller wants used when it can serve the condition.
    pub index_hint: IndexHint,
    /// Restrict candidates to the endpoint (edge) indexes.
    pub only_edge_indexes: bool,
}

impl Default for CompilerOptions {
    fn default() -> Self {
        Self {
            estimated_items: 1000,
            index_hint: IndexHint::None,
            only_edge_indexes: false,
        }
    }
}

impl CompilerOptions {
    /// Only the endpoint index is considered, so every accessor keeps the
    /// user filters as a remainder.
    pub fn edge_only() -> Self {
        Self {
            only_edge_indexes: true,
            ..Self::default()
        }
    }

    /// Parses options from a TOML table such as a `[traversal]` profile section.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }
}
