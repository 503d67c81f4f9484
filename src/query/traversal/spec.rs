//! Serialized form of an edge condition builder.
//!
//! ```json
//! {
//!   "globalEdgeConditions": [ { "type": "compare", ... } ],
//!   "edgeConditions": { "2": { "type": "and", "members": [ ... ] } }
//! }
//! ```
//!
//! Both keys are optional. Depth keys are decimal strings without sign or
//! leading zeros so every depth has exactly one key; unknown keys are ignored.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::query::ast::NodeSpec;
use crate::types::{Result, SombraError};

/// Global and per-depth edge filter parts.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EdgeConditionsSpec {
    /// Parts applied at every depth, in insertion order.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub global_edge_conditions: Vec<NodeSpec>,
    /// Depth (decimal string) to an AND node of extra parts.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub edge_conditions: BTreeMap<String, NodeSpec>,
}

impl EdgeConditionsSpec {
    /// Parses a document produced by [`to_json`](Self::to_json).
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Compact JSON rendering.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Whether the document carries no parts at all.
    pub fn is_empty(&self) -> bool {
        self.global_edge_conditions.is_empty() && self.edge_conditions.is_empty()
    }

    /// Stores `members` as the AND node for `depth`.
    pub fn insert_depth(&mut self, depth: u64, members: Vec<NodeSpec>) {
        self.edge_conditions
            .insert(depth.to_string(), NodeSpec::And { members });
    }

    /// Decodes the per-depth entries, ordered by numeric depth.
    pub fn depth_conditions(&self) -> Result<Vec<(u64, &[NodeSpec])>> {
        let mut out = Vec::with_capacity(self.edge_conditions.len());
        for (key, node) in &self.edge_conditions {
            let depth = key
                .parse::<u64>()
                .ok()
                .filter(|depth| depth.to_string() == *key)
                .ok_or_else(|| {
                    SombraError::InvalidOwned(format!(
                        "edge condition depth '{key}' is not a canonical non-negative integer"
                    ))
                })?;
            let NodeSpec::And { members } = node else {
                return Err(SombraError::InvalidOwned(format!(
                    "edge conditions for depth {depth} must be an and node"
                )));
            };
            out.push((depth, members.as_slice()));
        }
        out.sort_by_key(|(depth, _)| *depth);
        Ok(out)
    }
}
