#![forbid(unsafe_code)]

//! Identifiers and the crate-wide error type shared by the planner layers.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Handle of a node stored in a [`NodeArena`](crate::query::ast::NodeArena).
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct NodeId(pub u32);

/// Identifier of a query variable issued by a
/// [`VariableGenerator`](crate::query::variables::VariableGenerator).
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Serialize, Deserialize)]
pub struct VarId(pub u32);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for VarId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for VarId {
    fn from(value: u32) -> Self {
        VarId(value)
    }
}

impl From<VarId> for u32 {
    fn from(value: VarId) -> Self {
        value.0
    }
}

/// Direction in which a traversal step expands the current vertex.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TraversalDirection {
    /// Follow edges whose source is the current vertex.
    Outbound,
    /// Follow edges whose target is the current vertex.
    Inbound,
}

impl TraversalDirection {
    /// Edge attribute that must equal the current vertex for this direction.
    pub const fn endpoint_attribute(self) -> &'static str {
        match self {
            TraversalDirection::Outbound => FROM_ATTRIBUTE,
            TraversalDirection::Inbound => TO_ATTRIBUTE,
        }
    }

    /// Lowercase name used in explain output and error messages.
    pub const fn as_str(self) -> &'static str {
        match self {
            TraversalDirection::Outbound => "outbound",
            TraversalDirection::Inbound => "inbound",
        }
    }
}

impl fmt::Display for TraversalDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Edge attribute holding the source vertex id.
pub const FROM_ATTRIBUTE: &str = "from";
/// Edge attribute holding the target vertex id.
pub const TO_ATTRIBUTE: &str = "to";

/// Errors raised while building traversal conditions and index accessors.
///
/// Nothing in this layer performs I/O, so every variant is either a planner
/// consistency failure or malformed input handed in by a caller.
#[derive(thiserror::Error, Debug)]
pub enum SombraError {
    /// A node-model or builder invariant does not hold.
    #[error("internal: {0}")]
    Internal(&'static str),
    /// Same as [`SombraError::Internal`] with a formatted message.
    #[error("internal: {0}")]
    InternalOwned(String),
    /// The catalog produced no index for a collection a traversal must read.
    #[error("no usable index for collection '{collection}' ({direction})")]
    NoIndex {
        /// Edge collection name.
        collection: String,
        /// Direction the collection was compiled for.
        direction: TraversalDirection,
    },
    /// Caller-supplied input is malformed.
    #[error("invalid argument: {0}")]
    Invalid(&'static str),
    /// Same as [`SombraError::Invalid`] with a formatted message.
    #[error("invalid argument: {0}")]
    InvalidOwned(String),
    /// JSON encoding or decoding failed.
    #[error("serialization: {0}")]
    Serialization(#[from] serde_json::Error),
    /// Configuration text could not be parsed.
    #[error("config: {0}")]
    Config(#[from] toml::de::Error),
}

impl SombraError {
    /// Returns a machine-readable code for the error variant.
    pub fn code(&self) -> &'static str {
        match self {
            SombraError::Internal(_) | SombraError::InternalOwned(_) => "Internal",
            SombraError::NoIndex { .. } => "NoIndex",
            SombraError::Invalid(_) | SombraError::InvalidOwned(_) => "Invalid",
            SombraError::Serialization(_) => "Serialization",
            SombraError::Config(_) => "Config",
        }
    }

    /// Whether the error signals a planner consistency bug rather than bad input.
    ///
    /// Internal errors abort the surrounding planning step; callers never retry.
    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            SombraError::Internal(_) | SombraError::InternalOwned(_) | SombraError::NoIndex { .. }
        )
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, SombraError>;
