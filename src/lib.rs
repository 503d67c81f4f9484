//! Edge-condition compiler for graph traversals.
//!
//! Builds reusable per-direction and per-depth edge filters, selects an index
//! for every traversed edge collection and records the positions that must be
//! rebound for each expanded vertex.

#![warn(missing_docs)]

pub mod query;
pub mod types;

pub use query::traversal::{
    CompiledAccessors, CompilerOptions, EdgeConditionBuilder, EdgeConditionBuilderContainer,
    EdgeConditionsSpec, IndexAccessor, IndexAccessorCompiler,
};
pub use types::{NodeId, Result, SombraError, TraversalDirection, VarId};
