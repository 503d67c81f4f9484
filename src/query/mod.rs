#![forbid(unsafe_code)]

//! Condition compilation for traversal planning.
//!
//! This module provides the expression node model the planner works on, the
//! index catalog interface, and the traversal-specific builders and
//! compilers layered on top of them.

/// Arena-backed expression nodes.
///
/// Defines the n-ary AND, comparison, attribute access, reference and literal
/// nodes, plus cloning, rewriting and (de)serialization helpers.
pub mod ast;

/// Index catalog interface and an in-memory implementation.
///
/// Selects the cheapest usable index for a condition and specializes the
/// condition to what that index evaluates.
pub mod catalog;

/// Explain trees and plan fingerprints.
pub mod explain;

/// Non-constant part extraction.
///
/// Records the operands of a compiled condition that must be re-evaluated
/// before every execution.
pub mod nonconst;

/// Traversal edge conditions and index accessors.
pub mod traversal;

/// Literal values.
pub mod value;

/// Query variables and the generator issuing them.
pub mod variables;

pub use ast::{AstNode, CompareOp, NodeArena, NodeSpec};
pub use catalog::{InMemoryIndexCatalog, IndexCatalog, IndexHandle, IndexHint, IndexKind};
pub use explain::{ExplainNode, ExplainProp};
pub use value::Value;
pub use variables::{Variable, VariableGenerator};
