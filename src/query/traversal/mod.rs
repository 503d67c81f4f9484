#![forbid(unsafe_code)]

//! Edge conditions and index accessors for graph traversals.

/// Index accessor compilation.
///
/// Turns direction- and depth-specific edge conditions into index lookups
/// with a remainder filter and rebind positions.
pub mod accessor;

/// Direction- and depth-aware edge condition builder over an external arena.
pub mod condition;

/// Builder variant that owns its arena and rebinds the vertex id in place.
pub mod container;

/// Compiler options loadable from TOML.
pub mod options;

/// Serialized condition document.
pub mod spec;

pub use accessor::{CompiledAccessors, FilterExpression, IndexAccessor, IndexAccessorCompiler};
pub use condition::{DirectionTerms, EdgeConditionBuilder, VariableTerms};
pub use container::{ContainerTerms, EdgeConditionBuilderContainer, EDGE_VARIABLE};
pub use options::CompilerOptions;
pub use spec::EdgeConditionsSpec;
