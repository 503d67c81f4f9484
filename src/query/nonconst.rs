//! Extraction of the condition parts that must be rebound before every use.
//!
//! A compiled index condition is planned once but executed many times. Any
//! operand that depends on a variable other than the one the index scans (for
//! traversals: the current vertex) is recorded here with its position, so the
//! executor can re-evaluate and patch exactly those slots.

use smallvec::SmallVec;

use crate::query::ast::{AstNode, NodeArena};
use crate::query::variables::Variable;
use crate::types::{NodeId, Result, VarId};

/// One operand (or whole member) whose value is only known at execution time.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NonConstantPart {
    /// Position inside the condition: `[member]` or `[member, operand]`.
    pub path: SmallVec<[usize; 2]>,
    /// Detached copy of the expression to evaluate.
    pub expression: NodeId,
    /// Variables the expression reads.
    pub variables: Vec<VarId>,
}

/// Every non-constant part of one condition.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NonConstantParts {
    parts: Vec<NonConstantPart>,
}

impl NonConstantParts {
    /// Number of recorded parts.
    pub fn len(&self) -> usize {
        self.parts.len()
    }

    /// Whether the condition is fully constant.
    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    /// Iterates over the recorded parts in condition order.
    pub fn iter(&self) -> impl Iterator<Item = &NonConstantPart> {
        self.parts.iter()
    }

    /// Whether some recorded part sits inside AND member `member`.
    pub fn touches_member(&self, member: usize) -> bool {
        self.parts.iter().any(|p| p.path.first() == Some(&member))
    }

    /// Distinct variables needed to rebind all parts.
    pub fn variables(&self) -> Vec<VarId> {
        let mut out = Vec::new();
        for var in self.parts.iter().flat_map(|p| p.variables.iter()) {
            if !out.contains(var) {
                out.push(*var);
            }
        }
        out
    }
}

/// Collects the non-constant parts of the AND condition `condition` relative
/// to the index variable `variable`.
///
/// Operands that read `variable` itself are evaluated per document by the
/// index and are therefore skipped; constant operands never need rebinding.
pub fn extract_non_constant_parts(
    arena: &mut NodeArena,
    condition: NodeId,
    variable: &Variable,
) -> Result<NonConstantParts> {
    let members = arena.members(condition)?.to_vec();
    let mut parts = Vec::new();
    for (index, member) in members.into_iter().enumerate() {
        let operands = match arena.get(member)? {
            AstNode::Compare { lhs, rhs, .. } => Some([*lhs, *rhs]),
            _ => None,
        };
        match operands {
            Some(operands) => {
                for (side, operand) in operands.into_iter().enumerate() {
                    if let Some(part) = rebindable(arena, operand, variable, &[index, side])? {
                        parts.push(part);
                    }
                }
            }
            None => {
                if let Some(part) = rebindable(arena, member, variable, &[index])? {
                    parts.push(part);
                }
            }
        }
    }
    Ok(NonConstantParts { parts })
}

fn rebindable(
    arena: &mut NodeArena,
    node: NodeId,
    variable: &Variable,
    path: &[usize],
) -> Result<Option<NonConstantPart>> {
    if arena.is_constant(node)? {
        return Ok(None);
    }
    let mut variables = Vec::new();
    arena.collect_variables(node, &mut variables)?;
    if variables.contains(&variable.id) {
        return Ok(None);
    }
    let expression = arena.clone_subtree(node)?;
    Ok(Some(NonConstantPart {
        path: SmallVec::from_slice(path),
        expression,
        variables,
    }))
}
