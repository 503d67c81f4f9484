//! Arena-backed expression nodes used to express edge conditions.
//!
//! Every node lives in a [`NodeArena`] and is addressed by a [`NodeId`]. Other
//! structures only hold ids, so the arena is the single place where nodes are
//! created and released. Nodes may be shared (the node graph is a DAG): a
//! condition container points both of its direction terms at one literal node
//! so that rebinding the vertex id touches exactly one slot.

use std::collections::HashMap;
use std::fmt::Write as _;

use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::query::value::Value;
use crate::query::variables::Variable;
use crate::types::{NodeId, Result, SombraError, VarId};

/// Binary comparison operators understood by the condition builder.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum CompareOp {
    /// `==`
    #[serde(rename = "==")]
    Eq,
    /// `!=`
    #[serde(rename = "!=")]
    Ne,
    /// `<`
    #[serde(rename = "<")]
    Lt,
    /// `<=`
    #[serde(rename = "<=")]
    Le,
    /// `>`
    #[serde(rename = ">")]
    Gt,
    /// `>=`
    #[serde(rename = ">=")]
    Ge,
}

impl CompareOp {
    /// Operator symbol as rendered in explain output.
    pub const fn symbol(self) -> &'static str {
        match self {
            CompareOp::Eq => "==",
            CompareOp::Ne => "!=",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
        }
    }

    /// Operator that keeps the meaning when both operands trade places.
    pub const fn mirrored(self) -> Self {
        match self {
            CompareOp::Eq => CompareOp::Eq,
            CompareOp::Ne => CompareOp::Ne,
            CompareOp::Lt => CompareOp::Gt,
            CompareOp::Le => CompareOp::Ge,
            CompareOp::Gt => CompareOp::Lt,
            CompareOp::Ge => CompareOp::Le,
        }
    }
}

/// Single expression node.
#[derive(Clone, Debug, PartialEq)]
pub enum AstNode {
    /// N-ary conjunction. Member order is significant.
    And(Vec<NodeId>),
    /// Binary comparison.
    Compare {
        /// Comparison operator.
        op: CompareOp,
        /// Left operand.
        lhs: NodeId,
        /// Right operand.
        rhs: NodeId,
    },
    /// `base.name` attribute access.
    Attribute {
        /// Expression the attribute is read from.
        base: NodeId,
        /// Attribute name (one path segment).
        name: String,
    },
    /// Reference to a query variable.
    Reference(Variable),
    /// Literal value.
    Value(Value),
}

impl AstNode {
    /// Short name of the node kind, used in error messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            AstNode::And(_) => "and",
            AstNode::Compare { .. } => "compare",
            AstNode::Attribute { .. } => "attribute access",
            AstNode::Reference(_) => "reference",
            AstNode::Value(_) => "value",
        }
    }

    fn children(&self) -> SmallVec<[NodeId; 4]> {
        match self {
            AstNode::And(members) => members.iter().copied().collect(),
            AstNode::Compare { lhs, rhs, .. } => smallvec::smallvec![*lhs, *rhs],
            AstNode::Attribute { base, .. } => smallvec::smallvec![*base],
            AstNode::Reference(_) | AstNode::Value(_) => SmallVec::new(),
        }
    }
}

/// Position in an arena that [`NodeArena::rollback`] can return to.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ArenaMark(usize);

/// Owning pool of expression nodes.
#[derive(Clone, Debug, Default)]
pub struct NodeArena {
    nodes: Vec<AstNode>,
}

impl NodeArena {
    /// Creates an empty arena.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty arena with room for `capacity` nodes.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            nodes: Vec::with_capacity(capacity),
        }
    }

    /// Number of nodes ever allocated (and not rolled back).
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the arena holds no nodes.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn push(&mut self, node: AstNode) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(node);
        id
    }

    /// Allocates an n-ary AND node.
    pub fn and(&mut self, members: Vec<NodeId>) -> NodeId {
        self.push(AstNode::And(members))
    }

    /// Allocates a binary comparison node.
    pub fn compare(&mut self, op: CompareOp, lhs: NodeId, rhs: NodeId) -> NodeId {
        self.push(AstNode::Compare { op, lhs, rhs })
    }

    /// Allocates `lhs == rhs`.
    pub fn eq(&mut self, lhs: NodeId, rhs: NodeId) -> NodeId {
        self.compare(CompareOp::Eq, lhs, rhs)
    }

    /// Allocates `base.name`.
    pub fn attribute(&mut self, base: NodeId, name: impl Into<String>) -> NodeId {
        self.push(AstNode::Attribute {
            base,
            name: name.into(),
        })
    }

    /// Allocates a reference to `var`.
    pub fn reference(&mut self, var: &Variable) -> NodeId {
        self.push(AstNode::Reference(var.clone()))
    }

    /// Allocates a literal.
    pub fn value(&mut self, value: impl Into<Value>) -> NodeId {
        self.push(AstNode::Value(value.into()))
    }

    /// Allocates `var.path[0].path[1]...` and returns the outermost access.
    pub fn attribute_path(&mut self, var: &Variable, path: &[&str]) -> NodeId {
        let mut node = self.reference(var);
        for segment in path {
            node = self.attribute(node, *segment);
        }
        node
    }

    /// Returns the node behind `id`.
    pub fn get(&self, id: NodeId) -> Result<&AstNode> {
        self.nodes
            .get(id.0 as usize)
            .ok_or_else(|| SombraError::InternalOwned(format!("dangling node id {id}")))
    }

    fn get_mut(&mut self, id: NodeId) -> Result<&mut AstNode> {
        self.nodes
            .get_mut(id.0 as usize)
            .ok_or_else(|| SombraError::InternalOwned(format!("dangling node id {id}")))
    }

    /// Members of an AND node.
    pub fn members(&self, id: NodeId) -> Result<&[NodeId]> {
        match self.get(id)? {
            AstNode::And(members) => Ok(members),
            other => Err(expected_and(other)),
        }
    }

    fn members_mut(&mut self, id: NodeId) -> Result<&mut Vec<NodeId>> {
        match self.get_mut(id)? {
            AstNode::And(members) => Ok(members),
            other => Err(expected_and(other)),
        }
    }

    /// Number of members of an AND node.
    pub fn num_members(&self, id: NodeId) -> Result<usize> {
        Ok(self.members(id)?.len())
    }

    /// Member `index` of an AND node.
    pub fn member(&self, id: NodeId, index: usize) -> Result<NodeId> {
        self.members(id)?
            .get(index)
            .copied()
            .ok_or(SombraError::Internal("and member index out of range"))
    }

    /// Appends `member` to an AND node.
    pub fn add_member(&mut self, id: NodeId, member: NodeId) -> Result<()> {
        self.get(member)?;
        self.members_mut(id)?.push(member);
        Ok(())
    }

    /// Removes member `index`, keeping the relative order of the rest.
    pub fn remove_member(&mut self, id: NodeId, index: usize) -> Result<NodeId> {
        let members = self.members_mut(id)?;
        if index >= members.len() {
            return Err(SombraError::Internal("and member index out of range"));
        }
        Ok(members.remove(index))
    }

    /// Replaces member `index` in place and returns the previous member.
    pub fn change_member(&mut self, id: NodeId, index: usize, member: NodeId) -> Result<NodeId> {
        self.get(member)?;
        let members = self.members_mut(id)?;
        let slot = members
            .get_mut(index)
            .ok_or(SombraError::Internal("and member index out of range"))?;
        Ok(std::mem::replace(slot, member))
    }

    /// Left and right operand of a comparison node.
    pub fn operands(&self, id: NodeId) -> Result<(CompareOp, NodeId, NodeId)> {
        match self.get(id)? {
            AstNode::Compare { op, lhs, rhs } => Ok((*op, *lhs, *rhs)),
            other => Err(SombraError::InternalOwned(format!(
                "expected comparison node, found {}",
                other.kind_name()
            ))),
        }
    }

    /// Swaps both operands of a comparison, mirroring the operator.
    pub fn swap_operands(&mut self, id: NodeId) -> Result<()> {
        match self.get_mut(id)? {
            AstNode::Compare { op, lhs, rhs } => {
                std::mem::swap(lhs, rhs);
                *op = op.mirrored();
                Ok(())
            }
            _ => Err(SombraError::Internal("expected comparison node")),
        }
    }

    /// Overwrites node `id` with a string literal without allocating a node.
    ///
    /// An existing string literal keeps its buffer; any other node kind is
    /// turned into a literal in place.
    pub fn set_string_value(&mut self, id: NodeId, value: &str) -> Result<()> {
        match self.get_mut(id)? {
            AstNode::Value(v) => v.set_string(value),
            other => *other = AstNode::Value(Value::from(value)),
        }
        Ok(())
    }

    /// Deep-copies the subtree at `id` inside this arena.
    pub fn clone_subtree(&mut self, id: NodeId) -> Result<NodeId> {
        let node = self.get(id)?.clone();
        let copy = match node {
            AstNode::And(members) => {
                let mut out = Vec::with_capacity(members.len());
                for member in members {
                    out.push(self.clone_subtree(member)?);
                }
                AstNode::And(out)
            }
            AstNode::Compare { op, lhs, rhs } => AstNode::Compare {
                op,
                lhs: self.clone_subtree(lhs)?,
                rhs: self.clone_subtree(rhs)?,
            },
            AstNode::Attribute { base, name } => AstNode::Attribute {
                base: self.clone_subtree(base)?,
                name,
            },
            leaf => leaf,
        };
        Ok(self.push(copy))
    }

    /// Deep-copies the subtree at `id` into `target`.
    pub fn clone_into(&self, id: NodeId, target: &mut NodeArena) -> Result<NodeId> {
        let copy = match self.get(id)? {
            AstNode::And(members) => {
                let mut out = Vec::with_capacity(members.len());
                for member in members {
                    out.push(self.clone_into(*member, target)?);
                }
                AstNode::And(out)
            }
            AstNode::Compare { op, lhs, rhs } => AstNode::Compare {
                op: *op,
                lhs: self.clone_into(*lhs, target)?,
                rhs: self.clone_into(*rhs, target)?,
            },
            AstNode::Attribute { base, name } => AstNode::Attribute {
                base: self.clone_into(*base, target)?,
                name: name.clone(),
            },
            leaf => leaf.clone(),
        };
        Ok(target.push(copy))
    }

    /// Exact structural equality: same kinds, operators, names and literals.
    pub fn structurally_equal(&self, a: NodeId, b: NodeId) -> bool {
        if a == b {
            return true;
        }
        let (Ok(left), Ok(right)) = (self.get(a), self.get(b)) else {
            return false;
        };
        match (left, right) {
            (AstNode::And(l), AstNode::And(r)) => {
                l.len() == r.len()
                    && l.iter()
                        .zip(r.iter())
                        .all(|(x, y)| self.structurally_equal(*x, *y))
            }
            (
                AstNode::Compare {
                    op: lop,
                    lhs: ll,
                    rhs: lr,
                },
                AstNode::Compare {
                    op: rop,
                    lhs: rl,
                    rhs: rr,
                },
            ) => lop == rop && self.structurally_equal(*ll, *rl) && self.structurally_equal(*lr, *rr),
            (
                AstNode::Attribute { base: lb, name: ln },
                AstNode::Attribute { base: rb, name: rn },
            ) => ln == rn && self.structurally_equal(*lb, *rb),
            (AstNode::Reference(l), AstNode::Reference(r)) => l.id == r.id,
            (AstNode::Value(l), AstNode::Value(r)) => l == r,
            _ => false,
        }
    }

    /// Structural equality that also accepts comparisons whose operands were
    /// swapped (with the operator mirrored), as index normalization does.
    pub fn same_condition(&self, a: NodeId, b: NodeId) -> bool {
        if self.structurally_equal(a, b) {
            return true;
        }
        match (self.operands(a), self.operands(b)) {
            (Ok((lop, ll, lr)), Ok((rop, rl, rr))) => {
                lop.mirrored() == rop
                    && self.structurally_equal(ll, rr)
                    && self.structurally_equal(lr, rl)
            }
            _ => false,
        }
    }

    /// Whether the subtree can be evaluated without binding any variable.
    pub fn is_constant(&self, id: NodeId) -> Result<bool> {
        match self.get(id)? {
            AstNode::Reference(_) => Ok(false),
            AstNode::Value(_) => Ok(true),
            node => {
                for child in node.children() {
                    if !self.is_constant(child)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
        }
    }

    /// Collects the distinct variables referenced below `id`, in first-seen order.
    pub fn collect_variables(&self, id: NodeId, out: &mut Vec<VarId>) -> Result<()> {
        match self.get(id)? {
            AstNode::Reference(var) => {
                if !out.contains(&var.id) {
                    out.push(var.id);
                }
            }
            node => {
                for child in node.children() {
                    self.collect_variables(child, out)?;
                }
            }
        }
        Ok(())
    }

    /// Whether `var` is referenced anywhere below `id`.
    pub fn references_variable(&self, id: NodeId, var: VarId) -> Result<bool> {
        let mut vars = Vec::new();
        self.collect_variables(id, &mut vars)?;
        Ok(vars.contains(&var))
    }

    /// Decomposes `var.a.b` into the variable and its attribute path.
    /// Returns `None` for anything but a pure attribute chain on a reference.
    pub fn attribute_access_on(&self, id: NodeId) -> Option<(&Variable, SmallVec<[&str; 4]>)> {
        let mut path: SmallVec<[&str; 4]> = SmallVec::new();
        let mut current = id;
        loop {
            match self.get(current).ok()? {
                AstNode::Attribute { base, name } => {
                    path.push(name.as_str());
                    current = *base;
                }
                AstNode::Reference(var) if !path.is_empty() => {
                    path.reverse();
                    return Some((var, path));
                }
                _ => return None,
            }
        }
    }

    /// Rewrites every reference below `roots` whose variable appears in
    /// `mapping`. Shared nodes are rewritten once.
    pub fn replace_variables(
        &mut self,
        roots: &[NodeId],
        mapping: &HashMap<VarId, Variable>,
    ) -> Result<()> {
        if mapping.is_empty() {
            return Ok(());
        }
        let mut visited = FxHashSet::default();
        for root in roots {
            self.replace_variables_at(*root, mapping, &mut visited)?;
        }
        Ok(())
    }

    fn replace_variables_at(
        &mut self,
        id: NodeId,
        mapping: &HashMap<VarId, Variable>,
        visited: &mut FxHashSet<NodeId>,
    ) -> Result<()> {
        if !visited.insert(id) {
            return Ok(());
        }
        let children = match self.get_mut(id)? {
            AstNode::Reference(var) => {
                if let Some(replacement) = mapping.get(&var.id) {
                    *var = replacement.clone();
                }
                return Ok(());
            }
            node => node.children(),
        };
        for child in children {
            self.replace_variables_at(child, mapping, visited)?;
        }
        Ok(())
    }

    /// Replaces every access `search.path[0]...path[n]` below `roots` with a
    /// reference to `replacement`, in place.
    pub fn replace_attribute_access(
        &mut self,
        roots: &[NodeId],
        search: &Variable,
        path: &[String],
        replacement: &Variable,
    ) -> Result<()> {
        if path.is_empty() {
            return Err(SombraError::Invalid(
                "attribute replacement requires a non-empty path",
            ));
        }
        let mut visited = FxHashSet::default();
        for root in roots {
            self.replace_attribute_at(*root, search, path, replacement, &mut visited)?;
        }
        Ok(())
    }

    fn replace_attribute_at(
        &mut self,
        id: NodeId,
        search: &Variable,
        path: &[String],
        replacement: &Variable,
        visited: &mut FxHashSet<NodeId>,
    ) -> Result<()> {
        if !visited.insert(id) {
            return Ok(());
        }
        let matches = self
            .attribute_access_on(id)
            .map(|(var, found)| {
                var.id == search.id
                    && found.len() == path.len()
                    && found.iter().zip(path).all(|(a, b)| *a == b.as_str())
            })
            .unwrap_or(false);
        if matches {
            *self.get_mut(id)? = AstNode::Reference(replacement.clone());
            return Ok(());
        }
        for child in self.get(id)?.children() {
            self.replace_attribute_at(child, search, path, replacement, visited)?;
        }
        Ok(())
    }

    /// Current allocation position.
    pub fn checkpoint(&self) -> ArenaMark {
        ArenaMark(self.nodes.len())
    }

    /// Releases every node allocated after `mark`.
    ///
    /// Nodes older than the mark must not have been pointed at newer ones in
    /// the meantime.
    pub fn rollback(&mut self, mark: ArenaMark) {
        self.nodes.truncate(mark.0);
    }

    /// Human-readable rendering, e.g. `e.from == "vertices/A"`.
    pub fn render(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.render_into(id, &mut out, false);
        out
    }

    fn render_into(&self, id: NodeId, out: &mut String, nested: bool) {
        let Ok(node) = self.get(id) else {
            let _ = write!(out, "<dangling {id}>");
            return;
        };
        match node {
            AstNode::And(members) if members.is_empty() => out.push_str("true"),
            AstNode::And(members) => {
                if nested {
                    out.push('(');
                }
                for (i, member) in members.iter().enumerate() {
                    if i > 0 {
                        out.push_str(" AND ");
                    }
                    self.render_into(*member, out, true);
                }
                if nested {
                    out.push(')');
                }
            }
            AstNode::Compare { op, lhs, rhs } => {
                self.render_into(*lhs, out, true);
                let _ = write!(out, " {} ", op.symbol());
                self.render_into(*rhs, out, true);
            }
            AstNode::Attribute { base, name } => {
                self.render_into(*base, out, true);
                out.push('.');
                out.push_str(name);
            }
            AstNode::Reference(var) => out.push_str(&var.name),
            AstNode::Value(value) => {
                let _ = write!(out, "{value}");
            }
        }
    }

    /// Serializable copy of the subtree at `id`.
    pub fn to_spec(&self, id: NodeId) -> Result<NodeSpec> {
        Ok(match self.get(id)? {
            AstNode::And(members) => NodeSpec::And {
                members: members
                    .iter()
                    .map(|m| self.to_spec(*m))
                    .collect::<Result<Vec<_>>>()?,
            },
            AstNode::Compare { op, lhs, rhs } => NodeSpec::Compare {
                op: *op,
                lhs: Box::new(self.to_spec(*lhs)?),
                rhs: Box::new(self.to_spec(*rhs)?),
            },
            AstNode::Attribute { base, name } => NodeSpec::Attribute {
                base: Box::new(self.to_spec(*base)?),
                name: name.clone(),
            },
            AstNode::Reference(var) => NodeSpec::Reference {
                variable: var.clone(),
            },
            AstNode::Value(value) if !value.is_serializable() => {
                return Err(SombraError::InvalidOwned(format!(
                    "literal {value} in node {id} has no serialized form"
                )));
            }
            AstNode::Value(value) => NodeSpec::Value {
                value: value.clone(),
            },
        })
    }

    /// Allocates the nodes described by `spec` and returns the root.
    pub fn from_spec(&mut self, spec: &NodeSpec) -> NodeId {
        match spec {
            NodeSpec::And { members } => {
                let members = members.iter().map(|m| self.from_spec(m)).collect();
                self.and(members)
            }
            NodeSpec::Compare { op, lhs, rhs } => {
                let lhs = self.from_spec(lhs);
                let rhs = self.from_spec(rhs);
                self.compare(*op, lhs, rhs)
            }
            NodeSpec::Attribute { base, name } => {
                let base = self.from_spec(base);
                self.attribute(base, name.clone())
            }
            NodeSpec::Reference { variable } => self.reference(variable),
            NodeSpec::Value { value } => self.value(value.clone()),
        }
    }
}

fn expected_and(found: &AstNode) -> SombraError {
    SombraError::InternalOwned(format!(
        "expected n-ary and node, found {}",
        found.kind_name()
    ))
}

/// Owned, serializable form of an expression subtree.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NodeSpec {
    /// N-ary conjunction.
    And {
        /// Conjunction members in order.
        members: Vec<NodeSpec>,
    },
    /// Binary comparison.
    Compare {
        /// Comparison operator.
        op: CompareOp,
        /// Left operand.
        lhs: Box<NodeSpec>,
        /// Right operand.
        rhs: Box<NodeSpec>,
    },
    /// Attribute access.
    Attribute {
        /// Accessed expression.
        base: Box<NodeSpec>,
        /// Attribute name.
        name: String,
    },
    /// Variable reference.
    Reference {
        /// Referenced variable.
        variable: Variable,
    },
    /// Literal.
    Value {
        /// Literal payload.
        value: Value,
    },
}

impl NodeSpec {
    /// Visits every variable referenced by the spec.
    pub fn for_each_variable(&self, f: &mut impl FnMut(&Variable)) {
        match self {
            NodeSpec::And { members } => members.iter().for_each(|m| m.for_each_variable(f)),
            NodeSpec::Compare { lhs, rhs, .. } => {
                lhs.for_each_variable(f);
                rhs.for_each_variable(f);
            }
            NodeSpec::Attribute { base, .. } => base.for_each_variable(f),
            NodeSpec::Reference { variable } => f(variable),
            NodeSpec::Value { .. } => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::variables::VariableGenerator;

    fn label_filter(arena: &mut NodeArena, edge: &Variable, label: &str) -> NodeId {
        let access = arena.attribute_path(edge, &["label"]);
        let value = arena.value(label);
        arena.eq(access, value)
    }

    #[test]
    fn member_operations_preserve_order() {
        let mut arena = NodeArena::new();
        let a = arena.value(1i64);
        let b = arena.value(2i64);
        let c = arena.value(3i64);
        let and = arena.and(vec![a, b]);
        arena.add_member(and, c).unwrap();
        assert_eq!(arena.members(and).unwrap(), &[a, b, c]);

        assert_eq!(arena.remove_member(and, 0).unwrap(), a);
        assert_eq!(arena.members(and).unwrap(), &[b, c]);

        assert_eq!(arena.change_member(and, 1, a).unwrap(), c);
        assert_eq!(arena.members(and).unwrap(), &[b, a]);
        assert!(arena.remove_member(and, 5).is_err());
    }

    #[test]
    fn member_operations_reject_non_and_nodes() {
        let mut arena = NodeArena::new();
        let v = arena.value("x");
        let err = arena.num_members(v).unwrap_err();
        assert!(err.is_internal());
        assert!(err.to_string().contains("expected n-ary and node"));
        assert!(arena.get(NodeId(42)).is_err());
    }

    #[test]
    fn clone_subtree_is_independent() {
        let mut vars = VariableGenerator::new();
        let edge = vars.create_variable("e");
        let mut arena = NodeArena::new();
        let part = label_filter(&mut arena, &edge, "friend");
        let and = arena.and(vec![part]);

        let copy = arena.clone_subtree(and).unwrap();
        assert!(arena.structurally_equal(and, copy));
        let copied_part = arena.member(copy, 0).unwrap();
        let (_, _, rhs) = arena.operands(copied_part).unwrap();
        arena.set_string_value(rhs, "enemy").unwrap();

        assert_eq!(arena.render(and), "e.label == \"friend\"");
        assert_eq!(arena.render(copy), "e.label == \"enemy\"");
    }

    #[test]
    fn clone_into_other_arena() {
        let mut vars = VariableGenerator::new();
        let edge = vars.create_variable("e");
        let mut source = NodeArena::new();
        let part = label_filter(&mut source, &edge, "friend");
        let mut target = NodeArena::new();
        let copy = source.clone_into(part, &mut target).unwrap();
        assert_eq!(target.len(), source.len());
        assert_eq!(target.render(copy), source.render(part));
    }

    #[test]
    fn same_condition_accepts_mirrored_operands() {
        let mut vars = VariableGenerator::new();
        let edge = vars.create_variable("e");
        let mut arena = NodeArena::new();
        let a = arena.attribute_path(&edge, &["weight"]);
        let three = arena.value(3i64);
        let lt = arena.compare(CompareOp::Lt, a, three);
        let b = arena.attribute_path(&edge, &["weight"]);
        let three_again = arena.value(3i64);
        let gt = arena.compare(CompareOp::Gt, three_again, b);
        assert!(!arena.structurally_equal(lt, gt));
        assert!(arena.same_condition(lt, gt));

        arena.swap_operands(gt).unwrap();
        assert!(arena.structurally_equal(lt, gt));
    }

    #[test]
    fn constness_and_variables() {
        let mut vars = VariableGenerator::new();
        let edge = vars.create_variable("e");
        let tmp = vars.create_temporary_variable();
        let mut arena = NodeArena::new();
        let lit = arena.value("x");
        let access = arena.attribute_path(&edge, &["from"]);
        let tmp_ref = arena.reference(&tmp);
        let cmp = arena.eq(access, tmp_ref);
        assert!(arena.is_constant(lit).unwrap());
        assert!(!arena.is_constant(cmp).unwrap());

        let mut seen = Vec::new();
        arena.collect_variables(cmp, &mut seen).unwrap();
        assert_eq!(seen, vec![edge.id, tmp.id]);
        assert!(arena.references_variable(cmp, tmp.id).unwrap());

        let (var, path) = arena.attribute_access_on(access).unwrap();
        assert_eq!(var.id, edge.id);
        assert_eq!(path.as_slice(), &["from"]);
        assert!(arena.attribute_access_on(tmp_ref).is_none());
    }

    #[test]
    fn replace_variables_visits_shared_nodes_once() {
        let mut vars = VariableGenerator::new();
        let a = vars.create_variable("a");
        let b = vars.create_variable("b");
        let c = vars.create_variable("c");
        let mut arena = NodeArena::new();
        let shared = arena.reference(&a);
        let left = arena.attribute(shared, "x");
        let right = arena.attribute(shared, "y");
        let cmp = arena.eq(left, right);

        let mapping = HashMap::from([(a.id, b.clone()), (b.id, c.clone())]);
        arena.replace_variables(&[cmp, left], &mapping).unwrap();
        assert_eq!(arena.render(cmp), "b.x == b.y");
    }

    #[test]
    fn replace_attribute_access_in_place() {
        let mut vars = VariableGenerator::new();
        let e = vars.create_variable("e");
        let w = vars.create_variable("w");
        let mut arena = NodeArena::new();
        let deep = arena.attribute_path(&e, &["props", "weight", "raw"]);
        let one = arena.value(1i64);
        let cmp = arena.eq(deep, one);

        arena
            .replace_attribute_access(&[cmp], &e, &["props".into(), "weight".into()], &w)
            .unwrap();
        assert_eq!(arena.render(cmp), "w.raw == 1");
        assert!(arena
            .replace_attribute_access(&[cmp], &e, &[], &w)
            .is_err());
    }

    #[test]
    fn rollback_releases_new_nodes() {
        let mut arena = NodeArena::new();
        arena.value(1i64);
        let mark = arena.checkpoint();
        arena.value(2i64);
        arena.value(3i64);
        assert_eq!(arena.len(), 3);
        arena.rollback(mark);
        assert_eq!(arena.len(), 1);
    }

    #[test]
    fn render_nested_and() {
        let mut arena = NodeArena::new();
        let empty = arena.and(vec![]);
        assert_eq!(arena.render(empty), "true");
        let a = arena.value(true);
        let b = arena.value(false);
        let inner = arena.and(vec![a, b]);
        let outer = arena.and(vec![inner, a]);
        assert_eq!(arena.render(outer), "(true AND false) AND true");
    }

    #[test]
    fn spec_round_trip() {
        let mut vars = VariableGenerator::new();
        let edge = vars.create_variable("e");
        let mut arena = NodeArena::new();
        let part = label_filter(&mut arena, &edge, "friend");
        let and = arena.and(vec![part]);
        let spec = arena.to_spec(and).unwrap();
        let json = serde_json::to_value(&spec).unwrap();
        assert_eq!(json["type"], "and");
        assert_eq!(json["members"][0]["op"], "==");

        let decoded: NodeSpec = serde_json::from_value(json).unwrap();
        let mut other = NodeArena::new();
        let root = other.from_spec(&decoded);
        assert_eq!(other.render(root), arena.render(and));
        assert_eq!(other.to_spec(root).unwrap(), spec);
    }
}
