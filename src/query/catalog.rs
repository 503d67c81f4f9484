//! Index catalog interface consulted when compiling traversal conditions.
//!
//! The planner only needs one question answered: which index of a collection
//! serves a given AND condition best. The answer may also specialize the
//! condition, dropping the members the index cannot evaluate and moving the
//! indexed attribute to the left of each comparison it keeps.

use std::collections::HashMap;
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

use serde::Deserialize;
use tracing::trace;

use crate::query::ast::{AstNode, CompareOp, NodeArena};
use crate::query::variables::Variable;
use crate::types::{NodeId, Result, FROM_ATTRIBUTE, TO_ATTRIBUTE};

/// Index implementations a collection may carry.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum IndexKind {
    /// System index on the edge endpoints, present on every edge collection.
    Edge,
    /// Sorted index; serves equality prefixes and one trailing range.
    Persistent,
    /// Hash index; only serves equality on all of its fields.
    Hash,
}

impl IndexKind {
    /// Lowercase name used in explain output.
    pub const fn as_str(self) -> &'static str {
        match self {
            IndexKind::Edge => "edge",
            IndexKind::Persistent => "persistent",
            IndexKind::Hash => "hash",
        }
    }

    fn selectivity(self) -> f64 {
        match self {
            IndexKind::Edge => 0.1,
            IndexKind::Persistent => 0.05,
            IndexKind::Hash => 0.01,
        }
    }
}

/// Static description of one index.
#[derive(Clone, Debug, PartialEq)]
pub struct IndexDescriptor {
    /// Catalog-assigned identifier.
    pub id: u64,
    /// Index name, unique within its collection.
    pub name: String,
    /// Owning collection.
    pub collection: String,
    /// Index implementation.
    pub kind: IndexKind,
    /// Indexed attributes in index order.
    pub fields: Vec<String>,
}

/// Shared, read-only handle to an index descriptor.
#[derive(Clone, Debug)]
pub struct IndexHandle(Arc<IndexDescriptor>);

impl IndexHandle {
    /// Wraps a descriptor.
    pub fn new(descriptor: IndexDescriptor) -> Self {
        Self(Arc::new(descriptor))
    }
}

impl Deref for IndexHandle {
    type Target = IndexDescriptor;

    fn deref(&self) -> &IndexDescriptor {
        &self.0
    }
}

impl PartialEq for IndexHandle {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0) || *self.0 == *other.0
    }
}

impl fmt::Display for IndexHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{} ({})", self.collection, self.name, self.kind.as_str())
    }
}

/// Caller preference for a specific index.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(from = "Option<String>")]
pub enum IndexHint {
    /// Let the catalog decide.
    #[default]
    None,
    /// Prefer the named index when it can serve the condition at all.
    Named(String),
}

impl From<Option<String>> for IndexHint {
    fn from(value: Option<String>) -> Self {
        match value {
            Some(name) => IndexHint::Named(name),
            None => IndexHint::None,
        }
    }
}

/// Oracle that selects the index serving a condition best.
pub trait IndexCatalog {
    /// Picks the best index of `collection` for the AND node `condition`,
    /// whose documents are bound to `variable`.
    ///
    /// On success the condition may have been rewritten in place so that it
    /// only contains what the returned index evaluates. Returns `Ok(None)`
    /// when no index of the collection is usable.
    #[allow(clippy::too_many_arguments)]
    fn best_index(
        &self,
        arena: &mut NodeArena,
        collection: &str,
        condition: NodeId,
        variable: &Variable,
        estimated_items: usize,
        hint: &IndexHint,
        only_edge_indexes: bool,
    ) -> Result<Option<IndexHandle>>;
}

/// Simple in-memory catalog used for tests or prototyping.
#[derive(Debug, Default)]
pub struct InMemoryIndexCatalog {
    indexes: HashMap<String, Vec<IndexHandle>>,
    next_id: u64,
}

impl InMemoryIndexCatalog {
    /// Creates an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the endpoint index every edge collection carries.
    pub fn with_edge_index(self, collection: impl Into<String>) -> Self {
        self.with_index(
            collection,
            "edge",
            IndexKind::Edge,
            [FROM_ATTRIBUTE, TO_ATTRIBUTE],
        )
    }

    /// Registers a user index over `fields`.
    pub fn with_index<I, S>(
        mut self,
        collection: impl Into<String>,
        name: impl Into<String>,
        kind: IndexKind,
        fields: I,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let collection = collection.into();
        self.next_id += 1;
        let handle = IndexHandle::new(IndexDescriptor {
            id: self.next_id,
            name: name.into(),
            collection: collection.clone(),
            kind,
            fields: fields.into_iter().map(Into::into).collect(),
        });
        self.indexes.entry(collection).or_default().push(handle);
        self
    }

    /// Indexes registered for `collection`.
    pub fn indexes(&self, collection: &str) -> &[IndexHandle] {
        self.indexes
            .get(collection)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }
}

impl IndexCatalog for InMemoryIndexCatalog {
    fn best_index(
        &self,
        arena: &mut NodeArena,
        collection: &str,
        condition: NodeId,
        variable: &Variable,
        estimated_items: usize,
        hint: &IndexHint,
        only_edge_indexes: bool,
    ) -> Result<Option<IndexHandle>> {
        let terms = indexable_terms(arena, condition, variable)?;
        let mut best: Option<(&IndexHandle, Vec<usize>, f64)> = None;
        for index in self.indexes(collection) {
            if only_edge_indexes && index.kind != IndexKind::Edge {
                continue;
            }
            let covered = coverage(index, &terms);
            if covered.is_empty() {
                continue;
            }
            if matches!(hint, IndexHint::Named(name) if *name == index.name) {
                best = Some((index, covered, f64::MIN));
                break;
            }
            let cost = estimated_items.max(1) as f64
                * index.kind.selectivity().powi(covered.len() as i32);
            if best.as_ref().map_or(true, |(_, _, c)| cost < *c) {
                best = Some((index, covered, cost));
            }
        }
        let Some((index, covered, _)) = best else {
            trace!(collection, "catalog.best_index.none");
            return Ok(None);
        };
        specialize(arena, condition, &terms, &covered)?;
        trace!(
            collection,
            index = %index.name,
            covered = covered.len(),
            "catalog.best_index"
        );
        Ok(Some(index.clone()))
    }
}

/// Comparison member that reads one top-level attribute of the index variable.
#[derive(Debug)]
struct Term {
    member: usize,
    field: String,
    op: CompareOp,
    /// Whether the attribute sits on the right and must be swapped left.
    swapped: bool,
}

fn indexable_terms(
    arena: &NodeArena,
    condition: NodeId,
    variable: &Variable,
) -> Result<Vec<Term>> {
    let mut terms = Vec::new();
    for (member, node) in arena.members(condition)?.iter().enumerate() {
        let AstNode::Compare { op, lhs, rhs } = arena.get(*node)? else {
            continue;
        };
        let field_of = |side: NodeId| {
            arena
                .attribute_access_on(side)
                .filter(|(var, path)| var.id == variable.id && path.len() == 1)
                .map(|(_, path)| path[0].to_owned())
        };
        let (field, other, swapped) = match (field_of(*lhs), field_of(*rhs)) {
            (Some(field), None) => (field, *rhs, false),
            (None, Some(field)) => (field, *lhs, true),
            _ => continue,
        };
        if arena.references_variable(other, variable.id)? || *op == CompareOp::Ne {
            continue;
        }
        terms.push(Term {
            member,
            field,
            op: if swapped { op.mirrored() } else { *op },
            swapped,
        });
    }
    Ok(terms)
}

/// Member positions of `terms` the index evaluates, empty when unusable.
fn coverage(index: &IndexDescriptor, terms: &[Term]) -> Vec<usize> {
    let equality = |field: &str| {
        terms
            .iter()
            .find(|t| t.op == CompareOp::Eq && t.field == field)
            .map(|t| t.member)
    };
    match index.kind {
        IndexKind::Edge => index
            .fields
            .iter()
            .find_map(|field| equality(field.as_str()))
            .into_iter()
            .collect(),
        IndexKind::Hash => index
            .fields
            .iter()
            .map(|field| equality(field.as_str()))
            .collect::<Option<Vec<_>>>()
            .unwrap_or_default(),
        IndexKind::Persistent => {
            let mut covered = Vec::new();
            for field in &index.fields {
                if let Some(member) = equality(field.as_str()) {
                    covered.push(member);
                    continue;
                }
                covered.extend(
                    terms
                        .iter()
                        .filter(|t| t.field == *field && t.op != CompareOp::Eq)
                        .map(|t| t.member),
                );
                break;
            }
            covered
        }
    }
}

/// Drops uncovered members and normalizes covered comparisons.
fn specialize(
    arena: &mut NodeArena,
    condition: NodeId,
    terms: &[Term],
    covered: &[usize],
) -> Result<()> {
    for term in terms {
        if term.swapped && covered.contains(&term.member) {
            let node = arena.member(condition, term.member)?;
            arena.swap_operands(node)?;
        }
    }
    for index in (0..arena.num_members(condition)?).rev() {
        if !covered.contains(&index) {
            arena.remove_member(condition, index)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::variables::VariableGenerator;

    struct Fixture {
        arena: NodeArena,
        edge: Variable,
        vertex: Variable,
    }

    fn fixture() -> Fixture {
        let mut vars = VariableGenerator::new();
        Fixture {
            arena: NodeArena::new(),
            edge: vars.create_variable("e"),
            vertex: vars.create_temporary_variable(),
        }
    }

    impl Fixture {
        fn eq_attr(&mut self, field: &str, value: &str) -> NodeId {
            let access = self.arena.attribute_path(&self.edge, &[field]);
            let lit = self.arena.value(value);
            self.arena.eq(access, lit)
        }

        fn from_vertex(&mut self, reversed: bool) -> NodeId {
            let access = self.arena.attribute_path(&self.edge, &[FROM_ATTRIBUTE]);
            let vertex = self.arena.reference(&self.vertex);
            if reversed {
                self.arena.eq(vertex, access)
            } else {
                self.arena.eq(access, vertex)
            }
        }
    }

    #[test]
    fn edge_index_keeps_only_endpoint_member() {
        let mut fx = fixture();
        let label = fx.eq_attr("label", "friend");
        let from = fx.from_vertex(false);
        let cond = fx.arena.and(vec![label, from]);
        let catalog = InMemoryIndexCatalog::new().with_edge_index("knows");

        let index = catalog
            .best_index(&mut fx.arena, "knows", cond, &fx.edge, 1000, &IndexHint::None, false)
            .unwrap()
            .unwrap();
        assert_eq!(index.kind, IndexKind::Edge);
        assert_eq!(fx.arena.members(cond).unwrap(), &[from]);
    }

    #[test]
    fn normalizes_reversed_comparison() {
        let mut fx = fixture();
        let from = fx.from_vertex(true);
        let cond = fx.arena.and(vec![from]);
        let catalog = InMemoryIndexCatalog::new().with_edge_index("knows");
        catalog
            .best_index(&mut fx.arena, "knows", cond, &fx.edge, 1000, &IndexHint::None, false)
            .unwrap()
            .unwrap();
        let rendered = fx.arena.render(cond);
        assert!(rendered.starts_with("e.from == #"), "{rendered}");
    }

    #[test]
    fn prefers_more_selective_persistent_index() {
        let mut fx = fixture();
        let from = fx.from_vertex(false);
        let label = fx.eq_attr("label", "friend");
        let cond = fx.arena.and(vec![from, label]);
        let catalog = InMemoryIndexCatalog::new()
            .with_edge_index("knows")
            .with_index("knows", "by_from_label", IndexKind::Persistent, ["from", "label"]);

        let index = catalog
            .best_index(&mut fx.arena, "knows", cond, &fx.edge, 1000, &IndexHint::None, false)
            .unwrap()
            .unwrap();
        assert_eq!(index.name, "by_from_label");
        assert_eq!(fx.arena.num_members(cond).unwrap(), 2);
    }

    #[test]
    fn edge_only_flag_ignores_user_indexes() {
        let mut fx = fixture();
        let from = fx.from_vertex(false);
        let label = fx.eq_attr("label", "friend");
        let cond = fx.arena.and(vec![from, label]);
        let catalog = InMemoryIndexCatalog::new()
            .with_edge_index("knows")
            .with_index("knows", "by_from_label", IndexKind::Persistent, ["from", "label"]);
        let index = catalog
            .best_index(&mut fx.arena, "knows", cond, &fx.edge, 1000, &IndexHint::None, true)
            .unwrap()
            .unwrap();
        assert_eq!(index.kind, IndexKind::Edge);
    }

    #[test]
    fn hint_wins_when_usable() {
        let mut fx = fixture();
        let from = fx.from_vertex(false);
        let label = fx.eq_attr("label", "friend");
        let cond = fx.arena.and(vec![from, label]);
        let catalog = InMemoryIndexCatalog::new()
            .with_index("knows", "by_from_label", IndexKind::Hash, ["from", "label"])
            .with_edge_index("knows");
        let hint = IndexHint::Named("edge".into());
        let index = catalog
            .best_index(&mut fx.arena, "knows", cond, &fx.edge, 1000, &hint, false)
            .unwrap()
            .unwrap();
        assert_eq!(index.name, "edge");
    }

    #[test]
    fn hash_index_needs_every_field() {
        let mut fx = fixture();
        let label = fx.eq_attr("label", "friend");
        let cond = fx.arena.and(vec![label]);
        let catalog = InMemoryIndexCatalog::new().with_index(
            "knows",
            "by_label_kind",
            IndexKind::Hash,
            ["label", "kind"],
        );
        let found = catalog
            .best_index(&mut fx.arena, "knows", cond, &fx.edge, 1000, &IndexHint::None, false)
            .unwrap();
        assert!(found.is_none());
        assert_eq!(fx.arena.num_members(cond).unwrap(), 1);
    }

    #[test]
    fn unknown_collection_has_no_index() {
        let mut fx = fixture();
        let from = fx.from_vertex(false);
        let cond = fx.arena.and(vec![from]);
        let catalog = InMemoryIndexCatalog::new();
        assert!(catalog
            .best_index(&mut fx.arena, "missing", cond, &fx.edge, 1000, &IndexHint::None, false)
            .unwrap()
            .is_none());
    }

    #[test]
    fn index_hint_deserializes_from_optional_name() {
        let hint: IndexHint = serde_json::from_str("\"edge\"").unwrap();
        assert_eq!(hint, IndexHint::Named("edge".into()));
        let hint: IndexHint = serde_json::from_str("null").unwrap();
        assert_eq!(hint, IndexHint::None);
    }
}
