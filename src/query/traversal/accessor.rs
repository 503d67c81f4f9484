//! Index accessor compilation for traversal steps.
//!
//! For every (collection, direction) pair of a traversal the compiler asks the
//! index catalog which index serves the direction-specific edge condition,
//! then records everything the executor needs to run that index lookup once
//! per expanded vertex:
//!
//! - the (possibly index-specialized) condition,
//! - the AND member holding the endpoint equality ("member to update"),
//! - a remainder filter for the parts the index does not evaluate,
//! - the operands that must be re-evaluated before each lookup.
//!
//! Depths with extra parts get their own full accessor set. Compilation is
//! all-or-nothing: if any collection lacks a usable index, every node created
//! during the call is released again and no accessor is returned.

use std::collections::BTreeMap;

use tracing::{debug, trace, warn};

use crate::query::ast::{AstNode, CompareOp, NodeArena};
use crate::query::catalog::{IndexCatalog, IndexHandle};
use crate::query::explain::{ExplainNode, ExplainProp};
use crate::query::nonconst::{extract_non_constant_parts, NonConstantParts};
use crate::query::traversal::condition::{DirectionTerms, EdgeConditionBuilder};
use crate::query::traversal::options::CompilerOptions;
use crate::query::variables::Variable;
use crate::types::{NodeId, Result, SombraError, TraversalDirection, VarId};

/// Filter evaluated on every document the index returns.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FilterExpression {
    node: NodeId,
    variables: Vec<VarId>,
}

impl FilterExpression {
    fn compile(arena: &NodeArena, node: NodeId) -> Result<Self> {
        let mut variables = Vec::new();
        arena.collect_variables(node, &mut variables)?;
        Ok(Self { node, variables })
    }

    /// Root AND node of the filter.
    pub fn node(&self) -> NodeId {
        self.node
    }

    /// Variables the filter reads.
    pub fn variables(&self) -> &[VarId] {
        &self.variables
    }
}

/// Index lookup compiled for one (collection, direction) pair.
///
/// Never mutated after compilation, so it can be shared read-only across
/// threads. Only the node behind [`member_to_update`](Self::member_to_update)
/// changes at execution time, through [`bind_vertex`](Self::bind_vertex) on
/// the caller's arena.
#[derive(Clone, Debug)]
pub struct IndexAccessor {
    index: IndexHandle,
    condition: NodeId,
    member_to_update: Option<usize>,
    remainder: Option<FilterExpression>,
    non_constant: NonConstantParts,
    collection: String,
    collection_position: usize,
    direction: TraversalDirection,
    depth: Option<u64>,
}

impl IndexAccessor {
    /// Index chosen by the catalog.
    pub fn index(&self) -> &IndexHandle {
        &self.index
    }

    /// Condition the index evaluates, an AND node owned by this accessor.
    pub fn condition(&self) -> NodeId {
        self.condition
    }

    /// Position of the endpoint equality inside [`condition`](Self::condition).
    pub fn member_to_update(&self) -> Option<usize> {
        self.member_to_update
    }

    /// Parts of the original condition the index does not evaluate.
    pub fn remainder(&self) -> Option<&FilterExpression> {
        self.remainder.as_ref()
    }

    /// Operands that must be re-evaluated before each lookup.
    pub fn non_constant(&self) -> &NonConstantParts {
        &self.non_constant
    }

    /// Edge collection name.
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Ordinal of the collection among the traversal's collections.
    pub fn collection_position(&self) -> usize {
        self.collection_position
    }

    /// Direction this accessor expands.
    pub fn direction(&self) -> TraversalDirection {
        self.direction
    }

    /// Depth the accessor was specialized for, `None` for the base set.
    pub fn depth(&self) -> Option<u64> {
        self.depth
    }

    /// Overwrites the vertex side of the endpoint equality with `id`.
    ///
    /// Returns `false` when the index rewrote the condition so that no single
    /// member holds the equality; the caller must then rebind through the
    /// non-constant parts.
    pub fn bind_vertex(&self, arena: &mut NodeArena, id: &str) -> Result<bool> {
        let Some(position) = self.member_to_update else {
            return Ok(false);
        };
        let member = arena.member(self.condition, position)?;
        let (_, _, vertex) = arena.operands(member)?;
        arena.set_string_value(vertex, id)?;
        Ok(true)
    }

    fn explain(&self, arena: &NodeArena) -> ExplainNode {
        let mut node = ExplainNode::new("IndexAccessor");
        node.props = vec![
            ExplainProp::plain("collection", self.collection.clone()),
            ExplainProp::plain("position", self.collection_position.to_string()),
            ExplainProp::plain("direction", self.direction.as_str()),
            ExplainProp::plain("index", self.index.to_string()),
            ExplainProp::literal("condition", arena.render(self.condition)),
        ];
        if let Some(member) = self.member_to_update {
            node.props
                .push(ExplainProp::plain("member_to_update", member.to_string()));
        }
        if let Some(remainder) = &self.remainder {
            node.props
                .push(ExplainProp::literal("remainder", arena.render(remainder.node)));
        }
        if !self.non_constant.is_empty() {
            node.props.push(ExplainProp::plain(
                "non_constant",
                self.non_constant.len().to_string(),
            ));
        }
        node
    }
}

/// Accessors for the base condition and for every depth with extra parts.
#[derive(Clone, Debug, Default)]
pub struct CompiledAccessors {
    base: Vec<IndexAccessor>,
    by_depth: BTreeMap<u64, Vec<IndexAccessor>>,
}

impl CompiledAccessors {
    /// Accessors used at depths without extra parts, in collection order.
    pub fn base(&self) -> &[IndexAccessor] {
        &self.base
    }

    /// Accessors specialized for `depth`, if that depth has extra parts.
    pub fn depth(&self, depth: u64) -> Option<&[IndexAccessor]> {
        self.by_depth.get(&depth).map(Vec::as_slice)
    }

    /// Accessors an enumerator at `depth` must use.
    pub fn for_depth(&self, depth: u64) -> &[IndexAccessor] {
        self.depth(depth).unwrap_or(&self.base)
    }

    /// Depths with a specialized set, ascending.
    pub fn depths(&self) -> impl Iterator<Item = u64> + '_ {
        self.by_depth.keys().copied()
    }

    /// Total number of accessors across all sets.
    pub fn len(&self) -> usize {
        self.base.len() + self.by_depth.values().map(Vec::len).sum::<usize>()
    }

    /// Whether nothing was compiled.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Explain tree of every accessor, rendered against `arena`.
    pub fn explain(&self, arena: &NodeArena) -> ExplainNode {
        let mut root = ExplainNode::new("TraversalAccessors");
        root.props
            .push(ExplainProp::plain("collections", self.base.len().to_string()));
        root.inputs = self.base.iter().map(|a| a.explain(arena)).collect();
        for (depth, accessors) in &self.by_depth {
            let mut node = ExplainNode::new("DepthAccessors");
            node.props.push(ExplainProp::plain("depth", depth.to_string()));
            node.inputs = accessors.iter().map(|a| a.explain(arena)).collect();
            root.inputs.push(node);
        }
        root
    }

    /// Deterministic fingerprint of [`explain`](Self::explain), usable as a
    /// plan cache key.
    pub fn plan_hash(&self, arena: &NodeArena) -> u64 {
        self.explain(arena).fingerprint()
    }
}

/// Compiles traversal edge conditions into index accessors.
#[derive(Debug)]
pub struct IndexAccessorCompiler<C> {
    catalog: C,
    options: CompilerOptions,
}

impl<C: IndexCatalog> IndexAccessorCompiler<C> {
    /// Compiler with default options.
    pub fn new(catalog: C) -> Self {
        Self::with_options(catalog, CompilerOptions::default())
    }

    /// Compiler with explicit options.
    pub fn with_options(catalog: C, options: CompilerOptions) -> Self {
        Self { catalog, options }
    }

    /// The index catalog consulted for every pair.
    pub fn catalog(&self) -> &C {
        &self.catalog
    }

    /// Options forwarded to the catalog.
    pub fn options(&self) -> &CompilerOptions {
        &self.options
    }

    /// Compiles one accessor per entry of `collections`, plus one full set per
    /// depth registered on `builder`.
    ///
    /// `variable` is the edge variable the builder's conditions read from.
    /// Fails with [`SombraError::NoIndex`] when any collection has no usable
    /// index; `arena` is then restored to its state after the endpoint terms
    /// were built.
    pub fn build_index_accessors<T: DirectionTerms>(
        &self,
        arena: &mut NodeArena,
        builder: &mut EdgeConditionBuilder<T>,
        variable: &Variable,
        collections: &[(String, TraversalDirection)],
    ) -> Result<CompiledAccessors> {
        builder.prepare_terms(arena)?;
        let mark = arena.checkpoint();
        match self.compile_all(arena, builder, variable, collections) {
            Ok(compiled) => {
                debug!(
                    collections = collections.len(),
                    depths = compiled.by_depth.len(),
                    accessors = compiled.len(),
                    "traversal.accessor.compiled"
                );
                Ok(compiled)
            }
            Err(err) => {
                arena.rollback(mark);
                Err(err)
            }
        }
    }

    fn compile_all<T: DirectionTerms>(
        &self,
        arena: &mut NodeArena,
        builder: &mut EdgeConditionBuilder<T>,
        variable: &Variable,
        collections: &[(String, TraversalDirection)],
    ) -> Result<CompiledAccessors> {
        let mut compiled = CompiledAccessors {
            base: self.compile_set(arena, builder, variable, collections, None)?,
            by_depth: BTreeMap::new(),
        };
        let depths: Vec<u64> = builder.depths().collect();
        for depth in depths {
            let accessors = self.compile_set(arena, builder, variable, collections, Some(depth))?;
            compiled.by_depth.insert(depth, accessors);
        }
        Ok(compiled)
    }

    fn compile_set<T: DirectionTerms>(
        &self,
        arena: &mut NodeArena,
        builder: &mut EdgeConditionBuilder<T>,
        variable: &Variable,
        collections: &[(String, TraversalDirection)],
        depth: Option<u64>,
    ) -> Result<Vec<IndexAccessor>> {
        let mut accessors = Vec::with_capacity(collections.len());
        for (position, (collection, direction)) in collections.iter().enumerate() {
            let condition = match depth {
                Some(depth) => builder.clone_condition_for_depth(arena, *direction, depth)?,
                None => builder.clone_condition(arena, *direction)?,
            };
            accessors.push(self.compile_one(
                arena, condition, variable, collection, position, *direction, depth,
            )?);
        }
        Ok(accessors)
    }

    #[allow(clippy::too_many_arguments)]
    fn compile_one(
        &self,
        arena: &mut NodeArena,
        condition: NodeId,
        variable: &Variable,
        collection: &str,
        position: usize,
        direction: TraversalDirection,
        depth: Option<u64>,
    ) -> Result<IndexAccessor> {
        let original = arena.clone_subtree(condition)?;
        let index = self.catalog.best_index(
            arena,
            collection,
            condition,
            variable,
            self.options.estimated_items,
            &self.options.index_hint,
            self.options.only_edge_indexes,
        )?;
        let Some(index) = index else {
            warn!(collection, direction = %direction, ?depth, "traversal.accessor.no_index");
            return Err(SombraError::NoIndex {
                collection: collection.to_owned(),
                direction,
            });
        };

        let member_to_update = find_member_to_update(arena, condition, variable, direction)?;
        let remainder = split_remainder(arena, condition, original)?;
        let non_constant = extract_non_constant_parts(arena, condition, variable)?;
        trace!(
            collection,
            direction = %direction,
            ?depth,
            index = %index.name,
            ?member_to_update,
            remainder = remainder.is_some(),
            non_constant = non_constant.len(),
            "traversal.accessor.index"
        );
        Ok(IndexAccessor {
            index,
            condition,
            member_to_update,
            remainder,
            non_constant,
            collection: collection.to_owned(),
            collection_position: position,
            direction,
            depth,
        })
    }
}

/// Position of the `variable.<endpoint> == ..` member of `condition`.
fn find_member_to_update(
    arena: &NodeArena,
    condition: NodeId,
    variable: &Variable,
    direction: TraversalDirection,
) -> Result<Option<usize>> {
    let endpoint = direction.endpoint_attribute();
    for (position, member) in arena.members(condition)?.iter().enumerate() {
        let AstNode::Compare {
            op: CompareOp::Eq,
            lhs,
            ..
        } = arena.get(*member)?
        else {
            continue;
        };
        let matches = arena
            .attribute_access_on(*lhs)
            .is_some_and(|(var, path)| var.id == variable.id && path.as_slice() == [endpoint]);
        if matches {
            return Ok(Some(position));
        }
    }
    Ok(None)
}

/// Strips every member of `original` the index condition already covers and
/// returns what is left as a filter.
fn split_remainder(
    arena: &mut NodeArena,
    condition: NodeId,
    original: NodeId,
) -> Result<Option<FilterExpression>> {
    let covered = arena.members(condition)?.to_vec();
    let mut position = arena.num_members(original)?;
    while position > 0 {
        position -= 1;
        let member = arena.member(original, position)?;
        if covered.iter().any(|c| arena.same_condition(*c, member)) {
            arena.remove_member(original, position)?;
        }
    }
    if arena.num_members(original)? == 0 {
        return Ok(None);
    }
    Ok(Some(FilterExpression::compile(arena, original)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::catalog::{InMemoryIndexCatalog, IndexKind};
    use crate::query::traversal::condition::VariableTerms;
    use crate::query::variables::VariableGenerator;

    struct Planner {
        arena: NodeArena,
        edge: Variable,
        vertex: Variable,
        builder: EdgeConditionBuilder<VariableTerms>,
    }

    fn planner() -> Planner {
        let mut vars = VariableGenerator::new();
        let edge = vars.create_variable("e");
        let vertex = vars.create_temporary_variable();
        let mut arena = NodeArena::new();
        let builder =
            EdgeConditionBuilder::new(&mut arena, VariableTerms::new(edge.clone(), vertex.clone()));
        Planner {
            arena,
            edge,
            vertex,
            builder,
        }
    }

    fn add_label(p: &mut Planner, label: &str) {
        let access = p.arena.attribute_path(&p.edge, &["label"]);
        let value = p.arena.value(label);
        let part = p.arena.eq(access, value);
        p.builder.add_condition_part(&mut p.arena, part).unwrap();
    }

    fn pairs(names: &[(&str, TraversalDirection)]) -> Vec<(String, TraversalDirection)> {
        names.iter().map(|(n, d)| (n.to_string(), *d)).collect()
    }

    #[test]
    fn edge_index_leaves_filter_as_remainder() {
        let mut p = planner();
        add_label(&mut p, "friend");
        let compiler = IndexAccessorCompiler::new(InMemoryIndexCatalog::new().with_edge_index("knows"));
        let compiled = compiler
            .build_index_accessors(
                &mut p.arena,
                &mut p.builder,
                &p.edge,
                &pairs(&[("knows", TraversalDirection::Outbound)]),
            )
            .unwrap();

        let accessor = &compiled.base()[0];
        assert_eq!(accessor.index().kind, IndexKind::Edge);
        assert_eq!(
            p.arena.render(accessor.condition()),
            format!("e.from == {}", p.vertex.name)
        );
        assert_eq!(accessor.member_to_update(), Some(0));
        let remainder = accessor.remainder().unwrap();
        assert_eq!(p.arena.render(remainder.node()), "e.label == \"friend\"");
        assert_eq!(remainder.variables(), &[p.edge.id]);
        assert_eq!(accessor.non_constant().len(), 1);
        assert_eq!(accessor.non_constant().variables(), vec![p.vertex.id]);
    }

    #[test]
    fn covering_index_has_no_remainder() {
        let mut p = planner();
        add_label(&mut p, "friend");
        let catalog = InMemoryIndexCatalog::new().with_edge_index("knows").with_index(
            "knows",
            "by_to_label",
            IndexKind::Persistent,
            ["to", "label"],
        );
        let compiler = IndexAccessorCompiler::new(catalog);
        let compiled = compiler
            .build_index_accessors(
                &mut p.arena,
                &mut p.builder,
                &p.edge,
                &pairs(&[("knows", TraversalDirection::Inbound)]),
            )
            .unwrap();
        let accessor = &compiled.base()[0];
        assert_eq!(accessor.index().name, "by_to_label");
        assert!(accessor.remainder().is_none());
        assert_eq!(accessor.member_to_update(), Some(1));
        assert_eq!(accessor.direction(), TraversalDirection::Inbound);
    }

    #[test]
    fn missing_index_rolls_back_everything() {
        let mut p = planner();
        add_label(&mut p, "friend");
        p.builder.prepare_terms(&mut p.arena).unwrap();
        let nodes = p.arena.len();
        let compiler = IndexAccessorCompiler::new(InMemoryIndexCatalog::new().with_edge_index("knows"));
        let err = compiler
            .build_index_accessors(
                &mut p.arena,
                &mut p.builder,
                &p.edge,
                &pairs(&[
                    ("knows", TraversalDirection::Outbound),
                    ("likes", TraversalDirection::Outbound),
                ]),
            )
            .unwrap_err();
        assert!(matches!(err, SombraError::NoIndex { ref collection, .. } if collection == "likes"));
        assert!(err.is_internal());
        assert_eq!(p.arena.len(), nodes);
    }

    #[test]
    fn bind_vertex_patches_in_place() {
        let mut p = planner();
        let compiler = IndexAccessorCompiler::new(InMemoryIndexCatalog::new().with_edge_index("knows"));
        let compiled = compiler
            .build_index_accessors(
                &mut p.arena,
                &mut p.builder,
                &p.edge,
                &pairs(&[("knows", TraversalDirection::Outbound)]),
            )
            .unwrap();
        let accessor = &compiled.base()[0];
        let nodes = p.arena.len();
        assert!(accessor.bind_vertex(&mut p.arena, "vertices/A").unwrap());
        assert!(accessor.bind_vertex(&mut p.arena, "vertices/B").unwrap());
        assert_eq!(p.arena.len(), nodes);
        assert_eq!(
            p.arena.render(accessor.condition()),
            "e.from == \"vertices/B\""
        );
    }

    #[test]
    fn depth_sets_and_explain() {
        let mut p = planner();
        let weight = {
            let access = p.arena.attribute_path(&p.edge, &["weight"]);
            let three = p.arena.value(3i64);
            p.arena.compare(CompareOp::Lt, access, three)
        };
        p.builder.add_condition_for_depth(&p.arena, weight, 2).unwrap();
        let compiler = IndexAccessorCompiler::new(InMemoryIndexCatalog::new().with_edge_index("knows"));
        let compiled = compiler
            .build_index_accessors(
                &mut p.arena,
                &mut p.builder,
                &p.edge,
                &pairs(&[("knows", TraversalDirection::Inbound)]),
            )
            .unwrap();

        assert_eq!(compiled.len(), 2);
        assert_eq!(compiled.depths().collect::<Vec<_>>(), vec![2]);
        assert!(compiled.base()[0].remainder().is_none());
        let deep = &compiled.for_depth(2)[0];
        assert_eq!(deep.depth(), Some(2));
        assert_eq!(
            p.arena.render(deep.remainder().unwrap().node()),
            "e.weight < 3"
        );
        assert_eq!(compiled.for_depth(1)[0].depth(), None);

        let explain = compiled.explain(&p.arena);
        assert_eq!(explain.inputs.len(), 2);
        assert_eq!(explain.inputs[1].prop("depth"), Some("2"));
        assert_eq!(compiled.plan_hash(&p.arena), compiled.plan_hash(&p.arena));
    }

    #[test]
    fn accessors_are_shareable() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<IndexAccessor>();
        assert_send_sync::<CompiledAccessors>();
    }
}
