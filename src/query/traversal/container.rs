//! Edge condition builder that owns every node it references.
//!
//! The container keeps its own [`NodeArena`], a placeholder edge variable and
//! one string literal standing for the current vertex. Both endpoint terms
//! point at that literal, so moving a traversal enumerator to the next vertex
//! is a single [`set_vertex_id`](EdgeConditionBuilderContainer::set_vertex_id)
//! call.
//!
//! A container is not `Clone`. Each concurrently running enumerator owns its
//! own instance.

use std::collections::HashMap;

use crate::query::ast::{AstNode, NodeArena};
use crate::query::catalog::IndexCatalog;
use crate::query::traversal::accessor::{CompiledAccessors, IndexAccessorCompiler};
use crate::query::traversal::condition::{DirectionTerms, EdgeConditionBuilder};
use crate::query::traversal::spec::EdgeConditionsSpec;
use crate::query::value::Value;
use crate::query::variables::{Variable, VariableGenerator};
use crate::types::{NodeId, Result, TraversalDirection, VarId};

/// Name of the placeholder edge variable.
pub const EDGE_VARIABLE: &str = "edge";

/// Endpoint terms over the container's edge reference and vertex literal.
#[derive(Debug)]
pub struct ContainerTerms {
    edge_ref: NodeId,
    vertex: NodeId,
}

impl ContainerTerms {
    fn allocate(arena: &mut NodeArena, variable: &Variable) -> Self {
        let edge_ref = arena.reference(variable);
        let vertex = arena.value("");
        Self { edge_ref, vertex }
    }

    fn endpoint_term(&self, arena: &mut NodeArena, direction: TraversalDirection) -> NodeId {
        let access = arena.attribute(self.edge_ref, direction.endpoint_attribute());
        arena.eq(access, self.vertex)
    }
}

impl DirectionTerms for ContainerTerms {
    fn build_from(&self, arena: &mut NodeArena) -> Result<NodeId> {
        Ok(self.endpoint_term(arena, TraversalDirection::Outbound))
    }

    fn build_to(&self, arena: &mut NodeArena) -> Result<NodeId> {
        Ok(self.endpoint_term(arena, TraversalDirection::Inbound))
    }
}

/// Self-contained edge condition builder.
#[derive(Debug)]
pub struct EdgeConditionBuilderContainer {
    arena: NodeArena,
    variables: VariableGenerator,
    variable: Variable,
    builder: EdgeConditionBuilder<ContainerTerms>,
}

impl Default for EdgeConditionBuilderContainer {
    fn default() -> Self {
        Self::new()
    }
}

impl EdgeConditionBuilderContainer {
    /// Creates an empty container bound to the vertex id `""`.
    pub fn new() -> Self {
        let mut variables = VariableGenerator::new();
        let variable = variables.create_variable(EDGE_VARIABLE);
        let mut arena = NodeArena::with_capacity(16);
        let terms = ContainerTerms::allocate(&mut arena, &variable);
        let builder = EdgeConditionBuilder::new(&mut arena, terms);
        Self {
            arena,
            variables,
            variable,
            builder,
        }
    }

    /// Rebuilds a container from a serialized document.
    ///
    /// Every variable mentioned in the document is registered so variables
    /// issued later never collide with it.
    pub fn from_spec(spec: &EdgeConditionsSpec) -> Result<Self> {
        let mut variables = VariableGenerator::new();
        let mut mentioned = Vec::new();
        for part in &spec.global_edge_conditions {
            part.for_each_variable(&mut |v| mentioned.push(v.clone()));
        }
        for part in spec.edge_conditions.values() {
            part.for_each_variable(&mut |v| mentioned.push(v.clone()));
        }
        let edge = mentioned.iter().find(|v| v.name == EDGE_VARIABLE).cloned();
        for var in &mentioned {
            variables.register(var);
        }
        let variable = match edge {
            Some(edge) => edge,
            None => variables.create_variable(EDGE_VARIABLE),
        };

        let mut arena = NodeArena::with_capacity(16);
        let terms = ContainerTerms::allocate(&mut arena, &variable);
        let builder = EdgeConditionBuilder::from_spec(&mut arena, terms, spec)?;
        Ok(Self {
            arena,
            variables,
            variable,
            builder,
        })
    }

    /// Parses a JSON document, see [`from_spec`](Self::from_spec).
    pub fn from_json(text: &str) -> Result<Self> {
        Self::from_spec(&EdgeConditionsSpec::from_json(text)?)
    }

    /// Serializable document of the global and per-depth parts.
    pub fn to_spec(&self) -> Result<EdgeConditionsSpec> {
        self.builder.to_spec(&self.arena)
    }

    /// Compact JSON rendering of [`to_spec`](Self::to_spec).
    pub fn to_json(&self) -> Result<String> {
        self.to_spec()?.to_json()
    }

    /// The placeholder edge variable every term reads from.
    pub fn variable(&self) -> &Variable {
        &self.variable
    }

    /// Issues another variable without colliding with the edge placeholder.
    pub fn create_variable(&mut self, name: &str) -> Variable {
        self.variables.create_variable(name)
    }

    /// The container's node pool.
    pub fn arena(&self) -> &NodeArena {
        &self.arena
    }

    /// Mutable access to the node pool, e.g. for building parts in place.
    pub fn arena_mut(&mut self) -> &mut NodeArena {
        &mut self.arena
    }

    /// The wrapped builder.
    pub fn builder(&self) -> &EdgeConditionBuilder<ContainerTerms> {
        &self.builder
    }

    /// Vertex id both endpoint terms currently compare against.
    pub fn vertex_id(&self) -> Option<&str> {
        match self.arena.get(self.builder.terms().vertex) {
            Ok(AstNode::Value(value)) => value.as_str(),
            _ => None,
        }
    }

    /// Rebinds the vertex literal in place. No node is allocated.
    pub fn set_vertex_id(&mut self, id: &str) -> Result<()> {
        let vertex = self.builder.terms().vertex;
        self.arena.set_string_value(vertex, id)
    }

    /// Builds `edge.<path...> == value` inside the container's arena.
    pub fn attribute_equals(&mut self, path: &[&str], value: impl Into<Value>) -> NodeId {
        let access = self.arena.attribute_path(&self.variable, path);
        let value = self.arena.value(value);
        self.arena.eq(access, value)
    }

    /// Appends a part that already lives in the container's arena.
    pub fn add_condition_part(&mut self, part: NodeId) -> Result<()> {
        self.builder.add_condition_part(&mut self.arena, part)
    }

    /// Copies `part` out of a foreign arena and appends it.
    pub fn add_condition_part_from(&mut self, source: &NodeArena, part: NodeId) -> Result<NodeId> {
        let local = source.clone_into(part, &mut self.arena)?;
        self.add_condition_part(local)?;
        Ok(local)
    }

    /// Registers a part (already in the container's arena) for `depth`.
    pub fn add_condition_for_depth(&mut self, part: NodeId, depth: u64) -> Result<()> {
        self.builder.add_condition_for_depth(&self.arena, part, depth)
    }

    /// Copies `part` out of a foreign arena and registers it for `depth`.
    pub fn add_condition_for_depth_from(
        &mut self,
        source: &NodeArena,
        part: NodeId,
        depth: u64,
    ) -> Result<NodeId> {
        let local = source.clone_into(part, &mut self.arena)?;
        self.add_condition_for_depth(local, depth)?;
        Ok(local)
    }

    /// Base condition with `edge.from == <vertex>` attached.
    pub fn outbound_condition(&mut self) -> Result<NodeId> {
        self.builder.outbound_condition(&mut self.arena)
    }

    /// Base condition with `edge.to == <vertex>` attached.
    pub fn inbound_condition(&mut self) -> Result<NodeId> {
        self.builder.inbound_condition(&mut self.arena)
    }

    /// Base condition with the term for `direction` attached.
    pub fn condition(&mut self, direction: TraversalDirection) -> Result<NodeId> {
        self.builder.condition(&mut self.arena, direction)
    }

    /// Independent copy for `direction`, extended with the parts of `depth`
    /// when given.
    pub fn clone_condition(
        &mut self,
        direction: TraversalDirection,
        depth: Option<u64>,
    ) -> Result<NodeId> {
        match depth {
            Some(depth) => self
                .builder
                .clone_condition_for_depth(&mut self.arena, direction, depth),
            None => self.builder.clone_condition(&mut self.arena, direction),
        }
    }

    /// Substitutes variables in every stored condition.
    pub fn replace_variables(&mut self, mapping: &HashMap<VarId, Variable>) -> Result<()> {
        // Terms built later would still read the old edge reference.
        self.builder.prepare_terms(&mut self.arena)?;
        self.builder.replace_variables(&mut self.arena, mapping)?;
        if let Some(renamed) = mapping.get(&self.variable.id) {
            self.variables.register(renamed);
            self.variable = renamed.clone();
        }
        Ok(())
    }

    /// Replaces `search.path...` accesses with references to `replacement` in
    /// every stored condition, including endpoint terms not built yet.
    pub fn replace_attribute_access(
        &mut self,
        search: &Variable,
        path: &[String],
        replacement: &Variable,
    ) -> Result<()> {
        self.builder.prepare_terms(&mut self.arena)?;
        self.variables.register(replacement);
        self.builder
            .replace_attribute_access(&mut self.arena, search, path, replacement)
    }

    /// Compiles index accessors over the container's own arena and variable.
    pub fn build_index_accessors<C: IndexCatalog>(
        &mut self,
        compiler: &IndexAccessorCompiler<C>,
        collections: &[(String, TraversalDirection)],
    ) -> Result<CompiledAccessors> {
        compiler.build_index_accessors(
            &mut self.arena,
            &mut self.builder,
            &self.variable,
            collections,
        )
    }

    /// Renders a node of the container's arena.
    pub fn render(&self, node: NodeId) -> String {
        self.arena.render(node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outbound_without_parts_is_single_term() {
        let mut container = EdgeConditionBuilderContainer::new();
        container.set_vertex_id("vertices/A").unwrap();
        let cond = container.outbound_condition().unwrap();
        assert_eq!(container.arena().num_members(cond).unwrap(), 1);
        assert_eq!(container.render(cond), "edge.from == \"vertices/A\"");
    }

    #[test]
    fn label_then_inbound() {
        let mut container = EdgeConditionBuilderContainer::new();
        container.set_vertex_id("vertices/A").unwrap();
        let label = container.attribute_equals(&["label"], "friend");
        container.add_condition_part(label).unwrap();
        let cond = container.inbound_condition().unwrap();
        assert_eq!(
            container.render(cond),
            "edge.label == \"friend\" AND edge.to == \"vertices/A\""
        );
    }

    #[test]
    fn rebinding_allocates_nothing() {
        let mut container = EdgeConditionBuilderContainer::new();
        container.set_vertex_id("vertices/A").unwrap();
        let first = container.outbound_condition().unwrap();
        let first_render = container.render(first);
        let nodes = container.arena().len();

        container.set_vertex_id("vertices/B").unwrap();
        assert_eq!(container.arena().len(), nodes);
        let second = container.outbound_condition().unwrap();
        assert_eq!(first, second);
        assert_eq!(container.arena().len(), nodes);
        assert_eq!(first_render.replace("vertices/A", "vertices/B"), container.render(second));
        assert_eq!(container.vertex_id(), Some("vertices/B"));
    }

    #[test]
    fn both_terms_share_the_literal() {
        let mut container = EdgeConditionBuilderContainer::new();
        container.outbound_condition().unwrap();
        container.set_vertex_id("vertices/C").unwrap();
        let cond = container.inbound_condition().unwrap();
        assert_eq!(container.render(cond), "edge.to == \"vertices/C\"");
    }

    #[test]
    fn parts_from_foreign_arena_are_copied() {
        let mut container = EdgeConditionBuilderContainer::new();
        let mut planner = NodeArena::new();
        let access = planner.attribute_path(container.variable(), &["weight"]);
        let three = planner.value(3i64);
        let part = planner.eq(access, three);

        let local = container.add_condition_part_from(&planner, part).unwrap();
        planner.set_string_value(three, "changed").unwrap();
        assert_eq!(container.render(local), "edge.weight == 3");
    }

    #[test]
    fn json_round_trip() {
        let mut container = EdgeConditionBuilderContainer::new();
        let label = container.attribute_equals(&["label"], "friend");
        container.add_condition_part(label).unwrap();
        let weight = container.attribute_equals(&["weight"], 2i64);
        container.add_condition_for_depth(weight, 3).unwrap();
        container.outbound_condition().unwrap();

        let json = container.to_json().unwrap();
        let restored = EdgeConditionBuilderContainer::from_json(&json).unwrap();
        assert_eq!(restored.to_json().unwrap(), json);
        assert_eq!(restored.variable(), container.variable());
        assert_eq!(restored.builder().depths().collect::<Vec<_>>(), vec![3]);
    }
}
