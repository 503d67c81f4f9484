//! Direction- and depth-aware edge condition builder.
//!
//! The builder keeps one AND node (the base condition) holding the
//! direction-independent filter parts. The first time a direction is
//! requested, the matching endpoint term (`e.from == ..` or `e.to == ..`) is
//! appended; every later request swaps that trailing member in place instead
//! of rebuilding the conjunction.
//!
//! Nodes are never owned by the builder. They live in a [`NodeArena`] that the
//! caller passes to every operation; the builder only stores ids.

use std::collections::{BTreeMap, HashMap};

use tracing::trace;

use crate::query::ast::NodeArena;
use crate::query::traversal::spec::EdgeConditionsSpec;
use crate::query::variables::Variable;
use crate::types::{NodeId, Result, SombraError, TraversalDirection, VarId};

/// Builds the endpoint equality for each direction.
///
/// The planner compares the endpoint against a vertex variable
/// ([`VariableTerms`]); a standalone container compares against a literal it
/// owns and rebinds per step.
pub trait DirectionTerms {
    /// Builds `edge.from == <vertex>`.
    fn build_from(&self, arena: &mut NodeArena) -> Result<NodeId>;

    /// Builds `edge.to == <vertex>`.
    fn build_to(&self, arena: &mut NodeArena) -> Result<NodeId>;

    /// Builds the term for `direction`.
    fn build(&self, arena: &mut NodeArena, direction: TraversalDirection) -> Result<NodeId> {
        match direction {
            TraversalDirection::Outbound => self.build_from(arena),
            TraversalDirection::Inbound => self.build_to(arena),
        }
    }
}

/// Endpoint terms comparing the edge variable with a vertex variable, e.g.
/// `e.from == #3` where `#3` holds the vertex being expanded.
#[derive(Clone, Debug)]
pub struct VariableTerms {
    edge: Variable,
    vertex: Variable,
}

impl VariableTerms {
    /// Terms over `edge` compared with `vertex`.
    pub fn new(edge: Variable, vertex: Variable) -> Self {
        Self { edge, vertex }
    }

    /// The edge variable the terms read from.
    pub fn edge(&self) -> &Variable {
        &self.edge
    }

    /// The variable bound to the current vertex.
    pub fn vertex(&self) -> &Variable {
        &self.vertex
    }

    fn endpoint_term(&self, arena: &mut NodeArena, direction: TraversalDirection) -> NodeId {
        let access = arena.attribute_path(&self.edge, &[direction.endpoint_attribute()]);
        let vertex = arena.reference(&self.vertex);
        arena.eq(access, vertex)
    }
}

impl DirectionTerms for VariableTerms {
    fn build_from(&self, arena: &mut NodeArena) -> Result<NodeId> {
        Ok(self.endpoint_term(arena, TraversalDirection::Outbound))
    }

    fn build_to(&self, arena: &mut NodeArena) -> Result<NodeId> {
        Ok(self.endpoint_term(arena, TraversalDirection::Inbound))
    }
}

/// Edge condition builder over nodes owned by an external arena.
#[derive(Debug)]
pub struct EdgeConditionBuilder<T> {
    base: NodeId,
    from_condition: Option<NodeId>,
    to_condition: Option<NodeId>,
    depth_conditions: BTreeMap<u64, Vec<NodeId>>,
    contains_condition: bool,
    terms: T,
}

impl<T: DirectionTerms> EdgeConditionBuilder<T> {
    /// Creates a builder with an empty base condition allocated in `arena`.
    pub fn new(arena: &mut NodeArena, terms: T) -> Self {
        let base = arena.and(Vec::new());
        Self {
            base,
            from_condition: None,
            to_condition: None,
            depth_conditions: BTreeMap::new(),
            contains_condition: false,
            terms,
        }
    }

    /// Rebuilds a builder from a serialized condition document.
    pub fn from_spec(arena: &mut NodeArena, terms: T, spec: &EdgeConditionsSpec) -> Result<Self> {
        let mut builder = Self::new(arena, terms);
        for part in &spec.global_edge_conditions {
            let node = arena.from_spec(part);
            builder.add_condition_part(arena, node)?;
        }
        for (depth, parts) in spec.depth_conditions()? {
            builder.depth_conditions.entry(depth).or_default();
            for part in parts {
                let node = arena.from_spec(part);
                builder.add_condition_for_depth(arena, node, depth)?;
            }
        }
        Ok(builder)
    }

    /// Endpoint term factory.
    pub fn terms(&self) -> &T {
        &self.terms
    }

    /// The shared base AND node. Its last member is the attached endpoint
    /// term once a direction was requested.
    pub fn base_condition(&self) -> NodeId {
        self.base
    }

    /// Whether an endpoint term is currently attached to the base condition.
    pub fn has_direction_term(&self) -> bool {
        self.contains_condition
    }

    /// Number of direction-independent parts in the base condition.
    pub fn base_len(&self, arena: &NodeArena) -> Result<usize> {
        let len = arena.num_members(self.base)?;
        if !self.contains_condition {
            return Ok(len);
        }
        len.checked_sub(1).ok_or(SombraError::Internal(
            "endpoint term missing from base condition",
        ))
    }

    /// Appends a direction-independent filter part as one base member. An
    /// AND part stays a single nested member.
    ///
    /// Parts must all be added before the first direction is requested; the
    /// trailing endpoint slot is fixed from then on.
    pub fn add_condition_part(&mut self, arena: &mut NodeArena, part: NodeId) -> Result<()> {
        if self.contains_condition {
            return Err(SombraError::Internal(
                "condition parts must be added before a direction is requested",
            ));
        }
        if part == self.base {
            return Err(SombraError::Internal(
                "base condition cannot be added to itself",
            ));
        }
        arena.add_member(self.base, part)
    }

    /// Registers a filter part that only applies at traversal depth `depth`.
    pub fn add_condition_for_depth(
        &mut self,
        arena: &NodeArena,
        part: NodeId,
        depth: u64,
    ) -> Result<()> {
        arena.get(part)?;
        self.depth_conditions.entry(depth).or_default().push(part);
        Ok(())
    }

    /// Depths with registered parts, ascending. A depth read from a document
    /// with an empty part list is kept.
    pub fn depths(&self) -> impl Iterator<Item = u64> + '_ {
        self.depth_conditions.keys().copied()
    }

    /// Extra parts registered for `depth`.
    pub fn depth_parts(&self, depth: u64) -> &[NodeId] {
        self.depth_conditions
            .get(&depth)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Whether any depth carries extra parts.
    pub fn has_depth_conditions(&self) -> bool {
        !self.depth_conditions.is_empty()
    }

    /// Builds both endpoint terms if they were not built yet.
    pub fn prepare_terms(&mut self, arena: &mut NodeArena) -> Result<()> {
        self.term(arena, TraversalDirection::Outbound)?;
        self.term(arena, TraversalDirection::Inbound)?;
        Ok(())
    }

    /// Base condition with the `from` term attached.
    pub fn outbound_condition(&mut self, arena: &mut NodeArena) -> Result<NodeId> {
        self.condition(arena, TraversalDirection::Outbound)
    }

    /// Base condition with the `to` term attached.
    pub fn inbound_condition(&mut self, arena: &mut NodeArena) -> Result<NodeId> {
        self.condition(arena, TraversalDirection::Inbound)
    }

    /// Attaches the term for `direction` to the base condition and returns it.
    pub fn condition(&mut self, arena: &mut NodeArena, direction: TraversalDirection) -> Result<NodeId> {
        let term = self.term(arena, direction)?;
        self.swap_sides(arena, term, direction)?;
        Ok(self.base)
    }

    /// Independent copy of the base parts plus the `from` term.
    pub fn clone_outbound_condition(&mut self, arena: &mut NodeArena) -> Result<NodeId> {
        self.clone_with(arena, TraversalDirection::Outbound, None)
    }

    /// Independent copy of the base parts plus the `to` term.
    pub fn clone_inbound_condition(&mut self, arena: &mut NodeArena) -> Result<NodeId> {
        self.clone_with(arena, TraversalDirection::Inbound, None)
    }

    /// Independent copy of the base parts plus the term for `direction`.
    ///
    /// The builder's base condition is left untouched. The endpoint term is
    /// built and cached on first use, like [`condition`](Self::condition).
    pub fn clone_condition(
        &mut self,
        arena: &mut NodeArena,
        direction: TraversalDirection,
    ) -> Result<NodeId> {
        self.clone_with(arena, direction, None)
    }

    /// Like [`clone_outbound_condition`](Self::clone_outbound_condition), plus
    /// the parts registered for `depth`.
    pub fn clone_outbound_condition_for_depth(
        &mut self,
        depth: u64,
        arena: &mut NodeArena,
    ) -> Result<NodeId> {
        self.clone_with(arena, TraversalDirection::Outbound, Some(depth))
    }

    /// Like [`clone_inbound_condition`](Self::clone_inbound_condition), plus
    /// the parts registered for `depth`.
    pub fn clone_inbound_condition_for_depth(
        &mut self,
        depth: u64,
        arena: &mut NodeArena,
    ) -> Result<NodeId> {
        self.clone_with(arena, TraversalDirection::Inbound, Some(depth))
    }

    /// Copy for `direction` extended with the parts registered for `depth`.
    pub fn clone_condition_for_depth(
        &mut self,
        arena: &mut NodeArena,
        direction: TraversalDirection,
        depth: u64,
    ) -> Result<NodeId> {
        self.clone_with(arena, direction, Some(depth))
    }

    /// Substitutes variables in the base condition, both endpoint terms and
    /// every depth part.
    pub fn replace_variables(
        &mut self,
        arena: &mut NodeArena,
        mapping: &HashMap<VarId, Variable>,
    ) -> Result<()> {
        let roots = self.roots();
        arena.replace_variables(&roots, mapping)
    }

    /// Replaces `search.path...` accesses with references to `replacement`
    /// everywhere the builder points.
    pub fn replace_attribute_access(
        &mut self,
        arena: &mut NodeArena,
        search: &Variable,
        path: &[String],
        replacement: &Variable,
    ) -> Result<()> {
        let roots = self.roots();
        arena.replace_attribute_access(&roots, search, path, replacement)
    }

    /// Serializable document of the global and per-depth parts.
    pub fn to_spec(&self, arena: &NodeArena) -> Result<EdgeConditionsSpec> {
        let base_len = self.base_len(arena)?;
        let mut spec = EdgeConditionsSpec::default();
        for member in &arena.members(self.base)?[..base_len] {
            spec.global_edge_conditions.push(arena.to_spec(*member)?);
        }
        for (depth, parts) in &self.depth_conditions {
            let members = parts
                .iter()
                .map(|p| arena.to_spec(*p))
                .collect::<Result<Vec<_>>>()?;
            spec.insert_depth(*depth, members);
        }
        Ok(spec)
    }

    fn term(&mut self, arena: &mut NodeArena, direction: TraversalDirection) -> Result<NodeId> {
        let slot = match direction {
            TraversalDirection::Outbound => &mut self.from_condition,
            TraversalDirection::Inbound => &mut self.to_condition,
        };
        if let Some(term) = *slot {
            return Ok(term);
        }
        let term = self.terms.build(arena, direction)?;
        *slot = Some(term);
        Ok(term)
    }

    fn swap_sides(
        &mut self,
        arena: &mut NodeArena,
        term: NodeId,
        direction: TraversalDirection,
    ) -> Result<()> {
        if self.contains_condition {
            let last = arena
                .num_members(self.base)?
                .checked_sub(1)
                .ok_or(SombraError::Internal(
                    "endpoint term missing from base condition",
                ))?;
            arena.change_member(self.base, last, term)?;
        } else {
            arena.add_member(self.base, term)?;
            self.contains_condition = true;
        }
        trace!(direction = %direction, "traversal.condition.swap");
        Ok(())
    }

    fn clone_with(
        &mut self,
        arena: &mut NodeArena,
        direction: TraversalDirection,
        depth: Option<u64>,
    ) -> Result<NodeId> {
        let term = self.term(arena, direction)?;
        let base_len = self.base_len(arena)?;
        let base_parts = arena.members(self.base)?[..base_len].to_vec();
        let depth_parts = depth.map(|d| self.depth_parts(d)).unwrap_or_default();
        let mut members = Vec::with_capacity(base_len + 1 + depth_parts.len());
        for part in base_parts {
            members.push(arena.clone_subtree(part)?);
        }
        members.push(arena.clone_subtree(term)?);
        for part in depth_parts {
            members.push(arena.clone_subtree(*part)?);
        }
        Ok(arena.and(members))
    }

    fn roots(&self) -> Vec<NodeId> {
        let mut roots = vec![self.base];
        roots.extend(self.from_condition);
        roots.extend(self.to_condition);
        roots.extend(self.depth_conditions.values().flatten().copied());
        roots
    }
}
