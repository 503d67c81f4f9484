//! Query variables and the generator that issues their identifiers.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::VarId;

/// A named query variable. Equality and hashing only consider the id.
#[derive(Clone, Debug, Eq, Serialize, Deserialize)]
pub struct Variable {
    /// Unique identifier within the issuing generator.
    pub id: VarId,
    /// Display name; temporaries start with `#`.
    pub name: String,
}

impl Variable {
    /// Creates a variable handle from raw parts.
    pub fn new(id: VarId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }

    /// Whether this variable was issued as a planner temporary.
    pub fn is_temporary(&self) -> bool {
        self.name.starts_with('#')
    }
}

impl PartialEq for Variable {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl std::hash::Hash for Variable {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Issues unique variable identifiers for one query (or one standalone
/// condition container) and remembers every variable it handed out.
#[derive(Debug, Default)]
pub struct VariableGenerator {
    next_id: u32,
    variables: HashMap<VarId, Variable>,
}

impl VariableGenerator {
    /// Creates an empty generator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Issues a user-visible variable.
    pub fn create_variable(&mut self, name: impl Into<String>) -> Variable {
        let id = self.next();
        let var = Variable::new(id, name);
        self.variables.insert(id, var.clone());
        var
    }

    /// Issues a planner temporary named after its id.
    pub fn create_temporary_variable(&mut self) -> Variable {
        let id = self.next();
        let var = Variable::new(id, format!("#{}", id.0));
        self.variables.insert(id, var.clone());
        var
    }

    /// Issues a new variable carrying the name of `source` under a fresh id.
    pub fn clone_variable(&mut self, source: &Variable) -> Variable {
        self.create_variable(source.name.clone())
    }

    /// Renames a registered variable. Returns the updated handle, or `None`
    /// when the id was never issued here.
    pub fn rename(&mut self, id: VarId, name: impl Into<String>) -> Option<Variable> {
        let var = self.variables.get_mut(&id)?;
        var.name = name.into();
        Some(var.clone())
    }

    /// Registers an externally issued variable (e.g. one decoded from a
    /// serialized condition) so later ids never collide with it.
    pub fn register(&mut self, var: &Variable) {
        self.next_id = self.next_id.max(var.id.0 + 1);
        self.variables.entry(var.id).or_insert_with(|| var.clone());
    }

    /// Looks up a variable by id.
    pub fn get(&self, id: VarId) -> Option<&Variable> {
        self.variables.get(&id)
    }

    /// Number of variables issued or registered so far.
    pub fn len(&self) -> usize {
        self.variables.len()
    }

    /// Whether no variable was issued yet.
    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }

    fn next(&mut self) -> VarId {
        let id = VarId(self.next_id);
        self.next_id += 1;
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issues_unique_ids() {
        let mut vars = VariableGenerator::new();
        let a = vars.create_variable("e");
        let b = vars.create_temporary_variable();
        let c = vars.clone_variable(&a);
        assert_ne!(a.id, b.id);
        assert_ne!(a.id, c.id);
        assert_eq!(c.name, "e");
        assert!(b.is_temporary());
        assert_eq!(b.name, format!("#{}", b.id.0));
        assert_eq!(vars.len(), 3);
    }

    #[test]
    fn rename_updates_registry() {
        let mut vars = VariableGenerator::new();
        let a = vars.create_variable("e");
        let renamed = vars.rename(a.id, "edge").unwrap();
        assert_eq!(renamed.name, "edge");
        assert_eq!(vars.get(a.id).unwrap().name, "edge");
        assert!(vars.rename(VarId(99), "x").is_none());
    }

    #[test]
    fn register_moves_counter_past_foreign_ids() {
        let mut vars = VariableGenerator::new();
        vars.register(&Variable::new(VarId(7), "edge"));
        let next = vars.create_temporary_variable();
        assert_eq!(next.id, VarId(8));
    }
}
