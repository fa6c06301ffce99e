//! Per-state variable scopes.
//!
//! Every state owns a scope; the root machine owns the root scope, the
//! ultimate parent of all others. Scopes form an arena with parent links as
//! indices, so lookups walk the index chain and no back-references are
//! owned.

use crate::chart::{Chart, TargetId};
use serde_json::{Map, Value};

/// Index of a scope in the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScopeId(pub(crate) usize);

/// A named variable scope with an optional parent.
#[derive(Debug, Clone)]
struct Scope {
    name: String,
    parent: Option<ScopeId>,
    vars: Map<String, Value>,
}

/// Arena of scopes for one loaded chart.
///
/// Scope indices mirror chart node indices: the scope of a state is found
/// by [`Scopes::scope_of`], and scope 0 is the root scope.
#[derive(Debug, Clone)]
pub struct Scopes {
    scopes: Vec<Scope>,
}

impl Scopes {
    /// Creates an arena containing only a root scope.
    pub fn new(root_name: impl Into<String>) -> Self {
        Self {
            scopes: vec![Scope {
                name: root_name.into(),
                parent: None,
                vars: Map::new(),
            }],
        }
    }

    /// Builds one scope per chart node, parented along the state hierarchy.
    ///
    /// The chart root's scope is the root scope.
    pub fn for_chart(chart: &Chart) -> Self {
        let mut scopes = Vec::with_capacity(chart.len());
        for (t, node) in chart.targets() {
            scopes.push(Scope {
                name: node.id.clone(),
                parent: chart.parent(t).map(|p| ScopeId(p.index())),
                vars: Map::new(),
            });
        }
        Self { scopes }
    }

    /// The root scope.
    pub fn root(&self) -> ScopeId {
        ScopeId(0)
    }

    /// The scope owned by a state. Valid only for the chart this arena was
    /// built from.
    pub fn scope_of(&self, target: TargetId) -> ScopeId {
        ScopeId(target.index())
    }

    /// Name of a scope (the owning state's id).
    pub fn name(&self, scope: ScopeId) -> &str {
        &self.scopes[scope.0].name
    }

    /// Looks a variable up, walking the parent chain.
    pub fn get(&self, scope: ScopeId, name: &str) -> Option<&Value> {
        let mut cur = Some(scope);
        while let Some(s) = cur {
            let scope = &self.scopes[s.0];
            if let Some(v) = scope.vars.get(name) {
                return Some(v);
            }
            cur = scope.parent;
        }
        None
    }

    /// True if the variable is visible from the scope.
    pub fn has(&self, scope: ScopeId, name: &str) -> bool {
        self.get(scope, name).is_some()
    }

    /// Assigns a variable: the nearest scope in the chain that already
    /// binds the name is updated, otherwise the binding is created locally.
    pub fn set(&mut self, scope: ScopeId, name: &str, value: Value) {
        let mut cur = Some(scope);
        while let Some(s) = cur {
            if self.scopes[s.0].vars.contains_key(name) {
                self.scopes[s.0].vars.insert(name.to_string(), value);
                return;
            }
            cur = self.scopes[s.0].parent;
        }
        self.set_local(scope, name, value);
    }

    /// Binds a variable in exactly the given scope.
    pub fn set_local(&mut self, scope: ScopeId, name: &str, value: Value) {
        self.scopes[scope.0].vars.insert(name.to_string(), value);
    }

    /// Binds a variable in the root scope.
    pub fn set_root(&mut self, name: &str, value: Value) {
        self.set_local(self.root(), name, value);
    }

    /// Clears the local bindings of one scope. Parent bindings are
    /// untouched.
    pub fn reset(&mut self, scope: ScopeId) {
        self.scopes[scope.0].vars.clear();
    }

    /// Clears every scope in the arena.
    pub fn reset_all(&mut self) {
        for scope in &mut self.scopes {
            scope.vars.clear();
        }
    }
}
