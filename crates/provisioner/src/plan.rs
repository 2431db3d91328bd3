//! Dry-run plan.
//!
//! Lists the writes [`crate::apply::apply`] would perform on a merged
//! graph, in the same order, without touching the backend.

use crate::entity::Entity;
use crate::graph::{Graph, Parent, Scope};
use crate::types::{Buckets, State};
use std::fmt;

/// One pending write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Change {
    pub kind: &'static str,
    /// Owning template or host, for child kinds.
    pub parent: Option<Parent>,
    pub name: String,
    pub state: State,
}

impl Change {
    /// Verb describing the write.
    pub fn action(&self) -> &'static str {
        match self.state {
            State::New => "create",
            State::Updated => "update",
            State::Old => "delete",
            State::Equal => "keep",
        }
    }
}

impl fmt::Display for Change {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} '{}'", self.action(), self.kind, self.name)?;
        if let Some(parent) = &self.parent {
            write!(f, " in {parent}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Plan {
    pub changes: Vec<Change>,
    pub unchanged: usize,
}

impl Plan {
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn count(&self, state: State) -> usize {
        self.changes.iter().filter(|c| c.state == state).count()
    }

    fn push<T: Entity>(&mut self, parent: Option<&Parent>, state: State, values: &[T]) {
        for value in values {
            self.changes.push(Change {
                kind: T::KIND,
                parent: parent.cloned(),
                name: value.key().to_string(),
                state,
            });
        }
    }

    fn push_scope(&mut self, parent: &Parent, scope: &Scope) {
        let applications = scope.applications_by_state();
        let items = scope.items_by_state();
        let triggers = scope.triggers_by_state();
        self.unchanged += applications.equal.len() + items.equal.len() + triggers.equal.len();

        let parent = Some(parent);
        self.push(parent, State::Old, &applications.old);
        self.push(parent, State::New, &applications.new);
        self.push(parent, State::Old, &triggers.old);
        self.push(parent, State::Old, &items.old);
        self.push(parent, State::Updated, &items.updated);
        self.push(parent, State::Updated, &triggers.updated);
        self.push(parent, State::New, &items.new);
        self.push(parent, State::New, &triggers.new);
    }

    fn push_parents<T: Entity>(&mut self, buckets: &Buckets<T>) {
        self.unchanged += buckets.equal.len();
        self.push(None, State::New, &buckets.new);
        self.push(None, State::Updated, &buckets.updated);
    }
}

/// Build the plan for `graph`.
pub fn plan(graph: &Graph) -> Plan {
    let mut plan = Plan::default();

    let groups = graph.host_groups_by_state();
    plan.unchanged += groups.equal.len();
    plan.push(None, State::New, &groups.new);

    let parents = graph.parents();
    plan.push_parents(&graph.templates_by_state());
    for parent in parents.iter().filter(|p| matches!(p, Parent::Template(_))) {
        if let Some(scope) = graph.scope(parent) {
            plan.push_scope(parent, scope);
        }
    }

    plan.push_parents(&graph.hosts_by_state());
    for parent in parents.iter().filter(|p| matches!(p, Parent::Host(_))) {
        if let Some(scope) = graph.scope(parent) {
            plan.push_scope(parent, scope);
        }
    }

    plan
}
