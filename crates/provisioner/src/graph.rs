//! Resource graph and merge.
//!
//! The [`Graph`] is the single owner of every entity in a run. Entities
//! enter through the `insert_*` methods, which resolve a desired entry and
//! its observed counterpart into one classified entry:
//!
//! | stored   | incoming | result                                            |
//! |----------|----------|---------------------------------------------------|
//! | none     | any      | stored as given                                   |
//! | desired  | observed | desired values kept, identifier borrowed, `Equal` or `Updated` |
//! | observed | desired  | same as above, from the other side                |
//! | observed | observed | latest observation replaces the stored one        |
//! | desired  | desired  | definitions folded together ([`Entity::absorb`])  |
//!
//! Children of templates and hosts are merged the same way inside their
//! parent's [`Scope`]. Partition accessors hand out copies and never
//! change a classification.

use crate::entity::{Application, Entity, Host, HostGroup, Item, Template, Trigger};
use crate::error::{Error, Result};
use crate::types::{Buckets, State, Tracked};
use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Owner of a child entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Parent {
    Template(String),
    Host(String),
}

impl Parent {
    pub fn name(&self) -> &str {
        match self {
            Self::Template(name) | Self::Host(name) => name,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Template(_) => Template::KIND,
            Self::Host(_) => Host::KIND,
        }
    }
}

impl fmt::Display for Parent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind(), self.name())
    }
}

/// Insert `incoming` into `map`, merging with an existing entry of the same key.
///
/// Returns the resulting classification.
pub(crate) fn merge<T: Entity>(map: &mut BTreeMap<String, Tracked<T>>, mut incoming: Tracked<T>) -> State {
    let children = incoming.value.children_mut().map(std::mem::take);
    let key = incoming.value.key().to_string();

    let stored = match map.entry(key) {
        Entry::Vacant(slot) => slot.insert(incoming),
        Entry::Occupied(slot) => {
            let existing = slot.into_mut();
            resolve(existing, incoming);
            existing
        }
    };

    if let (Some(children), Some(scope)) = (children, stored.value.children_mut()) {
        scope.merge(children);
    }
    stored.state
}

fn resolve<T: Entity>(existing: &mut Tracked<T>, incoming: Tracked<T>) {
    match (existing.state.is_observed(), incoming.state.is_observed()) {
        // Re-observing an already merged entry compares again
        (false, true) => {
            existing.value.set_id(incoming.value.id().map(str::to_string));
            existing.state = classify(&existing.value, &incoming.value);
        }
        (true, false) => {
            let mut observed = std::mem::replace(existing, incoming);
            existing.value.set_id(observed.value.id().map(str::to_string));
            existing.state = classify(&existing.value, &observed.value);
            adopt_children(&mut existing.value, &mut observed.value);
        }
        (true, true) => {
            let mut previous = std::mem::replace(existing, incoming);
            adopt_children(&mut existing.value, &mut previous.value);
        }
        (false, false) => {
            let before = existing.value.clone();
            existing.value.absorb(incoming.value);
            if existing.state == State::Equal && !before.same_as(&existing.value) {
                existing.state = State::Updated;
            }
        }
    }
}

fn classify<T: Entity>(desired: &T, observed: &T) -> State {
    if desired.same_as(observed) {
        State::Equal
    } else {
        State::Updated
    }
}

fn adopt_children<T: Entity>(target: &mut T, source: &mut T) {
    if let (Some(target), Some(source)) = (target.children_mut(), source.children_mut()) {
        *target = std::mem::take(source);
    }
}

fn partition<T: Entity>(map: &BTreeMap<String, Tracked<T>>, label: &str) -> Buckets<T> {
    let mut buckets = Buckets::default();
    for tracked in map.values() {
        if tracked.state.is_change() && !tracked.state.is_observed() {
            log::info!(
                "{} = State: {}, Name: {}",
                T::KIND,
                tracked.state,
                tracked.value.key()
            );
        } else {
            log::debug!(
                "{} = State: {}, Name: {}",
                T::KIND,
                tracked.state,
                tracked.value.key()
            );
        }
        buckets.push(tracked.state, tracked.value.clone());
    }
    log::info!(
        "{}, total: {}, new or updated: {}",
        label,
        buckets.total(),
        buckets.pending()
    );
    buckets
}

fn assign<T: Entity>(map: &mut BTreeMap<String, Tracked<T>>, key: &str, id: String) -> Result<()> {
    let tracked = map.get_mut(key).ok_or_else(|| Error::missing_id(T::KIND, key))?;
    tracked.value.set_id(Some(id));
    Ok(())
}

/// Children owned by one template or host.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Scope {
    pub applications: BTreeMap<String, Tracked<Application>>,
    pub items: BTreeMap<String, Tracked<Item>>,
    pub triggers: BTreeMap<String, Tracked<Trigger>>,
}

impl Scope {
    pub fn insert_application(&mut self, application: Application, state: State) -> State {
        merge(&mut self.applications, Tracked::new(state, application))
    }

    pub fn insert_item(&mut self, item: Item, state: State) -> State {
        merge(&mut self.items, Tracked::new(state, item))
    }

    pub fn insert_trigger(&mut self, trigger: Trigger, state: State) -> State {
        merge(&mut self.triggers, Tracked::new(state, trigger))
    }

    /// Merge every child of `other` into this scope.
    pub fn merge(&mut self, other: Scope) {
        for (_, application) in other.applications {
            merge(&mut self.applications, application);
        }
        for (_, item) in other.items {
            merge(&mut self.items, item);
        }
        for (_, trigger) in other.triggers {
            merge(&mut self.triggers, trigger);
        }
    }

    pub fn applications_by_state(&self) -> Buckets<Application> {
        partition(&self.applications, "APPLICATIONS")
    }

    pub fn items_by_state(&self) -> Buckets<Item> {
        partition(&self.items, "ITEMS")
    }

    pub fn triggers_by_state(&self) -> Buckets<Trigger> {
        partition(&self.triggers, "TRIGGERS")
    }

    /// Resolve application names to identifiers.
    pub fn application_ids(&self, names: &BTreeSet<String>) -> Result<Vec<String>> {
        names
            .iter()
            .map(|name| {
                self.applications
                    .get(name)
                    .and_then(|a| a.value.id.clone())
                    .ok_or_else(|| Error::missing_id(Application::KIND, name.as_str()))
            })
            .collect()
    }

    pub fn assign_application_id(&mut self, name: &str, id: String) -> Result<()> {
        assign(&mut self.applications, name, id)
    }

    pub fn assign_item_id(&mut self, key: &str, id: String) -> Result<()> {
        assign(&mut self.items, key, id)
    }

    pub fn assign_trigger_id(&mut self, expression: &str, id: String) -> Result<()> {
        assign(&mut self.triggers, expression, id)
    }

    pub fn is_empty(&self) -> bool {
        self.applications.is_empty() && self.items.is_empty() && self.triggers.is_empty()
    }

    fn states(&self) -> impl Iterator<Item = State> + '_ {
        self.applications
            .values()
            .map(|t| t.state)
            .chain(self.items.values().map(|t| t.state))
            .chain(self.triggers.values().map(|t| t.state))
    }
}

/// All entities of one reconciliation run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Graph {
    host_groups: BTreeMap<String, Tracked<HostGroup>>,
    templates: BTreeMap<String, Tracked<Template>>,
    hosts: BTreeMap<String, Tracked<Host>>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    // =========================================================================
    // Insertion
    // =========================================================================

    pub fn insert_host_group(&mut self, group: HostGroup, state: State) -> State {
        merge(&mut self.host_groups, Tracked::new(state, group))
    }

    /// Insert a template together with its children.
    pub fn insert_template(&mut self, template: Template, state: State) -> State {
        merge(&mut self.templates, Tracked::new(state, template))
    }

    /// Insert a host together with its children.
    pub fn insert_host(&mut self, host: Host, state: State) -> State {
        merge(&mut self.hosts, Tracked::new(state, host))
    }

    // =========================================================================
    // Read access
    // =========================================================================

    pub fn host_group(&self, name: &str) -> Option<&Tracked<HostGroup>> {
        self.host_groups.get(name)
    }

    pub fn template(&self, name: &str) -> Option<&Tracked<Template>> {
        self.templates.get(name)
    }

    pub fn host(&self, name: &str) -> Option<&Tracked<Host>> {
        self.hosts.get(name)
    }

    pub fn host_groups_by_state(&self) -> Buckets<HostGroup> {
        partition(&self.host_groups, "HOSTGROUPS")
    }

    pub fn templates_by_state(&self) -> Buckets<Template> {
        partition(&self.templates, "TEMPLATES")
    }

    pub fn hosts_by_state(&self) -> Buckets<Host> {
        partition(&self.hosts, "HOSTS")
    }

    /// Parents whose children are reconciled, templates first.
    ///
    /// Observed-only templates and hosts are left alone, and so are their children.
    pub fn parents(&self) -> Vec<Parent> {
        let templates = self
            .templates
            .values()
            .filter(|t| !t.state.is_observed())
            .map(|t| Parent::Template(t.value.name.clone()));
        let hosts = self
            .hosts
            .values()
            .filter(|h| !h.state.is_observed())
            .map(|h| Parent::Host(h.value.name.clone()));
        templates.chain(hosts).collect()
    }

    pub fn scope(&self, parent: &Parent) -> Option<&Scope> {
        match parent {
            Parent::Template(name) => self.templates.get(name).map(|t| &t.value.children),
            Parent::Host(name) => self.hosts.get(name).map(|h| &h.value.children),
        }
    }

    pub fn scope_mut(&mut self, parent: &Parent) -> Option<&mut Scope> {
        match parent {
            Parent::Template(name) => self.templates.get_mut(name).map(|t| &mut t.value.children),
            Parent::Host(name) => self.hosts.get_mut(name).map(|h| &mut h.value.children),
        }
    }

    /// Backend identifier of a template or host.
    pub fn parent_id(&self, parent: &Parent) -> Result<String> {
        let id = match parent {
            Parent::Template(name) => self.templates.get(name).and_then(|t| t.value.id.clone()),
            Parent::Host(name) => self.hosts.get(name).and_then(|h| h.value.id.clone()),
        };
        id.ok_or_else(|| Error::missing_id(parent.kind(), parent.name()))
    }

    /// Resolve host group names to identifiers.
    pub fn host_group_ids(&self, names: &BTreeSet<String>) -> Result<Vec<String>> {
        names
            .iter()
            .map(|name| {
                self.host_groups
                    .get(name)
                    .and_then(|g| g.value.id.clone())
                    .ok_or_else(|| Error::missing_id(HostGroup::KIND, name.as_str()))
            })
            .collect()
    }

    /// Identifiers of every host group known to exist remotely.
    pub fn known_host_group_ids(&self) -> Vec<String> {
        self.host_groups
            .values()
            .filter_map(|g| g.value.id.clone())
            .collect()
    }

    /// Number of entities that would cause a write.
    ///
    /// Observed-only templates and hosts are never deleted and do not count.
    pub fn pending_changes(&self) -> usize {
        let groups = self
            .host_groups
            .values()
            .filter(|g| g.state.is_change())
            .count();
        let parents = self
            .templates
            .values()
            .filter(|t| !t.state.is_observed())
            .map(|t| (t.state, &t.value.children))
            .chain(
                self.hosts
                    .values()
                    .filter(|h| !h.state.is_observed())
                    .map(|h| (h.state, &h.value.children)),
            )
            .map(|(state, children)| {
                usize::from(state.is_change()) + children.states().filter(|s| s.is_change()).count()
            })
            .sum::<usize>();
        groups + parents
    }

    // =========================================================================
    // Identifier propagation
    // =========================================================================

    pub fn assign_host_group_id(&mut self, name: &str, id: String) -> Result<()> {
        assign(&mut self.host_groups, name, id)
    }

    pub fn assign_template_id(&mut self, name: &str, id: String) -> Result<()> {
        assign(&mut self.templates, name, id)
    }

    pub fn assign_host_id(&mut self, name: &str, id: String) -> Result<()> {
        assign(&mut self.hosts, name, id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(key: &str, name: &str) -> Item {
        Item {
            key: key.to_string(),
            name: name.to_string(),
            history: "5d".to_string(),
            trends: "5d".to_string(),
            applications: BTreeSet::from(["prometheus".to_string()]),
            ..Default::default()
        }
    }

    fn with_id<T: Entity>(mut value: T, id: &str) -> T {
        value.set_id(Some(id.to_string()));
        value
    }

    fn template(name: &str, groups: &[&str]) -> Template {
        Template {
            name: name.to_string(),
            host_groups: groups.iter().map(|g| g.to_string()).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_merge_equal_borrows_identifier() {
        let mut scope = Scope::default();
        scope.insert_item(item("prometheus.a", "A"), State::New);
        let state = scope.insert_item(with_id(item("prometheus.a", "A"), "25"), State::Old);

        assert_eq!(state, State::Equal);
        assert_eq!(scope.items["prometheus.a"].value.id.as_deref(), Some("25"));
    }

    #[test]
    fn test_merge_differing_is_updated_and_keeps_desired_values() {
        let mut scope = Scope::default();
        scope.insert_item(item("prometheus.a", "desired"), State::New);
        let state = scope.insert_item(with_id(item("prometheus.a", "observed"), "25"), State::Old);

        assert_eq!(state, State::Updated);
        let stored = &scope.items["prometheus.a"].value;
        assert_eq!(stored.name, "desired");
        assert_eq!(stored.id.as_deref(), Some("25"));
    }

    #[test]
    fn test_merge_classification_is_total() {
        for observed_name in ["same", "different"] {
            let mut scope = Scope::default();
            scope.insert_item(item("k", "same"), State::New);
            let state = scope.insert_item(with_id(item("k", observed_name), "1"), State::Old);
            assert!(matches!(state, State::Equal | State::Updated));
        }
    }

    #[test]
    fn test_merge_unmatched_observed_stays_old() {
        let mut scope = Scope::default();
        scope.insert_item(item("prometheus.a", "A"), State::New);
        let state = scope.insert_item(with_id(item("prometheus.gone", "Gone"), "30"), State::Old);

        assert_eq!(state, State::Old);
        let buckets = scope.items_by_state();
        assert_eq!(buckets.new.len(), 1);
        assert_eq!(buckets.old.len(), 1);
    }

    #[test]
    fn test_merge_reobserving_is_idempotent() {
        let mut scope = Scope::default();
        scope.insert_item(item("k", "A"), State::New);
        scope.insert_item(with_id(item("k", "A"), "1"), State::Old);
        let state = scope.insert_item(with_id(item("k", "A"), "1"), State::Old);

        assert_eq!(state, State::Equal);
        assert_eq!(scope.items.len(), 1);
    }

    #[test]
    fn test_merge_observed_first() {
        let mut scope = Scope::default();
        scope.insert_item(with_id(item("k", "old name"), "7"), State::Old);
        let state = scope.insert_item(item("k", "new name"), State::New);

        assert_eq!(state, State::Updated);
        assert_eq!(scope.items["k"].value.name, "new name");
        assert_eq!(scope.items["k"].value.id.as_deref(), Some("7"));
    }

    #[test]
    fn test_merge_host_group_is_equal_on_name() {
        let mut graph = Graph::new();
        graph.insert_host_group(HostGroup::named("Prometheus"), State::New);
        let state = graph.insert_host_group(
            with_id(HostGroup::named("Prometheus"), "107"),
            State::Old,
        );

        assert_eq!(state, State::Equal);
        assert_eq!(
            graph.host_group_ids(&BTreeSet::from(["Prometheus".to_string()])).unwrap(),
            vec!["107".to_string()]
        );
    }

    #[test]
    fn test_merge_template_children() {
        let mut graph = Graph::new();

        let mut desired = template("Prometheus", &["Templates"]);
        desired.children.insert_item(item("prometheus.a", "A"), State::New);
        desired
            .children
            .insert_application(Application::named("prometheus"), State::New);
        graph.insert_template(desired, State::New);

        let mut observed = with_id(template("Prometheus", &["Templates", "Other"]), "10500");
        observed
            .children
            .insert_item(with_id(item("prometheus.a", "A"), "25"), State::Old);
        observed
            .children
            .insert_item(with_id(item("prometheus.b", "B"), "26"), State::Old);
        let state = graph.insert_template(observed, State::Old);

        assert_eq!(state, State::Updated);
        let stored = graph.template("Prometheus").unwrap();
        assert_eq!(stored.value.id.as_deref(), Some("10500"));
        assert_eq!(stored.value.host_groups.len(), 1);

        let items = stored.value.children.items_by_state();
        assert_eq!(items.equal.len(), 1);
        assert_eq!(items.old.len(), 1);
        assert_eq!(stored.value.children.applications_by_state().new.len(), 1);
    }

    #[test]
    fn test_merge_desired_templates_union_groups() {
        let mut graph = Graph::new();
        let mut first = template("Prometheus", &["A"]);
        first.children.insert_item(item("prometheus.a", "A"), State::New);
        graph.insert_template(first, State::New);

        let mut second = template("Prometheus", &["B"]);
        second.children.insert_item(item("prometheus.b", "B"), State::New);
        let state = graph.insert_template(second, State::New);

        assert_eq!(state, State::New);
        let stored = &graph.template("Prometheus").unwrap().value;
        assert_eq!(stored.host_groups.len(), 2);
        assert_eq!(stored.children.items.len(), 2);
    }

    #[test]
    fn test_observed_first_keeps_observed_children() {
        let mut graph = Graph::new();
        let mut observed = with_id(template("Prometheus", &["A"]), "1");
        observed
            .children
            .insert_item(with_id(item("prometheus.gone", "Gone"), "9"), State::Old);
        graph.insert_template(observed, State::Old);

        let mut desired = template("Prometheus", &["A"]);
        desired.children.insert_item(item("prometheus.a", "A"), State::New);
        let state = graph.insert_template(desired, State::New);

        assert_eq!(state, State::Equal);
        let children = &graph.template("Prometheus").unwrap().value.children;
        assert_eq!(children.items.len(), 2);
        assert_eq!(children.items["prometheus.gone"].state, State::Old);
    }

    #[test]
    fn test_partition_does_not_mutate() {
        let mut graph = Graph::new();
        graph.insert_host_group(HostGroup::named("A"), State::New);
        graph.insert_host_group(with_id(HostGroup::named("B"), "2"), State::Old);

        let before = graph.clone();
        let first = graph.host_groups_by_state();
        let second = graph.host_groups_by_state();

        assert_eq!(first, second);
        assert_eq!(graph, before);
        assert_eq!(first.new.len(), 1);
        assert_eq!(first.old.len(), 1);
    }

    #[test]
    fn test_missing_identifiers() {
        let mut graph = Graph::new();
        graph.insert_host_group(HostGroup::named("A"), State::New);

        let err = graph
            .host_group_ids(&BTreeSet::from(["A".to_string()]))
            .unwrap_err();
        assert!(matches!(err, Error::MissingIdentifier { kind: "host group", .. }));

        graph.insert_template(template("T", &["A"]), State::New);
        assert!(graph.parent_id(&Parent::Template("T".to_string())).is_err());
        graph.assign_template_id("T", "10".to_string()).unwrap();
        assert_eq!(
            graph.parent_id(&Parent::Template("T".to_string())).unwrap(),
            "10"
        );
        assert!(graph.assign_host_id("nope", "1".to_string()).is_err());
    }

    #[test]
    fn test_parents_skip_observed_only() {
        let mut graph = Graph::new();
        graph.insert_template(template("Desired", &["A"]), State::New);
        graph.insert_template(with_id(template("Foreign", &["A"]), "3"), State::Old);
        graph.insert_host(
            Host {
                name: "node-1".to_string(),
                ..Default::default()
            },
            State::New,
        );

        assert_eq!(
            graph.parents(),
            vec![
                Parent::Template("Desired".to_string()),
                Parent::Host("node-1".to_string())
            ]
        );
    }

    #[test]
    fn test_pending_changes() {
        let mut graph = Graph::new();
        graph.insert_host_group(HostGroup::named("A"), State::New);
        graph.insert_host_group(with_id(HostGroup::named("A"), "1"), State::Old);

        let mut desired = template("T", &["A"]);
        desired.children.insert_item(item("k", "K"), State::New);
        graph.insert_template(desired, State::New);
        assert_eq!(graph.pending_changes(), 2);

        let mut observed = with_id(template("T", &["A"]), "5");
        observed
            .children
            .insert_item(with_id(item("k", "K"), "6"), State::Old);
        graph.insert_template(observed, State::Old);
        assert_eq!(graph.pending_changes(), 0);
    }
}
