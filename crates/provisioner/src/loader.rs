//! Observed state from the backend.
//!
//! Fetch order: host groups by name, templates by name with their
//! applications, items and triggers, then hosts in the known groups with
//! theirs. Everything enters the graph as `Old` and is resolved against
//! the desired entries by the merge.

use crate::backend::Backend;
use crate::config::HostConfig;
use crate::entity::{Application, Host, HostGroup, Item, Template, Trigger};
use crate::error::{Error, Phase, Result, ResultExt};
use crate::graph::{Graph, Parent, Scope};
use crate::types::State;
use std::collections::{BTreeSet, HashSet};

/// Names that bound what is read from the backend.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadScope {
    pub host_groups: Vec<String>,
    pub templates: Vec<String>,
}

impl LoadScope {
    pub fn from_configs(hosts: &[HostConfig]) -> Result<Self> {
        let mut scope = Self::default();
        let mut seen = HashSet::new();
        for host in hosts {
            scope.templates.push(host.name.clone());
            for group in host.host_groups() {
                if seen.insert(group) {
                    scope.host_groups.push(group.to_string());
                }
            }
        }

        if scope.templates.is_empty() {
            return Err(Error::config("no templates are defined"));
        }
        if scope.host_groups.is_empty() {
            return Err(Error::config("no host groups are defined"));
        }
        Ok(scope)
    }
}

/// Merge the backend's current objects into `graph`.
pub fn load(graph: &mut Graph, backend: &dyn Backend, scope: &LoadScope) -> Result<()> {
    let groups = backend
        .host_groups_by_name(&scope.host_groups)
        .during(Phase::Load, "get host groups", &scope.host_groups.join(", "))?;
    for group in groups {
        log::debug!("Loading host group from Zabbix: {:?}", group);
        graph.insert_host_group(HostGroup::from(group), State::Old);
    }

    let templates = backend
        .templates_by_name(&scope.templates)
        .during(Phase::Load, "get templates", &scope.templates.join(", "))?;
    for template in templates {
        let mut template = Template::from(template);
        let parent = Parent::Template(template.name.clone());
        let id = template
            .id
            .clone()
            .ok_or_else(|| Error::missing_id("template", template.name.as_str()))?;
        template.children = load_children(backend, &id, &parent)?;
        log::debug!("Loading template from Zabbix: {}", template.name);
        graph.insert_template(template, State::Old);
    }

    let group_ids = graph.known_host_group_ids();
    if group_ids.is_empty() {
        log::debug!("No host groups exist yet, skipping hosts");
        return Ok(());
    }

    let hosts = backend
        .hosts_in_groups(&group_ids)
        .during(Phase::Load, "get hosts", &group_ids.join(", "))?;
    for host in hosts {
        let mut host = Host::from(host);
        let parent = Parent::Host(host.name.clone());
        let id = host
            .id
            .clone()
            .ok_or_else(|| Error::missing_id("host", host.name.as_str()))?;
        host.children = load_children(backend, &id, &parent)?;
        log::debug!("Loading host from Zabbix: {}", host.name);
        graph.insert_host(host, State::Old);
    }

    Ok(())
}

fn load_children(backend: &dyn Backend, owner_id: &str, parent: &Parent) -> Result<Scope> {
    let mut scope = Scope::default();

    for application in backend
        .applications_of(owner_id)
        .during(Phase::Load, "get applications", parent)?
    {
        scope.insert_application(Application::from(application), State::Old);
    }

    for item in backend
        .items_of(owner_id)
        .during(Phase::Load, "get items", parent)?
    {
        let item_id = item.item_id.clone().unwrap_or_default();
        let applications: BTreeSet<String> = backend
            .item_applications(&item_id)
            .during(Phase::Load, "get item applications", parent)?
            .into_iter()
            .map(|a| a.name)
            .collect();
        let item = Item::observed(item, applications);
        log::debug!("Loading item from Zabbix: {:?}", item);
        scope.insert_item(item, State::Old);
    }

    for trigger in backend
        .triggers_of(owner_id)
        .during(Phase::Load, "get triggers", parent)?
    {
        let trigger = Trigger::from(trigger);
        log::debug!("Loading trigger from Zabbix: {:?}", trigger);
        scope.insert_trigger(trigger, State::Old);
    }

    Ok(scope)
}
