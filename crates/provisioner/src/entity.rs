//! Entity kinds managed by the provisioner.
//!
//! These are plain value types. Backend identifiers are optional and only
//! filled in from an observed counterpart or a create response. Equality
//! for reconciliation is [`Entity::same_as`], which compares business
//! fields only.

use crate::graph::Scope;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Debug;
use zabbix::{HostInterface, Priority, Tag};

/// Behaviour shared by every entity kind.
pub trait Entity: Clone + Debug {
    /// Kind name used in logs and errors.
    const KIND: &'static str;

    /// Natural key, unique within the owning scope.
    fn key(&self) -> &str;

    fn id(&self) -> Option<&str>;

    fn set_id(&mut self, id: Option<String>);

    /// Structural equality over business fields.
    fn same_as(&self, other: &Self) -> bool;

    /// Fold a second desired definition with the same key into this one.
    fn absorb(&mut self, other: Self) {
        log::warn!(
            "{} '{}' is defined more than once, keeping the latest definition",
            Self::KIND,
            self.key()
        );
        *self = other;
    }

    /// Owned children, for templates and hosts.
    fn children_mut(&mut self) -> Option<&mut Scope> {
        None
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostGroup {
    pub id: Option<String>,
    pub name: String,
}

impl HostGroup {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
        }
    }
}

impl Entity for HostGroup {
    const KIND: &'static str = "host group";

    fn key(&self) -> &str {
        &self.name
    }

    fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    fn set_id(&mut self, id: Option<String>) {
        self.id = id;
    }

    fn same_as(&self, other: &Self) -> bool {
        self.name == other.name
    }

    fn absorb(&mut self, _other: Self) {}
}

impl From<zabbix::HostGroup> for HostGroup {
    fn from(group: zabbix::HostGroup) -> Self {
        Self {
            id: group.group_id,
            name: group.name,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Application {
    pub id: Option<String>,
    pub name: String,
}

impl Application {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
        }
    }
}

impl Entity for Application {
    const KIND: &'static str = "application";

    fn key(&self) -> &str {
        &self.name
    }

    fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    fn set_id(&mut self, id: Option<String>) {
        self.id = id;
    }

    // Membership in the parent is implied by the scope holding it
    fn same_as(&self, other: &Self) -> bool {
        self.name == other.name
    }

    fn absorb(&mut self, _other: Self) {}
}

impl From<zabbix::Application> for Application {
    fn from(application: zabbix::Application) -> Self {
        Self {
            id: application.application_id,
            name: application.name,
        }
    }
}

/// A trapper item, keyed by its item key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Item {
    pub id: Option<String>,
    pub key: String,
    pub name: String,
    pub description: String,
    pub history: String,
    pub trends: String,
    pub trapper_hosts: String,
    pub applications: BTreeSet<String>,
}

impl Entity for Item {
    const KIND: &'static str = "item";

    fn key(&self) -> &str {
        &self.key
    }

    fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    fn set_id(&mut self, id: Option<String>) {
        self.id = id;
    }

    fn same_as(&self, other: &Self) -> bool {
        self.name == other.name
            && self.description == other.description
            && self.trends == other.trends
            && self.history == other.history
            && self.trapper_hosts == other.trapper_hosts
            && self.applications == other.applications
    }
}

impl Item {
    /// Shape an observed item; application names come from a separate lookup.
    pub fn observed(item: zabbix::Item, applications: BTreeSet<String>) -> Self {
        Self {
            id: item.item_id,
            key: item.key,
            name: item.name,
            description: item.description,
            history: item.history,
            trends: item.trends,
            trapper_hosts: item.trapper_hosts,
            applications,
        }
    }
}

/// A trigger, keyed by its expression.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Trigger {
    pub id: Option<String>,
    pub expression: String,
    pub description: String,
    pub priority: Priority,
    pub comments: String,
    pub url: String,
    pub manual_close: bool,
    /// Sent on write, not compared.
    pub tags: Vec<Tag>,
}

impl Entity for Trigger {
    const KIND: &'static str = "trigger";

    fn key(&self) -> &str {
        &self.expression
    }

    fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    fn set_id(&mut self, id: Option<String>) {
        self.id = id;
    }

    fn same_as(&self, other: &Self) -> bool {
        self.expression == other.expression
            && self.description == other.description
            && self.priority == other.priority
            && self.comments == other.comments
            && self.url == other.url
            && self.manual_close == other.manual_close
    }
}

impl From<zabbix::Trigger> for Trigger {
    fn from(trigger: zabbix::Trigger) -> Self {
        Self {
            id: trigger.trigger_id,
            expression: trigger.expression,
            description: trigger.description,
            priority: trigger.priority,
            comments: trigger.comments,
            url: trigger.url,
            manual_close: trigger.manual_close != 0,
            tags: trigger.tags,
        }
    }
}

/// A template, keyed by its technical name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Template {
    pub id: Option<String>,
    pub name: String,
    pub host_groups: BTreeSet<String>,
    pub children: Scope,
}

impl Template {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
}

impl Entity for Template {
    const KIND: &'static str = "template";

    fn key(&self) -> &str {
        &self.name
    }

    fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    fn set_id(&mut self, id: Option<String>) {
        self.id = id;
    }

    fn same_as(&self, other: &Self) -> bool {
        self.name == other.name && self.host_groups == other.host_groups
    }

    fn absorb(&mut self, other: Self) {
        self.host_groups.extend(other.host_groups);
    }

    fn children_mut(&mut self) -> Option<&mut Scope> {
        Some(&mut self.children)
    }
}

impl From<zabbix::Template> for Template {
    fn from(template: zabbix::Template) -> Self {
        Self {
            id: template.template_id,
            name: template.host,
            host_groups: template.groups.into_iter().map(|g| g.name).collect(),
            children: Scope::default(),
        }
    }
}

/// A monitored host, keyed by its technical name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Host {
    pub id: Option<String>,
    pub name: String,
    pub host_groups: BTreeSet<String>,
    pub inventory: BTreeMap<String, String>,
    /// Sent on create only.
    pub interfaces: Vec<HostInterface>,
    pub children: Scope,
}

impl Entity for Host {
    const KIND: &'static str = "host";

    fn key(&self) -> &str {
        &self.name
    }

    fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    fn set_id(&mut self, id: Option<String>) {
        self.id = id;
    }

    fn same_as(&self, other: &Self) -> bool {
        self.name == other.name
            && self.host_groups == other.host_groups
            && self.inventory == other.inventory
    }

    fn absorb(&mut self, other: Self) {
        self.host_groups.extend(other.host_groups);
        for (key, value) in other.inventory {
            self.inventory.entry(key).or_insert(value);
        }
        if self.interfaces.is_empty() {
            self.interfaces = other.interfaces;
        }
    }

    fn children_mut(&mut self) -> Option<&mut Scope> {
        Some(&mut self.children)
    }
}

impl From<zabbix::Host> for Host {
    fn from(host: zabbix::Host) -> Self {
        // The backend adds `hostid` to the inventory and reports every
        // unset field as an empty string
        let inventory = host
            .inventory
            .into_iter()
            .filter(|(key, value)| key != "hostid" && !value.is_empty())
            .collect();

        Self {
            id: host.host_id,
            name: host.host,
            host_groups: host.groups.into_iter().map(|g| g.name).collect(),
            inventory,
            interfaces: Vec::new(),
            children: Scope::default(),
        }
    }
}
