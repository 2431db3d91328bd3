//! In-memory backend for tests.

use super::Backend;
use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Mutex};
use zabbix::{Application, Error, GroupRef, Host, HostGroup, Item, Result, Template, Trigger};

/// Kind of write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Create,
    Update,
    Delete,
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        })
    }
}

/// One recorded write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub kind: &'static str,
    pub op: Op,
    /// Owning template or host ID, for child kinds.
    pub parent: Option<String>,
    pub count: usize,
}

#[derive(Debug, Default)]
struct Store {
    next_id: u64,
    host_groups: Vec<HostGroup>,
    templates: Vec<Template>,
    hosts: Vec<Host>,
    applications: Vec<Application>,
    items: Vec<Item>,
    /// Trigger with owner ID.
    triggers: Vec<(String, Trigger)>,
    calls: Vec<Call>,
    reads: usize,
    fail_on: Option<(&'static str, Op)>,
}

impl Store {
    fn next_id(&mut self) -> String {
        self.next_id += 1;
        (10_000 + self.next_id).to_string()
    }

    fn record(&mut self, kind: &'static str, op: Op, parent: Option<String>, count: usize) -> Result<()> {
        self.calls.push(Call {
            kind,
            op,
            parent,
            count,
        });
        if self.fail_on == Some((kind, op)) {
            return Err(Error::Api {
                code: -32500,
                message: "Application error.".to_string(),
                data: format!("injected failure on {op} {kind}"),
            });
        }
        Ok(())
    }

    fn group_refs(&self, refs: &[GroupRef]) -> Vec<GroupRef> {
        refs.iter()
            .map(|r| GroupRef {
                group_id: r.group_id.clone(),
                name: self
                    .host_groups
                    .iter()
                    .find(|g| g.group_id.as_deref() == Some(r.group_id.as_str()))
                    .map(|g| g.name.clone())
                    .unwrap_or_default(),
            })
            .collect()
    }

    /// Owner of an expression, from its `{<host>:` prefix.
    fn expression_owner(&self, expression: &str) -> Option<String> {
        let host = expression.strip_prefix('{')?.split(':').next()?;
        self.templates
            .iter()
            .find(|t| t.host == host)
            .and_then(|t| t.template_id.clone())
            .or_else(|| {
                self.hosts
                    .iter()
                    .find(|h| h.host == host)
                    .and_then(|h| h.host_id.clone())
            })
    }

    fn owner_of_ids<'a>(&self, owners: impl Iterator<Item = (&'a str, Option<&'a str>)>, ids: &[String]) -> Option<String> {
        owners
            .filter(|(_, id)| id.is_some_and(|id| ids.iter().any(|i| i == id)))
            .map(|(owner, _)| owner.to_string())
            .next()
    }
}

fn not_found(kind: &str, id: &str) -> Error {
    Error::Api {
        code: -32602,
        message: "Invalid params.".to_string(),
        data: format!("No permissions to referred object or it does not exist: {kind} {id}"),
    }
}

/// Mock backend for testing without a Zabbix server.
///
/// Objects written through it are stored and returned by later lookups,
/// so two consecutive runs against the same mock see each other's effects.
/// Writes are recorded as [`Call`]s; [`MockBackend::fail_on`] makes one
/// kind of write fail.
#[derive(Debug, Clone, Default)]
pub struct MockBackend {
    store: Arc<Mutex<Store>>,
}

impl MockBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an existing host group; returns its ID.
    pub fn add_host_group(&self, name: &str) -> String {
        let mut store = self.store.lock().unwrap();
        let id = store.next_id();
        store.host_groups.push(HostGroup {
            group_id: Some(id.clone()),
            name: name.to_string(),
        });
        id
    }

    /// Seed an existing template in the named groups; returns its ID.
    pub fn add_template(&self, name: &str, groups: &[&str]) -> String {
        let mut store = self.store.lock().unwrap();
        let id = store.next_id();
        let groups = groups
            .iter()
            .filter_map(|name| store.host_groups.iter().find(|g| g.name == *name))
            .filter_map(|g| g.group_id.clone())
            .map(GroupRef::new)
            .collect();
        store.templates.push(Template {
            template_id: Some(id.clone()),
            host: name.to_string(),
            name: name.to_string(),
            groups,
            ..Default::default()
        });
        id
    }

    /// Seed an item on a template or host; returns its ID.
    pub fn add_item(&self, owner_id: &str, item: Item) -> String {
        let mut store = self.store.lock().unwrap();
        let id = store.next_id();
        store.items.push(Item {
            item_id: Some(id.clone()),
            host_id: Some(owner_id.to_string()),
            ..item
        });
        id
    }

    /// Seed a trigger on a template or host; returns its ID.
    pub fn add_trigger(&self, owner_id: &str, trigger: Trigger) -> String {
        let mut store = self.store.lock().unwrap();
        let id = store.next_id();
        store.triggers.push((
            owner_id.to_string(),
            Trigger {
                trigger_id: Some(id.clone()),
                ..trigger
            },
        ));
        id
    }

    /// Make every write of `kind` with `op` fail.
    pub fn fail_on(&self, kind: &'static str, op: Op) {
        self.store.lock().unwrap().fail_on = Some((kind, op));
    }

    /// Recorded writes, in order.
    pub fn calls(&self) -> Vec<Call> {
        self.store.lock().unwrap().calls.clone()
    }

    pub fn clear_calls(&self) {
        let mut store = self.store.lock().unwrap();
        store.calls.clear();
        store.reads = 0;
    }

    /// Number of lookups served.
    pub fn reads(&self) -> usize {
        self.store.lock().unwrap().reads
    }

    pub fn host_groups(&self) -> Vec<HostGroup> {
        self.store.lock().unwrap().host_groups.clone()
    }

    pub fn templates(&self) -> Vec<Template> {
        self.store.lock().unwrap().templates.clone()
    }

    pub fn hosts(&self) -> Vec<Host> {
        self.store.lock().unwrap().hosts.clone()
    }

    pub fn items(&self) -> Vec<Item> {
        self.store.lock().unwrap().items.clone()
    }

    pub fn triggers(&self) -> Vec<Trigger> {
        let store = self.store.lock().unwrap();
        store.triggers.iter().map(|(_, t)| t.clone()).collect()
    }
}

impl Backend for MockBackend {
    fn host_groups_by_name(&self, names: &[String]) -> Result<Vec<HostGroup>> {
        let mut store = self.store.lock().unwrap();
        store.reads += 1;
        Ok(store
            .host_groups
            .iter()
            .filter(|g| names.contains(&g.name))
            .cloned()
            .collect())
    }

    fn templates_by_name(&self, names: &[String]) -> Result<Vec<Template>> {
        let mut store = self.store.lock().unwrap();
        store.reads += 1;
        Ok(store
            .templates
            .iter()
            .filter(|t| names.contains(&t.host))
            .map(|t| Template {
                groups: store.group_refs(&t.groups),
                ..t.clone()
            })
            .collect())
    }

    fn hosts_in_groups(&self, group_ids: &[String]) -> Result<Vec<Host>> {
        let mut store = self.store.lock().unwrap();
        store.reads += 1;
        Ok(store
            .hosts
            .iter()
            .filter(|h| h.groups.iter().any(|g| group_ids.contains(&g.group_id)))
            .map(|h| {
                let mut inventory = h.inventory.clone();
                if let Some(id) = &h.host_id {
                    inventory.insert("hostid".to_string(), id.clone());
                }
                Host {
                    groups: store.group_refs(&h.groups),
                    inventory,
                    interfaces: Vec::new(),
                    ..h.clone()
                }
            })
            .collect())
    }

    fn applications_of(&self, owner_id: &str) -> Result<Vec<Application>> {
        let mut store = self.store.lock().unwrap();
        store.reads += 1;
        Ok(store
            .applications
            .iter()
            .filter(|a| a.host_id.as_deref() == Some(owner_id))
            .cloned()
            .collect())
    }

    fn items_of(&self, owner_id: &str) -> Result<Vec<Item>> {
        let mut store = self.store.lock().unwrap();
        store.reads += 1;
        Ok(store
            .items
            .iter()
            .filter(|i| i.host_id.as_deref() == Some(owner_id))
            .map(|i| Item {
                application_ids: Vec::new(),
                ..i.clone()
            })
            .collect())
    }

    fn item_applications(&self, item_id: &str) -> Result<Vec<Application>> {
        let mut store = self.store.lock().unwrap();
        store.reads += 1;
        let Some(item) = store
            .items
            .iter()
            .find(|i| i.item_id.as_deref() == Some(item_id))
        else {
            return Ok(Vec::new());
        };
        Ok(store
            .applications
            .iter()
            .filter(|a| {
                a.application_id
                    .as_ref()
                    .is_some_and(|id| item.application_ids.contains(id))
            })
            .cloned()
            .collect())
    }

    fn triggers_of(&self, owner_id: &str) -> Result<Vec<Trigger>> {
        let mut store = self.store.lock().unwrap();
        store.reads += 1;
        Ok(store
            .triggers
            .iter()
            .filter(|(owner, _)| owner == owner_id)
            .map(|(_, t)| t.clone())
            .collect())
    }

    fn create_host_groups(&self, groups: &[HostGroup]) -> Result<Vec<String>> {
        let mut store = self.store.lock().unwrap();
        store.record("host group", Op::Create, None, groups.len())?;
        let mut ids = Vec::new();
        for group in groups {
            let id = store.next_id();
            store.host_groups.push(HostGroup {
                group_id: Some(id.clone()),
                ..group.clone()
            });
            ids.push(id);
        }
        Ok(ids)
    }

    fn create_templates(&self, templates: &[Template]) -> Result<Vec<String>> {
        let mut store = self.store.lock().unwrap();
        store.record("template", Op::Create, None, templates.len())?;
        let mut ids = Vec::new();
        for template in templates {
            let id = store.next_id();
            store.templates.push(Template {
                template_id: Some(id.clone()),
                ..template.clone()
            });
            ids.push(id);
        }
        Ok(ids)
    }

    fn update_templates(&self, templates: &[Template]) -> Result<()> {
        let mut store = self.store.lock().unwrap();
        store.record("template", Op::Update, None, templates.len())?;
        for template in templates {
            let id = template.template_id.clone().unwrap_or_default();
            let stored = store
                .templates
                .iter_mut()
                .find(|t| t.template_id.as_deref() == Some(id.as_str()))
                .ok_or_else(|| not_found("template", &id))?;
            *stored = template.clone();
        }
        Ok(())
    }

    fn create_hosts(&self, hosts: &[Host]) -> Result<Vec<String>> {
        let mut store = self.store.lock().unwrap();
        store.record("host", Op::Create, None, hosts.len())?;
        let mut ids = Vec::new();
        for host in hosts {
            let id = store.next_id();
            store.hosts.push(Host {
                host_id: Some(id.clone()),
                ..host.clone()
            });
            ids.push(id);
        }
        Ok(ids)
    }

    fn update_hosts(&self, hosts: &[Host]) -> Result<()> {
        let mut store = self.store.lock().unwrap();
        store.record("host", Op::Update, None, hosts.len())?;
        for host in hosts {
            let id = host.host_id.clone().unwrap_or_default();
            let stored = store
                .hosts
                .iter_mut()
                .find(|h| h.host_id.as_deref() == Some(id.as_str()))
                .ok_or_else(|| not_found("host", &id))?;
            let interfaces = std::mem::take(&mut stored.interfaces);
            *stored = Host {
                interfaces,
                ..host.clone()
            };
        }
        Ok(())
    }

    fn create_applications(&self, applications: &[Application]) -> Result<Vec<String>> {
        let mut store = self.store.lock().unwrap();
        let parent = applications.first().and_then(|a| a.host_id.clone());
        store.record("application", Op::Create, parent, applications.len())?;
        let mut ids = Vec::new();
        for application in applications {
            let id = store.next_id();
            store.applications.push(Application {
                application_id: Some(id.clone()),
                ..application.clone()
            });
            ids.push(id);
        }
        Ok(ids)
    }

    fn delete_applications(&self, ids: &[String]) -> Result<()> {
        let mut store = self.store.lock().unwrap();
        let parent = store.owner_of_ids(
            store
                .applications
                .iter()
                .map(|a| (a.host_id.as_deref().unwrap_or_default(), a.application_id.as_deref())),
            ids,
        );
        store.record("application", Op::Delete, parent, ids.len())?;
        let before = store.applications.len();
        store
            .applications
            .retain(|a| a.application_id.as_ref().is_none_or(|id| !ids.contains(id)));
        check_deleted(ids.len(), before - store.applications.len())
    }

    fn create_items(&self, items: &[Item]) -> Result<Vec<String>> {
        let mut store = self.store.lock().unwrap();
        let parent = items.first().and_then(|i| i.host_id.clone());
        store.record("item", Op::Create, parent, items.len())?;

        let keys: HashSet<(Option<&String>, &String)> =
            store.items.iter().map(|i| (i.host_id.as_ref(), &i.key)).collect();
        if let Some(dup) = items.iter().find(|i| keys.contains(&(i.host_id.as_ref(), &i.key))) {
            return Err(Error::Api {
                code: -32602,
                message: "Invalid params.".to_string(),
                data: format!("Item with key \"{}\" already exists.", dup.key),
            });
        }

        let mut ids = Vec::new();
        for item in items {
            let id = store.next_id();
            store.items.push(Item {
                item_id: Some(id.clone()),
                ..item.clone()
            });
            ids.push(id);
        }
        Ok(ids)
    }

    fn update_items(&self, items: &[Item]) -> Result<()> {
        let mut store = self.store.lock().unwrap();
        let ids: Vec<String> = items.iter().filter_map(|i| i.item_id.clone()).collect();
        let parent = store.owner_of_ids(
            store
                .items
                .iter()
                .map(|i| (i.host_id.as_deref().unwrap_or_default(), i.item_id.as_deref())),
            &ids,
        );
        store.record("item", Op::Update, parent, items.len())?;
        for item in items {
            let id = item.item_id.clone().unwrap_or_default();
            let stored = store
                .items
                .iter_mut()
                .find(|i| i.item_id.as_deref() == Some(id.as_str()))
                .ok_or_else(|| not_found("item", &id))?;
            *stored = Item {
                host_id: stored.host_id.clone(),
                ..item.clone()
            };
        }
        Ok(())
    }

    fn delete_items(&self, ids: &[String]) -> Result<()> {
        let mut store = self.store.lock().unwrap();
        let parent = store.owner_of_ids(
            store
                .items
                .iter()
                .map(|i| (i.host_id.as_deref().unwrap_or_default(), i.item_id.as_deref())),
            ids,
        );
        store.record("item", Op::Delete, parent, ids.len())?;
        let before = store.items.len();
        store
            .items
            .retain(|i| i.item_id.as_ref().is_none_or(|id| !ids.contains(id)));
        check_deleted(ids.len(), before - store.items.len())
    }

    fn create_triggers(&self, triggers: &[Trigger]) -> Result<Vec<String>> {
        let mut store = self.store.lock().unwrap();
        let owners: Vec<Option<String>> = triggers
            .iter()
            .map(|t| store.expression_owner(&t.expression))
            .collect();
        let parent = owners.first().cloned().flatten();
        store.record("trigger", Op::Create, parent, triggers.len())?;

        let mut ids = Vec::new();
        for (trigger, owner) in triggers.iter().zip(owners) {
            let Some(owner) = owner else {
                return Err(Error::Api {
                    code: -32602,
                    message: "Invalid params.".to_string(),
                    data: format!("Incorrect trigger expression \"{}\".", trigger.expression),
                });
            };
            let id = store.next_id();
            store.triggers.push((
                owner,
                Trigger {
                    trigger_id: Some(id.clone()),
                    ..trigger.clone()
                },
            ));
            ids.push(id);
        }
        Ok(ids)
    }

    fn update_triggers(&self, triggers: &[Trigger]) -> Result<()> {
        let mut store = self.store.lock().unwrap();
        let ids: Vec<String> = triggers.iter().filter_map(|t| t.trigger_id.clone()).collect();
        let parent = store.owner_of_ids(
            store
                .triggers
                .iter()
                .map(|(owner, t)| (owner.as_str(), t.trigger_id.as_deref())),
            &ids,
        );
        store.record("trigger", Op::Update, parent, triggers.len())?;
        for trigger in triggers {
            let id = trigger.trigger_id.clone().unwrap_or_default();
            let stored = store
                .triggers
                .iter_mut()
                .find(|(_, t)| t.trigger_id.as_deref() == Some(id.as_str()))
                .ok_or_else(|| not_found("trigger", &id))?;
            stored.1 = trigger.clone();
        }
        Ok(())
    }

    fn delete_triggers(&self, ids: &[String]) -> Result<()> {
        let mut store = self.store.lock().unwrap();
        let parent = store.owner_of_ids(
            store
                .triggers
                .iter()
                .map(|(owner, t)| (owner.as_str(), t.trigger_id.as_deref())),
            ids,
        );
        store.record("trigger", Op::Delete, parent, ids.len())?;
        let before = store.triggers.len();
        store
            .triggers
            .retain(|(_, t)| t.trigger_id.as_ref().is_none_or(|id| !ids.contains(id)));
        check_deleted(ids.len(), before - store.triggers.len())
    }
}

fn check_deleted(expected: usize, got: usize) -> Result<()> {
    if expected == got {
        Ok(())
    } else {
        Err(Error::ExpectedMore { expected, got })
    }
}
