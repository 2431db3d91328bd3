//! Apply engine.
//!
//! Writes happen in the only order the backend accepts:
//!
//! 1. create new host groups
//! 2. create new templates, update changed ones
//! 3. per template: applications, then triggers and items (see [`apply_scope`])
//! 4. create new hosts, update changed ones
//! 5. per host: same as 3
//!
//! Identifiers returned by creates are written back into the graph before
//! anything that references them is sent. The first failing call ends the
//! pass; already applied steps stay applied.

use crate::backend::Backend;
use crate::entity::{Application, Entity, Host, HostGroup, Item, Template, Trigger};
use crate::error::{Error, Phase, Result, ResultExt};
use crate::graph::{Graph, Parent, Scope};
use crate::types::ApplySummary;
use std::collections::BTreeSet;
use zabbix::{GroupRef, INVENTORY_MANUAL, ITEM_TYPE_TRAPPER, VALUE_TYPE_UNSIGNED};

/// Push every pending change in `graph` to `backend`.
pub fn apply(graph: &mut Graph, backend: &dyn Backend) -> Result<ApplySummary> {
    let mut summary = ApplySummary::default();

    apply_host_groups(graph, backend, &mut summary)?;
    apply_templates(graph, backend, &mut summary)?;
    for parent in graph.parents() {
        if matches!(parent, Parent::Template(_)) {
            apply_scope(graph, backend, &parent, &mut summary)?;
        }
    }

    apply_hosts(graph, backend, &mut summary)?;
    for parent in graph.parents() {
        if matches!(parent, Parent::Host(_)) {
            apply_scope(graph, backend, &parent, &mut summary)?;
        }
    }

    log::info!("Apply finished: {}", summary);
    Ok(summary)
}

fn apply_host_groups(graph: &mut Graph, backend: &dyn Backend, summary: &mut ApplySummary) -> Result<()> {
    let groups = graph.host_groups_by_state();
    summary.unchanged += groups.equal.len();

    if !groups.new.is_empty() {
        log::info!("Creating host groups: {}", keys(&groups.new));
        let payload: Vec<zabbix::HostGroup> = groups.new.iter().map(host_group_payload).collect();
        let ids = backend
            .create_host_groups(&payload)
            .during(Phase::Apply, "create host groups", &"host groups")?;
        for (group, id) in groups.new.iter().zip(ids) {
            graph.assign_host_group_id(&group.name, id)?;
        }
        summary.created += groups.new.len();
    }
    Ok(())
}

fn apply_templates(graph: &mut Graph, backend: &dyn Backend, summary: &mut ApplySummary) -> Result<()> {
    let templates = graph.templates_by_state();
    summary.unchanged += templates.equal.len();

    if !templates.new.is_empty() {
        log::info!("Creating templates: {}", keys(&templates.new));
        let payload = templates
            .new
            .iter()
            .map(|t| template_payload(graph, t, false))
            .collect::<Result<Vec<_>>>()?;
        let ids = backend
            .create_templates(&payload)
            .during(Phase::Apply, "create templates", &"templates")?;
        for (template, id) in templates.new.iter().zip(ids) {
            graph.assign_template_id(&template.name, id)?;
        }
        summary.created += templates.new.len();
    }

    if !templates.updated.is_empty() {
        log::info!("Updating templates: {}", keys(&templates.updated));
        let payload = templates
            .updated
            .iter()
            .map(|t| template_payload(graph, t, true))
            .collect::<Result<Vec<_>>>()?;
        backend
            .update_templates(&payload)
            .during(Phase::Apply, "update templates", &"templates")?;
        summary.updated += templates.updated.len();
    }
    Ok(())
}

fn apply_hosts(graph: &mut Graph, backend: &dyn Backend, summary: &mut ApplySummary) -> Result<()> {
    let hosts = graph.hosts_by_state();
    summary.unchanged += hosts.equal.len();

    if !hosts.new.is_empty() {
        log::info!("Creating hosts: {}", keys(&hosts.new));
        let payload = hosts
            .new
            .iter()
            .map(|h| host_payload(graph, h, false))
            .collect::<Result<Vec<_>>>()?;
        let ids = backend
            .create_hosts(&payload)
            .during(Phase::Apply, "create hosts", &"hosts")?;
        for (host, id) in hosts.new.iter().zip(ids) {
            graph.assign_host_id(&host.name, id)?;
        }
        summary.created += hosts.new.len();
    }

    if !hosts.updated.is_empty() {
        log::info!("Updating hosts: {}", keys(&hosts.updated));
        let payload = hosts
            .updated
            .iter()
            .map(|h| host_payload(graph, h, true))
            .collect::<Result<Vec<_>>>()?;
        backend
            .update_hosts(&payload)
            .during(Phase::Apply, "update hosts", &"hosts")?;
        summary.updated += hosts.updated.len();
    }
    Ok(())
}

/// Reconcile the children of one template or host.
///
/// Order: delete old applications, create new applications, delete old
/// triggers, delete old items, update items, update triggers, create
/// items, create triggers.
pub fn apply_scope(
    graph: &mut Graph,
    backend: &dyn Backend,
    parent: &Parent,
    summary: &mut ApplySummary,
) -> Result<()> {
    let parent_id = graph.parent_id(parent)?;
    log::debug!("Updating {}", parent);

    let applications = scope(graph, parent)?.applications_by_state();
    summary.unchanged += applications.equal.len();

    if !applications.old.is_empty() {
        log::info!("Deleting applications of {}: {}", parent, keys(&applications.old));
        backend
            .delete_applications(&ids_of(&applications.old)?)
            .during(Phase::Apply, "delete applications", parent)?;
        summary.deleted += applications.old.len();
    }

    if !applications.new.is_empty() {
        log::info!("Creating applications of {}: {}", parent, keys(&applications.new));
        let payload: Vec<zabbix::Application> = applications
            .new
            .iter()
            .map(|a| application_payload(&parent_id, a))
            .collect();
        let ids = backend
            .create_applications(&payload)
            .during(Phase::Apply, "create applications", parent)?;
        let scope = scope_mut(graph, parent)?;
        for (application, id) in applications.new.iter().zip(ids) {
            scope.assign_application_id(&application.name, id)?;
        }
        summary.created += applications.new.len();
    }

    let children = scope(graph, parent)?;
    let items = children.items_by_state();
    let triggers = children.triggers_by_state();
    summary.unchanged += items.equal.len() + triggers.equal.len();

    // Triggers reference items, so they go first
    if !triggers.old.is_empty() {
        log::info!("Deleting triggers of {}: {}", parent, keys(&triggers.old));
        backend
            .delete_triggers(&ids_of(&triggers.old)?)
            .during(Phase::Apply, "delete triggers", parent)?;
        summary.deleted += triggers.old.len();
    }

    if !items.old.is_empty() {
        log::info!("Deleting items of {}: {}", parent, keys(&items.old));
        backend
            .delete_items(&ids_of(&items.old)?)
            .during(Phase::Apply, "delete items", parent)?;
        summary.deleted += items.old.len();
    }

    if !items.updated.is_empty() {
        log::info!("Updating items of {}: {}", parent, keys(&items.updated));
        let children = scope(graph, parent)?;
        let payload = items
            .updated
            .iter()
            .map(|i| item_payload(children, None, i))
            .collect::<Result<Vec<_>>>()?;
        backend
            .update_items(&payload)
            .during(Phase::Apply, "update items", parent)?;
        summary.updated += items.updated.len();
    }

    if !triggers.updated.is_empty() {
        log::info!("Updating triggers of {}: {}", parent, keys(&triggers.updated));
        let payload = triggers
            .updated
            .iter()
            .map(|t| trigger_payload(t, true))
            .collect::<Result<Vec<_>>>()?;
        backend
            .update_triggers(&payload)
            .during(Phase::Apply, "update triggers", parent)?;
        summary.updated += triggers.updated.len();
    }

    if !items.new.is_empty() {
        log::info!("Creating items of {}: {}", parent, keys(&items.new));
        let children = scope(graph, parent)?;
        let payload = items
            .new
            .iter()
            .map(|i| item_payload(children, Some(&parent_id), i))
            .collect::<Result<Vec<_>>>()?;
        let ids = backend
            .create_items(&payload)
            .during(Phase::Apply, "create items", parent)?;
        let children = scope_mut(graph, parent)?;
        for (item, id) in items.new.iter().zip(ids) {
            children.assign_item_id(&item.key, id)?;
        }
        summary.created += items.new.len();
    }

    if !triggers.new.is_empty() {
        log::info!("Creating triggers of {}: {}", parent, keys(&triggers.new));
        let payload = triggers
            .new
            .iter()
            .map(|t| trigger_payload(t, false))
            .collect::<Result<Vec<_>>>()?;
        let ids = backend
            .create_triggers(&payload)
            .during(Phase::Apply, "create triggers", parent)?;
        let children = scope_mut(graph, parent)?;
        for (trigger, id) in triggers.new.iter().zip(ids) {
            children.assign_trigger_id(&trigger.expression, id)?;
        }
        summary.created += triggers.new.len();
    }

    Ok(())
}

fn scope<'a>(graph: &'a Graph, parent: &Parent) -> Result<&'a Scope> {
    graph
        .scope(parent)
        .ok_or_else(|| Error::missing_id(parent.kind(), parent.name()))
}

fn scope_mut<'a>(graph: &'a mut Graph, parent: &Parent) -> Result<&'a mut Scope> {
    graph
        .scope_mut(parent)
        .ok_or_else(|| Error::missing_id(parent.kind(), parent.name()))
}

fn keys<T: Entity>(entities: &[T]) -> String {
    entities.iter().map(Entity::key).collect::<Vec<_>>().join(", ")
}

fn ids_of<T: Entity>(entities: &[T]) -> Result<Vec<String>> {
    entities
        .iter()
        .map(|e| {
            e.id()
                .map(str::to_string)
                .ok_or_else(|| Error::missing_id(T::KIND, e.key()))
        })
        .collect()
}

fn required_id<T: Entity>(entity: &T) -> Result<String> {
    entity
        .id()
        .map(str::to_string)
        .ok_or_else(|| Error::missing_id(T::KIND, entity.key()))
}

// =========================================================================
// Payloads
// =========================================================================

fn host_group_payload(group: &HostGroup) -> zabbix::HostGroup {
    zabbix::HostGroup {
        group_id: None,
        name: group.name.clone(),
    }
}

fn group_refs(graph: &Graph, names: &BTreeSet<String>) -> Result<Vec<GroupRef>> {
    Ok(graph
        .host_group_ids(names)?
        .into_iter()
        .map(GroupRef::new)
        .collect())
}

fn template_payload(graph: &Graph, template: &Template, existing: bool) -> Result<zabbix::Template> {
    Ok(zabbix::Template {
        template_id: if existing {
            Some(required_id(template)?)
        } else {
            None
        },
        host: template.name.clone(),
        name: template.name.clone(),
        description: String::new(),
        groups: group_refs(graph, &template.host_groups)?,
    })
}

fn host_payload(graph: &Graph, host: &Host, existing: bool) -> Result<zabbix::Host> {
    Ok(zabbix::Host {
        host_id: if existing {
            Some(required_id(host)?)
        } else {
            None
        },
        host: host.name.clone(),
        name: host.name.clone(),
        status: 0,
        inventory_mode: INVENTORY_MANUAL,
        inventory: host.inventory.clone(),
        groups: group_refs(graph, &host.host_groups)?,
        // Interfaces are only set on create
        interfaces: if existing {
            Vec::new()
        } else {
            host.interfaces.clone()
        },
    })
}

fn application_payload(parent_id: &str, application: &Application) -> zabbix::Application {
    zabbix::Application {
        application_id: None,
        host_id: Some(parent_id.to_string()),
        name: application.name.clone(),
    }
}

/// `parent_id` is set for creates; updates carry the item ID instead.
fn item_payload(scope: &Scope, parent_id: Option<&str>, item: &Item) -> Result<zabbix::Item> {
    Ok(zabbix::Item {
        item_id: match parent_id {
            Some(_) => None,
            None => Some(required_id(item)?),
        },
        host_id: parent_id.map(str::to_string),
        name: item.name.clone(),
        key: item.key.clone(),
        item_type: ITEM_TYPE_TRAPPER,
        value_type: VALUE_TYPE_UNSIGNED,
        history: item.history.clone(),
        trends: item.trends.clone(),
        trapper_hosts: item.trapper_hosts.clone(),
        description: item.description.clone(),
        application_ids: scope.application_ids(&item.applications)?,
    })
}

fn trigger_payload(trigger: &Trigger, existing: bool) -> Result<zabbix::Trigger> {
    Ok(zabbix::Trigger {
        trigger_id: if existing {
            Some(required_id(trigger)?)
        } else {
            None
        },
        description: trigger.description.clone(),
        expression: trigger.expression.clone(),
        comments: trigger.comments.clone(),
        url: trigger.url.clone(),
        manual_close: i32::from(trigger.manual_close),
        priority: trigger.priority,
        status: 0,
        tags: trigger.tags.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{Call, MockBackend, Op};
    use crate::types::State;
    use zabbix::Priority;

    fn item(key: &str) -> Item {
        Item {
            key: key.to_string(),
            name: key.to_string(),
            history: "5d".to_string(),
            trends: "5d".to_string(),
            applications: BTreeSet::from(["prometheus".to_string()]),
            ..Default::default()
        }
    }

    fn trigger(key: &str) -> Trigger {
        Trigger {
            expression: format!("{{Prometheus:{key}.last()}}<>0"),
            description: key.to_string(),
            priority: Priority::Warning,
            manual_close: true,
            ..Default::default()
        }
    }

    fn desired_graph(keys: &[&str]) -> Graph {
        let mut graph = Graph::new();
        graph.insert_host_group(HostGroup::named("Prometheus"), State::New);

        let mut template = Template::named("Prometheus");
        template.host_groups.insert("Prometheus".to_string());
        template
            .children
            .insert_application(Application::named("prometheus"), State::New);
        for key in keys {
            template.children.insert_item(item(key), State::New);
            template.children.insert_trigger(trigger(key), State::New);
        }
        graph.insert_template(template, State::New);
        graph
    }

    fn position(calls: &[Call], kind: &str, op: Op) -> usize {
        calls
            .iter()
            .position(|c| c.kind == kind && c.op == op)
            .unwrap_or_else(|| panic!("no {op} {kind} call"))
    }

    #[test]
    fn test_apply_creates_in_dependency_order() {
        let mock = MockBackend::new();
        let mut graph = desired_graph(&["prometheus.a", "prometheus.b"]);

        let summary = apply(&mut graph, &mock).unwrap();

        let calls = mock.calls();
        let kinds: Vec<(&str, Op)> = calls.iter().map(|c| (c.kind, c.op)).collect();
        assert_eq!(
            kinds,
            vec![
                ("host group", Op::Create),
                ("template", Op::Create),
                ("application", Op::Create),
                ("item", Op::Create),
                ("trigger", Op::Create),
            ]
        );
        assert_eq!(summary.created, 1 + 1 + 1 + 2 + 2);

        // Identifiers were propagated into the graph
        let template = graph.template("Prometheus").unwrap();
        assert!(template.value.id.is_some());
        assert!(
            template
                .value
                .children
                .items
                .values()
                .all(|i| i.value.id.is_some())
        );
        assert!(graph.host_group("Prometheus").unwrap().value.id.is_some());

        // Items were created with the new application's ID
        let application_id = mock.items()[0].application_ids[0].clone();
        assert!(!application_id.is_empty());
    }

    #[test]
    fn test_apply_deletes_triggers_before_items() {
        let mock = MockBackend::new();
        mock.add_host_group("Prometheus");
        let template_id = mock.add_template("Prometheus", &["Prometheus"]);
        let item_id = mock.add_item(
            &template_id,
            zabbix::Item {
                key: "prometheus.gone".to_string(),
                ..Default::default()
            },
        );
        let trigger_id = mock.add_trigger(
            &template_id,
            zabbix::Trigger {
                expression: "{Prometheus:prometheus.gone.last()}<>0".to_string(),
                ..Default::default()
            },
        );

        let mut graph = desired_graph(&["prometheus.a"]);
        let mut observed = Template::named("Prometheus");
        observed.id = Some(template_id.clone());
        observed.host_groups.insert("Prometheus".to_string());
        observed.children.insert_item(
            Item {
                id: Some(item_id),
                ..item("prometheus.gone")
            },
            State::Old,
        );
        observed.children.insert_trigger(
            Trigger {
                id: Some(trigger_id),
                ..trigger("prometheus.gone")
            },
            State::Old,
        );
        graph.insert_host_group(
            HostGroup {
                id: mock.host_groups()[0].group_id.clone(),
                name: "Prometheus".to_string(),
            },
            State::Old,
        );
        graph.insert_template(observed, State::Old);

        let summary = apply(&mut graph, &mock).unwrap();
        let calls = mock.calls();

        assert!(position(&calls, "trigger", Op::Delete) < position(&calls, "item", Op::Delete));
        assert!(position(&calls, "application", Op::Create) < position(&calls, "item", Op::Create));
        assert!(position(&calls, "item", Op::Create) < position(&calls, "trigger", Op::Create));
        assert_eq!(summary.deleted, 2);
        assert!(calls.iter().all(|c| c.kind != "template"));
        assert!(
            calls
                .iter()
                .filter(|c| c.kind != "host group")
                .all(|c| c.parent.as_deref() == Some(template_id.as_str()))
        );
    }

    #[test]
    fn test_apply_updates_keep_identifiers() {
        let mock = MockBackend::new();
        let group_id = mock.add_host_group("Prometheus");
        let template_id = mock.add_template("Prometheus", &["Prometheus"]);
        let item_id = mock.add_item(
            &template_id,
            zabbix::Item {
                key: "prometheus.a".to_string(),
                ..Default::default()
            },
        );

        let mut graph = Graph::new();
        graph.insert_host_group(HostGroup::named("Prometheus"), State::New);
        graph.insert_host_group(
            HostGroup {
                id: Some(group_id),
                name: "Prometheus".to_string(),
            },
            State::Old,
        );
        let mut template = Template::named("Prometheus");
        template.host_groups.insert("Prometheus".to_string());
        template
            .children
            .insert_application(Application::named("prometheus"), State::New);
        template.children.insert_item(item("prometheus.a"), State::New);
        graph.insert_template(template, State::New);

        let mut observed = Template::named("Prometheus");
        observed.id = Some(template_id.clone());
        observed.host_groups.insert("Prometheus".to_string());
        observed.children.insert_item(
            Item {
                id: Some(item_id.clone()),
                name: "stale".to_string(),
                ..item("prometheus.a")
            },
            State::Old,
        );
        observed
            .children
            .insert_application(
                Application {
                    id: Some("777".to_string()),
                    name: "prometheus".to_string(),
                },
                State::Old,
            );
        graph.insert_template(observed, State::Old);

        let summary = apply(&mut graph, &mock).unwrap();

        assert_eq!(
            mock.calls(),
            vec![Call {
                kind: "item",
                op: Op::Update,
                parent: Some(template_id),
                count: 1,
            }]
        );
        assert_eq!(summary.updated, 1);
        let stored = &mock.items()[0];
        assert_eq!(stored.item_id.as_deref(), Some(item_id.as_str()));
        assert_eq!(stored.name, "prometheus.a");
        assert_eq!(stored.application_ids, vec!["777".to_string()]);
    }

    #[test]
    fn test_apply_aborts_on_first_failure() {
        let mock = MockBackend::new();
        mock.fail_on("item", Op::Create);
        let mut graph = desired_graph(&["prometheus.a"]);

        let err = apply(&mut graph, &mock).unwrap_err();

        match &err {
            Error::Backend { phase, action, scope, .. } => {
                assert_eq!(*phase, Phase::Apply);
                assert_eq!(action, "create items");
                assert_eq!(scope, "template Prometheus");
            }
            other => panic!("Expected Error::Backend, got {other:?}"),
        }
        assert!(mock.calls().iter().all(|c| c.kind != "trigger"));
        assert!(mock.triggers().is_empty());
        assert_eq!(mock.templates().len(), 1);
    }

    #[test]
    fn test_apply_hosts_after_templates() {
        let mock = MockBackend::new();
        let mut graph = desired_graph(&["prometheus.a"]);
        graph.insert_host(
            Host {
                name: "node-1".to_string(),
                host_groups: BTreeSet::from(["Prometheus".to_string()]),
                interfaces: vec![zabbix::HostInterface::agent("127.0.0.1", "10050")],
                ..Default::default()
            },
            State::New,
        );

        apply(&mut graph, &mock).unwrap();

        let calls = mock.calls();
        assert!(position(&calls, "trigger", Op::Create) < position(&calls, "host", Op::Create));
        let host = &mock.hosts()[0];
        assert_eq!(host.inventory_mode, INVENTORY_MANUAL);
        assert_eq!(host.interfaces.len(), 1);
        assert!(graph.host("node-1").unwrap().value.id.is_some());
    }

    #[test]
    fn test_missing_group_identifier_is_consistency_error() {
        let mock = MockBackend::new();
        let mut graph = Graph::new();
        let mut template = Template::named("Prometheus");
        template.host_groups.insert("Unknown".to_string());
        graph.insert_template(template, State::New);

        let err = apply(&mut graph, &mock).unwrap_err();
        assert!(matches!(err, Error::MissingIdentifier { kind: "host group", .. }));
        assert!(mock.calls().is_empty());
    }

    #[test]
    fn test_trigger_payload() {
        let mut desired = trigger("prometheus.a");
        assert!(trigger_payload(&desired, true).is_err());

        desired.id = Some("5".to_string());
        let payload = trigger_payload(&desired, true).unwrap();
        assert_eq!(payload.trigger_id.as_deref(), Some("5"));
        assert_eq!(payload.manual_close, 1);
    }
}
