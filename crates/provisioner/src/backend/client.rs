//! [`Backend`] over the Zabbix JSON-RPC API.

use super::Backend;
use serde_json::json;
use zabbix::{Application, Client, Host, HostGroup, Item, Query, Result, Template, Trigger};

fn owned_by(owner_id: &str) -> Query {
    Query::new()
        .set("hostids", owner_id)
        .set("inherited", false)
}

impl Backend for Client {
    fn host_groups_by_name(&self, names: &[String]) -> Result<Vec<HostGroup>> {
        self.host_groups_get(Query::new().filter("name", names.iter().cloned()))
    }

    fn templates_by_name(&self, names: &[String]) -> Result<Vec<Template>> {
        self.templates_get(
            Query::new()
                .filter("host", names.iter().cloned())
                .set("selectGroups", "extend"),
        )
    }

    fn hosts_in_groups(&self, group_ids: &[String]) -> Result<Vec<Host>> {
        self.hosts_get(
            Query::new()
                .set("groupids", json!(group_ids))
                .set("selectGroups", "extend")
                .set("selectInventory", "extend"),
        )
    }

    fn applications_of(&self, owner_id: &str) -> Result<Vec<Application>> {
        self.applications_get(owned_by(owner_id))
    }

    fn items_of(&self, owner_id: &str) -> Result<Vec<Item>> {
        self.items_get(owned_by(owner_id))
    }

    fn item_applications(&self, item_id: &str) -> Result<Vec<Application>> {
        self.applications_get(Query::new().set("itemids", item_id))
    }

    fn triggers_of(&self, owner_id: &str) -> Result<Vec<Trigger>> {
        self.triggers_get(
            owned_by(owner_id)
                .set("expandExpression", true)
                .set("selectTags", "extend"),
        )
    }

    fn create_host_groups(&self, groups: &[HostGroup]) -> Result<Vec<String>> {
        self.host_groups_create(groups)
    }

    fn create_templates(&self, templates: &[Template]) -> Result<Vec<String>> {
        self.templates_create(templates)
    }

    fn update_templates(&self, templates: &[Template]) -> Result<()> {
        self.templates_update(templates)
    }

    fn create_hosts(&self, hosts: &[Host]) -> Result<Vec<String>> {
        self.hosts_create(hosts)
    }

    fn update_hosts(&self, hosts: &[Host]) -> Result<()> {
        self.hosts_update(hosts)
    }

    fn create_applications(&self, applications: &[Application]) -> Result<Vec<String>> {
        self.applications_create(applications)
    }

    fn delete_applications(&self, ids: &[String]) -> Result<()> {
        self.applications_delete(ids)
    }

    fn create_items(&self, items: &[Item]) -> Result<Vec<String>> {
        self.items_create(items)
    }

    fn update_items(&self, items: &[Item]) -> Result<()> {
        self.items_update(items)
    }

    fn delete_items(&self, ids: &[String]) -> Result<()> {
        self.items_delete(ids)
    }

    fn create_triggers(&self, triggers: &[Trigger]) -> Result<Vec<String>> {
        self.triggers_create(triggers)
    }

    fn update_triggers(&self, triggers: &[Trigger]) -> Result<()> {
        self.triggers_update(triggers)
    }

    fn delete_triggers(&self, ids: &[String]) -> Result<()> {
        self.triggers_delete(ids)
    }
}
