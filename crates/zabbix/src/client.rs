//! Typed API over a [`Transport`].

use crate::error::{Error, Result};
use crate::rpc::{HttpTransport, Transport};
use crate::types::{Application, HostGroup, Host, Item, Params, Template, Trigger};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;

/// Builder for `*.get` parameters.
///
/// ```
/// use zabbix::Query;
///
/// let params = Query::new()
///     .filter("name", ["Templates", "Linux servers"])
///     .set("selectGroups", "extend")
///     .into_params();
/// assert_eq!(params["filter"]["name"][1], "Linux servers");
/// ```
#[derive(Debug, Clone, Default)]
pub struct Query {
    params: Params,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a top-level parameter.
    pub fn set(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.params.insert(key.to_string(), value.into());
        self
    }

    /// Add an exact-match filter on `field`.
    pub fn filter<I, S>(mut self, field: &str, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let values: Vec<Value> = values.into_iter().map(|v| Value::String(v.into())).collect();
        let filter = self
            .params
            .entry("filter")
            .or_insert_with(|| Value::Object(Params::new()));
        if let Value::Object(map) = filter {
            map.insert(field.to_string(), Value::Array(values));
        }
        self
    }

    pub fn into_params(self) -> Params {
        self.params
    }
}

impl From<Query> for Params {
    fn from(query: Query) -> Self {
        query.into_params()
    }
}

/// High-level Zabbix API client.
///
/// Wraps a transport and exposes typed get/create/update/delete calls per
/// object kind. `get` calls default `output` to `extend`; `create` returns
/// the assigned IDs in request order; `delete` and `update` verify the
/// number of confirmed IDs.
pub struct Client {
    transport: Box<dyn Transport>,
}

impl Client {
    /// Create a client over an arbitrary transport.
    pub fn new(transport: impl Transport + 'static) -> Self {
        Self {
            transport: Box::new(transport),
        }
    }

    /// Connect to `url` over HTTP and log in.
    pub fn connect(url: &str, user: &str, password: &str, timeout: Duration) -> Result<Self> {
        let mut transport = HttpTransport::with_timeout(url, timeout);
        transport.login(user, password)?;
        Ok(Self::new(transport))
    }

    /// Raw JSON-RPC call.
    pub fn call(&self, method: &str, params: impl Serialize) -> Result<Value> {
        let params = serde_json::to_value(params)?;
        self.transport.call(method, params)
    }

    /// API version of the server.
    pub fn version(&self) -> Result<String> {
        let value = self.call("apiinfo.version", Value::Array(Vec::new()))?;
        value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| Error::InvalidResponse("apiinfo.version did not return a string".into()))
    }

    // =========================================================================
    // Host groups
    // =========================================================================

    pub fn host_groups_get(&self, params: impl Into<Params>) -> Result<Vec<HostGroup>> {
        self.get("hostgroup.get", params.into())
    }

    pub fn host_group_get_by_id(&self, id: &str) -> Result<HostGroup> {
        self.get_one("hostgroup.get", Query::new().set("groupids", id).into_params())
    }

    pub fn host_groups_create(&self, groups: &[HostGroup]) -> Result<Vec<String>> {
        self.create("hostgroup.create", groups, "groupids")
    }

    pub fn host_groups_delete(&self, ids: &[String]) -> Result<()> {
        self.delete("hostgroup.delete", ids, "groupids")
    }

    // =========================================================================
    // Templates
    // =========================================================================

    pub fn templates_get(&self, params: impl Into<Params>) -> Result<Vec<Template>> {
        self.get("template.get", params.into())
    }

    pub fn templates_create(&self, templates: &[Template]) -> Result<Vec<String>> {
        self.create("template.create", templates, "templateids")
    }

    pub fn templates_update(&self, templates: &[Template]) -> Result<()> {
        self.update("template.update", templates, "templateids")
    }

    // =========================================================================
    // Hosts
    // =========================================================================

    pub fn hosts_get(&self, params: impl Into<Params>) -> Result<Vec<Host>> {
        self.get("host.get", params.into())
    }

    pub fn host_get_by_id(&self, id: &str) -> Result<Host> {
        self.get_one("host.get", Query::new().set("hostids", id).into_params())
    }

    pub fn host_get_by_name(&self, host: &str) -> Result<Host> {
        self.get_one("host.get", Query::new().filter("host", [host]).into_params())
    }

    pub fn hosts_create(&self, hosts: &[Host]) -> Result<Vec<String>> {
        self.create("host.create", hosts, "hostids")
    }

    pub fn hosts_update(&self, hosts: &[Host]) -> Result<()> {
        self.update("host.update", hosts, "hostids")
    }

    pub fn hosts_delete(&self, ids: &[String]) -> Result<()> {
        self.delete("host.delete", ids, "hostids")
    }

    // =========================================================================
    // Applications
    // =========================================================================

    pub fn applications_get(&self, params: impl Into<Params>) -> Result<Vec<Application>> {
        self.get("application.get", params.into())
    }

    pub fn application_get_by_id(&self, id: &str) -> Result<Application> {
        self.get_one(
            "application.get",
            Query::new().set("applicationids", id).into_params(),
        )
    }

    pub fn applications_create(&self, applications: &[Application]) -> Result<Vec<String>> {
        self.create("application.create", applications, "applicationids")
    }

    pub fn applications_delete(&self, ids: &[String]) -> Result<()> {
        self.delete("application.delete", ids, "applicationids")
    }

    // =========================================================================
    // Items
    // =========================================================================

    pub fn items_get(&self, params: impl Into<Params>) -> Result<Vec<Item>> {
        self.get("item.get", params.into())
    }

    pub fn items_create(&self, items: &[Item]) -> Result<Vec<String>> {
        self.create("item.create", items, "itemids")
    }

    pub fn items_update(&self, items: &[Item]) -> Result<()> {
        self.update("item.update", items, "itemids")
    }

    pub fn items_delete(&self, ids: &[String]) -> Result<()> {
        self.delete("item.delete", ids, "itemids")
    }

    // =========================================================================
    // Triggers
    // =========================================================================

    pub fn triggers_get(&self, params: impl Into<Params>) -> Result<Vec<Trigger>> {
        self.get("trigger.get", params.into())
    }

    pub fn triggers_create(&self, triggers: &[Trigger]) -> Result<Vec<String>> {
        self.create("trigger.create", triggers, "triggerids")
    }

    pub fn triggers_update(&self, triggers: &[Trigger]) -> Result<()> {
        self.update("trigger.update", triggers, "triggerids")
    }

    pub fn triggers_delete(&self, ids: &[String]) -> Result<()> {
        self.delete("trigger.delete", ids, "triggerids")
    }

    // =========================================================================
    // Shared call shapes
    // =========================================================================

    fn get<T: DeserializeOwned>(&self, method: &str, mut params: Params) -> Result<Vec<T>> {
        params
            .entry("output")
            .or_insert_with(|| Value::String("extend".to_string()));
        let result = self.transport.call(method, Value::Object(params))?;
        Ok(serde_json::from_value(result)?)
    }

    fn get_one<T: DeserializeOwned>(&self, method: &str, params: Params) -> Result<T> {
        let mut results: Vec<T> = self.get(method, params)?;
        if results.len() == 1 {
            Ok(results.remove(0))
        } else {
            Err(Error::ExpectedOneResult(results.len()))
        }
    }

    fn create<T: Serialize>(&self, method: &str, objects: &[T], ids_field: &str) -> Result<Vec<String>> {
        let result = self.call(method, objects)?;
        let ids = confirmed_ids(&result, ids_field)?;
        if ids.len() != objects.len() {
            return Err(Error::ExpectedMore {
                expected: objects.len(),
                got: ids.len(),
            });
        }
        Ok(ids)
    }

    fn update<T: Serialize>(&self, method: &str, objects: &[T], ids_field: &str) -> Result<()> {
        self.create(method, objects, ids_field).map(|_| ())
    }

    fn delete(&self, method: &str, ids: &[String], ids_field: &str) -> Result<()> {
        let result = self.call(method, ids)?;
        let confirmed = confirmed_ids(&result, ids_field)?;
        if confirmed.len() != ids.len() {
            return Err(Error::ExpectedMore {
                expected: ids.len(),
                got: confirmed.len(),
            });
        }
        Ok(())
    }
}

/// Extract the `<kind>ids` member of a create/update/delete result.
///
/// Some server versions return a map instead of an array for trigger
/// deletion; only the number and values of IDs matter here.
fn confirmed_ids(result: &Value, field: &str) -> Result<Vec<String>> {
    let ids = result
        .get(field)
        .ok_or_else(|| Error::InvalidResponse(format!("result has no `{field}` member")))?;

    let values: Vec<&Value> = match ids {
        Value::Array(values) => values.iter().collect(),
        Value::Object(map) => map.values().collect(),
        other => {
            return Err(Error::InvalidResponse(format!(
                "`{field}` is not a list: {other}"
            )));
        }
    };

    values
        .into_iter()
        .map(|v| match v {
            Value::String(s) => Ok(s.clone()),
            Value::Number(n) => Ok(n.to_string()),
            other => Err(Error::InvalidResponse(format!("invalid id in `{field}`: {other}"))),
        })
        .collect()
}
