//! Backend seam between the engine and Zabbix.
//!
//! [`Backend`] is implemented for [`zabbix::Client`]; [`MockBackend`] keeps
//! an in-memory store and records every call, for tests:
//!
//! ```
//! use provisioner::backend::{Backend, MockBackend};
//!
//! let mock = MockBackend::new();
//! mock.add_host_group("Prometheus");
//!
//! let groups = mock.host_groups_by_name(&["Prometheus".to_string()]).unwrap();
//! assert_eq!(groups.len(), 1);
//! ```

mod client;
mod mock;

pub use mock::{Call, MockBackend, Op};

use zabbix::{Application, Host, HostGroup, Item, Result, Template, Trigger};

/// Typed operations the loader and apply engine need.
///
/// `owner_id` is the identifier of a template or host. Lookups by owner
/// return directly owned objects only, not inherited ones.
pub trait Backend {
    fn host_groups_by_name(&self, names: &[String]) -> Result<Vec<HostGroup>>;

    /// Templates with their host groups.
    fn templates_by_name(&self, names: &[String]) -> Result<Vec<Template>>;

    /// Hosts in any of the groups, with host groups and inventory.
    fn hosts_in_groups(&self, group_ids: &[String]) -> Result<Vec<Host>>;

    fn applications_of(&self, owner_id: &str) -> Result<Vec<Application>>;

    fn items_of(&self, owner_id: &str) -> Result<Vec<Item>>;

    /// Applications an item belongs to.
    fn item_applications(&self, item_id: &str) -> Result<Vec<Application>>;

    /// Triggers with expanded expressions.
    fn triggers_of(&self, owner_id: &str) -> Result<Vec<Trigger>>;

    /// Create host groups; returns the new IDs in request order.
    fn create_host_groups(&self, groups: &[HostGroup]) -> Result<Vec<String>>;

    fn create_templates(&self, templates: &[Template]) -> Result<Vec<String>>;

    fn update_templates(&self, templates: &[Template]) -> Result<()>;

    fn create_hosts(&self, hosts: &[Host]) -> Result<Vec<String>>;

    fn update_hosts(&self, hosts: &[Host]) -> Result<()>;

    fn create_applications(&self, applications: &[Application]) -> Result<Vec<String>>;

    fn delete_applications(&self, ids: &[String]) -> Result<()>;

    fn create_items(&self, items: &[Item]) -> Result<Vec<String>>;

    fn update_items(&self, items: &[Item]) -> Result<()>;

    fn delete_items(&self, ids: &[String]) -> Result<()>;

    fn create_triggers(&self, triggers: &[Trigger]) -> Result<Vec<String>>;

    fn update_triggers(&self, triggers: &[Trigger]) -> Result<()>;

    fn delete_triggers(&self, ids: &[String]) -> Result<()>;
}
