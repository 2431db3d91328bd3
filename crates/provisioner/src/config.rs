//! Host entries: one template, its host groups and where its rules live.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

/// Inventory tag given to discovered hosts when none is configured.
pub const DEFAULT_INVENTORY_TAG: &str = "Prom2zbx";

/// One host entry of the configuration file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostConfig {
    /// Template name; also the host part of every trigger expression.
    pub name: String,

    /// Host groups of the template. Discovered hosts join the first one.
    #[serde(default)]
    pub host_groups: Vec<String>,

    /// Inventory `tag` of discovered hosts.
    #[serde(default)]
    pub tag: String,

    /// Inventory `deployment_status` of discovered hosts.
    #[serde(default)]
    pub deployment_status: String,

    #[serde(default = "default_application")]
    pub item_default_application: String,

    #[serde(default = "default_retention")]
    pub item_default_history: String,

    #[serde(default = "default_retention")]
    pub item_default_trends: String,

    #[serde(default)]
    pub item_default_trapper_hosts: String,

    /// Directory holding the Prometheus rule files.
    #[serde(default)]
    pub alerts_dir: PathBuf,

    /// Tags attached to every trigger of the template.
    #[serde(default)]
    pub trigger_tags: BTreeMap<String, String>,
}

fn default_application() -> String {
    "prometheus".to_string()
}

fn default_retention() -> String {
    "5d".to_string()
}

impl HostConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            host_groups: Vec::new(),
            tag: String::new(),
            deployment_status: String::new(),
            item_default_application: default_application(),
            item_default_history: default_retention(),
            item_default_trends: default_retention(),
            item_default_trapper_hosts: String::new(),
            alerts_dir: PathBuf::new(),
            trigger_tags: BTreeMap::new(),
        }
    }

    /// Inventory tag for discovered hosts.
    pub fn inventory_tag(&self) -> &str {
        if self.tag.is_empty() {
            DEFAULT_INVENTORY_TAG
        } else {
            &self.tag
        }
    }

    /// Host group names with surrounding whitespace removed, blanks skipped.
    pub fn host_groups(&self) -> impl Iterator<Item = &str> {
        self.host_groups
            .iter()
            .map(|g| g.trim())
            .filter(|g| !g.is_empty())
    }
}

/// Check host entries before anything talks to the backend.
pub fn validate(hosts: &[HostConfig]) -> Result<()> {
    if hosts.is_empty() {
        return Err(Error::config("no hosts are defined"));
    }

    let mut seen = BTreeSet::new();
    for host in hosts {
        if host.name.trim().is_empty() {
            return Err(Error::config("host entry without a name"));
        }
        if host.host_groups().next().is_none() {
            return Err(Error::config(format!(
                "host '{}' has no host groups",
                host.name
            )));
        }
        if host.alerts_dir.as_os_str().is_empty() {
            return Err(Error::config(format!(
                "host '{}' has no alertsDir",
                host.name
            )));
        }
        if !seen.insert(host.name.as_str()) {
            return Err(Error::config(format!(
                "host '{}' is defined more than once",
                host.name
            )));
        }
    }
    Ok(())
}
