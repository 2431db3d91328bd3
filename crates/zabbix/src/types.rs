//! Wire types for the Zabbix JSON-RPC API.
//!
//! Field names follow the API (`groupid`, `key_`, ...). Zabbix encodes most
//! numbers as strings in responses, so integer fields accept both forms.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Parameters of a JSON-RPC call.
pub type Params = serde_json::Map<String, Value>;

/// Item type: Zabbix trapper (values are pushed, not polled).
pub const ITEM_TYPE_TRAPPER: i32 = 2;

/// Item value type: numeric unsigned.
pub const VALUE_TYPE_UNSIGNED: i32 = 3;

/// Host inventory filled in manually.
pub const INVENTORY_MANUAL: i32 = 0;

/// Host interface type: Zabbix agent.
pub const INTERFACE_AGENT: i32 = 1;

/// A host group.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostGroup {
    #[serde(rename = "groupid", default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
    pub name: String,
}

/// Reference to a host group inside a template or host payload.
///
/// Responses of `selectGroups` carry the name as well; it is never sent back.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupRef {
    #[serde(rename = "groupid")]
    pub group_id: String,
    #[serde(default, skip_serializing)]
    pub name: String,
}

impl GroupRef {
    pub fn new(group_id: impl Into<String>) -> Self {
        Self {
            group_id: group_id.into(),
            name: String::new(),
        }
    }
}

/// A template.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Template {
    #[serde(rename = "templateid", default, skip_serializing_if = "Option::is_none")]
    pub template_id: Option<String>,
    /// Technical name.
    pub host: String,
    /// Visible name.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub groups: Vec<GroupRef>,
}

/// A host interface, only sent when creating hosts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostInterface {
    #[serde(default)]
    pub dns: String,
    #[serde(default)]
    pub ip: String,
    #[serde(default, deserialize_with = "de::int")]
    pub main: i32,
    #[serde(default)]
    pub port: String,
    #[serde(rename = "type", default, deserialize_with = "de::int")]
    pub interface_type: i32,
    #[serde(rename = "useip", default, deserialize_with = "de::int")]
    pub use_ip: i32,
}

impl HostInterface {
    /// An agent interface reached by IP address.
    pub fn agent(ip: impl Into<String>, port: impl Into<String>) -> Self {
        Self {
            dns: String::new(),
            ip: ip.into(),
            main: 1,
            port: port.into(),
            interface_type: INTERFACE_AGENT,
            use_ip: 1,
        }
    }
}

/// A host.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Host {
    #[serde(rename = "hostid", default, skip_serializing_if = "Option::is_none")]
    pub host_id: Option<String>,
    /// Technical name.
    pub host: String,
    /// Visible name.
    #[serde(default)]
    pub name: String,
    #[serde(default, deserialize_with = "de::int")]
    pub status: i32,
    #[serde(default, deserialize_with = "de::int")]
    pub inventory_mode: i32,
    #[serde(default, deserialize_with = "de::inventory")]
    pub inventory: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub groups: Vec<GroupRef>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub interfaces: Vec<HostInterface>,
}

/// An application (item grouping, Zabbix 4.x).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Application {
    #[serde(rename = "applicationid", default, skip_serializing_if = "Option::is_none")]
    pub application_id: Option<String>,
    #[serde(rename = "hostid", default, skip_serializing_if = "Option::is_none")]
    pub host_id: Option<String>,
    pub name: String,
}

/// An item.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    #[serde(rename = "itemid", default, skip_serializing_if = "Option::is_none")]
    pub item_id: Option<String>,
    /// Owning template or host; only sent on create.
    #[serde(rename = "hostid", default, skip_serializing_if = "Option::is_none")]
    pub host_id: Option<String>,
    pub name: String,
    #[serde(rename = "key_")]
    pub key: String,
    #[serde(rename = "type", default, deserialize_with = "de::int")]
    pub item_type: i32,
    #[serde(default, deserialize_with = "de::int")]
    pub value_type: i32,
    #[serde(default)]
    pub history: String,
    #[serde(default)]
    pub trends: String,
    #[serde(default)]
    pub trapper_hosts: String,
    #[serde(default)]
    pub description: String,
    /// Application IDs; responses list applications via a separate lookup.
    #[serde(rename = "applications", default, skip_deserializing)]
    pub application_ids: Vec<String>,
}

/// A trigger tag.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Tag {
    pub tag: String,
    #[serde(default)]
    pub value: String,
}

/// A trigger.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trigger {
    #[serde(rename = "triggerid", default, skip_serializing_if = "Option::is_none")]
    pub trigger_id: Option<String>,
    pub description: String,
    pub expression: String,
    #[serde(default)]
    pub comments: String,
    #[serde(default)]
    pub url: String,
    #[serde(default, deserialize_with = "de::int")]
    pub manual_close: i32,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default, deserialize_with = "de::int")]
    pub status: i32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<Tag>,
}

/// Trigger severity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Priority {
    #[default]
    NotClassified,
    Information,
    Warning,
    Average,
    High,
    Disaster,
}

impl Priority {
    /// All priorities, lowest first.
    pub const ALL: [Priority; 6] = [
        Self::NotClassified,
        Self::Information,
        Self::Warning,
        Self::Average,
        Self::High,
        Self::Disaster,
    ];

    /// Numeric value used by the API.
    pub fn as_i32(self) -> i32 {
        match self {
            Self::NotClassified => 0,
            Self::Information => 1,
            Self::Warning => 2,
            Self::Average => 3,
            Self::High => 4,
            Self::Disaster => 5,
        }
    }

    /// Parse the API's numeric value.
    pub fn from_i32(value: i32) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.as_i32() == value)
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::NotClassified => "not classified",
            Self::Information => "information",
            Self::Warning => "warning",
            Self::Average => "average",
            Self::High => "high",
            Self::Disaster => "disaster",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Serialize for Priority {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i32(self.as_i32())
    }
}

impl<'de> Deserialize<'de> for Priority {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = de::int(deserializer)?;
        Self::from_i32(value)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown trigger priority {value}")))
    }
}

mod de {
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;
    use std::collections::BTreeMap;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum IntOrString {
        Int(i64),
        Str(String),
    }

    /// Accept `3` as well as `"3"`.
    pub fn int<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i32, D::Error> {
        let value = match IntOrString::deserialize(deserializer)? {
            IntOrString::Int(i) => i,
            IntOrString::Str(s) if s.trim().is_empty() => 0,
            IntOrString::Str(s) => s.trim().parse().map_err(serde::de::Error::custom)?,
        };
        i32::try_from(value).map_err(serde::de::Error::custom)
    }

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Inventory {
        Map(BTreeMap<String, Value>),
        // Hosts with inventory disabled report `[]`
        List(Vec<Value>),
    }

    pub fn inventory<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<BTreeMap<String, String>, D::Error> {
        Ok(match Inventory::deserialize(deserializer)? {
            Inventory::Map(map) => map
                .into_iter()
                .map(|(k, v)| {
                    let v = match v {
                        Value::String(s) => s,
                        other => other.to_string(),
                    };
                    (k, v)
                })
                .collect(),
            Inventory::List(_) => BTreeMap::new(),
        })
    }
}
