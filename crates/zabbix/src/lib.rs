//! # zabbix
//!
//! Blocking client for the Zabbix JSON-RPC API.
//!
//! Covers the object kinds needed to provision trapper-based alerting:
//! host groups, templates, hosts, applications, items and triggers.
//!
//! ## Example
//!
//! ```no_run
//! use std::time::Duration;
//! use zabbix::{Client, Query};
//!
//! let client = Client::connect(
//!     "http://127.0.0.1/zabbix/api_jsonrpc.php",
//!     "Admin",
//!     "zabbix",
//!     Duration::from_secs(30),
//! )
//! .expect("login failed");
//!
//! let groups = client
//!     .host_groups_get(Query::new().filter("name", ["Linux servers"]))
//!     .expect("request failed");
//! for group in groups {
//!     println!("{} {:?}", group.name, group.group_id);
//! }
//! ```
//!
//! ## Testing
//!
//! [`MockTransport`] answers calls from queued results, so code built on
//! [`Client`] can be tested without a server:
//!
//! ```
//! use serde_json::json;
//! use zabbix::{Client, MockTransport};
//!
//! let mock = MockTransport::new();
//! mock.reply("apiinfo.version", json!("4.4.10"));
//! let client = Client::new(mock);
//! assert_eq!(client.version().unwrap(), "4.4.10");
//! ```

#![warn(clippy::all)]

pub mod client;
pub mod error;
pub mod rpc;
pub mod types;

pub use client::{Client, Query};
pub use error::{Error, ErrorCategory, Result};
pub use rpc::{HttpTransport, MockTransport, Transport};
pub use types::{
    Application, GroupRef, Host, HostGroup, HostInterface, INTERFACE_AGENT, INVENTORY_MANUAL,
    ITEM_TYPE_TRAPPER, Item, Params, Priority, Tag, Template, Trigger, VALUE_TYPE_UNSIGNED,
};
