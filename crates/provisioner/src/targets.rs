//! Target discovery through the Prometheus HTTP API.

use crate::error::{Error, Result};
use serde::Deserialize;
use std::collections::HashSet;
use std::time::Duration;

/// Source of monitored instance names.
pub trait TargetSource {
    /// Instance names without port, deduplicated, in discovery order.
    fn instances(&self) -> Result<Vec<String>>;
}

#[derive(Debug, Deserialize)]
struct TargetsResponse {
    #[serde(default)]
    status: String,
    data: TargetsData,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TargetsData {
    #[serde(default)]
    active_targets: Vec<ActiveTarget>,
}

#[derive(Debug, Deserialize)]
struct ActiveTarget {
    #[serde(default)]
    labels: TargetLabels,
}

#[derive(Debug, Default, Deserialize)]
struct TargetLabels {
    #[serde(default)]
    instance: String,
}

/// Reads `GET <base>/api/v1/targets`.
pub struct PrometheusTargets {
    agent: ureq::Agent,
    base_url: String,
}

impl PrometheusTargets {
    pub fn new(base_url: &str, timeout: Duration) -> Self {
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .build()
            .into();
        Self {
            agent,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn targets_url(&self) -> String {
        format!("{}/api/v1/targets", self.base_url)
    }

    fn error(&self, message: impl ToString) -> Error {
        Error::Targets {
            url: self.targets_url(),
            message: message.to_string(),
        }
    }
}

impl TargetSource for PrometheusTargets {
    fn instances(&self) -> Result<Vec<String>> {
        let response: TargetsResponse = self
            .agent
            .get(&self.targets_url())
            .header("Accept", "application/json")
            .call()
            .map_err(|e| self.error(e))?
            .body_mut()
            .read_json()
            .map_err(|e| self.error(e))?;

        if response.status != "success" {
            return Err(self.error(format!("status {}", response.status)));
        }

        let instances = unique_instances(
            response
                .data
                .active_targets
                .into_iter()
                .map(|t| t.labels.instance),
        );
        log::info!("Targets list: {:?}", instances);
        Ok(instances)
    }
}

/// Fixed instance names, for tests and embedding.
#[derive(Debug, Clone, Default)]
pub struct StaticTargets(pub Vec<String>);

impl TargetSource for StaticTargets {
    fn instances(&self) -> Result<Vec<String>> {
        Ok(unique_instances(self.0.iter().cloned()))
    }
}

fn unique_instances(instances: impl Iterator<Item = String>) -> Vec<String> {
    let mut seen = HashSet::new();
    instances
        .map(|i| strip_port(&i).to_string())
        .filter(|i| !i.is_empty() && seen.insert(i.clone()))
        .collect()
}

/// Drop a trailing `:port` from an instance label.
///
/// Bracketed IPv6 addresses keep their brackets; unbracketed IPv6
/// addresses are returned unchanged.
pub fn strip_port(instance: &str) -> &str {
    if let Some(rest) = instance.strip_prefix('[') {
        return match rest.find(']') {
            Some(end) => &instance[..end + 2],
            None => instance,
        };
    }
    match instance.rsplit_once(':') {
        Some((host, port)) if !host.contains(':') && port.chars().all(|c| c.is_ascii_digit()) => {
            host
        }
        _ => instance,
    }
}
