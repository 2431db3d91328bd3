//! # provisioner
//!
//! Reconciles Prometheus alerting rules into Zabbix.
//!
//! Each host entry names a template and a rule directory. Every alerting
//! rule becomes a trapper item and a trigger on that template, and every
//! instance Prometheus scrapes becomes a host. A run has three phases:
//!
//! - **Synthesize**: build the desired [`Graph`] from rules and targets
//! - **Load**: merge what the backend already has into the same graph
//! - **Apply**: create, update and delete until the backend matches
//!
//! ## Example
//!
//! ```
//! use provisioner::backend::MockBackend;
//! use provisioner::rules::{Rule, StaticRules};
//! use provisioner::{HostConfig, Provisioner, SynthesisOptions};
//!
//! let mut host = HostConfig::new("Prometheus");
//! host.host_groups = vec!["Prometheus".to_string()];
//! host.alerts_dir = "alerts".into();
//!
//! let provisioner = Provisioner::new(vec![host], SynthesisOptions::default())
//!     .with_rules(StaticRules(vec![Rule {
//!         name: "HighLoad".to_string(),
//!         expression: "node_load1 > 4".to_string(),
//!         ..Default::default()
//!     }]));
//!
//! let backend = MockBackend::new();
//! let summary = provisioner.run(&backend).unwrap();
//! assert!(summary.created > 0);
//!
//! // A second run finds nothing to do
//! assert!(provisioner.run(&backend).unwrap().is_converged());
//! ```

#![warn(clippy::all)]

pub mod apply;
pub mod backend;
pub mod config;
pub mod entity;
pub mod error;
pub mod graph;
pub mod loader;
pub mod plan;
pub mod rules;
pub mod synthesizer;
pub mod targets;
pub mod types;

pub use backend::Backend;
pub use config::HostConfig;
pub use error::{Error, ErrorCategory, Phase, Result};
pub use graph::{Graph, Parent};
pub use plan::{Change, Plan};
pub use synthesizer::{FiringCondition, SynthesisOptions, Synthesizer};
pub use types::{ApplySummary, State};

use loader::LoadScope;
use rules::{RuleDir, RuleSource};
use targets::TargetSource;

/// One configured reconciliation: host entries plus where rules and
/// targets come from.
pub struct Provisioner {
    hosts: Vec<HostConfig>,
    synthesizer: Synthesizer,
    rules: Box<dyn RuleSource>,
    targets: Option<Box<dyn TargetSource>>,
}

impl Provisioner {
    /// Rules are read from each entry's `alertsDir`; no targets are
    /// discovered until [`Provisioner::with_targets`] is called.
    pub fn new(hosts: Vec<HostConfig>, options: SynthesisOptions) -> Self {
        Self {
            hosts,
            synthesizer: Synthesizer::new(options),
            rules: Box::new(RuleDir),
            targets: None,
        }
    }

    #[must_use]
    pub fn with_rules(mut self, source: impl RuleSource + 'static) -> Self {
        self.rules = Box::new(source);
        self
    }

    #[must_use]
    pub fn with_targets(mut self, source: impl TargetSource + 'static) -> Self {
        self.targets = Some(Box::new(source));
        self
    }

    /// Desired state only, without contacting the backend. Rule sources
    /// and targets are read here, so callers that need a session can open
    /// it afterwards.
    pub fn desired(&self) -> Result<Graph> {
        config::validate(&self.hosts)?;

        let instances = match &self.targets {
            Some(targets) => {
                let instances = targets.instances()?;
                log::info!("Discovered {} instances", instances.len());
                instances
            }
            None => {
                log::info!("No Prometheus URL given, skipping target discovery");
                Vec::new()
            }
        };

        let mut graph = Graph::new();
        for host in &self.hosts {
            let rules = self.rules.rules(&host.alerts_dir)?;
            self.synthesizer.populate(&mut graph, host, &rules, &instances);
        }
        Ok(graph)
    }

    /// Merge what `backend` has into a graph from [`Provisioner::desired`].
    pub fn reconcile(&self, mut desired: Graph, backend: &dyn Backend) -> Result<Graph> {
        let scope = LoadScope::from_configs(&self.hosts)?;
        loader::load(&mut desired, backend, &scope)?;
        log::info!("Pending changes: {}", desired.pending_changes());
        Ok(desired)
    }

    /// What [`Provisioner::apply`] would write, without writing.
    pub fn plan_desired(&self, desired: Graph, backend: &dyn Backend) -> Result<Plan> {
        let graph = self.reconcile(desired, backend)?;
        Ok(plan::plan(&graph))
    }

    /// Reconcile a prebuilt desired graph and apply it.
    pub fn apply(&self, desired: Graph, backend: &dyn Backend) -> Result<ApplySummary> {
        let mut graph = self.reconcile(desired, backend)?;
        apply::apply(&mut graph, backend)
    }

    pub fn plan(&self, backend: &dyn Backend) -> Result<Plan> {
        self.plan_desired(self.desired()?, backend)
    }

    /// Synthesize, reconcile and apply.
    pub fn run(&self, backend: &dyn Backend) -> Result<ApplySummary> {
        self.apply(self.desired()?, backend)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{MockBackend, Op};
    use crate::rules::{Rule, StaticRules};
    use crate::targets::StaticTargets;
    use std::collections::BTreeMap;

    fn rule(name: &str, severity: &str) -> Rule {
        Rule {
            name: name.to_string(),
            expression: "up == 0".to_string(),
            labels: BTreeMap::from([("severity".to_string(), severity.to_string())]),
            annotations: BTreeMap::from([("summary".to_string(), format!("{name} fired"))]),
        }
    }

    fn host_config() -> HostConfig {
        let mut host = HostConfig::new("Prometheus");
        host.host_groups = vec!["Prometheus".to_string(), "Alerts".to_string()];
        host.deployment_status = "0".to_string();
        host.alerts_dir = "alerts".into();
        host
    }

    fn provisioner(rules: Vec<Rule>) -> Provisioner {
        provisioner_for(host_config(), rules)
    }

    fn provisioner_for(host: HostConfig, rules: Vec<Rule>) -> Provisioner {
        Provisioner::new(
            vec![host],
            SynthesisOptions {
                prometheus_url: Some("http://prometheus:9090".to_string()),
                ..Default::default()
            },
        )
        .with_rules(StaticRules(rules))
        .with_targets(StaticTargets(vec!["node-1".to_string(), "node-2".to_string()]))
    }

    #[test]
    fn test_second_run_is_converged() {
        let backend = MockBackend::new();
        let provisioner = provisioner(vec![rule("HighLoad", "warning"), rule("InstanceDown", "critical")]);

        let first = provisioner.run(&backend).unwrap();
        // 2 groups, 1 template, 1 application, 2 items, 2 triggers, 2 hosts
        assert_eq!(first.created, 10);
        assert_eq!(backend.hosts().len(), 2);

        backend.clear_calls();
        let second = provisioner.run(&backend).unwrap();
        assert!(backend.calls().is_empty(), "unexpected writes: {:?}", backend.calls());
        assert!(second.is_converged());
        assert_eq!(second.unchanged, 10);
    }

    #[test]
    fn test_removed_rule_is_deleted() {
        let backend = MockBackend::new();
        provisioner(vec![rule("HighLoad", "warning"), rule("InstanceDown", "critical")])
            .run(&backend)
            .unwrap();

        backend.clear_calls();
        let summary = provisioner(vec![rule("HighLoad", "warning")])
            .run(&backend)
            .unwrap();

        assert_eq!(summary.deleted, 2);
        let ops: Vec<(&str, Op)> = backend.calls().iter().map(|c| (c.kind, c.op)).collect();
        assert_eq!(ops, vec![("trigger", Op::Delete), ("item", Op::Delete)]);
        assert_eq!(backend.items().len(), 1);
        assert_eq!(backend.triggers().len(), 1);
    }

    #[test]
    fn test_changed_severity_updates_trigger() {
        let backend = MockBackend::new();
        provisioner(vec![rule("HighLoad", "warning")])
            .run(&backend)
            .unwrap();

        backend.clear_calls();
        let summary = provisioner(vec![rule("HighLoad", "critical")])
            .run(&backend)
            .unwrap();

        assert_eq!(summary.updated, 1);
        assert_eq!(backend.triggers()[0].priority, zabbix::Priority::Disaster);
        assert!(backend.triggers()[0].trigger_id.is_some());
    }

    #[test]
    fn test_plan_writes_nothing() {
        let backend = MockBackend::new();
        let plan = provisioner(vec![rule("HighLoad", "warning")])
            .plan(&backend)
            .unwrap();

        assert!(!plan.is_empty());
        assert_eq!(plan.count(State::New), plan.changes.len());
        assert!(backend.calls().is_empty());
    }

    #[test]
    fn test_invalid_config_stops_before_backend() {
        let backend = MockBackend::new();
        let provisioner = Provisioner::new(vec![HostConfig::new("Prometheus")], SynthesisOptions::default());

        let err = provisioner.run(&backend).unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Configuration);
        assert_eq!(backend.reads(), 0);
    }

    #[test]
    fn test_unreadable_rules_fail_before_backend() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut host = host_config();
        host.alerts_dir = dir.path().join("missing");
        let provisioner = Provisioner::new(vec![host], SynthesisOptions::default());

        let err = provisioner.desired().unwrap_err();
        assert!(matches!(err, Error::Rules { .. }), "{err}");
        assert_eq!(err.category(), ErrorCategory::Configuration);

        let backend = MockBackend::new();
        assert!(provisioner.run(&backend).is_err());
        assert_eq!(backend.reads(), 0);
        assert!(backend.calls().is_empty());
    }

    #[test]
    fn test_apply_prebuilt_desired_graph() {
        let backend = MockBackend::new();
        let provisioner = provisioner(vec![rule("HighLoad", "warning")]);

        let desired = provisioner.desired().unwrap();
        assert_eq!(backend.reads(), 0);

        let plan = provisioner.plan_desired(desired.clone(), &backend).unwrap();
        let summary = provisioner.apply(desired, &backend).unwrap();
        assert_eq!(summary.created, plan.changes.len());
        assert!(provisioner.run(&backend).unwrap().is_converged());
    }

    #[test]
    fn test_padded_group_name_converges() {
        let backend = MockBackend::new();
        let mut host = host_config();
        host.host_groups = vec!["Prometheus ".to_string()];
        let provisioner = provisioner_for(host, vec![rule("HighLoad", "warning")]);

        provisioner.run(&backend).unwrap();
        assert_eq!(backend.host_groups()[0].name, "Prometheus");

        backend.clear_calls();
        let second = provisioner.run(&backend).unwrap();
        assert!(backend.calls().is_empty(), "unexpected writes: {:?}", backend.calls());
        assert!(second.is_converged());
    }

    #[test]
    fn test_unwanted_host_children_are_deleted() {
        let backend = MockBackend::new();
        let provisioner = provisioner(vec![rule("HighLoad", "warning")]);
        provisioner.run(&backend).unwrap();

        let host_id = backend
            .hosts()
            .iter()
            .find(|h| h.host == "node-1")
            .and_then(|h| h.host_id.clone())
            .unwrap();
        backend.add_item(
            &host_id,
            zabbix::Item {
                name: "Stale".to_string(),
                key: "prometheus.stale".to_string(),
                history: "5d".to_string(),
                ..Default::default()
            },
        );
        backend.add_trigger(
            &host_id,
            zabbix::Trigger {
                description: "Stale".to_string(),
                expression: "{node-1:prometheus.stale.last()}<>0".to_string(),
                ..Default::default()
            },
        );

        backend.clear_calls();
        let summary = provisioner.run(&backend).unwrap();
        assert_eq!(summary.deleted, 2);

        let calls = backend.calls();
        let ops: Vec<(&str, Op)> = calls.iter().map(|c| (c.kind, c.op)).collect();
        assert_eq!(ops, vec![("trigger", Op::Delete), ("item", Op::Delete)]);
        assert!(calls.iter().all(|c| c.parent.as_deref() == Some(host_id.as_str())));
        assert!(backend.items().iter().all(|i| i.key != "prometheus.stale"));

        backend.clear_calls();
        assert!(provisioner.run(&backend).unwrap().is_converged());
        assert!(backend.calls().is_empty());
    }

    #[test]
    fn test_changed_tag_updates_hosts() {
        let backend = MockBackend::new();
        provisioner(vec![rule("HighLoad", "warning")])
            .run(&backend)
            .unwrap();

        let mut host = host_config();
        host.tag = "k8s".to_string();
        let provisioner = provisioner_for(host, vec![rule("HighLoad", "warning")]);

        backend.clear_calls();
        let summary = provisioner.run(&backend).unwrap();
        assert_eq!(summary.updated, 2);
        assert_eq!(summary.created, 0);
        let ops: Vec<(&str, Op)> = backend.calls().iter().map(|c| (c.kind, c.op)).collect();
        assert_eq!(ops, vec![("host", Op::Update)]);

        for host in backend.hosts() {
            assert_eq!(host.inventory["tag"], "k8s");
            assert!(host.host_id.is_some());
            assert_eq!(host.interfaces.len(), 1, "interfaces kept for {}", host.host);
        }

        backend.clear_calls();
        assert!(provisioner.run(&backend).unwrap().is_converged());
        assert!(backend.calls().is_empty());
    }
}
