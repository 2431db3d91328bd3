//! Desired state from alerting rules and discovered targets.
//!
//! Every rule becomes one trapper item and one trigger on the host entry's
//! template. The item key joins the two: the trigger expression reads the
//! item, and the forwarding path pushes alert values into it.

use crate::config::HostConfig;
use crate::entity::{Application, Host, HostGroup, Item, Template, Trigger};
use crate::graph::Graph;
use crate::rules::Rule;
use crate::types::State;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use zabbix::{HostInterface, Priority, Tag};

/// Annotation turning a trigger into a no-data trigger; its value is the delay in seconds.
pub const NODATA_ANNOTATION: &str = "zabbix_trigger_nodata";

/// Drill-down URLs this long or longer fall back to the alerts page.
pub const MAX_URL_LEN: usize = 255;

/// Annotations used as trigger comment, first present wins.
const COMMENT_ANNOTATIONS: [&str; 3] = ["summary", "message", "description"];

/// When a trigger fires.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FiringCondition {
    /// Item value `<>0`.
    #[default]
    NotEqualZero,
    /// Item value `>0`.
    GreaterThanZero,
}

impl FiringCondition {
    pub fn operator(self) -> &'static str {
        match self {
            Self::NotEqualZero => "<>0",
            Self::GreaterThanZero => ">0",
        }
    }
}

impl fmt::Display for FiringCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::NotEqualZero => "ne-zero",
            Self::GreaterThanZero => "gt-zero",
        })
    }
}

/// Options shared by every host entry.
#[derive(Debug, Clone)]
pub struct SynthesisOptions {
    /// Prefix of every item key.
    pub key_prefix: String,
    /// Base URL for trigger drill-down links and target discovery.
    pub prometheus_url: Option<String>,
    pub firing: FiringCondition,
}

impl Default for SynthesisOptions {
    fn default() -> Self {
        Self {
            key_prefix: "prometheus".to_string(),
            prometheus_url: None,
            firing: FiringCondition::default(),
        }
    }
}

pub struct Synthesizer {
    options: SynthesisOptions,
}

impl Synthesizer {
    pub fn new(mut options: SynthesisOptions) -> Self {
        options.prometheus_url = options
            .prometheus_url
            .map(|url| url.trim_end_matches('/').to_string())
            .filter(|url| !url.is_empty());
        log::debug!(
            "Synthesizing with key prefix '{}', firing condition {}",
            options.key_prefix,
            options.firing
        );
        Self { options }
    }

    pub fn item_key(&self, rule_name: &str) -> String {
        format!(
            "{}.{}",
            self.options.key_prefix.to_lowercase(),
            rule_name.to_lowercase()
        )
    }

    /// Build the template of a host entry, children included.
    pub fn template(&self, config: &HostConfig, rules: &[Rule]) -> Template {
        let mut template = Template::named(config.name.as_str());
        template.host_groups = config.host_groups().map(str::to_string).collect();

        let tags: Vec<Tag> = config
            .trigger_tags
            .iter()
            .map(|(tag, value)| Tag {
                tag: tag.clone(),
                value: value.clone(),
            })
            .collect();

        let application = config.item_default_application.as_str();
        for rule in rules {
            let key = self.item_key(&rule.name);

            template
                .children
                .insert_application(Application::named(application), State::New);
            let item = Item {
                id: None,
                key: key.clone(),
                name: rule.name.clone(),
                description: String::new(),
                history: config.item_default_history.clone(),
                trends: config.item_default_trends.clone(),
                trapper_hosts: config.item_default_trapper_hosts.clone(),
                applications: BTreeSet::from([application.to_string()]),
            };

            let trigger = self.trigger(&config.name, &key, rule, tags.clone());
            log::debug!("Loading item from rules: {:?}", item);
            template.children.insert_item(item, State::New);
            log::debug!("Loading trigger from rules: {:?}", trigger);
            template.children.insert_trigger(trigger, State::New);
        }

        template
    }

    fn trigger(&self, owner: &str, key: &str, rule: &Rule, tags: Vec<Tag>) -> Trigger {
        let (expression, description) = match rule.annotations.get(NODATA_ANNOTATION) {
            Some(delay) => (
                nodata_expression(owner, key, delay),
                format!("{} - no data for the last {} seconds", rule.name, delay),
            ),
            None => (
                trigger_expression(owner, key, self.options.firing),
                rule.name.clone(),
            ),
        };

        Trigger {
            id: None,
            expression,
            description,
            priority: rule
                .labels
                .get("severity")
                .map(|s| priority_for_severity(s))
                .unwrap_or_default(),
            comments: comment_for(&rule.annotations),
            url: self
                .options
                .prometheus_url
                .as_deref()
                .map(|base| drill_down_url(base, &rule.expression))
                .unwrap_or_default(),
            manual_close: true,
            tags,
        }
    }

    /// Desired hosts for the instances discovered under a host entry.
    pub fn hosts(&self, config: &HostConfig, instances: &[String]) -> Vec<Host> {
        let Some(group) = config.host_groups().next() else {
            return Vec::new();
        };

        let mut inventory = BTreeMap::from([("tag".to_string(), config.inventory_tag().to_string())]);
        if !config.deployment_status.is_empty() {
            inventory.insert(
                "deployment_status".to_string(),
                config.deployment_status.clone(),
            );
        }

        instances
            .iter()
            .map(|instance| Host {
                id: None,
                name: instance.clone(),
                host_groups: BTreeSet::from([group.to_string()]),
                inventory: inventory.clone(),
                interfaces: vec![HostInterface::agent("127.0.0.1", "10050")],
                children: Default::default(),
            })
            .collect()
    }

    /// Insert everything a host entry wants into the graph.
    pub fn populate(&self, graph: &mut Graph, config: &HostConfig, rules: &[Rule], instances: &[String]) {
        for group in config.host_groups() {
            graph.insert_host_group(HostGroup::named(group), State::New);
        }

        log::info!(
            "Rules for template {} loaded: {}",
            config.name,
            rules.len()
        );
        graph.insert_template(self.template(config, rules), State::New);

        for host in self.hosts(config, instances) {
            log::debug!("Host from targets: {:?}", host);
            graph.insert_host(host, State::New);
        }
    }
}

/// `{<owner>:<key>.last()}<>0` or `>0`.
pub fn trigger_expression(owner: &str, key: &str, firing: FiringCondition) -> String {
    format!("{{{owner}:{key}.last()}}{}", firing.operator())
}

/// `{<owner>:<key>.nodata(<delay>)}`.
pub fn nodata_expression(owner: &str, key: &str, delay: &str) -> String {
    format!("{{{owner}:{key}.nodata({delay})}}")
}

/// Link to the rule's graph, or to the alerts page when too long.
pub fn drill_down_url(base: &str, expression: &str) -> String {
    let escaped: String = url::form_urlencoded::byte_serialize(expression.as_bytes()).collect();
    let graph = format!("{base}/graph?g0.expr={escaped}");
    if graph.len() >= MAX_URL_LEN {
        format!("{base}/alerts")
    } else {
        graph
    }
}

/// Case-insensitive severity label to priority; unknown values are not classified.
pub fn priority_for_severity(severity: &str) -> Priority {
    match severity.to_lowercase().as_str() {
        "information" => Priority::Information,
        "warning" => Priority::Warning,
        "average" => Priority::Average,
        "high" => Priority::High,
        "critical" => Priority::Disaster,
        _ => Priority::NotClassified,
    }
}

fn comment_for(annotations: &BTreeMap<String, String>) -> String {
    COMMENT_ANNOTATIONS
        .iter()
        .find_map(|name| annotations.get(*name))
        .cloned()
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> HostConfig {
        let mut config = HostConfig::new("Prometheus");
        config.host_groups = vec!["Prometheus".to_string(), "Alerts".to_string()];
        config
    }

    fn rule(name: &str) -> Rule {
        Rule {
            name: name.to_string(),
            expression: "node_load1 > 4".to_string(),
            ..Default::default()
        }
    }

    fn synthesizer(url: Option<&str>) -> Synthesizer {
        Synthesizer::new(SynthesisOptions {
            key_prefix: "Prometheus".to_string(),
            prometheus_url: url.map(str::to_string),
            firing: FiringCondition::NotEqualZero,
        })
    }

    #[test]
    fn test_item_key_is_lowercase() {
        assert_eq!(synthesizer(None).item_key("HighLoad"), "prometheus.highload");
    }

    #[test]
    fn test_trigger_expression_variants() {
        assert_eq!(
            trigger_expression("Prometheus", "prometheus.highload", FiringCondition::NotEqualZero),
            "{Prometheus:prometheus.highload.last()}<>0"
        );
        assert_eq!(
            trigger_expression("Prometheus", "prometheus.highload", FiringCondition::GreaterThanZero),
            "{Prometheus:prometheus.highload.last()}>0"
        );
    }

    #[test]
    fn test_firing_condition_display() {
        assert_eq!(FiringCondition::default().to_string(), "ne-zero");
        assert_eq!(FiringCondition::GreaterThanZero.to_string(), "gt-zero");
    }

    #[test]
    fn test_severity_is_case_insensitive() {
        let critical = priority_for_severity("critical");
        assert_eq!(priority_for_severity("CRITICAL"), critical);
        assert_eq!(priority_for_severity("Critical"), critical);
        assert_eq!(critical.as_i32(), 5);

        assert_eq!(priority_for_severity("information").as_i32(), 1);
        assert_eq!(priority_for_severity("Warning").as_i32(), 2);
        assert_eq!(priority_for_severity("average").as_i32(), 3);
        assert_eq!(priority_for_severity("HIGH").as_i32(), 4);
        assert_eq!(priority_for_severity("page"), Priority::NotClassified);
        assert_eq!(priority_for_severity(""), Priority::NotClassified);
    }

    #[test]
    fn test_drill_down_url_short() {
        assert_eq!(
            drill_down_url("http://prometheus:9090", "node_load1 > 4"),
            "http://prometheus:9090/graph?g0.expr=node_load1+%3E+4"
        );
    }

    #[test]
    fn test_drill_down_url_falls_back_when_long() {
        let expression = format!("sum(rate({}[5m])) > 0", "x".repeat(250));
        assert_eq!(
            drill_down_url("http://prometheus:9090", &expression),
            "http://prometheus:9090/alerts"
        );
    }

    #[test]
    fn test_drill_down_url_length_boundary() {
        // "http://p/graph?g0.expr=" is 23 characters
        let at_limit = drill_down_url("http://p", &"a".repeat(MAX_URL_LEN - 23));
        assert_eq!(at_limit, "http://p/alerts");

        let below = drill_down_url("http://p", &"a".repeat(MAX_URL_LEN - 24));
        assert_eq!(below.len(), MAX_URL_LEN - 1);
    }

    #[test]
    fn test_comment_precedence() {
        let mut annotations = BTreeMap::from([
            ("description".to_string(), "from description".to_string()),
            ("message".to_string(), "from message".to_string()),
        ]);
        assert_eq!(comment_for(&annotations), "from message");

        annotations.insert("summary".to_string(), "from summary".to_string());
        assert_eq!(comment_for(&annotations), "from summary");

        assert_eq!(comment_for(&BTreeMap::new()), "");
    }

    #[test]
    fn test_template_from_rules() {
        let mut config = config();
        config
            .trigger_tags
            .insert("team".to_string(), "infra".to_string());
        let mut high_load = rule("HighLoad");
        high_load
            .labels
            .insert("severity".to_string(), "high".to_string());
        high_load
            .annotations
            .insert("summary".to_string(), "Load is high".to_string());

        let template = synthesizer(Some("http://prometheus:9090/")).template(&config, &[high_load]);

        assert_eq!(template.name, "Prometheus");
        assert_eq!(template.host_groups.len(), 2);

        let item = &template.children.items["prometheus.highload"];
        assert_eq!(item.state, State::New);
        assert_eq!(item.value.name, "HighLoad");
        assert_eq!(item.value.history, "5d");
        assert!(item.value.applications.contains("prometheus"));
        assert!(template.children.applications.contains_key("prometheus"));

        let trigger = &template.children.triggers["{Prometheus:prometheus.highload.last()}<>0"];
        assert_eq!(trigger.value.description, "HighLoad");
        assert_eq!(trigger.value.priority, Priority::High);
        assert_eq!(trigger.value.comments, "Load is high");
        assert!(trigger.value.manual_close);
        assert!(trigger.value.url.starts_with("http://prometheus:9090/graph?g0.expr="));
        assert_eq!(trigger.value.tags[0].tag, "team");
    }

    #[test]
    fn test_nodata_replaces_default_expression() {
        let mut heartbeat = rule("Heartbeat");
        heartbeat
            .annotations
            .insert(NODATA_ANNOTATION.to_string(), "600".to_string());

        let template = synthesizer(None).template(&config(), &[heartbeat]);
        assert_eq!(template.children.triggers.len(), 1);

        let trigger = &template.children.triggers.values().next().unwrap().value;
        assert_eq!(trigger.expression, "{Prometheus:prometheus.heartbeat.nodata(600)}");
        assert!(!trigger.expression.contains(".last()"));
        assert!(trigger.description.contains("600"));
        assert_eq!(
            trigger.description,
            "Heartbeat - no data for the last 600 seconds"
        );
        assert!(trigger.url.is_empty());
    }

    #[test]
    fn test_hosts_join_first_group() {
        let mut config = config();
        config.deployment_status = "0".to_string();
        let hosts = synthesizer(None).hosts(&config, &["node-1".to_string()]);

        assert_eq!(hosts.len(), 1);
        let host = &hosts[0];
        assert_eq!(host.name, "node-1");
        assert_eq!(host.host_groups, BTreeSet::from(["Prometheus".to_string()]));
        assert_eq!(host.inventory["tag"], "Prom2zbx");
        assert_eq!(host.inventory["deployment_status"], "0");
        assert_eq!(host.interfaces[0].port, "10050");
    }

    #[test]
    fn test_padded_group_names_are_trimmed() {
        let mut config = config();
        config.host_groups = vec!["Prometheus ".to_string(), " ".to_string()];

        let template = synthesizer(None).template(&config, &[]);
        assert_eq!(template.host_groups, BTreeSet::from(["Prometheus".to_string()]));

        let hosts = synthesizer(None).hosts(&config, &["node-1".to_string()]);
        assert_eq!(hosts[0].host_groups, BTreeSet::from(["Prometheus".to_string()]));
    }

    #[test]
    fn test_populate() {
        let mut graph = Graph::new();
        synthesizer(None).populate(
            &mut graph,
            &config(),
            &[rule("HighLoad"), rule("DiskFull")],
            &["node-1".to_string()],
        );

        let groups = graph.host_groups_by_state();
        assert_eq!(groups.new.len(), 2);
        let template = graph.template("Prometheus").unwrap();
        assert_eq!(template.value.children.items.len(), 2);
        assert_eq!(template.value.children.applications.len(), 1);
        assert_eq!(graph.host("node-1").unwrap().state, State::New);
    }
}
