//! Prometheus alerting rules.
//!
//! Rule files are the standard rule-group format:
//!
//! ```yaml
//! groups:
//!   - name: node
//!     rules:
//!       - alert: HighLoad
//!         expr: node_load1 > 4
//!         labels:
//!           severity: warning
//!         annotations:
//!           summary: Load is high
//! ```
//!
//! Recording rules (`record:`) carry no alert and are skipped.

use crate::error::{Error, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// One alerting rule.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Rule {
    pub name: String,
    pub expression: String,
    pub labels: BTreeMap<String, String>,
    pub annotations: BTreeMap<String, String>,
}

/// Source of alerting rules for one host entry.
pub trait RuleSource {
    fn rules(&self, dir: &Path) -> Result<Vec<Rule>>;
}

#[derive(Debug, Deserialize)]
struct RuleFile {
    #[serde(default)]
    groups: Vec<RuleGroup>,
}

#[derive(Debug, Deserialize)]
struct RuleGroup {
    #[serde(default)]
    rules: Vec<RawRule>,
}

#[derive(Debug, Deserialize)]
struct RawRule {
    #[serde(default)]
    alert: Option<String>,
    #[serde(default)]
    expr: String,
    #[serde(default)]
    labels: BTreeMap<String, String>,
    #[serde(default)]
    annotations: BTreeMap<String, String>,
}

/// Reads every `*.yml` / `*.yaml` file below a directory, in path order.
#[derive(Debug, Clone, Copy, Default)]
pub struct RuleDir;

impl RuleDir {
    fn files(dir: &Path) -> Result<Vec<PathBuf>> {
        if !dir.is_dir() {
            return Err(Error::rules(dir, "not a directory"));
        }

        let mut files = Vec::new();
        for entry in WalkDir::new(dir).sort_by_file_name() {
            let entry = entry.map_err(|e| Error::rules(dir, e))?;
            let path = entry.path();
            let is_rule_file = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e == "yml" || e == "yaml");
            if entry.file_type().is_file() && is_rule_file {
                files.push(path.to_path_buf());
            }
        }
        Ok(files)
    }

    /// Parse one rule file.
    pub fn parse(path: &Path, content: &str) -> Result<Vec<Rule>> {
        if content.trim().is_empty() {
            return Ok(Vec::new());
        }
        let file: RuleFile = serde_yaml::from_str(content).map_err(|e| Error::rules(path, e))?;

        Ok(file
            .groups
            .into_iter()
            .flat_map(|group| group.rules)
            .filter_map(|raw| {
                let name = raw.alert?;
                Some(Rule {
                    name,
                    expression: raw.expr,
                    labels: raw.labels,
                    annotations: raw.annotations,
                })
            })
            .collect())
    }
}

impl RuleSource for RuleDir {
    fn rules(&self, dir: &Path) -> Result<Vec<Rule>> {
        let mut rules = Vec::new();
        for path in Self::files(dir)? {
            let content = std::fs::read_to_string(&path).map_err(|e| Error::rules(&path, e))?;
            let parsed = Self::parse(&path, &content)?;
            log::debug!("Loaded {} rules from {}", parsed.len(), path.display());
            rules.extend(parsed);
        }
        Ok(rules)
    }
}

/// Fixed rules, for tests and embedding.
#[derive(Debug, Clone, Default)]
pub struct StaticRules(pub Vec<Rule>);

impl RuleSource for StaticRules {
    fn rules(&self, _dir: &Path) -> Result<Vec<Rule>> {
        Ok(self.0.clone())
    }
}
