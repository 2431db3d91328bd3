//! Host configuration file loading.
//!
//! The file is a list of host entries in YAML, TOML or JSON, picked by
//! extension. YAML and JSON may hold the list directly or under `hosts`;
//! TOML needs the `[[hosts]]` form.

use anyhow::{Context, Result, bail};
use provisioner::HostConfig;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Get the config directory path
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir().context("Could not determine home directory")?;
    Ok(home.join(".config").join("zal"))
}

/// Default host configuration file
pub fn default_config_path() -> Result<PathBuf> {
    Ok(config_dir()?.join("hosts.yml"))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Yaml,
    Toml,
    Json,
}

impl ConfigFormat {
    pub fn from_path(path: &Path) -> Result<Self> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("yml" | "yaml") => Ok(Self::Yaml),
            Some("toml") => Ok(Self::Toml),
            Some("json") => Ok(Self::Json),
            _ => bail!(
                "Unsupported config format for {} (expected .yml, .yaml, .toml or .json)",
                path.display()
            ),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum HostsFile {
    List(Vec<HostConfig>),
    Table { hosts: Vec<HostConfig> },
}

impl HostsFile {
    fn into_hosts(self) -> Vec<HostConfig> {
        match self {
            Self::List(hosts) | Self::Table { hosts } => hosts,
        }
    }
}

/// Parse host entries from `content`.
pub fn parse_hosts(content: &str, format: ConfigFormat) -> Result<Vec<HostConfig>> {
    let file: HostsFile = match format {
        ConfigFormat::Yaml => serde_yaml::from_str(content).context("Invalid YAML host configuration")?,
        ConfigFormat::Toml => toml::from_str(content).context("Invalid TOML host configuration")?,
        ConfigFormat::Json => serde_json::from_str(content).context("Invalid JSON host configuration")?,
    };
    Ok(file.into_hosts())
}

/// Load host entries and resolve each `alertsDir` against the file's directory.
pub fn load_hosts(path: &Path) -> Result<Vec<HostConfig>> {
    let format = ConfigFormat::from_path(path)?;
    let content =
        fs::read_to_string(path).with_context(|| format!("Could not read {}", path.display()))?;
    let mut hosts =
        parse_hosts(&content, format).with_context(|| format!("Could not parse {}", path.display()))?;

    let base = path.parent().unwrap_or_else(|| Path::new("."));
    for host in hosts.iter_mut().filter(|h| !h.alerts_dir.as_os_str().is_empty()) {
        host.alerts_dir = resolve_dir(base, &host.alerts_dir);
    }

    provisioner::config::validate(&hosts)?;
    log::debug!("Loaded {} host entries from {}", hosts.len(), path.display());
    Ok(hosts)
}

fn resolve_dir(base: &Path, dir: &Path) -> PathBuf {
    let expanded = shellexpand::tilde(&dir.to_string_lossy()).into_owned();
    let expanded = PathBuf::from(expanded);
    if expanded.is_absolute() {
        expanded
    } else {
        base.join(expanded)
    }
}
