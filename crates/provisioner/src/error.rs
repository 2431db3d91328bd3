//! Error types for provisioning runs.
//!
//! Every backend failure is wrapped with the phase, the action and the
//! parent scope it happened in. Nothing is retried: the first error ends
//! the run and a rerun reconciles whatever was already applied.

use std::fmt;
use std::path::PathBuf;

/// Result type alias for provisioning operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Categories of provisioning errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Bad host configuration or unreadable input; raised before any backend call.
    Configuration,
    /// Transport failure, API rejection or malformed response.
    Backend,
    /// The backend returned a different number of results than required.
    Shape,
    /// An entity references something whose identifier was never resolved.
    Consistency,
}

impl ErrorCategory {
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            Self::Configuration => "Invalid configuration",
            Self::Backend => "Zabbix call failed",
            Self::Shape => "Unexpected result count",
            Self::Consistency => "Unresolved reference",
        }
    }

    /// Whether the backend may have been partially changed.
    #[must_use]
    pub fn may_be_partial(&self) -> bool {
        !matches!(self, Self::Configuration)
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// Stage of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Synthesize,
    Load,
    Apply,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Synthesize => "synthesize",
            Self::Load => "load",
            Self::Apply => "apply",
        })
    }
}

/// Errors that can occur during a provisioning run.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Host configuration is missing or invalid.
    #[error("configuration error: {0}")]
    Config(String),

    /// A rule directory or file could not be read.
    #[error("failed to read rules from {}: {message}", path.display())]
    Rules { path: PathBuf, message: String },

    /// Target discovery failed.
    #[error("failed to discover targets from {url}: {message}")]
    Targets { url: String, message: String },

    /// A backend call failed.
    #[error("{phase} failed at {action} ({scope}): {source}")]
    Backend {
        phase: Phase,
        action: String,
        scope: String,
        #[source]
        source: zabbix::Error,
    },

    /// An entity's identifier was needed but never resolved.
    #[error("{kind} '{name}' has no identifier")]
    MissingIdentifier { kind: &'static str, name: String },
}

impl Error {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    pub fn rules(path: impl Into<PathBuf>, message: impl fmt::Display) -> Self {
        Self::Rules {
            path: path.into(),
            message: message.to_string(),
        }
    }

    pub fn missing_id(kind: &'static str, name: impl Into<String>) -> Self {
        Self::MissingIdentifier {
            kind,
            name: name.into(),
        }
    }

    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Config(_) | Self::Rules { .. } | Self::Targets { .. } => {
                ErrorCategory::Configuration
            }
            Self::Backend { source, .. } if source.is_shape() => ErrorCategory::Shape,
            Self::Backend { .. } => ErrorCategory::Backend,
            Self::MissingIdentifier { .. } => ErrorCategory::Consistency,
        }
    }
}

/// Attach phase and scope to backend results.
pub trait ResultExt<T> {
    fn during(self, phase: Phase, action: &str, scope: &dyn fmt::Display) -> Result<T>;
}

impl<T> ResultExt<T> for zabbix::Result<T> {
    fn during(self, phase: Phase, action: &str, scope: &dyn fmt::Display) -> Result<T> {
        self.map_err(|source| Error::Backend {
            phase,
            action: action.to_string(),
            scope: scope.to_string(),
            source,
        })
    }
}
