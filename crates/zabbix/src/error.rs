//! Error types for Zabbix API operations.
//!
//! Errors are categorized so callers can tell a broken transport from an
//! API-level rejection or a response with an unexpected shape.

use std::fmt;

/// Result type alias for Zabbix operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Categories of Zabbix errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// The request never produced a JSON-RPC response (connection, timeout, HTTP status).
    Transport,
    /// The server answered with a JSON-RPC error object.
    Api,
    /// The response had a different cardinality than the call requires.
    Shape,
    /// The response body could not be decoded.
    Format,
    /// A call was made before logging in.
    Session,
}

impl ErrorCategory {
    /// Whether this error category is typically transient.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transport)
    }

    /// Get a user-friendly description of this error category.
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            Self::Transport => "Could not reach the Zabbix API",
            Self::Api => "Zabbix rejected the request",
            Self::Shape => "Unexpected number of results",
            Self::Format => "Malformed API response",
            Self::Session => "Not logged in",
        }
    }

    /// Get actionable advice for resolving this error category.
    #[must_use]
    pub fn advice(&self) -> &'static str {
        match self {
            Self::Transport => "Check the API URL and that the frontend is reachable",
            Self::Api => "Check the error data and the permissions of the API user",
            Self::Shape => "The object may have been changed concurrently, rerun to reconcile",
            Self::Format => "Check that the URL points at api_jsonrpc.php",
            Self::Session => "Log in before issuing authenticated calls",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// Errors that can occur while talking to the Zabbix API.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// HTTP request failed.
    #[error("HTTP request failed: {message}")]
    Http {
        /// Error message.
        message: String,
        /// HTTP status code if available.
        status: Option<u16>,
    },

    /// The API returned a JSON-RPC error object.
    #[error("API error {code}: {message} {data}")]
    Api {
        /// JSON-RPC error code.
        code: i64,
        /// Short error message.
        message: String,
        /// Detailed error description.
        data: String,
    },

    /// Invalid response from the API.
    #[error("invalid API response: {0}")]
    InvalidResponse(String),

    /// A lookup that must match exactly one object matched a different number.
    #[error("expected exactly one result, got {0}")]
    ExpectedOneResult(usize),

    /// A batch confirmation returned a different number of IDs than requested.
    #[error("expected {expected} results, got {got}")]
    ExpectedMore {
        /// Number of objects in the request.
        expected: usize,
        /// Number of IDs confirmed by the server.
        got: usize,
    },

    /// An authenticated method was called without a session.
    #[error("not logged in, call user.login first")]
    NotLoggedIn,
}

impl Error {
    /// Create an HTTP error.
    pub fn http(message: impl Into<String>, status: Option<u16>) -> Self {
        Self::Http {
            message: message.into(),
            status,
        }
    }

    /// Get the category of this error.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Http { .. } => ErrorCategory::Transport,
            Self::Api { .. } => ErrorCategory::Api,
            Self::InvalidResponse(_) => ErrorCategory::Format,
            Self::ExpectedOneResult(_) | Self::ExpectedMore { .. } => ErrorCategory::Shape,
            Self::NotLoggedIn => ErrorCategory::Session,
        }
    }

    /// Whether this is a cardinality error.
    #[must_use]
    pub fn is_shape(&self) -> bool {
        self.category() == ErrorCategory::Shape
    }
}

impl From<ureq::Error> for Error {
    fn from(err: ureq::Error) -> Self {
        match err {
            ureq::Error::StatusCode(code) => Self::Http {
                message: format!("HTTP {}", code),
                status: Some(code),
            },
            other => Self::Http {
                message: other.to_string(),
                status: None,
            },
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidResponse(err.to_string())
    }
}
