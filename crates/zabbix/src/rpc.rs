//! JSON-RPC transport.
//!
//! The [`Transport`] trait is the seam between the typed API and the wire.
//! [`HttpTransport`] talks to a real frontend through `api_jsonrpc.php`;
//! [`MockTransport`] answers from canned results, for tests.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Default timeout for a single API request.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Methods that must be called without an `auth` token.
const ANONYMOUS_METHODS: &[&str] = &["apiinfo.version", "user.login"];

/// A JSON-RPC transport.
pub trait Transport: Send + Sync {
    /// Invoke `method` with `params` and return the `result` member.
    fn call(&self, method: &str, params: Value) -> Result<Value>;
}

impl<T: Transport + ?Sized> Transport for Arc<T> {
    fn call(&self, method: &str, params: Value) -> Result<Value> {
        (**self).call(method, params)
    }
}

#[derive(Debug, Serialize)]
struct Request<'a> {
    jsonrpc: &'static str,
    method: &'a str,
    params: Value,
    id: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    auth: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct Response {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    code: i64,
    message: String,
    #[serde(default)]
    data: String,
}

impl Response {
    fn into_result(self) -> Result<Value> {
        if let Some(err) = self.error {
            return Err(Error::Api {
                code: err.code,
                message: err.message,
                data: err.data,
            });
        }
        self.result
            .ok_or_else(|| Error::InvalidResponse("response has neither result nor error".into()))
    }
}

/// Blocking HTTP transport with session handling.
pub struct HttpTransport {
    agent: ureq::Agent,
    url: String,
    auth: Option<String>,
    next_id: AtomicU64,
}

impl HttpTransport {
    /// Create a transport for the given `api_jsonrpc.php` URL.
    pub fn new(url: impl Into<String>) -> Self {
        Self::with_timeout(url, DEFAULT_TIMEOUT)
    }

    /// Create a transport with a custom request timeout.
    pub fn with_timeout(url: impl Into<String>, timeout: Duration) -> Self {
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .build()
            .into();
        Self {
            agent,
            url: url.into(),
            auth: None,
            next_id: AtomicU64::new(1),
        }
    }

    /// Whether a session token is held.
    pub fn is_logged_in(&self) -> bool {
        self.auth.is_some()
    }

    /// Log in and keep the session token for subsequent calls.
    pub fn login(&mut self, user: &str, password: &str) -> Result<()> {
        let token = self.call(
            "user.login",
            serde_json::json!({ "user": user, "password": password }),
        )?;
        let token = token
            .as_str()
            .ok_or_else(|| Error::InvalidResponse("user.login did not return a token".into()))?;
        self.auth = Some(token.to_string());
        log::debug!("Logged in to {} as {}", self.url, user);
        Ok(())
    }
}

impl Transport for HttpTransport {
    fn call(&self, method: &str, params: Value) -> Result<Value> {
        let auth = if ANONYMOUS_METHODS.contains(&method) {
            None
        } else {
            Some(self.auth.as_deref().ok_or(Error::NotLoggedIn)?)
        };

        let request = Request {
            jsonrpc: "2.0",
            method,
            params,
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            auth,
        };
        if method == "user.login" {
            log::trace!("-> {}", method);
        } else {
            log::trace!("-> {} {}", method, request.params);
        }

        let response: Response = self
            .agent
            .post(&self.url)
            .header("Content-Type", "application/json-rpc")
            .header("User-Agent", "zal")
            .send_json(&request)?
            .body_mut()
            .read_json()?;

        response.into_result()
    }
}

#[derive(Debug, Clone)]
enum MockReply {
    Result(Value),
    ApiError { code: i64, message: String },
}

/// Mock transport for testing without a Zabbix server.
///
/// Replies are queued per method and consumed in order. Every request is
/// recorded and can be inspected with [`MockTransport::calls`].
#[derive(Debug, Default)]
pub struct MockTransport {
    replies: Mutex<HashMap<String, VecDeque<MockReply>>>,
    calls: Mutex<Vec<(String, Value)>>,
}

impl MockTransport {
    /// Create a new empty mock transport.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a successful result for `method`.
    pub fn reply(&self, method: &str, result: Value) -> &Self {
        self.push(method, MockReply::Result(result));
        self
    }

    /// Queue a JSON-RPC error for `method`.
    pub fn reply_error(&self, method: &str, code: i64, message: &str) -> &Self {
        self.push(
            method,
            MockReply::ApiError {
                code,
                message: message.to_string(),
            },
        );
        self
    }

    /// All requests made so far, in order.
    pub fn calls(&self) -> Vec<(String, Value)> {
        self.calls.lock().unwrap().clone()
    }

    fn push(&self, method: &str, reply: MockReply) {
        self.replies
            .lock()
            .unwrap()
            .entry(method.to_string())
            .or_default()
            .push_back(reply);
    }
}

impl Transport for MockTransport {
    fn call(&self, method: &str, params: Value) -> Result<Value> {
        self.calls
            .lock()
            .unwrap()
            .push((method.to_string(), params));

        let reply = self
            .replies
            .lock()
            .unwrap()
            .get_mut(method)
            .and_then(VecDeque::pop_front);

        match reply {
            Some(MockReply::Result(value)) => Ok(value),
            Some(MockReply::ApiError { code, message }) => Err(Error::Api {
                code,
                message,
                data: String::new(),
            }),
            None => Err(Error::InvalidResponse(format!(
                "mock reply not configured: {method}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_response_error_object() {
        let response: Response = serde_json::from_value(json!({
            "jsonrpc": "2.0",
            "error": {"code": -32602, "message": "Invalid params.", "data": "Host group \"x\" already exists."},
            "id": 1
        }))
        .unwrap();

        match response.into_result() {
            Err(Error::Api { code, data, .. }) => {
                assert_eq!(code, -32602);
                assert!(data.contains("already exists"));
            }
            other => panic!("Expected Error::Api, got {other:?}"),
        }
    }

    #[test]
    fn test_response_without_result() {
        let response: Response = serde_json::from_value(json!({"jsonrpc": "2.0", "id": 1})).unwrap();
        assert!(matches!(
            response.into_result(),
            Err(Error::InvalidResponse(_))
        ));
    }

    #[test]
    fn test_request_envelope() {
        let request = Request {
            jsonrpc: "2.0",
            method: "hostgroup.get",
            params: json!({"output": "extend"}),
            id: 7,
            auth: Some("0424bd59b807674191e7d77572075f33"),
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["method"], "hostgroup.get");
        assert_eq!(value["id"], 7);
        assert_eq!(value["auth"], "0424bd59b807674191e7d77572075f33");

        let anonymous = Request {
            auth: None,
            ..request
        };
        assert!(serde_json::to_value(&anonymous).unwrap().get("auth").is_none());
    }

    #[test]
    fn test_http_transport_requires_login() {
        let transport = HttpTransport::new("http://127.0.0.1:1/api_jsonrpc.php");
        assert!(!transport.is_logged_in());
        assert!(matches!(
            transport.call("host.get", json!({})),
            Err(Error::NotLoggedIn)
        ));
    }

    #[test]
    fn test_mock_transport_replies_in_order() {
        let mock = MockTransport::new();
        mock.reply("host.get", json!([]))
            .reply_error("host.get", -32500, "Application error.");

        assert_eq!(mock.call("host.get", json!({})).unwrap(), json!([]));
        assert!(matches!(
            mock.call("host.get", json!({})),
            Err(Error::Api { code: -32500, .. })
        ));
        assert!(mock.call("host.get", json!({})).is_err());
        assert_eq!(mock.calls().len(), 3);
    }
}
