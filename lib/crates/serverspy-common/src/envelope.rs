//! Outbound call envelopes, call diagnostics and the wire-level result
//! shapes written back to the caller.

use serde::Serialize;
use serde_json::Value;

use crate::error::AgentError;

/// Version string sent in the agent header on every control-API call.
pub const CLIENT_VERSION: &str = "0.1";

/// Header carrying [`CLIENT_VERSION`].
pub const AGENT_HEADER: &str = "ServerSpy-Agent";

/// Extra header on `maps` submissions, carrying the task identifier.
pub const TOKEN_HEADER: &str = "Token";

/// Inbound header whose presence selects the task pipeline.
pub const TASK_ID_HEADER: &str = "TaskId";

/// HTTP methods used against the control API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Get,
    Post,
}

impl Method {
    pub fn as_str(self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
        }
    }
}

/// One outbound control-API call. Built fresh per call, never reused.
#[derive(Debug, Clone, PartialEq)]
pub struct CallEnvelope {
    pub url: String,
    pub method: Method,
    pub headers: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl CallEnvelope {
    /// Envelope with the default JSON and agent-version headers.
    pub fn new(api_base: &str, endpoint: &str, method: Method) -> Self {
        Self {
            url: join_url(api_base, endpoint),
            method,
            headers: vec![
                ("Content-Type".to_string(), "application/json".to_string()),
                (AGENT_HEADER.to_string(), CLIENT_VERSION.to_string()),
            ],
            body: None,
        }
    }

    pub fn get(api_base: &str, endpoint: &str) -> Self {
        Self::new(api_base, endpoint, Method::Get)
    }

    pub fn post(api_base: &str, endpoint: &str, body: Value) -> Self {
        Self {
            body: Some(body),
            ..Self::new(api_base, endpoint, Method::Post)
        }
    }

    #[must_use]
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

fn join_url(base: &str, endpoint: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        endpoint.trim_start_matches('/')
    )
}

/// Diagnostics of one outbound call, reported as `debug` on failure.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CallDebug {
    pub url: String,
    pub method: Method,
    /// HTTP status, absent when no response arrived.
    pub http_code: Option<u16>,
    pub total_time_ms: u64,
    pub request_size: usize,
    /// Offending response body, attached when the reply was rejected.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

/// Per-request record of the last outbound call.
///
/// Threaded by `&mut` through every control-API call of one request so the
/// failure envelope can report what was last attempted.
#[derive(Debug, Default)]
pub struct CallTrace {
    last: Option<CallDebug>,
}

impl CallTrace {
    pub fn record(&mut self, debug: CallDebug) {
        self.last = Some(debug);
    }

    /// Attach a rejected response body to the last recorded call.
    pub fn attach_body(&mut self, body: Value) {
        if let Some(last) = self.last.as_mut() {
            last.body = Some(body);
        }
    }

    pub fn last(&self) -> Option<&CallDebug> {
        self.last.as_ref()
    }

    pub fn into_last(self) -> Option<CallDebug> {
        self.last
    }
}

/// `{status: false, error, debug}`: the single failure shape of the task
/// endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct FailureEnvelope {
    pub status: bool,
    pub error: String,
    pub debug: Option<CallDebug>,
}

impl FailureEnvelope {
    pub fn new(error: &AgentError, trace: CallTrace) -> Self {
        Self {
            status: false,
            error: error.to_string(),
            debug: trace.into_last(),
        }
    }
}

/// Result of a `push` task. Failures are reported here, never raised.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PushOutcome {
    pub status: bool,
    /// OS error number, `-1` when the failure has none, `0` on success.
    pub errno: i32,
    pub errstr: String,
}

impl PushOutcome {
    pub fn ok() -> Self {
        Self {
            status: true,
            errno: 0,
            errstr: String::new(),
        }
    }

    pub fn failed(errno: i32, errstr: impl Into<String>) -> Self {
        Self {
            status: false,
            errno,
            errstr: errstr.into(),
        }
    }

    pub fn from_io(err: &std::io::Error) -> Self {
        Self::failed(err.raw_os_error().unwrap_or(-1), err.to_string())
    }
}
