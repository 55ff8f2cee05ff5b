//! Control-API client.
//!
//! Every call is attempt-once. The diagnostics of each call are recorded in
//! the request's [`CallTrace`] whether or not the call succeeds.

use std::time::{Duration, Instant};

use reqwest::Client;
use serde_json::Value;

use serverspy_common::{AgentError, CallDebug, CallEnvelope, CallTrace, Method};

/// HTTP client bound to one control-API base URL.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: Client,
    base: String,
}

impl ApiClient {
    /// Build a client. `timeout` of `None` lets calls block indefinitely.
    ///
    /// # Errors
    ///
    /// Returns an error if the TLS backend cannot be initialised.
    pub fn new(base: impl Into<String>, timeout: Option<Duration>) -> Result<Self, AgentError> {
        let mut builder = Client::builder().user_agent(concat!(
            env!("CARGO_PKG_NAME"),
            "/",
            env!("CARGO_PKG_VERSION")
        ));
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder
            .build()
            .map_err(|e| AgentError::Internal(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            http,
            base: base.into(),
        })
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    /// Envelope for a `GET` against this client's base URL.
    pub fn get(&self, endpoint: &str) -> CallEnvelope {
        CallEnvelope::get(&self.base, endpoint)
    }

    /// Envelope for a JSON `POST` against this client's base URL.
    pub fn post(&self, endpoint: &str, body: Value) -> CallEnvelope {
        CallEnvelope::post(&self.base, endpoint, body)
    }

    /// Execute one call and decode the reply as JSON.
    ///
    /// The reply body is decoded regardless of HTTP status; a body that is
    /// not JSON decodes to `null`.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::Transport`] when no response arrives or the body
    /// cannot be read.
    pub async fn call(
        &self,
        envelope: CallEnvelope,
        trace: &mut CallTrace,
    ) -> Result<Value, AgentError> {
        let payload = match &envelope.body {
            Some(body) => Some(serde_json::to_vec(body).map_err(|e| {
                AgentError::Internal(format!("failed to encode request body: {e}"))
            })?),
            None => None,
        };
        let request_size = payload.as_ref().map_or(0, Vec::len);

        let mut request = match envelope.method {
            Method::Get => self.http.get(&envelope.url),
            Method::Post => self.http.post(&envelope.url),
        };
        for (name, value) in &envelope.headers {
            request = request.header(name.as_str(), value.as_str());
        }
        if let Some(payload) = payload {
            request = request.body(payload);
        }

        tracing::debug!(
            method = envelope.method.as_str(),
            url = %envelope.url,
            request_size,
            "control API call",
        );

        let started = Instant::now();
        let mut debug = CallDebug {
            url: envelope.url.clone(),
            method: envelope.method,
            http_code: None,
            total_time_ms: 0,
            request_size,
            body: None,
        };

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                debug.total_time_ms = elapsed_ms(started);
                trace.record(debug);
                return Err(AgentError::Transport {
                    url: envelope.url,
                    message: e.to_string(),
                });
            }
        };

        let status = response.status();
        debug.http_code = Some(status.as_u16());
        let bytes = response.bytes().await;
        debug.total_time_ms = elapsed_ms(started);
        trace.record(debug);

        let bytes = bytes.map_err(|e| AgentError::Transport {
            url: envelope.url.clone(),
            message: e.to_string(),
        })?;

        if !status.is_success() {
            tracing::warn!(url = %envelope.url, status = status.as_u16(), "control API returned non-success status");
        }

        Ok(serde_json::from_slice(&bytes).unwrap_or_else(|e| {
            tracing::warn!(url = %envelope.url, error = %e, "control API reply is not JSON");
            Value::Null
        }))
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
