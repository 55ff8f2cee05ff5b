//! Inbound HTTP surface.
//!
//! Every path and method is routed to the same entry point; only the
//! `TaskId` header decides what happens. `/health` is the one exception,
//! kept for container and load-balancer probes.

use std::sync::Arc;

use axum::Router;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use serde::Serialize;

use serverspy_common::{AgentError, CallTrace, FailureEnvelope, TASK_ID_HEADER};

use crate::pipeline;
use crate::state::AppState;
use crate::upload::UploadConnector;

const SPLASH: &str = include_str!("../assets/splash.html");

/// Build the agent's router over shared state.
pub fn router<U: UploadConnector + 'static>(state: Arc<AppState<U>>) -> Router {
    Router::new()
        .route("/health", get(health))
        .fallback(entry::<U>)
        .with_state(state)
}

async fn health() -> StatusCode {
    StatusCode::OK
}

async fn entry<U: UploadConnector + 'static>(
    State(state): State<Arc<AppState<U>>>,
    headers: HeaderMap,
) -> Response {
    let Some(raw) = headers.get(TASK_ID_HEADER) else {
        return splash(state.config.splash);
    };

    let Ok(raw) = raw.to_str() else {
        let err = AgentError::Validation("header is not valid UTF-8".into());
        tracing::warn!(error = %err, "rejected request");
        return present(&FailureEnvelope::new(&err, CallTrace::default()));
    };

    match pipeline::run_task(&state, raw).await {
        Ok(response) => present(&response),
        Err(failure) => present(&failure),
    }
}

fn splash(enabled: bool) -> Response {
    if enabled {
        Html(SPLASH).into_response()
    } else {
        StatusCode::NOT_FOUND.into_response()
    }
}

/// Every task outcome, success or failure, is a 200 with a JSON body.
fn present<T: Serialize>(body: &T) -> Response {
    match serde_json::to_string(body) {
        Ok(json) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "application/json")],
            json,
        )
            .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "failed to encode response");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
