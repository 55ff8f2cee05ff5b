//! Task handlers and the fixed name → handler registry.
//!
//! Exactly four operations exist:
//!   - `verify`  — report host metadata
//!   - `metrics` — report raw `/proc` metrics
//!   - `map`     — describe one directory
//!   - `push`    — stream one file to the upload service
//!
//! There is no dynamic lookup: a [`TaskName`] can only name one of these,
//! and unknown names are rejected while the task is parsed.

pub mod map;
pub mod metrics;
pub mod push;
pub mod verify;

use serde_json::Value;

use serverspy_common::{AgentConfig, AgentError, CallTrace, Task, TaskId, TaskName};

use crate::api::ApiClient;
use crate::upload::UploadConnector;

/// Everything a handler may touch while running one task.
pub struct TaskContext<'a, U> {
    pub task_id: &'a TaskId,
    pub task: &'a Task,
    pub config: &'a AgentConfig,
    pub api: &'a ApiClient,
    pub uploader: &'a U,
}

/// Run the handler registered for the task's name.
///
/// # Errors
///
/// Propagates request-level handler failures (control-API transport
/// errors). `map` and `push` fold their local failures into the response.
pub async fn perform<U: UploadConnector>(
    ctx: &TaskContext<'_, U>,
    trace: &mut CallTrace,
) -> Result<Value, AgentError> {
    tracing::info!(task_id = %ctx.task_id, task = %ctx.task.name, "performing task");

    match ctx.task.name {
        TaskName::Verify => verify::run(ctx, trace).await,
        TaskName::Metrics => metrics::run(ctx, trace).await,
        TaskName::Map => map::run(ctx, trace).await,
        TaskName::Push => push::run(ctx).await,
    }
}

/// Run blocking filesystem work off the async executor.
pub(crate) async fn blocking<T, F>(f: F) -> Result<T, AgentError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| AgentError::Internal(format!("blocking task failed: {e}")))
}
