//! The task pipeline: validate → retrieve → perform → present.
//!
//! Each step consumes the previous one's output, so steps can only run in
//! order. Every failure, whichever step raises it, reaches the caller
//! through [`run_task`], the single translation point into the failure
//! envelope.

use serde_json::Value;

use serverspy_common::{AgentError, CallTrace, FailureEnvelope, Task, TaskId};

use crate::api::ApiClient;
use crate::handlers::{self, TaskContext};
use crate::state::AppState;
use crate::upload::UploadConnector;

/// A request whose task identifier passed validation.
#[derive(Debug)]
pub struct Agent {
    task_id: TaskId,
}

impl Agent {
    /// # Errors
    ///
    /// Returns [`AgentError::Validation`] when the identifier is not
    /// UUID-shaped.
    pub fn new(raw_task_id: &str) -> Result<Self, AgentError> {
        Ok(Self {
            task_id: TaskId::parse(raw_task_id)?,
        })
    }

    pub fn task_id(&self) -> &TaskId {
        &self.task_id
    }

    /// Fetch the task definition from the control API.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::Protocol`] when the reply lacks `task` or
    /// `data` (the reply is attached to the trace), and
    /// [`AgentError::UnknownTask`] when it names no handler.
    pub async fn retrieve_task(
        self,
        api: &ApiClient,
        trace: &mut CallTrace,
    ) -> Result<RetrievedTask, AgentError> {
        let endpoint = format!("tasks/{}", self.task_id);
        let reply = api.call(api.get(&endpoint), trace).await?;

        let task = match Task::from_reply(&reply) {
            Ok(task) => task,
            Err(AgentError::Protocol) => {
                trace.attach_body(reply);
                return Err(AgentError::Protocol);
            }
            Err(e) => return Err(e),
        };

        tracing::debug!(task_id = %self.task_id, task = %task.name, "task retrieved");
        Ok(RetrievedTask {
            task_id: self.task_id,
            task,
        })
    }
}

/// A task ready to be performed.
#[derive(Debug)]
pub struct RetrievedTask {
    task_id: TaskId,
    task: Task,
}

impl RetrievedTask {
    pub fn task(&self) -> &Task {
        &self.task
    }

    /// Run the registered handler; its output is the task response.
    ///
    /// # Errors
    ///
    /// Propagates handler failures.
    pub async fn perform<U: UploadConnector>(
        self,
        state: &AppState<U>,
        trace: &mut CallTrace,
    ) -> Result<Value, AgentError> {
        let ctx = TaskContext {
            task_id: &self.task_id,
            task: &self.task,
            config: &state.config,
            api: &state.api,
            uploader: &state.uploader,
        };
        handlers::perform(&ctx, trace).await
    }
}

/// Run the whole pipeline for one request.
///
/// Tasks are serialized: a request waits here while another task runs.
///
/// # Errors
///
/// Every failure is returned as the wire-level [`FailureEnvelope`],
/// carrying the diagnostics of the last outbound call.
pub async fn run_task<U: UploadConnector>(
    state: &AppState<U>,
    raw_task_id: &str,
) -> Result<Value, FailureEnvelope> {
    let mut trace = CallTrace::default();

    match execute(state, raw_task_id, &mut trace).await {
        Ok(response) => Ok(response),
        Err(err) => {
            tracing::warn!(error = %err, "task failed");
            Err(FailureEnvelope::new(&err, trace))
        }
    }
}

async fn execute<U: UploadConnector>(
    state: &AppState<U>,
    raw_task_id: &str,
    trace: &mut CallTrace,
) -> Result<Value, AgentError> {
    let agent = Agent::new(raw_task_id)?;
    let _running = state.exclusive().await;

    agent
        .retrieve_task(&state.api, trace)
        .await?
        .perform(state, trace)
        .await
}
