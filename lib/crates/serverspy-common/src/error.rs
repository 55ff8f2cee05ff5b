//! Error taxonomy for the task pipeline.
//!
//! Every variant is reported to the caller through the failure envelope
//! (`{status: false, error, debug}`); the `Display` text is the `error` field.

use thiserror::Error;

/// Errors that abort a task request.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("TaskId is not in valid format.")]
    Validation(String),

    #[error("Invalid data returned.")]
    Protocol,

    #[error("Task handler '{0}' does not exist.")]
    UnknownTask(String),

    #[error("Call to {url} failed: {message}")]
    Transport { url: String, message: String },

    #[error("Internal error: {0}")]
    Internal(String),
}
