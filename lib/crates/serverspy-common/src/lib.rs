pub mod config;
pub mod envelope;
pub mod error;
pub mod map;
pub mod task;

pub use config::AgentConfig;
pub use envelope::{
    AGENT_HEADER, CLIENT_VERSION, CallDebug, CallEnvelope, CallTrace, FailureEnvelope, Method,
    PushOutcome, TASK_ID_HEADER, TOKEN_HEADER,
};
pub use error::AgentError;
pub use map::{BaseAttrs, DirectoryMap, EntryKind, FileAttrs, LinkAttrs, MapEntry};
pub use task::{Task, TaskId, TaskName, validate_task_id};
