//! Task identifier, task names and the task definition returned by the
//! control API.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use serde_json::Value;

use crate::error::AgentError;

/// UUID hex groups `8-4-4-4-12`, any letter case, braces optional.
pub static TASK_ID_RE: LazyLock<Regex> = LazyLock::new(|| {
    // Safety: constant pattern, cannot fail.
    #[allow(clippy::expect_used)]
    Regex::new(
        r"^\{?[0-9A-Fa-f]{8}-[0-9A-Fa-f]{4}-[0-9A-Fa-f]{4}-[0-9A-Fa-f]{4}-[0-9A-Fa-f]{12}\}?$",
    )
    .expect("valid regex")
});

/// Validate that a task identifier has the UUID shape.
///
/// SECURITY: the identifier is interpolated into control-API URLs and sent
/// as a header, so it must be checked before anything else touches it.
pub fn validate_task_id(task_id: &str) -> Result<(), AgentError> {
    if TASK_ID_RE.is_match(task_id) {
        Ok(())
    } else {
        Err(AgentError::Validation(task_id.to_string()))
    }
}

/// A validated task identifier. Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    pub fn parse(raw: &str) -> Result<Self, AgentError> {
        validate_task_id(raw)?;
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The 16 raw bytes sent ahead of an upload stream: braces and hyphens
    /// stripped, the remaining 32 hex digits decoded.
    pub fn wire_bytes(&self) -> Result<[u8; 16], hex::FromHexError> {
        let digits: String = self
            .0
            .chars()
            .filter(|c| !matches!(c, '-' | '{' | '}'))
            .collect();
        let mut out = [0u8; 16];
        hex::decode_to_slice(digits, &mut out)?;
        Ok(out)
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for TaskId {
    type Err = AgentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// The fixed set of operations the agent will perform.
///
/// There is no way to reach anything else: names outside this set are
/// rejected before a handler is selected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskName {
    Verify,
    Metrics,
    Map,
    Push,
}

impl TaskName {
    pub const ALL: [TaskName; 4] = [
        TaskName::Verify,
        TaskName::Metrics,
        TaskName::Map,
        TaskName::Push,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            TaskName::Verify => "verify",
            TaskName::Metrics => "metrics",
            TaskName::Map => "map",
            TaskName::Push => "push",
        }
    }
}

impl fmt::Display for TaskName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskName {
    type Err = AgentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TaskName::ALL
            .into_iter()
            .find(|name| name.as_str() == s)
            .ok_or_else(|| AgentError::UnknownTask(s.to_string()))
    }
}

/// A task fetched from the control API: which handler to run and its
/// handler-specific payload.
#[derive(Debug, Clone, PartialEq)]
pub struct Task {
    pub name: TaskName,
    pub data: Value,
}

impl Task {
    /// Build a task from the decoded `GET tasks/{id}` reply.
    ///
    /// Both a string `task` and a non-null `data` must be present, otherwise
    /// the reply is a protocol error. A well-formed reply naming no known
    /// handler is an unknown-task error.
    pub fn from_reply(reply: &Value) -> Result<Self, AgentError> {
        let name = reply.get("task").and_then(Value::as_str);
        let data = reply.get("data").filter(|d| !d.is_null());

        let (Some(name), Some(data)) = (name, data) else {
            return Err(AgentError::Protocol);
        };

        Ok(Self {
            name: name.parse()?,
            data: data.clone(),
        })
    }

    /// The payload as a path, for handlers that take one.
    pub fn data_path(&self) -> Option<&str> {
        self.data.as_str()
    }
}
