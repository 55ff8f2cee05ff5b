//! `metrics` — raw contents of well-known `/proc` pseudo-files.
//!
//! Content is passed through unparsed; the control API interprets it.

use std::collections::BTreeMap;
use std::path::Path;

use serde_json::{Value, json};

use serverspy_common::{AgentError, CallTrace};

use super::{TaskContext, blocking};
use crate::upload::UploadConnector;

/// Metric key → path relative to the proc root.
pub const METRIC_SOURCES: [(&str, &str); 7] = [
    ("stat", "stat"),
    ("uptime", "uptime"),
    ("version", "version"),
    ("meminfo", "meminfo"),
    ("loadavg", "loadavg"),
    ("network", "self/net/dev"),
    ("diskstats", "diskstats"),
];

/// Read every metric source under `proc_root` that is a readable regular
/// file, trailing whitespace trimmed. Anything else is left out.
pub fn collect(proc_root: &Path) -> BTreeMap<String, String> {
    let mut data = BTreeMap::new();
    for (key, relative) in METRIC_SOURCES {
        let path = proc_root.join(relative);
        if !path.is_file() {
            tracing::debug!(metric = key, path = %path.display(), "metric source missing");
            continue;
        }
        match std::fs::read_to_string(&path) {
            Ok(content) => {
                data.insert(key.to_string(), content.trim_end().to_string());
            }
            Err(e) => {
                tracing::debug!(metric = key, path = %path.display(), error = %e, "metric source unreadable");
            }
        }
    }
    data
}

pub(super) async fn run<U: UploadConnector>(
    ctx: &TaskContext<'_, U>,
    trace: &mut CallTrace,
) -> Result<Value, AgentError> {
    let proc_root = ctx.config.proc_root.clone();
    let data = blocking(move || collect(&proc_root)).await?;
    tracing::debug!(sources = data.len(), "collected metrics");

    let body = json!({
        "taskId": ctx.task_id,
        "data": data,
    });
    ctx.api.call(ctx.api.post("metrics", body), trace).await
}
