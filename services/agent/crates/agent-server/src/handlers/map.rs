//! `map` — describe the immediate children of one directory and submit the
//! result to the `maps` endpoint.
//!
//! Attribute tiers are cumulative by type priority: a file carries the
//! file, symlink and base tiers; a symlink carries the symlink and base
//! tiers; everything else carries the base tier only.

use std::fs::{self, Metadata};
use std::io::Read;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};

use md5::{Digest, Md5};
use serde_json::Value;

use serverspy_common::{
    AgentError, BaseAttrs, CallTrace, DirectoryMap, EntryKind, FileAttrs, LinkAttrs, MapEntry,
    TOKEN_HEADER,
};

use super::{TaskContext, blocking};
use crate::upload::UploadConnector;

/// Map `dir`. Failures opening or reading the directory land in
/// [`DirectoryMap::error`]; entries read before the failure are kept.
pub fn map_directory(dir: &Path) -> DirectoryMap {
    let mut map = DirectoryMap::default();

    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            map.error = Some(format!("failed to open {}: {e}", dir.display()));
            return map;
        }
    };

    // read_dir never yields `.` or `..`.
    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                map.error = Some(format!("failed to read {}: {e}", dir.display()));
                break;
            }
        };
        let name = entry.file_name().to_string_lossy().into_owned();
        map.entries.insert(name, describe(&entry.path()));
    }

    map
}

/// Classify and stat one entry.
fn describe(path: &Path) -> MapEntry {
    let lstat = fs::symlink_metadata(path).ok();
    let stat = fs::metadata(path).ok();
    let kind = classify(lstat.as_ref(), stat.as_ref());

    let base = stat.as_ref().map_or_else(BaseAttrs::default, |m| BaseAttrs {
        mode: Some(m.mode()),
        uid: Some(m.uid()),
        gid: Some(m.gid()),
    });

    MapEntry::assemble(
        kind,
        base,
        || LinkAttrs {
            linkinfo: lstat
                .as_ref()
                .and_then(|m| i64::try_from(m.dev()).ok())
                .unwrap_or(-1),
        },
        || {
            stat.as_ref().map(|m| FileAttrs {
                bytes: m.len(),
                mtime: m.mtime(),
                md5: md5_file(path),
            })
        },
    )
}

/// Symlink first (not followed), then file, then directory (followed).
fn classify(lstat: Option<&Metadata>, stat: Option<&Metadata>) -> EntryKind {
    if lstat.is_some_and(|m| m.file_type().is_symlink()) {
        EntryKind::Symlink
    } else if stat.is_some_and(Metadata::is_file) {
        EntryKind::File
    } else if stat.is_some_and(Metadata::is_dir) {
        EntryKind::Dir
    } else {
        EntryKind::Unknown
    }
}

/// Hex MD5 of a file's content, read in 64 KB chunks.
fn md5_file(path: &Path) -> Option<String> {
    let mut file = match fs::File::open(path) {
        Ok(file) => file,
        Err(e) => {
            tracing::debug!(path = %path.display(), error = %e, "cannot hash file");
            return None;
        }
    };
    let mut hasher = Md5::new();
    let mut buf = vec![0u8; 65536];
    loop {
        let n = match file.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                tracing::debug!(path = %path.display(), error = %e, "cannot hash file");
                return None;
            }
        };
        hasher.update(&buf[..n]);
    }
    Some(format!("{:x}", hasher.finalize()))
}

pub(super) async fn run<U: UploadConnector>(
    ctx: &TaskContext<'_, U>,
    trace: &mut CallTrace,
) -> Result<Value, AgentError> {
    let dir = ctx
        .task
        .data_path()
        .map_or_else(|| ctx.config.resolved_work_dir(), PathBuf::from);

    tracing::debug!(dir = %dir.display(), "mapping directory");
    let map = blocking(move || map_directory(&dir)).await?;
    if let Some(error) = &map.error {
        tracing::warn!(%error, entries = map.entries.len(), "directory map incomplete");
    }

    let body = serde_json::to_value(&map)
        .map_err(|e| AgentError::Internal(format!("failed to encode directory map: {e}")))?;
    let call = ctx
        .api
        .post("maps", body)
        .with_header(TOKEN_HEADER, ctx.task_id.as_str());
    ctx.api.call(call, trace).await
}
