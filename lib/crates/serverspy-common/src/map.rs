//! Directory-map records submitted to the `maps` endpoint.

use std::collections::BTreeMap;

use serde::Serialize;

/// What a directory entry is. Classification order is the declaration
/// order: a symlink is never reported as the file or directory it targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Symlink,
    File,
    Dir,
    Unknown,
}

impl EntryKind {
    /// Attribute tiers are cumulative: file ⊇ symlink ⊇ base.
    pub fn carries_link_attrs(self) -> bool {
        matches!(self, EntryKind::File | EntryKind::Symlink)
    }

    pub fn carries_file_attrs(self) -> bool {
        matches!(self, EntryKind::File)
    }
}

/// Attributes every entry carries. `None` when the entry cannot be
/// stat'ed (e.g. a dangling symlink).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BaseAttrs {
    pub mode: Option<u32>,
    pub uid: Option<u32>,
    pub gid: Option<u32>,
}

/// Symlink tier: device number from `lstat`, `-1` on failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LinkAttrs {
    pub linkinfo: i64,
}

/// File tier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileAttrs {
    pub bytes: u64,
    /// Last modification, unix seconds.
    pub mtime: i64,
    /// Hex MD5 of the content, `null` when it cannot be read.
    pub md5: Option<String>,
}

/// One entry of a directory map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MapEntry {
    #[serde(rename = "type")]
    pub kind: EntryKind,
    #[serde(flatten)]
    pub file: Option<FileAttrs>,
    #[serde(flatten)]
    pub link: Option<LinkAttrs>,
    #[serde(flatten)]
    pub base: BaseAttrs,
}

impl MapEntry {
    /// Assemble an entry, pulling in every attribute tier its kind carries.
    ///
    /// The tier closures only run for kinds that carry them, so a directory
    /// is never hashed and a file always gets its link tier too.
    pub fn assemble(
        kind: EntryKind,
        base: BaseAttrs,
        link: impl FnOnce() -> LinkAttrs,
        file: impl FnOnce() -> Option<FileAttrs>,
    ) -> Self {
        Self {
            kind,
            file: if kind.carries_file_attrs() { file() } else { None },
            link: kind.carries_link_attrs().then(link),
            base,
        }
    }
}

/// Map of one directory, keyed by entry name.
///
/// A failure while opening or reading the directory is recorded in
/// `error`; entries gathered before it are kept.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DirectoryMap {
    #[serde(flatten)]
    pub entries: BTreeMap<String, MapEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn base() -> BaseAttrs {
        BaseAttrs {
            mode: Some(0o100_644),
            uid: Some(1000),
            gid: Some(1000),
        }
    }

    fn file() -> Option<FileAttrs> {
        Some(FileAttrs {
            bytes: 5,
            mtime: 1_700_000_000,
            md5: Some("5d41402abc4b2a76b9719d911017c592".into()),
        })
    }

    #[test]
    fn file_entries_carry_every_tier() {
        let entry = MapEntry::assemble(EntryKind::File, base(), || LinkAttrs { linkinfo: 2049 }, file);
        assert_eq!(
            serde_json::to_value(entry).unwrap(),
            json!({
                "type": "file",
                "bytes": 5,
                "mtime": 1_700_000_000,
                "md5": "5d41402abc4b2a76b9719d911017c592",
                "linkinfo": 2049,
                "mode": 0o100_644,
                "uid": 1000,
                "gid": 1000,
            })
        );
    }

    #[test]
    fn symlink_entries_skip_file_tier() {
        let entry = MapEntry::assemble(
            EntryKind::Symlink,
            base(),
            || LinkAttrs { linkinfo: 7 },
            || panic!("symlinks are never hashed"),
        );
        let value = serde_json::to_value(entry).unwrap();
        assert_eq!(value["type"], "symlink");
        assert_eq!(value["linkinfo"], 7);
        assert!(value.get("md5").is_none());
        assert!(value.get("bytes").is_none());
    }

    #[test]
    fn dir_and_unknown_entries_carry_base_only() {
        for kind in [EntryKind::Dir, EntryKind::Unknown] {
            let entry = MapEntry::assemble(
                kind,
                BaseAttrs::default(),
                || panic!("no link tier"),
                || panic!("no file tier"),
            );
            let value = serde_json::to_value(entry).unwrap();
            let keys: Vec<_> = value.as_object().unwrap().keys().cloned().collect();
            assert_eq!(keys.len(), 4, "{keys:?}");
            assert!(value["mode"].is_null());
        }
    }

    #[test]
    fn map_flattens_entries_and_error() {
        let mut map = DirectoryMap::default();
        map.entries.insert(
            "www".into(),
            MapEntry::assemble(EntryKind::Dir, base(), || LinkAttrs { linkinfo: 0 }, || None),
        );
        map.error = Some("Permission denied (os error 13)".into());

        let value = serde_json::to_value(map).unwrap();
        assert_eq!(value["www"]["type"], "dir");
        assert_eq!(value["error"], "Permission denied (os error 13)");
    }

    #[test]
    fn empty_map_is_empty_object() {
        assert_eq!(
            serde_json::to_value(DirectoryMap::default()).unwrap(),
            json!({})
        );
    }
}
