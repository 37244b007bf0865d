//! Flat cache records and tree reconstruction.
//!
//! A scan tree is persisted as one row per entry. Each row keeps a
//! `parent_path` back-reference used only for lookup; ownership is rebuilt
//! on the way out by [`reconstruct`]:
//!
//! 1. Group every record by its parent path. Records whose parent is the
//!    root, is missing, or is not itself among the records are top-level.
//! 2. Build each top-level record, pulling its children out of the group
//!    map recursively. Every record is consumed at most once, so the result
//!    is a tree even if the stored rows are inconsistent.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use itertools::Itertools;
use serde::{Deserialize, Serialize};

use lordisk_core::{DirectoryEntry, Entry, EntryKind, FileEntry, ScanResult};

/// One persisted file or directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedRecord {
    pub path: PathBuf,
    pub name: String,
    pub size: u64,
    pub kind: EntryKind,
    /// Lowercase extension with leading dot; `None` for directories.
    pub extension: Option<String>,
    pub modified_at: DateTime<Utc>,
    pub created_at: Option<DateTime<Utc>>,
    pub parent_path: Option<PathBuf>,
    pub is_placeholder: bool,
    /// Stamp of the scan session this record belongs to.
    pub scan_timestamp: DateTime<Utc>,
}

impl CachedRecord {
    /// Record for a single entry (its children are not included).
    pub fn from_entry(entry: &Entry, scan_timestamp: DateTime<Utc>) -> Self {
        let extension = match entry {
            Entry::File(f) => Some(f.extension.to_string()),
            Entry::Directory(_) => None,
        };
        Self {
            path: entry.path().to_path_buf(),
            name: entry.name().to_string(),
            size: entry.size(),
            kind: entry.kind(),
            extension,
            modified_at: entry.modified_at().into(),
            created_at: entry.created_at().map(Into::into),
            parent_path: entry.path().parent().map(Path::to_path_buf),
            is_placeholder: entry.is_placeholder(),
            scan_timestamp,
        }
    }

    pub fn is_file(&self) -> bool {
        self.kind == EntryKind::File
    }

    fn into_entry(self, children: Vec<Entry>) -> Entry {
        let modified_at = SystemTime::from(self.modified_at);
        let created_at = self.created_at.map(SystemTime::from);
        match self.kind {
            EntryKind::File => Entry::File(FileEntry {
                path: self.path,
                name: self.name.into(),
                size: self.size,
                extension: self.extension.unwrap_or_default().into(),
                modified_at,
                created_at,
            }),
            EntryKind::Directory if self.is_placeholder => {
                Entry::Directory(DirectoryEntry::placeholder(self.path, modified_at, created_at))
            }
            EntryKind::Directory => {
                let mut children = children;
                children.sort_by(|a, b| b.size().cmp(&a.size()));
                Entry::Directory(DirectoryEntry {
                    path: self.path,
                    name: self.name.into(),
                    size: self.size,
                    children,
                    modified_at,
                    created_at,
                    is_placeholder: false,
                })
            }
        }
    }
}

/// Flatten every entry below the root of `result` into records.
pub fn flatten(result: &ScanResult) -> Vec<CachedRecord> {
    let stamp: DateTime<Utc> = result.scanned_at.into();
    result
        .walk()
        .map(|(entry, _)| CachedRecord::from_entry(entry, stamp))
        .collect()
}

/// Re-assemble flat records into root-level items.
pub fn reconstruct(root: &Path, records: Vec<CachedRecord>) -> Vec<Entry> {
    let known: HashSet<PathBuf> = records.iter().map(|r| r.path.clone()).collect();

    let mut by_parent: HashMap<Option<PathBuf>, Vec<CachedRecord>> = records
        .into_iter()
        .map(|record| {
            let key = record
                .parent_path
                .clone()
                .filter(|parent| parent.as_path() != root && known.contains(parent));
            (key, record)
        })
        .into_group_map();

    let top_level = by_parent.remove(&None).unwrap_or_default();
    let mut items: Vec<Entry> = top_level
        .into_iter()
        .map(|record| build(record, &mut by_parent))
        .collect();
    items.sort_by(|a, b| b.size().cmp(&a.size()));
    items
}

fn build(record: CachedRecord, by_parent: &mut HashMap<Option<PathBuf>, Vec<CachedRecord>>) -> Entry {
    let children = match record.kind {
        EntryKind::Directory => by_parent
            .remove(&Some(record.path.clone()))
            .unwrap_or_default()
            .into_iter()
            .map(|child| build(child, by_parent))
            .collect(),
        EntryKind::File => Vec::new(),
    };
    record.into_entry(children)
}
