//! File and directory entry types.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use compact_str::CompactString;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::tree::Walk;

/// Largest size accepted from the filesystem (2^53 - 1).
///
/// Anything above this is treated as a corrupt stat result.
pub const MAX_PLAUSIBLE_SIZE: u64 = (1 << 53) - 1;

/// Discriminant shared by entries and persisted records.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum EntryKind {
    File,
    Directory,
}

/// A single regular file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileEntry {
    /// Absolute path, unique within a scan.
    pub path: PathBuf,
    /// File name (last path component).
    pub name: CompactString,
    /// Size in bytes.
    pub size: u64,
    /// Lowercase extension including the leading dot, or empty.
    pub extension: CompactString,
    /// Last modification time.
    pub modified_at: SystemTime,
    /// Creation time, where the platform reports one.
    pub created_at: Option<SystemTime>,
}

impl FileEntry {
    /// Create a file entry, deriving name and extension from the path.
    pub fn new(
        path: impl Into<PathBuf>,
        size: u64,
        modified_at: SystemTime,
        created_at: Option<SystemTime>,
    ) -> Self {
        let path = path.into();
        let name = entry_name(&path);
        let extension = extension_of(&name);
        Self {
            path,
            name,
            size,
            extension,
            modified_at,
            created_at,
        }
    }
}

/// A directory and, unless it is a placeholder, its walked contents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectoryEntry {
    /// Absolute path, unique within a scan.
    pub path: PathBuf,
    /// Directory name (last path component).
    pub name: CompactString,
    /// Sum of all descendant file sizes. Always 0 for placeholders.
    pub size: u64,
    /// Children sorted by size descending.
    pub children: Vec<Entry>,
    /// Last modification time.
    pub modified_at: SystemTime,
    /// Creation time, where the platform reports one.
    pub created_at: Option<SystemTime>,
    /// True when the contents were never walked.
    pub is_placeholder: bool,
}

impl DirectoryEntry {
    /// Create an unexpanded directory node.
    pub fn placeholder(
        path: impl Into<PathBuf>,
        modified_at: SystemTime,
        created_at: Option<SystemTime>,
    ) -> Self {
        let path = path.into();
        Self {
            name: entry_name(&path),
            path,
            size: 0,
            children: Vec::new(),
            modified_at,
            created_at,
            is_placeholder: true,
        }
    }

    /// Create an expanded directory whose size is the sum of its children.
    pub fn with_children(
        path: impl Into<PathBuf>,
        children: Vec<Entry>,
        modified_at: SystemTime,
        created_at: Option<SystemTime>,
    ) -> Self {
        let path = path.into();
        let mut dir = Self {
            name: entry_name(&path),
            path,
            size: 0,
            children,
            modified_at,
            created_at,
            is_placeholder: false,
        };
        dir.recompute_size();
        dir
    }

    /// Re-sum the size from direct children and restore size ordering.
    pub fn recompute_size(&mut self) {
        self.size = children_size(&self.children);
        self.children.sort_by(|a, b| b.size().cmp(&a.size()));
    }

    /// Number of files anywhere below this directory.
    pub fn file_count(&self) -> u64 {
        self.walk().filter(|(e, _)| e.is_file()).count() as u64
    }

    /// Number of directories anywhere below this directory (self excluded).
    pub fn dir_count(&self) -> u64 {
        self.walk().filter(|(e, _)| e.is_dir()).count() as u64
    }

    /// Iterate every descendant depth-first with its depth relative to `self`.
    pub fn walk(&self) -> Walk<'_> {
        Walk::new(&self.children, 1)
    }

    /// Find a descendant by path.
    pub fn find(&self, path: &Path) -> Option<&Entry> {
        find_in(&self.children, path)
    }

    /// Replace the descendant directory at `sub.path` with `sub`, re-summing
    /// every ancestor on the way back up.
    ///
    /// Hands `sub` back when no directory with that path exists below `self`.
    pub fn graft(&mut self, sub: DirectoryEntry) -> Result<(), DirectoryEntry> {
        graft_into(&mut self.children, sub)?;
        self.recompute_size();
        Ok(())
    }
}

/// A node in a scan tree: closed set of file and directory variants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Entry {
    File(FileEntry),
    Directory(DirectoryEntry),
}

impl Entry {
    pub fn path(&self) -> &Path {
        match self {
            Entry::File(f) => &f.path,
            Entry::Directory(d) => &d.path,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Entry::File(f) => &f.name,
            Entry::Directory(d) => &d.name,
        }
    }

    pub fn size(&self) -> u64 {
        match self {
            Entry::File(f) => f.size,
            Entry::Directory(d) => d.size,
        }
    }

    pub fn kind(&self) -> EntryKind {
        match self {
            Entry::File(_) => EntryKind::File,
            Entry::Directory(_) => EntryKind::Directory,
        }
    }

    pub fn modified_at(&self) -> SystemTime {
        match self {
            Entry::File(f) => f.modified_at,
            Entry::Directory(d) => d.modified_at,
        }
    }

    pub fn created_at(&self) -> Option<SystemTime> {
        match self {
            Entry::File(f) => f.created_at,
            Entry::Directory(d) => d.created_at,
        }
    }

    pub fn is_dir(&self) -> bool {
        matches!(self, Entry::Directory(_))
    }

    pub fn is_file(&self) -> bool {
        matches!(self, Entry::File(_))
    }

    pub fn is_placeholder(&self) -> bool {
        matches!(self, Entry::Directory(d) if d.is_placeholder)
    }

    pub fn as_directory(&self) -> Option<&DirectoryEntry> {
        match self {
            Entry::Directory(d) => Some(d),
            Entry::File(_) => None,
        }
    }

    /// Child entries (empty for files and placeholders).
    pub fn children(&self) -> &[Entry] {
        match self {
            Entry::Directory(d) => &d.children,
            Entry::File(_) => &[],
        }
    }
}

impl From<FileEntry> for Entry {
    fn from(file: FileEntry) -> Self {
        Entry::File(file)
    }
}

impl From<DirectoryEntry> for Entry {
    fn from(dir: DirectoryEntry) -> Self {
        Entry::Directory(dir)
    }
}

/// Lowercase extension of a file name, including the leading dot.
///
/// Dotfiles without a further extension (".bashrc") have none.
pub fn extension_of(name: &str) -> CompactString {
    match Path::new(name).extension() {
        Some(ext) => {
            let mut out = CompactString::const_new(".");
            out.push_str(&ext.to_string_lossy().to_lowercase());
            out
        }
        None => CompactString::default(),
    }
}

/// Saturating sum of entry sizes.
pub fn children_size(children: &[Entry]) -> u64 {
    children
        .iter()
        .fold(0u64, |acc, child| acc.saturating_add(child.size()))
}

pub(crate) fn entry_name(path: &Path) -> CompactString {
    path.file_name()
        .map(|n| CompactString::new(n.to_string_lossy()))
        .unwrap_or_else(|| CompactString::new(path.to_string_lossy()))
}

pub(crate) fn find_in<'a>(entries: &'a [Entry], path: &Path) -> Option<&'a Entry> {
    for entry in entries {
        if entry.path() == path {
            return Some(entry);
        }
        if let Entry::Directory(dir) = entry {
            if path.starts_with(&dir.path) {
                return find_in(&dir.children, path);
            }
        }
    }
    None
}

pub(crate) fn graft_into(entries: &mut [Entry], sub: DirectoryEntry) -> Result<(), DirectoryEntry> {
    for entry in entries.iter_mut() {
        let Entry::Directory(dir) = entry else {
            continue;
        };
        if dir.path == sub.path {
            *dir = sub;
            return Ok(());
        }
        if sub.path.starts_with(&dir.path) {
            return dir.graft(sub);
        }
    }
    Err(sub)
}
