//! Scan result container and statistics.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};

use crate::error::ScanWarning;
use crate::node::{DirectoryEntry, Entry, children_size, find_in, graft_into};

/// Summary statistics for a scan tree.
///
/// None of the counters include the root itself.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeStats {
    /// Total number of files.
    pub total_files: u64,
    /// Total number of directories, placeholders included.
    pub total_dirs: u64,
    /// Directories whose contents were not walked.
    pub placeholders: u64,
    /// Deepest level present (root children are depth 1).
    pub max_depth: u32,
}

impl TreeStats {
    /// Create new empty stats.
    pub fn new() -> Self {
        Self::default()
    }

    /// Compute stats over a list of root-level items.
    pub fn collect(items: &[Entry]) -> Self {
        let mut stats = Self::new();
        for (entry, depth) in Walk::new(items, 1) {
            stats.max_depth = stats.max_depth.max(depth);
            match entry {
                Entry::File(_) => stats.total_files += 1,
                Entry::Directory(dir) => {
                    stats.total_dirs += 1;
                    if dir.is_placeholder {
                        stats.placeholders += 1;
                    }
                }
            }
        }
        stats
    }

    /// Files plus directories.
    pub fn item_count(&self) -> u64 {
        self.total_files + self.total_dirs
    }
}

/// The outcome of one scan pass (or of a cache hit).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanResult {
    /// Root path that was scanned.
    pub root_path: PathBuf,
    /// Direct children of the root, sorted by size descending.
    pub items: Vec<Entry>,
    /// Sum of the root-level item sizes.
    pub total_size: u64,
    /// Every file and directory below the root (root excluded).
    pub item_count: u64,
    /// Summary statistics.
    pub stats: TreeStats,
    /// When this result was produced.
    pub scanned_at: SystemTime,
    /// How long the pass took.
    pub scan_duration: Duration,
    /// Non-fatal problems encountered.
    pub warnings: Vec<ScanWarning>,
}

impl ScanResult {
    /// Build a result from root-level items.
    pub fn new(
        root_path: impl Into<PathBuf>,
        mut items: Vec<Entry>,
        scan_duration: Duration,
        warnings: Vec<ScanWarning>,
    ) -> Self {
        items.sort_by(|a, b| b.size().cmp(&a.size()));
        let stats = TreeStats::collect(&items);
        Self {
            root_path: root_path.into(),
            total_size: children_size(&items),
            item_count: stats.item_count(),
            stats,
            items,
            scanned_at: SystemTime::now(),
            scan_duration,
            warnings,
        }
    }

    /// Build a result from a walked root directory.
    pub fn from_root(root: DirectoryEntry, scan_duration: Duration, warnings: Vec<ScanWarning>) -> Self {
        Self::new(root.path, root.children, scan_duration, warnings)
    }

    /// Total number of files.
    pub fn total_files(&self) -> u64 {
        self.stats.total_files
    }

    /// Total number of directories.
    pub fn total_dirs(&self) -> u64 {
        self.stats.total_dirs
    }

    /// Check if there were any warnings during scanning.
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    /// Iterate every entry depth-first with its depth (root children are 1).
    pub fn walk(&self) -> Walk<'_> {
        Walk::new(&self.items, 1)
    }

    /// Find an entry by path.
    pub fn find(&self, path: &Path) -> Option<&Entry> {
        find_in(&self.items, path)
    }

    /// Placeholder directories in breadth-first order, with their depth.
    pub fn placeholders(&self) -> Vec<(PathBuf, u32)> {
        let mut found = Vec::new();
        let mut queue: VecDeque<(&Entry, u32)> = self.items.iter().map(|e| (e, 1)).collect();
        while let Some((entry, depth)) = queue.pop_front() {
            if let Entry::Directory(dir) = entry {
                if dir.is_placeholder {
                    found.push((dir.path.clone(), depth));
                } else {
                    queue.extend(dir.children.iter().map(|c| (c, depth + 1)));
                }
            }
        }
        found
    }

    /// Replace the directory at `sub.path` with `sub` and refresh totals.
    ///
    /// Hands `sub` back when the path is not part of this result.
    pub fn graft(&mut self, sub: DirectoryEntry) -> Result<(), DirectoryEntry> {
        graft_into(&mut self.items, sub)?;
        self.items.sort_by(|a, b| b.size().cmp(&a.size()));
        self.total_size = children_size(&self.items);
        self.stats = TreeStats::collect(&self.items);
        self.item_count = self.stats.item_count();
        Ok(())
    }
}

/// Depth-first pre-order walk over a list of entries.
pub struct Walk<'a> {
    stack: Vec<(&'a Entry, u32)>,
}

impl<'a> Walk<'a> {
    pub(crate) fn new(entries: &'a [Entry], depth: u32) -> Self {
        Self {
            stack: entries.iter().rev().map(|e| (e, depth)).collect(),
        }
    }
}

impl<'a> Iterator for Walk<'a> {
    type Item = (&'a Entry, u32);

    fn next(&mut self) -> Option<Self::Item> {
        let (entry, depth) = self.stack.pop()?;
        self.stack
            .extend(entry.children().iter().rev().map(|c| (c, depth + 1)));
        Some((entry, depth))
    }
}
