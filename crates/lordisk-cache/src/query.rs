//! Query filters and aggregate results.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use lordisk_core::{EntryKind, FileCategory};

/// Optional constraints for [`crate::ScanCache::search_files`]. All set
/// fields must match.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchFilters {
    pub kind: Option<EntryKind>,
    /// Inclusive lower bound in bytes.
    pub min_size: Option<u64>,
    /// Inclusive upper bound in bytes.
    pub max_size: Option<u64>,
    /// Accepted extensions. "jpg", ".JPG" and ".jpg" are equivalent.
    pub extensions: Vec<String>,
}

impl SearchFilters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn kind(mut self, kind: EntryKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn min_size(mut self, min_size: u64) -> Self {
        self.min_size = Some(min_size);
        self
    }

    pub fn max_size(mut self, max_size: u64) -> Self {
        self.max_size = Some(max_size);
        self
    }

    pub fn extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extensions = extensions.into_iter().map(Into::into).collect();
        self
    }
}

/// Totals recorded for the latest scan session of a root.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub total_size: u64,
    pub file_count: u64,
    pub directory_count: u64,
    /// `None` when the root has never been cached.
    pub last_scan: Option<DateTime<Utc>>,
}

/// Aggregate for one extension. Files without one report `""`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileTypeStat {
    pub extension: String,
    pub count: u64,
    pub total_size: u64,
}

/// Aggregate for one [`FileCategory`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryStat {
    pub category: FileCategory,
    pub count: u64,
    pub total_size: u64,
    /// Extensions folded into this category, sorted.
    pub extensions: Vec<String>,
}

/// Files that share an exact byte size.
///
/// Same size does not mean same content; this is a cheap first pass that
/// narrows down candidates for a real content comparison.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SizeGroup {
    pub size: u64,
    pub paths: Vec<PathBuf>,
    /// Bytes reclaimable if all but one member were removed.
    pub wasted_bytes: u64,
}

impl SizeGroup {
    pub fn new(size: u64, paths: Vec<PathBuf>) -> Self {
        let wasted_bytes = size.saturating_mul(paths.len().saturating_sub(1) as u64);
        Self {
            size,
            paths,
            wasted_bytes,
        }
    }

    pub fn count(&self) -> usize {
        self.paths.len()
    }

    pub fn deletable_count(&self) -> usize {
        self.paths.len().saturating_sub(1)
    }
}
