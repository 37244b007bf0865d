//! Events streamed by a staggered scan.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use lordisk_core::{DirectoryEntry, ScanResult};

use crate::progress::ScanProgress;

/// Where the first result of a scan came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultSource {
    /// A fresh immediate pass over the filesystem.
    Fresh,
    /// A cached scan still inside its staleness window.
    Cache,
}

/// One message on a scan's event stream.
///
/// A fresh scan sends `Immediate` before any `DirectoryScanned`, and ends
/// with exactly one of `Complete`, `Cancelled` or `Error`. `Progress` may
/// appear anywhere before the terminal event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScanEvent {
    Progress(ScanProgress),
    Immediate(ScanResult),
    DirectoryScanned {
        path: PathBuf,
        /// Depth of `path` below the scan root.
        depth: u32,
        entry: DirectoryEntry,
    },
    /// The scan succeeded but persisting it did not.
    CacheWriteFailed { message: String },
    Complete(ScanResult),
    Cancelled,
    Error { message: String },
}

impl ScanEvent {
    /// Whether no further events follow this one.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete(_) | Self::Cancelled | Self::Error { .. })
    }
}
