//! Depth-bounded recursive directory scanner.
//!
//! The scanner lists a directory, probes every surviving child, then
//! recurses into subdirectories in lockstep batches of `batch_size` on the
//! rayon pool. A directory's size is summed only after every child has
//! resolved, so aggregation is strictly children-before-parent.
//!
//! Failure handling by level:
//!
//! - the root cannot be listed: the scan fails
//! - a subdirectory cannot be listed: it stays a zero-size placeholder and a
//!   [`WarningKind::SubtreeFailed`] warning is recorded
//! - a single entry cannot be probed: it is skipped

use std::path::Path;
use std::sync::Mutex;
use std::time::Instant;

use rayon::prelude::*;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use lordisk_core::{
    DirectoryEntry, Entry, MAX_PLAUSIBLE_SIZE, PathFilter, ProbeError, ProbeErrorKind, ScanConfig,
    ScanError, ScanResult, ScanWarning,
};

use crate::probe::{FsProbe, Probe, Probed};
use crate::progress::{LevelProgress, ScanContext, lock};

/// Default width of a subdirectory recursion batch.
pub const DEFAULT_BATCH_SIZE: usize = 10;

/// Why a walk stopped early.
enum WalkError {
    Cancelled,
    Probe(ProbeError),
}

/// Recursive scanner over any [`Probe`].
pub struct RecursiveScanner<P = FsProbe> {
    probe: P,
    filter: PathFilter,
    batch_size: usize,
    progress_tx: broadcast::Sender<LevelProgress>,
}

impl RecursiveScanner<FsProbe> {
    /// Create a scanner over the real filesystem.
    pub fn new() -> Self {
        Self::with_probe(FsProbe::default())
    }
}

impl Default for RecursiveScanner<FsProbe> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: Probe> RecursiveScanner<P> {
    pub fn with_probe(probe: P) -> Self {
        let (progress_tx, _) = broadcast::channel(256);
        Self {
            probe,
            filter: PathFilter::new(),
            batch_size: DEFAULT_BATCH_SIZE,
            progress_tx,
        }
    }

    /// Create a scanner over `probe` with `config`'s extra ignore names and
    /// batch size.
    pub fn from_config(probe: P, config: &ScanConfig) -> Self {
        Self::with_probe(probe)
            .with_filter(PathFilter::with_extra(config.ignore_names.iter().cloned()))
            .with_batch_size(config.batch_size)
    }

    pub fn with_filter(mut self, filter: PathFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Subscribe to per-directory progress. One message per listed directory.
    pub fn subscribe(&self) -> broadcast::Receiver<LevelProgress> {
        self.progress_tx.subscribe()
    }

    /// Scan `root` down to `max_depth` (root is depth 0).
    pub fn scan(&self, root: &Path, max_depth: u32, ctx: &ScanContext) -> Result<ScanResult, ScanError> {
        let start = Instant::now();
        let (dir, warnings) = self.scan_directory(root, max_depth, ctx)?;
        Ok(ScanResult::from_root(dir, start.elapsed(), warnings))
    }

    /// Scan a single directory subtree, returning it as an entry.
    ///
    /// `max_depth` is relative to `path`. Failing to read `path` itself is
    /// an error; everything below degrades.
    pub fn scan_directory(
        &self,
        path: &Path,
        max_depth: u32,
        ctx: &ScanContext,
    ) -> Result<(DirectoryEntry, Vec<ScanWarning>), ScanError> {
        let stub = match self.probe.probe(path)? {
            Probed::Directory(stub) => stub,
            Probed::File(_) => {
                return Err(ScanError::NotADirectory {
                    path: path.to_path_buf(),
                });
            }
        };

        let warnings = Mutex::new(Vec::new());
        let children = match self.walk_children(path, 0, max_depth, ctx, &warnings) {
            Ok(children) => children,
            Err(WalkError::Cancelled) => return Err(ScanError::Interrupted),
            Err(WalkError::Probe(err)) => return Err(err.into()),
        };
        let dir = aggregate(&stub, children, &warnings);

        let warnings = warnings.into_inner().unwrap_or_else(|e| e.into_inner());
        Ok((dir, warnings))
    }

    /// List and resolve the children of `dir`, which sits at `depth`.
    fn walk_children(
        &self,
        dir: &Path,
        depth: u32,
        max_depth: u32,
        ctx: &ScanContext,
        warnings: &Mutex<Vec<ScanWarning>>,
    ) -> Result<Vec<Entry>, WalkError> {
        if ctx.is_cancelled() {
            return Err(WalkError::Cancelled);
        }

        let names = self.probe.list(dir).map_err(WalkError::Probe)?;
        let expand = depth + 1 < max_depth;

        let mut entries = Vec::with_capacity(names.len());
        let mut pending = Vec::new();
        let mut level = LevelProgress {
            directory: dir.to_path_buf(),
            files: 0,
            directories: 0,
        };

        for name in names {
            if self.filter.should_skip(&name.to_string_lossy()) {
                continue;
            }
            let path = dir.join(&name);

            match self.probe.probe(&path) {
                Ok(Probed::File(mut file)) => {
                    if file.size > MAX_PLAUSIBLE_SIZE {
                        warn!(path = %path.display(), size = file.size, "implausible file size, counting as 0");
                        lock(warnings).push(ScanWarning::size_overflow(&path, file.size));
                        file.size = 0;
                    }
                    level.files += 1;
                    entries.push(Entry::File(file));
                }
                Ok(Probed::Directory(stub)) => {
                    level.directories += 1;
                    if expand {
                        pending.push(stub);
                    } else {
                        entries.push(Entry::Directory(stub));
                    }
                }
                Err(err) if err.kind == ProbeErrorKind::Unsupported => {
                    debug!(path = %path.display(), "skipping special file");
                }
                Err(err) => {
                    debug!(path = %path.display(), error = %err, "skipping unreadable entry");
                    lock(warnings).push(ScanWarning::from_probe(&err));
                }
            }
        }

        ctx.tracker.record_level(&level);
        // No subscribers is fine
        let _ = self.progress_tx.send(level);

        for batch in pending.chunks(self.batch_size) {
            if ctx.is_cancelled() {
                return Err(WalkError::Cancelled);
            }
            let resolved: Vec<Option<DirectoryEntry>> = batch
                .par_iter()
                .map(|stub| self.expand(stub, depth + 1, max_depth, ctx, warnings))
                .collect();
            for dir in resolved {
                entries.push(Entry::Directory(dir.ok_or(WalkError::Cancelled)?));
            }
        }

        Ok(entries)
    }

    /// Walk one subdirectory. `None` only on cancellation.
    fn expand(
        &self,
        stub: &DirectoryEntry,
        depth: u32,
        max_depth: u32,
        ctx: &ScanContext,
        warnings: &Mutex<Vec<ScanWarning>>,
    ) -> Option<DirectoryEntry> {
        match self.walk_children(&stub.path, depth, max_depth, ctx, warnings) {
            Ok(children) => Some(aggregate(stub, children, warnings)),
            Err(WalkError::Cancelled) => None,
            Err(WalkError::Probe(err)) => {
                warn!(path = %stub.path.display(), error = %err, "subdirectory unreadable, keeping placeholder");
                lock(warnings).push(ScanWarning::subtree_failed(&stub.path, &err));
                Some(stub.clone())
            }
        }
    }
}

/// Sum `children` into an expanded copy of `stub`.
///
/// An aggregate past the plausible bound degrades to the placeholder.
fn aggregate(stub: &DirectoryEntry, children: Vec<Entry>, warnings: &Mutex<Vec<ScanWarning>>) -> DirectoryEntry {
    let dir = DirectoryEntry::with_children(&stub.path, children, stub.modified_at, stub.created_at);
    if dir.size > MAX_PLAUSIBLE_SIZE {
        warn!(path = %dir.path.display(), size = dir.size, "implausible directory size, keeping placeholder");
        lock(warnings).push(ScanWarning::size_overflow(&dir.path, dir.size));
        return stub.clone();
    }
    dir
}
