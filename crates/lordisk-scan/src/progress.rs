//! Scan progress reporting.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use strum::Display;
use tokio_util::sync::CancellationToken;

/// Lifecycle of a staggered scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ScanState {
    #[default]
    Idle,
    ImmediateScanning,
    ImmediateDelivered,
    BackgroundScanning,
    Complete,
    Cancelled,
    Error,
}

impl ScanState {
    /// Which pass is doing work in this state, if any.
    pub fn phase(self) -> Option<ScanPhase> {
        match self {
            Self::ImmediateScanning | Self::ImmediateDelivered => Some(ScanPhase::Immediate),
            Self::BackgroundScanning => Some(ScanPhase::Background),
            _ => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Cancelled | Self::Error)
    }
}

/// The pass a scan is in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ScanPhase {
    Immediate,
    Background,
}

/// Counts gathered while listing one directory. Level-local, not cumulative.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LevelProgress {
    pub directory: PathBuf,
    pub files: u64,
    pub directories: u64,
}

/// Point-in-time view of a scan's progress.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanProgress {
    /// Number of files seen so far.
    pub files_scanned: u64,
    /// Number of directories seen so far.
    pub dirs_scanned: u64,
    /// Directory most recently listed.
    pub current_path: PathBuf,
    pub is_scanning: bool,
    pub state: ScanState,
    pub phase: Option<ScanPhase>,
    /// Time elapsed since the scan started.
    pub elapsed: Duration,
}

impl ScanProgress {
    /// Create initial progress state.
    pub fn new() -> Self {
        Self {
            files_scanned: 0,
            dirs_scanned: 0,
            current_path: PathBuf::new(),
            is_scanning: false,
            state: ScanState::Idle,
            phase: None,
            elapsed: Duration::ZERO,
        }
    }

    /// Calculate scan rate in files per second.
    pub fn files_per_second(&self) -> f64 {
        if self.elapsed.as_secs_f64() > 0.0 {
            self.files_scanned as f64 / self.elapsed.as_secs_f64()
        } else {
            0.0
        }
    }

    /// Get total items scanned (files + dirs).
    pub fn total_items(&self) -> u64 {
        self.files_scanned + self.dirs_scanned
    }
}

impl Default for ScanProgress {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared, thread-safe progress counters.
///
/// Cloning yields another handle to the same counters. Writers only ever
/// add, so pollers see monotonic counts within one run; a poll may lag
/// slightly behind the workers.
#[derive(Debug, Clone, Default)]
pub struct ProgressTracker {
    inner: Arc<TrackerInner>,
}

#[derive(Debug, Default)]
struct TrackerInner {
    files: AtomicU64,
    dirs: AtomicU64,
    scanning: AtomicBool,
    current_path: Mutex<PathBuf>,
    state: Mutex<ScanState>,
    started: Mutex<Option<Instant>>,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Zero every counter and mark a new scan as running in `state`.
    pub fn reset(&self, state: ScanState) {
        self.inner.files.store(0, Ordering::Relaxed);
        self.inner.dirs.store(0, Ordering::Relaxed);
        *lock(&self.inner.current_path) = PathBuf::new();
        *lock(&self.inner.started) = Some(Instant::now());
        *lock(&self.inner.state) = state;
        self.inner.scanning.store(true, Ordering::Release);
    }

    /// Fold one directory's level-local counts into the totals.
    pub fn record_level(&self, level: &LevelProgress) {
        self.inner.files.fetch_add(level.files, Ordering::Relaxed);
        self.inner.dirs.fetch_add(level.directories, Ordering::Relaxed);
        self.set_current_path(&level.directory);
    }

    pub fn set_current_path(&self, path: &Path) {
        *lock(&self.inner.current_path) = path.to_path_buf();
    }

    pub fn set_state(&self, state: ScanState) {
        *lock(&self.inner.state) = state;
    }

    /// Stop the running scan in a terminal `state`.
    ///
    /// Returns false if the scan had already finished; only the first call
    /// flips `is_scanning`.
    pub fn finish(&self, state: ScanState) -> bool {
        if self.inner.scanning.swap(false, Ordering::AcqRel) {
            self.set_state(state);
            true
        } else {
            false
        }
    }

    pub fn is_scanning(&self) -> bool {
        self.inner.scanning.load(Ordering::Acquire)
    }

    pub fn state(&self) -> ScanState {
        *lock(&self.inner.state)
    }

    pub fn snapshot(&self) -> ScanProgress {
        let state = self.state();
        let started = *lock(&self.inner.started);
        ScanProgress {
            files_scanned: self.inner.files.load(Ordering::Relaxed),
            dirs_scanned: self.inner.dirs.load(Ordering::Relaxed),
            current_path: lock(&self.inner.current_path).clone(),
            is_scanning: self.is_scanning(),
            state,
            phase: state.phase(),
            elapsed: started.map(|t| t.elapsed()).unwrap_or_default(),
        }
    }
}

/// Explicit per-scan handles threaded through the scanner.
#[derive(Debug, Clone, Default)]
pub struct ScanContext {
    pub tracker: ProgressTracker,
    pub cancel: CancellationToken,
}

impl ScanContext {
    pub fn new(tracker: ProgressTracker, cancel: CancellationToken) -> Self {
        Self { tracker, cancel }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
