//! Two-phase scan orchestration.
//!
//! A scan first runs a shallow immediate pass and hands that result back to
//! the caller. A spawned task then deepens every placeholder the immediate
//! pass left behind, breadth-first and in throttled batches, streaming one
//! [`ScanEvent::DirectoryScanned`] per finished unit before a terminal event.
//! The deepened tree is written to the cache when one is attached, even
//! when the caller's final result stays the immediate one.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::{DashMap, DashSet};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use lordisk_cache::ScanCache;
use lordisk_core::{ScanConfig, ScanError, ScanResult};

use crate::event::{ResultSource, ScanEvent};
use crate::probe::{FsProbe, Probe};
use crate::progress::{LevelProgress, ProgressTracker, ScanContext, ScanProgress, ScanState};
use crate::scanner::RecursiveScanner;

/// Runs staggered scans, one progress tracker per run.
pub struct StaggeredCoordinator<P = FsProbe> {
    probe: P,
    cache: Option<Arc<ScanCache>>,
    trackers: Arc<DashMap<PathBuf, ProgressTracker>>,
    active: Arc<DashSet<PathBuf>>,
}

impl StaggeredCoordinator<FsProbe> {
    /// Create a coordinator over the real filesystem, without a cache.
    pub fn new() -> Self {
        Self::with_probe(FsProbe::default())
    }
}

impl Default for StaggeredCoordinator<FsProbe> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: Probe + Clone + 'static> StaggeredCoordinator<P> {
    pub fn with_probe(probe: P) -> Self {
        Self {
            probe,
            cache: None,
            trackers: Arc::new(DashMap::new()),
            active: Arc::new(DashSet::new()),
        }
    }

    /// Serve fresh results from `cache` and persist completed scans into it.
    pub fn with_cache(mut self, cache: Arc<ScanCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Progress of the latest scan of `root`, if one was started.
    pub fn progress(&self, root: &Path) -> Option<ScanProgress> {
        let key = std::fs::canonicalize(root).unwrap_or_else(|_| root.to_path_buf());
        self.trackers.get(&key).map(|tracker| tracker.snapshot())
    }

    /// Whether a scan of `root` is currently running.
    pub fn is_scanning(&self, root: &Path) -> bool {
        std::fs::canonicalize(root)
            .map(|root| self.active.contains(&root))
            .unwrap_or(false)
    }

    /// Start a scan. Returns once the immediate pass (or a cache hit) is
    /// available; background work continues on the returned handle.
    pub async fn scan(&self, config: ScanConfig) -> Result<StaggeredScan, ScanError> {
        self.scan_with(config, CancellationToken::new()).await
    }

    /// Like [`scan`](Self::scan), stopping early when `cancel` fires.
    pub async fn scan_with(
        &self,
        config: ScanConfig,
        cancel: CancellationToken,
    ) -> Result<StaggeredScan, ScanError> {
        self.run(config, cancel, true).await
    }

    /// Drop the cached scan of the root, then scan it fresh.
    pub async fn rescan(&self, config: ScanConfig) -> Result<StaggeredScan, ScanError> {
        if let Some(cache) = &self.cache {
            let root = canonical_root(&config.root)?;
            let cache = Arc::clone(cache);
            let cleared = tokio::task::spawn_blocking(move || cache.clear_cache(Some(&root))).await;
            match cleared {
                Ok(Ok(removed)) => debug!(removed, "invalidated cached scan"),
                Ok(Err(err)) => warn!(error = %err, "failed to invalidate cached scan"),
                Err(err) => warn!(error = %err, "cache invalidation task failed"),
            }
        }
        self.run(config, CancellationToken::new(), false).await
    }

    async fn run(
        &self,
        mut config: ScanConfig,
        cancel: CancellationToken,
        read_cache: bool,
    ) -> Result<StaggeredScan, ScanError> {
        config.validate()?;
        let started = Instant::now();
        let tracker = ProgressTracker::new();
        let root = match canonical_root(&config.root) {
            Ok(root) => root,
            Err(err) => {
                tracker.reset(ScanState::ImmediateScanning);
                tracker.finish(ScanState::Error);
                self.trackers.insert(config.root.clone(), tracker);
                return Err(err);
            }
        };
        config.root = root.clone();
        let guard = ActiveRoot::acquire(&self.active, &root)?;
        self.trackers.insert(root.clone(), tracker.clone());

        if read_cache {
            if let Some(result) = self.load_cached(&root, config.cache_max_age).await {
                info!(root = %root.display(), "serving cached scan");
                tracker.reset(ScanState::ImmediateScanning);
                tracker.finish(ScanState::Complete);
                drop(guard);

                let (events_tx, events_rx) = mpsc::unbounded_channel();
                let _ = events_tx.send(ScanEvent::Complete(result.clone()));
                return Ok(StaggeredScan {
                    result,
                    source: ResultSource::Cache,
                    events: events_rx,
                    tracker,
                    cancel,
                    task: None,
                });
            }
        }

        tracker.reset(ScanState::ImmediateScanning);
        info!(root = %root.display(), depth = config.effective_immediate_depth(), "immediate pass");

        let probe = self.probe.for_config(&config);
        let scanner = Arc::new(RecursiveScanner::from_config(probe, &config));
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let forwarder = forward_progress(scanner.subscribe(), tracker.clone(), events_tx.clone());
        let ctx = ScanContext::new(tracker.clone(), cancel.clone());

        let immediate = {
            let scanner = Arc::clone(&scanner);
            let ctx = ctx.clone();
            let root = root.clone();
            let depth = config.effective_immediate_depth();
            tokio::task::spawn_blocking(move || scanner.scan(&root, depth, &ctx)).await
        };
        let immediate = match immediate.map_err(join_error).and_then(|outcome| outcome) {
            Ok(result) => result,
            Err(err) => {
                let state = match err {
                    ScanError::Interrupted => ScanState::Cancelled,
                    _ => ScanState::Error,
                };
                tracker.finish(state);
                return Err(err);
            }
        };

        tracker.set_state(ScanState::ImmediateDelivered);
        let _ = events_tx.send(ScanEvent::Immediate(immediate.clone()));

        let task = tokio::spawn(run_background(BackgroundRun {
            config,
            scanner,
            ctx,
            result: immediate.clone(),
            cache: self.cache.clone(),
            events: events_tx,
            forwarder,
            started,
            guard,
        }));

        Ok(StaggeredScan {
            result: immediate,
            source: ResultSource::Fresh,
            events: events_rx,
            tracker,
            cancel,
            task: Some(task),
        })
    }

    async fn load_cached(&self, root: &Path, max_age: Duration) -> Option<ScanResult> {
        let cache = Arc::clone(self.cache.as_ref()?);
        let key = root.to_path_buf();
        match tokio::task::spawn_blocking(move || cache.load_result(&key, max_age)).await {
            Ok(Ok(found)) => found,
            Ok(Err(err)) => {
                warn!(root = %root.display(), error = %err, "cache read failed, rescanning");
                None
            }
            Err(err) => {
                warn!(root = %root.display(), error = %err, "cache read task failed, rescanning");
                None
            }
        }
    }
}

/// Handle to a running (or cache-served) scan.
pub struct StaggeredScan {
    result: ScanResult,
    source: ResultSource,
    events: mpsc::UnboundedReceiver<ScanEvent>,
    tracker: ProgressTracker,
    cancel: CancellationToken,
    task: Option<JoinHandle<Result<ScanResult, ScanError>>>,
}

impl StaggeredScan {
    /// The immediate result, or the cached one on a cache hit.
    pub fn result(&self) -> &ScanResult {
        &self.result
    }

    pub fn source(&self) -> ResultSource {
        self.source
    }

    /// Progress of this run.
    pub fn progress(&self) -> ScanProgress {
        self.tracker.snapshot()
    }

    /// Next event, or `None` once the stream has ended.
    pub async fn next_event(&mut self) -> Option<ScanEvent> {
        self.events.recv().await
    }

    /// Stop the background pass at its next batch boundary.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Wait for the background pass and return the final result.
    pub async fn wait(self) -> Result<ScanResult, ScanError> {
        let Self { result, task, .. } = self;
        match task {
            Some(task) => task.await.map_err(join_error)?,
            None => Ok(result),
        }
    }
}

/// Membership of a root in the active set, released on drop.
struct ActiveRoot {
    roots: Arc<DashSet<PathBuf>>,
    path: PathBuf,
}

impl ActiveRoot {
    fn acquire(roots: &Arc<DashSet<PathBuf>>, path: &Path) -> Result<Self, ScanError> {
        if !roots.insert(path.to_path_buf()) {
            return Err(ScanError::AlreadyScanning {
                path: path.to_path_buf(),
            });
        }
        Ok(Self {
            roots: Arc::clone(roots),
            path: path.to_path_buf(),
        })
    }
}

impl Drop for ActiveRoot {
    fn drop(&mut self) {
        self.roots.remove(&self.path);
    }
}

struct BackgroundRun<P> {
    config: ScanConfig,
    scanner: Arc<RecursiveScanner<P>>,
    ctx: ScanContext,
    result: ScanResult,
    cache: Option<Arc<ScanCache>>,
    events: mpsc::UnboundedSender<ScanEvent>,
    forwarder: JoinHandle<()>,
    started: Instant,
    guard: ActiveRoot,
}

async fn run_background<P: Probe + 'static>(run: BackgroundRun<P>) -> Result<ScanResult, ScanError> {
    let BackgroundRun {
        config,
        scanner,
        ctx,
        result: immediate,
        cache,
        events,
        forwarder,
        started,
        guard,
    } = run;

    let mut deepened = immediate.clone();
    let outcome = if config.has_background_pass() {
        ctx.tracker.set_state(ScanState::BackgroundScanning);
        deepen(&scanner, &ctx, &config, &mut deepened, &events).await
    } else {
        Ok(())
    };

    // Flush progress so the terminal event is last on the stream
    drop(scanner);
    let _ = forwarder.await;

    if let Err(err) = outcome {
        drop(guard);
        return Err(match err {
            ScanError::Interrupted => {
                info!(root = %config.root.display(), "scan cancelled");
                ctx.tracker.finish(ScanState::Cancelled);
                let _ = events.send(ScanEvent::Cancelled);
                ScanError::Interrupted
            }
            err => {
                ctx.tracker.finish(ScanState::Error);
                let _ = events.send(ScanEvent::Error {
                    message: err.to_string(),
                });
                err
            }
        });
    }

    deepened.scan_duration = started.elapsed();
    let result = if config.merge_background {
        deepened.clone()
    } else {
        immediate
    };

    if let Some(cache) = cache {
        let written = tokio::task::spawn_blocking(move || cache.cache_result(&deepened)).await;
        let failure = match written {
            Ok(Ok(_)) => None,
            Ok(Err(err)) => Some(err.to_string()),
            Err(err) => Some(err.to_string()),
        };
        if let Some(message) = failure {
            warn!(root = %config.root.display(), error = %message, "failed to cache scan");
            let _ = events.send(ScanEvent::CacheWriteFailed { message });
        }
    }

    drop(guard);
    ctx.tracker.finish(ScanState::Complete);
    info!(
        root = %config.root.display(),
        total_size = result.total_size,
        items = result.item_count,
        "scan complete"
    );
    let _ = events.send(ScanEvent::Complete(result.clone()));
    Ok(result)
}

/// Background pass: scan every placeholder shallower than the background
/// depth, one unit per placeholder, in throttled batches, grafting each
/// finished unit into `result`.
async fn deepen<P: Probe + 'static>(
    scanner: &Arc<RecursiveScanner<P>>,
    ctx: &ScanContext,
    config: &ScanConfig,
    result: &mut ScanResult,
    events: &mpsc::UnboundedSender<ScanEvent>,
) -> Result<(), ScanError> {
    let target = config.effective_background_depth();
    let mut seen = HashSet::new();
    let units: Vec<(PathBuf, u32)> = result
        .placeholders()
        .into_iter()
        .filter(|(path, depth)| *depth < target && seen.insert(path.clone()))
        .collect();
    info!(units = units.len(), depth = target, "background pass");

    for (index, batch) in units.chunks(config.background_batch_size.max(1)).enumerate() {
        if index > 0 {
            tokio::select! {
                _ = tokio::time::sleep(config.batch_delay) => {}
                _ = ctx.cancel.cancelled() => {}
            }
        }
        if ctx.is_cancelled() {
            return Err(ScanError::Interrupted);
        }

        let mut set = JoinSet::new();
        for (path, depth) in batch.iter().cloned() {
            let scanner = Arc::clone(scanner);
            let ctx = ctx.clone();
            set.spawn_blocking(move || {
                let outcome = scanner.scan_directory(&path, target - depth, &ctx);
                (path, depth, outcome)
            });
        }

        let mut interrupted = false;
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((path, depth, Ok((entry, warnings)))) => {
                    debug!(path = %path.display(), size = entry.size, "background unit done");
                    let _ = events.send(ScanEvent::DirectoryScanned {
                        path,
                        depth,
                        entry: entry.clone(),
                    });
                    match result.graft(entry) {
                        Ok(()) => result.warnings.extend(warnings),
                        Err(entry) => debug!(path = %entry.path.display(), "no placeholder to graft onto"),
                    }
                }
                Ok((_, _, Err(ScanError::Interrupted))) => interrupted = true,
                Ok((path, _, Err(err))) => {
                    warn!(path = %path.display(), error = %err, "background unit failed, keeping placeholder");
                }
                Err(err) => warn!(error = %err, "background unit task failed"),
            }
        }
        if interrupted {
            return Err(ScanError::Interrupted);
        }
    }

    Ok(())
}

/// Forward each level the scanner finishes as a tracker snapshot.
fn forward_progress(
    mut levels: broadcast::Receiver<LevelProgress>,
    tracker: ProgressTracker,
    events: mpsc::UnboundedSender<ScanEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match levels.recv().await {
                Ok(_) => {
                    if events.send(ScanEvent::Progress(tracker.snapshot())).is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => debug!(skipped, "progress forwarder lagged"),
                Err(RecvError::Closed) => break,
            }
        }
    })
}

fn canonical_root(root: &Path) -> Result<PathBuf, ScanError> {
    std::fs::canonicalize(root).map_err(|e| ScanError::io(root, e))
}

fn join_error(err: JoinError) -> ScanError {
    ScanError::Other {
        message: format!("Scan task failed: {err}"),
    }
}
