use lordisk_cache::ScanCache;
use lordisk_core::{Entry, WarningKind};
use lordisk_scan::{
    FsProbe, Probe, ProbeError, Probed, RecursiveScanner, ResultSource, ScanConfig, ScanContext,
    ScanError, ScanEvent, ScanResult, ScanState, StaggeredCoordinator, StaggeredScan,
};
use std::collections::HashSet;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// Filesystem probe that refuses to list the given directory names.
#[derive(Clone)]
struct DenyProbe {
    denied: Arc<HashSet<OsString>>,
}

impl DenyProbe {
    fn new(names: &[&str]) -> Self {
        Self {
            denied: Arc::new(names.iter().map(OsString::from).collect()),
        }
    }
}

impl Probe for DenyProbe {
    fn list(&self, dir: &Path) -> Result<Vec<OsString>, ProbeError> {
        if dir.file_name().is_some_and(|n| self.denied.contains(n)) {
            return Err(ProbeError::io(
                dir,
                std::io::Error::from(std::io::ErrorKind::PermissionDenied),
            ));
        }
        FsProbe::default().list(dir)
    }

    fn probe(&self, path: &Path) -> Result<Probed, ProbeError> {
        FsProbe::default().probe(path)
    }
}

fn write(path: &Path, len: usize) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, vec![b'x'; len]).unwrap();
}

/// root/a.txt (100), root/sub/b.txt (50)
fn basic_tree() -> TempDir {
    let temp = TempDir::new().unwrap();
    write(&temp.path().join("a.txt"), 100);
    write(&temp.path().join("sub/b.txt"), 50);
    temp
}

/// Three levels of nesting below the root.
fn nested_tree() -> TempDir {
    let temp = TempDir::new().unwrap();
    write(&temp.path().join("top.bin"), 10);
    write(&temp.path().join("l1/f1.bin"), 20);
    write(&temp.path().join("l1/l2/f2.bin"), 30);
    write(&temp.path().join("l1/l2/l3/f3.bin"), 40);
    write(&temp.path().join("m1/g1.bin"), 5);
    temp
}

/// Several sibling directories so the background pass has several units.
fn wide_tree(dirs: usize) -> TempDir {
    let temp = TempDir::new().unwrap();
    for i in 0..dirs {
        write(&temp.path().join(format!("d{i}/inner/file.bin")), 8);
    }
    temp
}

fn root_of(temp: &TempDir) -> PathBuf {
    temp.path().canonicalize().unwrap()
}

fn assert_sizes_aggregate(entries: &[Entry]) {
    for entry in entries {
        if let Entry::Directory(d) = entry {
            if d.is_placeholder {
                assert_eq!(d.size, 0);
                assert!(d.children.is_empty());
            } else {
                let sum: u64 = d.children.iter().map(Entry::size).sum();
                assert_eq!(d.size, sum, "size mismatch at {}", d.path.display());
                assert_sizes_aggregate(&d.children);
            }
        }
    }
}

fn assert_unique_paths(result: &ScanResult) {
    let mut seen = HashSet::new();
    for (entry, _) in result.walk() {
        assert!(seen.insert(entry.path().to_path_buf()), "duplicate {}", entry.path().display());
    }
}

async fn drain(scan: &mut StaggeredScan) -> Vec<ScanEvent> {
    let mut events = Vec::new();
    while let Some(event) = scan.next_event().await {
        let terminal = event.is_terminal();
        events.push(event);
        if terminal {
            break;
        }
    }
    events
}

#[test]
fn test_basic_scan_scenario() {
    let temp = basic_tree();
    let result = RecursiveScanner::new()
        .scan(temp.path(), 10, &ScanContext::default())
        .unwrap();

    assert_eq!(result.total_size, 150);
    assert_eq!(result.find(&temp.path().join("sub")).unwrap().size(), 50);
    // a.txt, sub, sub/b.txt; the root is not counted
    assert_eq!(result.item_count, 3);
    assert_sizes_aggregate(&result.items);
}

#[test]
fn test_noise_directories_never_appear() {
    let temp = basic_tree();
    for noise in [".git", "node_modules", "found.042"] {
        write(&temp.path().join(noise).join("payload.bin"), 1000);
    }

    let result = RecursiveScanner::new()
        .scan(temp.path(), 10, &ScanContext::default())
        .unwrap();

    for (entry, _) in result.walk() {
        assert!(!matches!(entry.name(), ".git" | "node_modules" | "found.042"));
    }
    assert_eq!(result.total_size, 150);
}

#[test]
fn test_placeholders_at_depth_limit() {
    let temp = nested_tree();
    let result = RecursiveScanner::new()
        .scan(temp.path(), 1, &ScanContext::default())
        .unwrap();

    for (entry, depth) in result.walk() {
        assert_eq!(depth, 1);
        if entry.is_dir() {
            assert!(entry.is_placeholder());
            assert_eq!(entry.size(), 0);
            assert!(entry.children().is_empty());
        }
    }
    assert_eq!(result.stats.placeholders, 2);
}

#[test]
fn test_permission_error_mid_tree() {
    let temp = basic_tree();
    write(&temp.path().join("sub2/hidden.bin"), 999);

    let scanner = RecursiveScanner::with_probe(DenyProbe::new(&["sub2"]));
    let result = scanner.scan(temp.path(), 10, &ScanContext::default()).unwrap();

    let sub2 = result.find(&temp.path().join("sub2")).unwrap();
    assert!(sub2.is_placeholder());
    assert_eq!(sub2.size(), 0);
    assert_eq!(result.total_size, 150);
    assert!(result.warnings.iter().any(|w| w.kind == WarningKind::SubtreeFailed));
    assert_sizes_aggregate(&result.items);
}

#[test]
fn test_small_batches_scan_everything() {
    let temp = wide_tree(7);
    let result = RecursiveScanner::new()
        .with_batch_size(2)
        .scan(temp.path(), 10, &ScanContext::default())
        .unwrap();

    assert_eq!(result.total_files(), 7);
    assert_eq!(result.total_size, 56);
    assert_unique_paths(&result);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_staggered_delivery_order() {
    let temp = nested_tree();
    let config = ScanConfig::builder()
        .root(temp.path())
        .immediate_depth(1u32)
        .background_depth(3u32)
        .build()
        .unwrap();

    let coordinator = StaggeredCoordinator::new();
    let mut scan = coordinator.scan(config).await.unwrap();
    assert_eq!(scan.source(), ResultSource::Fresh);

    let immediate = scan.result().clone();
    assert_eq!(immediate.total_size, 10);
    assert_eq!(immediate.stats.placeholders, 2);

    let events = drain(&mut scan).await;
    let kinds: Vec<_> = events
        .iter()
        .filter(|e| !matches!(e, ScanEvent::Progress(_)))
        .collect();

    assert!(matches!(kinds.first(), Some(ScanEvent::Immediate(_))));
    assert!(matches!(kinds.last(), Some(ScanEvent::Complete(_))));

    let scanned: Vec<_> = kinds
        .iter()
        .filter_map(|e| match e {
            ScanEvent::DirectoryScanned { path, depth, entry } => Some((path, *depth, entry)),
            _ => None,
        })
        .collect();
    assert_eq!(scanned.len(), 2);

    let root = root_of(&temp);
    let (_, depth, l1) = scanned.iter().find(|(p, _, _)| **p == root.join("l1")).unwrap();
    assert_eq!(*depth, 1);
    // l1 at depth 1, l2 at depth 2 expanded, l3 at depth 3 left as placeholder
    assert_eq!(l1.size, 50);
    assert!(l1.find(&root.join("l1/l2/l3")).unwrap().is_placeholder());

    // Advisory by default: completion carries the immediate shape
    match kinds.last() {
        Some(ScanEvent::Complete(result)) => assert_eq!(result.total_size, 10),
        other => panic!("unexpected terminal event {other:?}"),
    }
    assert_eq!(scan.progress().state, ScanState::Complete);
    assert!(!scan.progress().is_scanning);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_merge_background_into_final_result() {
    let temp = nested_tree();
    let config = ScanConfig::builder()
        .root(temp.path())
        .immediate_depth(1u32)
        .background_depth(10u32)
        .merge_background(true)
        .build()
        .unwrap();

    let coordinator = StaggeredCoordinator::new();
    let scan = coordinator.scan(config).await.unwrap();
    let result = scan.wait().await.unwrap();

    assert_eq!(result.total_size, 105);
    assert_eq!(result.stats.placeholders, 0);
    assert_eq!(result.total_files(), 5);
    assert_sizes_aggregate(&result.items);
    assert_unique_paths(&result);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_progress_is_monotonic() {
    let temp = wide_tree(12);
    let config = ScanConfig::builder()
        .root(temp.path())
        .immediate_depth(1u32)
        .background_depth(4u32)
        .background_batch_size(3usize)
        .batch_delay(Duration::from_millis(1))
        .build()
        .unwrap();

    let coordinator = StaggeredCoordinator::new();
    let mut scan = coordinator.scan(config).await.unwrap();
    let events = drain(&mut scan).await;

    let mut last = (0, 0);
    let mut seen = 0;
    for event in &events {
        if let ScanEvent::Progress(p) = event {
            assert!(p.files_scanned >= last.0);
            assert!(p.dirs_scanned >= last.1);
            last = (p.files_scanned, p.dirs_scanned);
            seen += 1;
        }
    }
    assert!(seen > 0);
    assert!(matches!(events.last(), Some(ScanEvent::Complete(_))));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_cache_hit_and_rescan() {
    let temp = basic_tree();
    let cache = Arc::new(ScanCache::open_in_memory().unwrap());
    let coordinator = StaggeredCoordinator::new().with_cache(Arc::clone(&cache));
    let config = ScanConfig::builder()
        .root(temp.path())
        .merge_background(true)
        .build()
        .unwrap();

    let first = coordinator.scan(config.clone()).await.unwrap();
    let fresh = first.wait().await.unwrap();
    assert_eq!(fresh.total_size, 150);

    let mut second = coordinator.scan(config.clone()).await.unwrap();
    assert_eq!(second.source(), ResultSource::Cache);
    assert_eq!(second.result().total_size, 150);
    assert_eq!(second.result().item_count, fresh.item_count);
    let events = drain(&mut second).await;
    assert_eq!(events.len(), 1);
    assert!(matches!(events[0], ScanEvent::Complete(_)));

    let third = coordinator.rescan(config).await.unwrap();
    assert_eq!(third.source(), ResultSource::Fresh);
    third.wait().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_cancellation_caches_nothing() {
    let temp = wide_tree(4);
    let cache = Arc::new(ScanCache::open_in_memory().unwrap());
    let coordinator = StaggeredCoordinator::new().with_cache(Arc::clone(&cache));
    let config = ScanConfig::builder()
        .root(temp.path())
        .immediate_depth(1u32)
        .background_depth(5u32)
        .background_batch_size(1usize)
        .batch_delay(Duration::from_secs(30))
        .build()
        .unwrap();

    let mut scan = coordinator.scan(config).await.unwrap();
    scan.cancel();
    let events = drain(&mut scan).await;
    assert!(matches!(events.last(), Some(ScanEvent::Cancelled)));
    assert!(matches!(scan.wait().await, Err(ScanError::Interrupted)));

    let progress = coordinator.progress(temp.path()).unwrap();
    assert_eq!(progress.state, ScanState::Cancelled);
    assert_eq!(cache.cache_size().unwrap(), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_same_root_is_serialized() {
    let temp = wide_tree(4);
    let config = ScanConfig::builder()
        .root(temp.path())
        .immediate_depth(1u32)
        .background_depth(5u32)
        .background_batch_size(1usize)
        .batch_delay(Duration::from_secs(30))
        .build()
        .unwrap();

    let coordinator = StaggeredCoordinator::new();
    let running = coordinator.scan(config.clone()).await.unwrap();
    assert!(coordinator.is_scanning(temp.path()));

    let err = coordinator.scan(config.clone()).await.err().unwrap();
    assert!(matches!(err, ScanError::AlreadyScanning { .. }));

    // A different root is independent
    let other = basic_tree();
    let independent = coordinator.scan(ScanConfig::new(other.path())).await.unwrap();
    independent.wait().await.unwrap();

    running.cancel();
    let _ = running.wait().await;
    assert!(!coordinator.is_scanning(temp.path()));
    coordinator.scan(ScanConfig::new(temp.path())).await.unwrap().wait().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_missing_root_fails() {
    let temp = TempDir::new().unwrap();
    let coordinator = StaggeredCoordinator::new();
    let err = coordinator
        .scan(ScanConfig::new(temp.path().join("missing")))
        .await
        .err()
        .unwrap();

    assert!(matches!(err, ScanError::NotFound { .. }));
    let progress = coordinator.progress(&temp.path().join("missing")).unwrap();
    assert_eq!(progress.state, ScanState::Error);
    assert!(!progress.is_scanning);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_invalid_config_is_rejected() {
    let temp = basic_tree();
    let mut config = ScanConfig::new(temp.path());
    config.background_batch_size = 0;

    let err = StaggeredCoordinator::new().scan(config).await.err().unwrap();
    assert!(matches!(err, ScanError::InvalidConfig { .. }));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_concurrent_roots_keep_separate_progress() {
    let slow = wide_tree(6);
    let config = ScanConfig::builder()
        .root(slow.path())
        .immediate_depth(1u32)
        .background_depth(5u32)
        .background_batch_size(1usize)
        .batch_delay(Duration::from_secs(30))
        .build()
        .unwrap();

    let coordinator = StaggeredCoordinator::new();
    let running = coordinator.scan(config).await.unwrap();
    let before = running.progress();
    assert!(before.is_scanning);
    assert!(before.dirs_scanned >= 6);

    let other = basic_tree();
    let quick = coordinator.scan(ScanConfig::new(other.path())).await.unwrap();
    let quick_progress = {
        let done = quick.wait().await.unwrap();
        assert_eq!(done.total_size, 150);
        coordinator.progress(other.path()).unwrap()
    };
    assert_eq!(quick_progress.state, ScanState::Complete);
    assert!(!quick_progress.is_scanning);

    // The other root neither reset nor finished the running scan
    let after = running.progress();
    assert!(after.is_scanning);
    assert!(after.dirs_scanned >= before.dirs_scanned);
    assert!(after.files_scanned >= before.files_scanned);
    assert!(coordinator.progress(slow.path()).unwrap().is_scanning);

    running.cancel();
    assert!(matches!(running.wait().await, Err(ScanError::Interrupted)));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_cache_keeps_background_depth() {
    let temp = TempDir::new().unwrap();
    write(&temp.path().join("a/b/c/big.bin"), 4096);
    let cache = Arc::new(ScanCache::open_in_memory().unwrap());
    let coordinator = StaggeredCoordinator::new().with_cache(Arc::clone(&cache));

    let scan = coordinator.scan(ScanConfig::new(temp.path())).await.unwrap();
    // b sits at the immediate depth and stays a placeholder for the caller
    assert_eq!(scan.result().total_size, 0);
    let result = scan.wait().await.unwrap();
    assert_eq!(result.total_size, 0);

    let root = root_of(&temp);
    let large = cache.get_large_files(&root, 1024).unwrap();
    assert_eq!(large.len(), 1);
    assert_eq!(large[0].path, root.join("a/b/c/big.bin"));

    let stats = cache.get_stats(&root).unwrap();
    assert_eq!(stats.total_size, 4096);
    assert_eq!(stats.file_count, 1);

    let cached = coordinator.scan(ScanConfig::new(temp.path())).await.unwrap();
    assert_eq!(cached.source(), ResultSource::Cache);
    assert_eq!(cached.result().total_size, 4096);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_cache_write_failure_is_reported_separately() {
    let temp = basic_tree();
    let db = TempDir::new().unwrap();
    let db_path = db.path().join("cache.db");
    let cache = Arc::new(ScanCache::open(&db_path).unwrap());
    rusqlite::Connection::open(&db_path)
        .unwrap()
        .execute_batch("DROP TABLE entries")
        .unwrap();

    let coordinator = StaggeredCoordinator::new().with_cache(cache);
    let mut scan = coordinator.scan(ScanConfig::new(temp.path())).await.unwrap();
    let events = drain(&mut scan).await;

    let failed = events
        .iter()
        .position(|e| matches!(e, ScanEvent::CacheWriteFailed { .. }))
        .expect("cache write failure event");
    let complete = events
        .iter()
        .position(|e| matches!(e, ScanEvent::Complete(_)))
        .expect("complete event");
    assert!(failed < complete);
    assert!(!events.iter().any(|e| matches!(e, ScanEvent::Error { .. })));

    let result = scan.wait().await.unwrap();
    assert_eq!(result.total_size, 150);
    assert_eq!(scan_state(&coordinator, temp.path()), ScanState::Complete);
}

fn scan_state(coordinator: &StaggeredCoordinator, root: &Path) -> ScanState {
    coordinator.progress(root).unwrap().state
}

#[tokio::test(flavor = "multi_thread")]
async fn test_background_unit_failure_is_isolated() {
    let temp = nested_tree();
    let config = ScanConfig::builder()
        .root(temp.path())
        .immediate_depth(1u32)
        .background_depth(10u32)
        .merge_background(true)
        .build()
        .unwrap();

    let coordinator = StaggeredCoordinator::with_probe(DenyProbe::new(&["m1"]));
    let result = coordinator.scan(config).await.unwrap().wait().await.unwrap();

    let root = root_of(&temp);
    assert!(result.find(&root.join("m1")).unwrap().is_placeholder());
    assert_eq!(result.find(&root.join("l1")).unwrap().size(), 90);
    assert_eq!(result.total_size, 100);
}
