use lordisk_cache::{CacheStats, FILE_TYPE_LIMIT, ScanCache, SearchFilters, flatten};
use lordisk_core::{DirectoryEntry, Entry, EntryKind, FileCategory, FileEntry, ScanResult};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tempfile::TempDir;

const MB: u64 = 1024 * 1024;
const DAY: Duration = Duration::from_secs(24 * 60 * 60);
const HOUR: Duration = Duration::from_secs(60 * 60);

fn file_at(path: &str, size: u64, modified: SystemTime) -> Entry {
    FileEntry::new(path, size, modified, None).into()
}

fn file(path: &str, size: u64) -> Entry {
    file_at(path, size, SystemTime::now())
}

fn dir(path: &str, children: Vec<Entry>) -> Entry {
    DirectoryEntry::with_children(path, children, SystemTime::now(), None).into()
}

fn result(root: &str, items: Vec<Entry>) -> ScanResult {
    ScanResult::new(root, items, Duration::ZERO, Vec::new())
}

fn basic_result() -> ScanResult {
    result(
        "/r",
        vec![
            file("/r/a.txt", 100),
            dir(
                "/r/sub",
                vec![
                    file("/r/sub/b.txt", 50),
                    DirectoryEntry::placeholder("/r/sub/deep", SystemTime::now(), None).into(),
                ],
            ),
        ],
    )
}

#[test]
fn test_cache_round_trip() {
    let cache = ScanCache::open_in_memory().unwrap();
    let original = basic_result();
    cache.cache_result(&original).unwrap();

    let records = cache.get_cached_scan(Path::new("/r"), HOUR).unwrap().unwrap();
    assert_eq!(records.len(), flatten(&original).len());

    let loaded = cache.load_result(Path::new("/r"), HOUR).unwrap().unwrap();
    assert_eq!(loaded.total_size, 150);
    assert_eq!(loaded.item_count, original.item_count);
    assert_eq!(loaded.find(Path::new("/r/sub")).unwrap().size(), 50);
    assert!(loaded.find(Path::new("/r/sub/deep")).unwrap().is_placeholder());
}

#[test]
fn test_cache_persists_on_disk() {
    let tmp = TempDir::new().unwrap();
    let db = tmp.path().join("nested").join("cache.db");

    {
        let cache = ScanCache::open(&db).unwrap();
        cache.cache_result(&basic_result()).unwrap();
    }

    let cache = ScanCache::open(&db).unwrap();
    let loaded = cache.load_result(Path::new("/r"), HOUR).unwrap().unwrap();
    assert_eq!(loaded.total_size, 150);
}

#[test]
fn test_zero_max_age_always_misses() {
    let cache = ScanCache::open_in_memory().unwrap();
    cache.cache_result(&basic_result()).unwrap();
    std::thread::sleep(Duration::from_millis(5));

    assert!(cache.get_cached_scan(Path::new("/r"), Duration::ZERO).unwrap().is_none());
    assert!(cache.get_cached_scan(Path::new("/r"), HOUR).unwrap().is_some());
}

#[test]
fn test_stats_from_latest_session() {
    let cache = ScanCache::open_in_memory().unwrap();
    let stamp = cache.cache_result(&basic_result()).unwrap();

    let stats = cache.get_stats(Path::new("/r")).unwrap();
    assert_eq!(stats.total_size, 150);
    assert_eq!(stats.file_count, 2);
    // sub and its placeholder
    assert_eq!(stats.directory_count, 2);
    assert_eq!(stats.last_scan, Some(stamp));

    assert_eq!(cache.get_stats(Path::new("/other")).unwrap(), CacheStats::default());
}

#[test]
fn test_new_scan_supersedes_old() {
    let cache = ScanCache::open_in_memory().unwrap();
    cache.cache_result(&basic_result()).unwrap();
    cache.cache_result(&result("/r", vec![file("/r/only.bin", 7)])).unwrap();

    let records = cache.get_cached_scan(Path::new("/r"), HOUR).unwrap().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].name, "only.bin");
    assert_eq!(cache.get_stats(Path::new("/r")).unwrap().total_size, 7);
}

#[test]
fn test_large_files() {
    let cache = ScanCache::open_in_memory().unwrap();
    cache
        .cache_result(&result(
            "/r",
            vec![file("/r/small.iso", 10 * MB), file("/r/big.iso", 200 * MB)],
        ))
        .unwrap();

    let large = cache.get_large_files(Path::new("/r"), 100 * MB).unwrap();
    assert_eq!(large.len(), 1);
    assert_eq!(large[0].name, "big.iso");
    assert_eq!(large[0].size, 200 * MB);
}

#[test]
fn test_old_files() {
    let now = SystemTime::now();
    let cache = ScanCache::open_in_memory().unwrap();
    cache
        .cache_result(&result(
            "/r",
            vec![
                file_at("/r/fresh.log", 1, now - DAY),
                file_at("/r/stale.log", 1, now - DAY * 40),
            ],
        ))
        .unwrap();

    let old = cache.get_old_files(Path::new("/r"), 30).unwrap();
    assert_eq!(old.len(), 1);
    assert_eq!(old[0].name, "stale.log");
}

#[test]
fn test_file_type_stats() {
    let cache = ScanCache::open_in_memory().unwrap();
    cache
        .cache_result(&result(
            "/r",
            vec![
                file("/r/a.jpg", 10),
                file("/r/b.JPG", 20),
                file("/r/c.rs", 5),
                file("/r/Makefile", 1),
            ],
        ))
        .unwrap();

    let stats = cache.get_file_type_stats(Path::new("/r")).unwrap();
    assert_eq!(stats[0].extension, ".jpg");
    assert_eq!(stats[0].count, 2);
    assert_eq!(stats[0].total_size, 30);
    assert_eq!(stats[1].extension, ".rs");
    // Makefile has no extension and is left out
    assert_eq!(stats.len(), 2);
}

#[test]
fn test_file_type_stats_are_capped() {
    let cache = ScanCache::open_in_memory().unwrap();
    let files = (0..30u64)
        .map(|i| file(&format!("/r/f{i}.e{i}"), i + 1))
        .collect();
    cache.cache_result(&result("/r", files)).unwrap();

    let stats = cache.get_file_type_stats(Path::new("/r")).unwrap();
    assert_eq!(stats.len(), FILE_TYPE_LIMIT);
    assert_eq!(stats[0].extension, ".e29");
    assert_eq!(stats[0].total_size, 30);

    // Categories still see every file
    let categories = cache.get_category_stats(Path::new("/r")).unwrap();
    let counted: u64 = categories.iter().map(|c| c.count).sum();
    assert_eq!(counted, 30);
}

#[test]
fn test_category_stats() {
    let cache = ScanCache::open_in_memory().unwrap();
    cache
        .cache_result(&result(
            "/r",
            vec![
                file("/r/a.jpg", 10),
                file("/r/b.png", 20),
                file("/r/c.mp4", 100),
                file("/r/d.weird", 1),
            ],
        ))
        .unwrap();

    let stats = cache.get_category_stats(Path::new("/r")).unwrap();
    assert_eq!(stats[0].category, FileCategory::Video);
    assert_eq!(stats[1].category, FileCategory::Image);
    assert_eq!(stats[1].count, 2);
    assert_eq!(stats[1].total_size, 30);
    assert_eq!(stats[1].extensions, vec![".jpg".to_string(), ".png".to_string()]);
    assert_eq!(stats[2].category, FileCategory::Other);
}

#[test]
fn test_search_filters() {
    let cache = ScanCache::open_in_memory().unwrap();
    cache
        .cache_result(&result(
            "/r",
            vec![
                file("/r/report.pdf", 300),
                file("/r/report.txt", 20),
                file("/r/50%_off.txt", 10),
                dir("/r/reports", vec![file("/r/reports/q1.pdf", 40)]),
            ],
        ))
        .unwrap();
    let root = Path::new("/r");

    let all = cache.search_files(root, "report", &SearchFilters::new()).unwrap();
    assert_eq!(all.len(), 3);
    // Largest first
    assert_eq!(all[0].name, "report.pdf");

    let files = cache
        .search_files(root, "report", &SearchFilters::new().kind(EntryKind::File))
        .unwrap();
    assert_eq!(files.len(), 2);

    let pdfs = cache
        .search_files(root, "", &SearchFilters::new().extensions(["PDF"]))
        .unwrap();
    let names: Vec<_> = pdfs.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, vec!["report.pdf", "q1.pdf"]);

    let bounded = cache
        .search_files(root, "", &SearchFilters::new().min_size(20).max_size(40).kind(EntryKind::File))
        .unwrap();
    assert_eq!(bounded.len(), 2);

    // LIKE wildcards in the query are literal
    let literal = cache.search_files(root, "%_", &SearchFilters::new()).unwrap();
    assert_eq!(literal.len(), 1);
    assert_eq!(literal[0].name, "50%_off.txt");
}

#[test]
fn test_sibling_roots_do_not_leak() {
    let cache = ScanCache::open_in_memory().unwrap();
    cache.cache_result(&result("/data/a", vec![file("/data/a/x.bin", 5)])).unwrap();
    cache.cache_result(&result("/data/ab", vec![file("/data/ab/y.bin", 9)])).unwrap();

    let a = cache.get_cached_scan(Path::new("/data/a"), HOUR).unwrap().unwrap();
    assert_eq!(a.len(), 1);
    assert_eq!(a[0].path, PathBuf::from("/data/a/x.bin"));

    cache.clear_cache(Some(Path::new("/data/a"))).unwrap();
    assert!(cache.get_cached_scan(Path::new("/data/a"), HOUR).unwrap().is_none());
    assert!(cache.get_cached_scan(Path::new("/data/ab"), HOUR).unwrap().is_some());
}

#[test]
fn test_clear_all_and_cache_size() {
    let cache = ScanCache::open_in_memory().unwrap();
    cache.cache_result(&basic_result()).unwrap();
    cache.cache_result(&result("/s", vec![file("/s/z", 1)])).unwrap();
    assert_eq!(cache.cache_size().unwrap(), 5);

    let removed = cache.clear_cache(None).unwrap();
    assert_eq!(removed, 5);
    assert_eq!(cache.cache_size().unwrap(), 0);
    assert_eq!(cache.get_stats(Path::new("/r")).unwrap().last_scan, None);
}

#[test]
fn test_size_duplicates() {
    let cache = ScanCache::open_in_memory().unwrap();
    cache
        .cache_result(&result(
            "/r",
            vec![
                file("/r/a.iso", 2 * MB),
                file("/r/b.iso", 2 * MB),
                file("/r/c.iso", 2 * MB),
                file("/r/d.mov", 5 * MB),
                file("/r/e.mov", 5 * MB),
                file("/r/lonely.bin", 3 * MB),
                file("/r/tiny1", 10),
                file("/r/tiny2", 10),
            ],
        ))
        .unwrap();

    let groups = cache.get_size_duplicates(Path::new("/r"), MB).unwrap();
    assert_eq!(groups.len(), 2);

    assert_eq!(groups[0].size, 5 * MB);
    assert_eq!(groups[0].count(), 2);
    assert_eq!(groups[0].wasted_bytes, 5 * MB);

    assert_eq!(groups[1].size, 2 * MB);
    assert_eq!(groups[1].deletable_count(), 2);
    assert_eq!(groups[1].wasted_bytes, 4 * MB);
}
