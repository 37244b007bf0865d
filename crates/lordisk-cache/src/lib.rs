//! Persistent scan cache for lordisk.
//!
//! The cache keeps the most recent complete scan of each root in a SQLite
//! database, one row per entry, and answers queries over it without
//! touching the filesystem again:
//!
//! - freshness-checked retrieval of a whole scan ([`ScanCache::load_result`])
//! - name search with size, kind and extension filters
//! - large files, old files, per-extension and per-category totals
//! - same-size groups as duplicate candidates
//!
//! ```no_run
//! use std::path::Path;
//! use std::time::Duration;
//! use lordisk_cache::ScanCache;
//!
//! let cache = ScanCache::open("/tmp/lordisk.db")?;
//! if let Some(result) = cache.load_result(Path::new("/home"), Duration::from_secs(3600))? {
//!     println!("{} bytes", result.total_size);
//! }
//! # Ok::<(), lordisk_cache::CacheError>(())
//! ```

mod error;
mod query;
mod record;
mod store;

pub use error::CacheError;
pub use query::{CacheStats, CategoryStat, FileTypeStat, SearchFilters, SizeGroup};
pub use record::{CachedRecord, flatten, reconstruct};
pub use store::{
    DEFAULT_DUPLICATE_MIN_SIZE, DEFAULT_LARGE_FILE_SIZE, FILE_TYPE_LIMIT, QUERY_LIMIT,
    SEARCH_LIMIT, ScanCache,
};
