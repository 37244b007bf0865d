//! SQLite-backed scan cache.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, SystemTime};

use chrono::{DateTime, SubsecRound, Utc};
use itertools::Itertools;
use rusqlite::types::Value;
use rusqlite::{Connection, OptionalExtension, Row, params, params_from_iter};
use tracing::{debug, info};

use lordisk_core::{EntryKind, FileCategory, ScanResult};

use crate::error::CacheError;
use crate::query::{CacheStats, CategoryStat, FileTypeStat, SearchFilters, SizeGroup};
use crate::record::{CachedRecord, flatten, reconstruct};

/// Maximum rows returned by [`ScanCache::search_files`].
pub const SEARCH_LIMIT: usize = 1000;

/// Maximum rows returned by the convenience queries.
pub const QUERY_LIMIT: usize = 100;

/// Maximum buckets returned by [`ScanCache::get_file_type_stats`].
pub const FILE_TYPE_LIMIT: usize = 20;

/// Default threshold for [`ScanCache::get_large_files`] (100 MiB).
pub const DEFAULT_LARGE_FILE_SIZE: u64 = 100 * 1024 * 1024;

/// Default threshold for [`ScanCache::get_size_duplicates`] (1 MiB).
pub const DEFAULT_DUPLICATE_MIN_SIZE: u64 = 1024 * 1024;

const MILLIS_PER_DAY: i64 = 24 * 60 * 60 * 1000;

const RECORD_COLUMNS: &str = "path, name, size, kind, extension, modified_ms, created_ms, \
                              parent_path, placeholder, scan_timestamp_ms";

/// Durable record of the most recent scan per root.
///
/// Every write replaces the root's previous rows inside one transaction,
/// and the single connection is guarded by a mutex, so readers never see a
/// half-written session.
pub struct ScanCache {
    conn: Mutex<Connection>,
}

impl ScanCache {
    /// Open (or create) a cache database at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, CacheError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| CacheError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA temp_store = MEMORY;",
        )?;
        Self::init(conn)
    }

    /// Open a throwaway in-memory cache.
    pub fn open_in_memory() -> Result<Self, CacheError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, CacheError> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS entries (
                root_path TEXT NOT NULL,
                path TEXT NOT NULL,
                name TEXT NOT NULL,
                size INTEGER NOT NULL,
                kind TEXT NOT NULL CHECK(kind IN ('file', 'directory')),
                extension TEXT,
                modified_ms INTEGER NOT NULL,
                created_ms INTEGER,
                parent_path TEXT,
                placeholder INTEGER NOT NULL DEFAULT 0,
                scan_timestamp_ms INTEGER NOT NULL,
                PRIMARY KEY (root_path, path)
            );

            CREATE TABLE IF NOT EXISTS scans (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                root_path TEXT NOT NULL,
                scan_timestamp_ms INTEGER NOT NULL,
                total_size INTEGER NOT NULL,
                file_count INTEGER NOT NULL,
                directory_count INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_entries_path ON entries (path);
            CREATE INDEX IF NOT EXISTS idx_entries_session ON entries (root_path, scan_timestamp_ms);
            CREATE INDEX IF NOT EXISTS idx_entries_parent ON entries (root_path, parent_path);
            CREATE INDEX IF NOT EXISTS idx_entries_size ON entries (size);
            CREATE INDEX IF NOT EXISTS idx_entries_modified ON entries (modified_ms);
            CREATE INDEX IF NOT EXISTS idx_entries_extension ON entries (extension);
            CREATE INDEX IF NOT EXISTS idx_scans_root_path ON scans (root_path, scan_timestamp_ms);",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, CacheError> {
        self.conn.lock().map_err(|_| CacheError::Poisoned)
    }

    /// Replace everything cached for `root` with `records` and a new session
    /// stamped now. All-or-nothing.
    pub fn cache_scan(
        &self,
        root: &Path,
        records: &[CachedRecord],
        total_size: u64,
        file_count: u64,
        directory_count: u64,
    ) -> Result<DateTime<Utc>, CacheError> {
        let stamp = Utc::now().trunc_subsecs(3);
        let stamp_ms = stamp.timestamp_millis();
        let root_key = path_key(root);

        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        tx.execute("DELETE FROM entries WHERE root_path = ?1", params![root_key])?;
        tx.execute("DELETE FROM scans WHERE root_path = ?1", params![root_key])?;
        tx.execute(
            "INSERT INTO scans (root_path, scan_timestamp_ms, total_size, file_count, directory_count)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                root_key,
                stamp_ms,
                to_sql_int(&root_key, total_size)?,
                to_sql_int(&root_key, file_count)?,
                to_sql_int(&root_key, directory_count)?,
            ],
        )?;

        {
            let mut stmt = tx.prepare(
                "INSERT OR REPLACE INTO entries
                 (root_path, path, name, size, kind, extension, modified_ms, created_ms,
                  parent_path, placeholder, scan_timestamp_ms)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            )?;

            for record in records {
                let path = path_key(&record.path);
                stmt.execute(params![
                    root_key,
                    path,
                    record.name,
                    to_sql_int(&path, record.size)?,
                    record.kind.to_string(),
                    record.extension,
                    record.modified_at.timestamp_millis(),
                    record.created_at.map(|t| t.timestamp_millis()),
                    record.parent_path.as_deref().map(path_key),
                    record.is_placeholder,
                    stamp_ms,
                ])?;
            }
        }

        tx.commit()?;
        info!(root = %root.display(), records = records.len(), "cached scan");
        Ok(stamp)
    }

    /// Flatten and cache a whole scan result.
    pub fn cache_result(&self, result: &ScanResult) -> Result<DateTime<Utc>, CacheError> {
        let records = flatten(result);
        self.cache_scan(
            &result.root_path,
            &records,
            result.total_size,
            result.total_files(),
            result.total_dirs(),
        )
    }

    /// Records of the latest session for `root`, if it is younger than
    /// `max_age`. `None` means the caller must rescan.
    pub fn get_cached_scan(
        &self,
        root: &Path,
        max_age: Duration,
    ) -> Result<Option<Vec<CachedRecord>>, CacheError> {
        let root_key = path_key(root);
        let max_age_ms = i64::try_from(max_age.as_millis()).unwrap_or(i64::MAX);
        let cutoff = Utc::now().timestamp_millis().saturating_sub(max_age_ms);

        let conn = self.lock()?;
        let session: Option<i64> = conn
            .query_row(
                "SELECT scan_timestamp_ms FROM scans
                 WHERE root_path = ?1 AND scan_timestamp_ms > ?2
                 ORDER BY scan_timestamp_ms DESC LIMIT 1",
                params![root_key, cutoff],
                |row| row.get(0),
            )
            .optional()?;

        let Some(stamp_ms) = session else {
            debug!(root = %root.display(), "no fresh cached scan");
            return Ok(None);
        };

        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM entries
             WHERE root_path = ?1 AND scan_timestamp_ms = ?2
             ORDER BY path"
        );
        let records = query_records(&conn, &sql, vec![Value::Text(root_key), Value::Integer(stamp_ms)])?;
        Ok(Some(records))
    }

    /// Load a fresh cached scan and rebuild it as a tree.
    pub fn load_result(&self, root: &Path, max_age: Duration) -> Result<Option<ScanResult>, CacheError> {
        Ok(self.get_cached_scan(root, max_age)?.map(|records| {
            let scanned_at = records.first().map(|r| SystemTime::from(r.scan_timestamp));
            let items = reconstruct(root, records);
            let mut result = ScanResult::new(root, items, Duration::ZERO, Vec::new());
            if let Some(scanned_at) = scanned_at {
                result.scanned_at = scanned_at;
            }
            result
        }))
    }

    /// Totals of the latest session, without touching entry rows.
    pub fn get_stats(&self, root: &Path) -> Result<CacheStats, CacheError> {
        let root_key = path_key(root);
        let conn = self.lock()?;
        let row = conn
            .query_row(
                "SELECT total_size, file_count, directory_count, scan_timestamp_ms FROM scans
                 WHERE root_path = ?1
                 ORDER BY scan_timestamp_ms DESC LIMIT 1",
                params![root_key],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, i64>(2)?,
                        row.get::<_, i64>(3)?,
                    ))
                },
            )
            .optional()?;

        match row {
            Some((total_size, file_count, directory_count, stamp_ms)) => Ok(CacheStats {
                total_size: from_sql_int(&root_key, total_size)?,
                file_count: from_sql_int(&root_key, file_count)?,
                directory_count: from_sql_int(&root_key, directory_count)?,
                last_scan: Some(from_millis(&root_key, stamp_ms)?),
            }),
            None => Ok(CacheStats::default()),
        }
    }

    /// Substring search on names, AND-combined with `filters`, largest first.
    pub fn search_files(
        &self,
        root: &Path,
        query: &str,
        filters: &SearchFilters,
    ) -> Result<Vec<CachedRecord>, CacheError> {
        let mut sql = format!(
            "SELECT {RECORD_COLUMNS} FROM entries
             WHERE root_path = ?1 AND name LIKE ?2 ESCAPE '\\'"
        );
        let mut values = vec![
            Value::Text(path_key(root)),
            Value::Text(format!("%{}%", escape_like(query))),
        ];

        if let Some(kind) = filters.kind {
            values.push(Value::Text(kind.to_string()));
            sql.push_str(&format!(" AND kind = ?{}", values.len()));
        }
        if let Some(min) = filters.min_size {
            values.push(Value::Integer(to_sql_int("min_size", min)?));
            sql.push_str(&format!(" AND size >= ?{}", values.len()));
        }
        if let Some(max) = filters.max_size {
            values.push(Value::Integer(to_sql_int("max_size", max)?));
            sql.push_str(&format!(" AND size <= ?{}", values.len()));
        }
        if !filters.extensions.is_empty() {
            let placeholders = filters
                .extensions
                .iter()
                .map(|ext| {
                    values.push(Value::Text(normalize_extension(ext)));
                    format!("?{}", values.len())
                })
                .join(", ");
            sql.push_str(&format!(" AND extension IN ({placeholders})"));
        }
        sql.push_str(&format!(" ORDER BY size DESC, path LIMIT {SEARCH_LIMIT}"));

        let conn = self.lock()?;
        query_records(&conn, &sql, values)
    }

    /// Files of at least `min_size` bytes, largest first.
    pub fn get_large_files(&self, root: &Path, min_size: u64) -> Result<Vec<CachedRecord>, CacheError> {
        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM entries
             WHERE root_path = ?1 AND kind = 'file' AND size >= ?2
             ORDER BY size DESC, path LIMIT {QUERY_LIMIT}"
        );
        let conn = self.lock()?;
        query_records(
            &conn,
            &sql,
            vec![
                Value::Text(path_key(root)),
                Value::Integer(to_sql_int("min_size", min_size)?),
            ],
        )
    }

    /// Files not modified in the last `days_old` days, oldest first.
    pub fn get_old_files(&self, root: &Path, days_old: u32) -> Result<Vec<CachedRecord>, CacheError> {
        let cutoff = Utc::now()
            .timestamp_millis()
            .saturating_sub(i64::from(days_old) * MILLIS_PER_DAY);
        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM entries
             WHERE root_path = ?1 AND kind = 'file' AND modified_ms < ?2
             ORDER BY modified_ms ASC, path LIMIT {QUERY_LIMIT}"
        );
        let conn = self.lock()?;
        query_records(&conn, &sql, vec![Value::Text(path_key(root)), Value::Integer(cutoff)])
    }

    /// Count and total size per extension, largest total first, capped at
    /// [`FILE_TYPE_LIMIT`]. Files without an extension are left out.
    pub fn get_file_type_stats(&self, root: &Path) -> Result<Vec<FileTypeStat>, CacheError> {
        Ok(self
            .extension_totals(root)?
            .into_iter()
            .filter(|stat| !stat.extension.is_empty())
            .take(FILE_TYPE_LIMIT)
            .collect())
    }

    /// Every extension bucket, including `""` for files without one.
    fn extension_totals(&self, root: &Path) -> Result<Vec<FileTypeStat>, CacheError> {
        let root_key = path_key(root);
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT COALESCE(extension, ''), COUNT(*), SUM(size) FROM entries
             WHERE root_path = ?1 AND kind = 'file'
             GROUP BY extension
             ORDER BY SUM(size) DESC, extension",
        )?;
        let rows = stmt
            .query_map(params![root_key], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?, row.get::<_, i64>(2)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(extension, count, total)| {
                Ok(FileTypeStat {
                    count: from_sql_int(&extension, count)?,
                    total_size: from_sql_int(&extension, total)?,
                    extension,
                })
            })
            .collect()
    }

    /// Per-extension stats folded into broad categories, largest total first.
    pub fn get_category_stats(&self, root: &Path) -> Result<Vec<CategoryStat>, CacheError> {
        let mut by_category: BTreeMap<FileCategory, CategoryStat> = BTreeMap::new();
        for stat in self.extension_totals(root)? {
            let category = FileCategory::from_extension(&stat.extension);
            let entry = by_category.entry(category).or_insert_with(|| CategoryStat {
                category,
                count: 0,
                total_size: 0,
                extensions: Vec::new(),
            });
            entry.count += stat.count;
            entry.total_size = entry.total_size.saturating_add(stat.total_size);
            if !stat.extension.is_empty() {
                entry.extensions.push(stat.extension);
            }
        }

        let mut stats: Vec<CategoryStat> = by_category.into_values().collect();
        for stat in &mut stats {
            stat.extensions.sort();
        }
        stats.sort_by(|a, b| b.total_size.cmp(&a.total_size));
        Ok(stats)
    }

    /// Groups of files sharing an exact size (no content comparison).
    pub fn get_size_duplicates(&self, root: &Path, min_size: u64) -> Result<Vec<SizeGroup>, CacheError> {
        let root_key = path_key(root);
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT path, size FROM entries
             WHERE root_path = ?1 AND kind = 'file' AND size IN (
                 SELECT size FROM entries
                 WHERE root_path = ?1 AND kind = 'file' AND size >= ?2
                 GROUP BY size HAVING COUNT(*) > 1
                 ORDER BY size DESC LIMIT {QUERY_LIMIT}
             )
             ORDER BY size DESC, path"
        ))?;
        let rows = stmt
            .query_map(params![root_key, to_sql_int("min_size", min_size)?], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut groups = Vec::new();
        for (size, members) in &rows.into_iter().chunk_by(|(_, size)| *size) {
            let size = from_sql_int(&root_key, size)?;
            let paths: Vec<PathBuf> = members.map(|(path, _)| PathBuf::from(path)).collect();
            groups.push(SizeGroup::new(size, paths));
        }
        Ok(groups)
    }

    /// Delete cached rows for one root, or for every root when `None`.
    ///
    /// Returns the number of entry rows removed.
    pub fn clear_cache(&self, root: Option<&Path>) -> Result<usize, CacheError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let removed = match root {
            Some(root) => {
                let root_key = path_key(root);
                let removed = tx.execute("DELETE FROM entries WHERE root_path = ?1", params![root_key])?;
                tx.execute("DELETE FROM scans WHERE root_path = ?1", params![root_key])?;
                removed
            }
            None => {
                let removed = tx.execute("DELETE FROM entries", [])?;
                tx.execute("DELETE FROM scans", [])?;
                removed
            }
        };
        tx.commit()?;
        debug!(removed, "cleared cache");
        Ok(removed)
    }

    /// Number of entry rows across all roots.
    pub fn cache_size(&self) -> Result<u64, CacheError> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM entries", [], |row| row.get(0))?;
        from_sql_int("entries", count)
    }
}

/// Raw column values of one `entries` row.
struct RecordRow {
    path: String,
    name: String,
    size: i64,
    kind: String,
    extension: Option<String>,
    modified_ms: i64,
    created_ms: Option<i64>,
    parent_path: Option<String>,
    placeholder: bool,
    scan_timestamp_ms: i64,
}

impl RecordRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            path: row.get(0)?,
            name: row.get(1)?,
            size: row.get(2)?,
            kind: row.get(3)?,
            extension: row.get(4)?,
            modified_ms: row.get(5)?,
            created_ms: row.get(6)?,
            parent_path: row.get(7)?,
            placeholder: row.get(8)?,
            scan_timestamp_ms: row.get(9)?,
        })
    }
}

impl TryFrom<RecordRow> for CachedRecord {
    type Error = CacheError;

    fn try_from(row: RecordRow) -> Result<Self, Self::Error> {
        let kind: EntryKind = row
            .kind
            .parse()
            .map_err(|_| CacheError::corrupt(&row.path, format!("unknown kind {:?}", row.kind)))?;
        Ok(Self {
            size: from_sql_int(&row.path, row.size)?,
            modified_at: from_millis(&row.path, row.modified_ms)?,
            created_at: row
                .created_ms
                .map(|ms| from_millis(&row.path, ms))
                .transpose()?,
            scan_timestamp: from_millis(&row.path, row.scan_timestamp_ms)?,
            kind,
            name: row.name,
            extension: row.extension,
            parent_path: row.parent_path.map(PathBuf::from),
            is_placeholder: row.placeholder,
            path: PathBuf::from(row.path),
        })
    }
}

fn query_records(conn: &Connection, sql: &str, values: Vec<Value>) -> Result<Vec<CachedRecord>, CacheError> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params_from_iter(values), RecordRow::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    rows.into_iter().map(CachedRecord::try_from).collect()
}

fn path_key(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

fn normalize_extension(ext: &str) -> String {
    let ext = ext.trim().to_lowercase();
    if ext.is_empty() || ext.starts_with('.') {
        ext
    } else {
        format!(".{ext}")
    }
}

fn escape_like(query: &str) -> String {
    let mut out = String::with_capacity(query.len());
    for c in query.chars() {
        if matches!(c, '\\' | '%' | '_') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn to_sql_int(context: &str, value: u64) -> Result<i64, CacheError> {
    i64::try_from(value).map_err(|_| CacheError::corrupt(context, format!("value {value} out of range")))
}

fn from_sql_int(context: &str, value: i64) -> Result<u64, CacheError> {
    u64::try_from(value).map_err(|_| CacheError::corrupt(context, format!("negative value {value}")))
}

fn from_millis(context: &str, ms: i64) -> Result<DateTime<Utc>, CacheError> {
    DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| CacheError::corrupt(context, format!("timestamp {ms} out of range")))
}
