//! lordisk - staggered disk usage scanner with a queryable scan cache.
//!
//! Usage:
//!   lordisk scan [PATH]          Scan (or serve from cache) and show a summary
//!   lordisk rescan [PATH]        Drop the cached scan and scan again
//!   lordisk stats [PATH]         Totals of the cached scan
//!   lordisk search PATH QUERY    Search cached entries by name
//!   lordisk large [PATH]         Largest cached files
//!   lordisk old [PATH]           Least recently modified cached files
//!   lordisk types [PATH]         Size per extension
//!   lordisk categories [PATH]    Size per file category
//!   lordisk duplicates [PATH]    Files sharing an exact size
//!   lordisk clear [PATH]         Clear one root, or the whole cache
//!   lordisk cache-size           Number of cached entries

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local, Utc};
use clap::{Args, Parser, Subcommand, ValueEnum};
use color_eyre::eyre::{Context, Result, bail, eyre};
use tracing_subscriber::EnvFilter;

use lordisk_cache::{
    CachedRecord, DEFAULT_DUPLICATE_MIN_SIZE, DEFAULT_LARGE_FILE_SIZE, ScanCache, SearchFilters,
};
use lordisk_core::{Entry, EntryKind, ScanConfig, ScanResult};
use lordisk_scan::{ResultSource, ScanEvent, StaggeredCoordinator};

#[derive(Parser)]
#[command(
    name = "lordisk",
    version,
    about = "Staggered disk usage scanner with a queryable scan cache",
    long_about = "lordisk shows a shallow result right away, deepens it in the background, \
                  and caches the finished scan so later queries need no rescan."
)]
struct Cli {
    /// Cache database (defaults to $LORDISK_CACHE, then the user cache dir)
    #[arg(long, global = true)]
    cache: Option<PathBuf>,

    /// Output format
    #[arg(short, long, global = true, default_value = "text")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Scan a directory, serving a fresh cached scan when there is one
    Scan(ScanArgs),

    /// Invalidate the cached scan and scan again
    Rescan(ScanArgs),

    /// Show totals of the cached scan
    Stats {
        #[arg(default_value = ".")]
        path: PathBuf,
    },

    /// Search cached entries by name
    Search {
        /// Root the scan was taken of
        path: PathBuf,

        /// Substring to look for in entry names
        query: String,

        /// Only files or only directories
        #[arg(short, long)]
        kind: Option<KindArg>,

        /// Minimum size (e.g., "10MB")
        #[arg(long)]
        min_size: Option<String>,

        /// Maximum size (e.g., "1GB")
        #[arg(long)]
        max_size: Option<String>,

        /// Accepted extensions, repeatable (e.g., --ext jpg --ext png)
        #[arg(short, long = "ext")]
        extensions: Vec<String>,
    },

    /// List the largest cached files
    Large {
        #[arg(default_value = ".")]
        path: PathBuf,

        /// Minimum file size
        #[arg(short, long)]
        min_size: Option<String>,
    },

    /// List cached files not modified for a while
    Old {
        #[arg(default_value = ".")]
        path: PathBuf,

        /// Minimum age in days
        #[arg(short, long, default_value = "365")]
        days: u32,
    },

    /// Size per extension
    Types {
        #[arg(default_value = ".")]
        path: PathBuf,
    },

    /// Size per file category
    Categories {
        #[arg(default_value = ".")]
        path: PathBuf,
    },

    /// Files sharing an exact size (duplicate candidates)
    Duplicates {
        #[arg(default_value = ".")]
        path: PathBuf,

        /// Minimum file size to consider
        #[arg(short, long)]
        min_size: Option<String>,
    },

    /// Clear the cache for one root, or entirely when no path is given
    Clear { path: Option<PathBuf> },

    /// Number of cached entries across all roots
    CacheSize,
}

#[derive(Args)]
struct ScanArgs {
    /// Path to scan
    #[arg(default_value = ".")]
    path: PathBuf,

    /// Depth of the immediate pass
    #[arg(short, long, default_value = "2")]
    immediate_depth: u32,

    /// Depth the background pass deepens to
    #[arg(short, long, default_value = "5")]
    background_depth: u32,

    /// Hard cap on both passes
    #[arg(long)]
    max_depth: Option<u32>,

    /// Merge background results into the final result
    #[arg(short, long)]
    merge: bool,

    /// Follow symbolic links
    #[arg(short = 'L', long)]
    follow_symlinks: bool,

    /// Extra entry names to skip, repeatable
    #[arg(long)]
    ignore: Vec<String>,

    /// Maximum age of a cached scan (e.g., "1h", "30m", "2d")
    #[arg(long, default_value = "1h")]
    max_age: String,

    /// Neither read nor write the cache
    #[arg(long)]
    no_cache: bool,

    /// Stream progress to stderr
    #[arg(short, long)]
    progress: bool,

    /// Display depth of the tree
    #[arg(short, long, default_value = "3")]
    depth: u32,

    /// Number of top entries to show per directory
    #[arg(short = 'n', long, default_value = "10")]
    top: usize,
}

impl ScanArgs {
    fn to_config(&self) -> Result<ScanConfig> {
        let mut builder = ScanConfig::builder();
        builder
            .root(self.path.clone())
            .immediate_depth(self.immediate_depth)
            .background_depth(self.background_depth)
            .max_depth(self.max_depth)
            .merge_background(self.merge)
            .follow_symlinks(self.follow_symlinks)
            .ignore_names(self.ignore.clone())
            .cache_max_age(parse_duration(&self.max_age)?);
        builder.build().map_err(|e| eyre!("Invalid scan options: {e}"))
    }
}

#[derive(Debug, Clone, Copy, ValueEnum, Default)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum KindArg {
    File,
    Directory,
}

impl From<KindArg> for EntryKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::File => EntryKind::File,
            KindArg::Directory => EntryKind::Directory,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::try_from_env("LORDISK_LOG").unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let cli = Cli::parse();
    let format = cli.format;
    let cache_path = resolve_cache_path(cli.cache)?;
    tracing::debug!(cache = %cache_path.display(), "resolved cache database");

    match cli.command {
        Command::Scan(args) => run_scan(&args, &cache_path, false, format).await?,
        Command::Rescan(args) => run_scan(&args, &cache_path, true, format).await?,
        Command::Stats { path } => run_stats(&open_cache(&cache_path)?, &canonical(&path)?, format)?,
        Command::Search {
            path,
            query,
            kind,
            min_size,
            max_size,
            extensions,
        } => {
            let mut filters = SearchFilters::new().extensions(extensions);
            if let Some(kind) = kind {
                filters = filters.kind(kind.into());
            }
            if let Some(min) = min_size {
                filters = filters.min_size(parse_size(&min)?);
            }
            if let Some(max) = max_size {
                filters = filters.max_size(parse_size(&max)?);
            }
            let cache = open_cache(&cache_path)?;
            let records = cache.search_files(&canonical(&path)?, &query, &filters)?;
            print_records(&records, format)?;
        }
        Command::Large { path, min_size } => {
            let min = match min_size {
                Some(s) => parse_size(&s)?,
                None => DEFAULT_LARGE_FILE_SIZE,
            };
            let records = open_cache(&cache_path)?.get_large_files(&canonical(&path)?, min)?;
            print_records(&records, format)?;
        }
        Command::Old { path, days } => {
            let records = open_cache(&cache_path)?.get_old_files(&canonical(&path)?, days)?;
            print_records(&records, format)?;
        }
        Command::Types { path } => run_types(&open_cache(&cache_path)?, &canonical(&path)?, format)?,
        Command::Categories { path } => {
            run_categories(&open_cache(&cache_path)?, &canonical(&path)?, format)?
        }
        Command::Duplicates { path, min_size } => {
            let min = match min_size {
                Some(s) => parse_size(&s)?,
                None => DEFAULT_DUPLICATE_MIN_SIZE,
            };
            run_duplicates(&open_cache(&cache_path)?, &canonical(&path)?, min, format)?
        }
        Command::Clear { path } => {
            let cache = open_cache(&cache_path)?;
            let removed = match path {
                Some(path) => cache.clear_cache(Some(&canonical(&path)?))?,
                None => cache.clear_cache(None)?,
            };
            match format {
                OutputFormat::Text => println!("Removed {removed} cached entries"),
                OutputFormat::Json => println!("{}", serde_json::json!({ "removed": removed })),
            }
        }
        Command::CacheSize => {
            let count = open_cache(&cache_path)?.cache_size()?;
            match format {
                OutputFormat::Text => println!("{count} cached entries"),
                OutputFormat::Json => println!("{}", serde_json::json!({ "entries": count })),
            }
        }
    }

    Ok(())
}

/// `--cache`, else `$LORDISK_CACHE`, else `<cache dir>/lordisk/cache.db`.
fn resolve_cache_path(flag: Option<PathBuf>) -> Result<PathBuf> {
    if let Some(path) = flag {
        return Ok(path);
    }
    if let Some(path) = std::env::var_os("LORDISK_CACHE").filter(|v| !v.is_empty()) {
        return Ok(PathBuf::from(path));
    }
    dirs::cache_dir()
        .map(|dir| dir.join("lordisk").join("cache.db"))
        .ok_or_else(|| eyre!("No cache directory available; pass --cache or set LORDISK_CACHE"))
}

fn open_cache(path: &Path) -> Result<ScanCache> {
    ScanCache::open(path).with_context(|| format!("Cannot open cache at {}", path.display()))
}

fn canonical(path: &Path) -> Result<PathBuf> {
    path.canonicalize()
        .with_context(|| format!("Invalid path {}", path.display()))
}

/// Run a staggered scan and display the final result.
async fn run_scan(args: &ScanArgs, cache_path: &Path, rescan: bool, format: OutputFormat) -> Result<()> {
    let config = args.to_config()?;

    let mut coordinator = StaggeredCoordinator::new();
    if !args.no_cache {
        coordinator = coordinator.with_cache(Arc::new(open_cache(cache_path)?));
    }

    let mut scan = if rescan {
        coordinator.rescan(config).await
    } else {
        coordinator.scan(config).await
    }
    .context("Scan failed")?;

    match scan.source() {
        ResultSource::Cache => eprintln!(
            "Using cached scan of {} from {}",
            scan.result().root_path.display(),
            format_time(scan.result().scanned_at.into())
        ),
        ResultSource::Fresh => eprintln!(
            "Immediate pass: {} in {} items, deepening...",
            format_size(scan.result().total_size),
            scan.result().item_count
        ),
    }

    let mut final_result = None;
    while let Some(event) = scan.next_event().await {
        match event {
            ScanEvent::Progress(progress) => {
                if args.progress {
                    eprintln!(
                        " {} files, {} dirs  {}",
                        progress.files_scanned,
                        progress.dirs_scanned,
                        progress.current_path.display()
                    );
                }
            }
            ScanEvent::Immediate(_) => {}
            ScanEvent::DirectoryScanned { path, entry, .. } => {
                if args.progress {
                    eprintln!(" done {} ({})", path.display(), format_size(entry.size));
                }
            }
            ScanEvent::CacheWriteFailed { message } => {
                eprintln!("warning: scan finished but could not be cached: {message}");
            }
            ScanEvent::Complete(result) => {
                final_result = Some(result);
                break;
            }
            ScanEvent::Cancelled => bail!("Scan cancelled"),
            ScanEvent::Error { message } => bail!("Scan failed: {message}"),
        }
    }

    let result = match final_result {
        Some(result) => result,
        None => scan.wait().await.context("Scan failed")?,
    };

    match format {
        OutputFormat::Text => print_summary(&result, args.depth, args.top),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&result)?),
    }
    Ok(())
}

fn print_summary(result: &ScanResult, max_depth: u32, top_n: usize) {
    println!();
    println!("{}", "─".repeat(60));
    println!(" {} - {}", result.root_path.display(), format_size(result.total_size));
    println!(
        " {} files, {} directories ({} not expanded)",
        result.total_files(),
        result.total_dirs(),
        result.stats.placeholders
    );
    println!(" Scanned in {:.2}s", result.scan_duration.as_secs_f64());
    println!("{}", "─".repeat(60));
    println!();

    print_entries(&result.items, 1, max_depth, top_n, result.total_size);

    if result.has_warnings() {
        println!();
        println!("{} warning(s) during scan", result.warnings.len());
    }
}

fn print_entries(entries: &[Entry], depth: u32, max_depth: u32, top_n: usize, root_size: u64) {
    let indent = "  ".repeat(depth as usize - 1);
    for entry in entries.iter().take(top_n) {
        let ratio = if root_size > 0 {
            entry.size() as f64 / root_size as f64 * 100.0
        } else {
            0.0
        };
        let marker = match entry {
            Entry::Directory(d) if d.is_placeholder => "▶ ",
            Entry::Directory(_) => "▼ ",
            Entry::File(_) => "  ",
        };
        let suffix = if entry.is_dir() { "/" } else { "" };

        println!(
            "{}{}{:<40} {:>10} {:>5.1}% {}",
            indent,
            marker,
            truncate(&format!("{}{}", entry.name(), suffix), 40),
            format_size(entry.size()),
            ratio,
            make_bar(ratio / 100.0, 10)
        );

        if depth < max_depth && !entry.children().is_empty() {
            print_entries(entry.children(), depth + 1, max_depth, top_n, root_size);
        }
    }

    let remaining = entries.len().saturating_sub(top_n);
    if remaining > 0 {
        println!("{}  ... and {} more", indent, remaining);
    }
}

fn run_stats(cache: &ScanCache, root: &Path, format: OutputFormat) -> Result<()> {
    let stats = cache.get_stats(root)?;
    match format {
        OutputFormat::Text => match stats.last_scan {
            Some(when) => {
                println!(" {} - {}", root.display(), format_size(stats.total_size));
                println!(" {} files, {} directories", stats.file_count, stats.directory_count);
                println!(" Last scanned {}", format_time(when));
            }
            None => println!(" {} has not been scanned", root.display()),
        },
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&stats)?),
    }
    Ok(())
}

fn print_records(records: &[CachedRecord], format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Text => {
            if records.is_empty() {
                println!(" No matching entries.");
            }
            for record in records {
                let age = (Utc::now() - record.modified_at).num_days();
                let suffix = if record.is_file() { "" } else { "/" };
                println!(
                    " {:>10}  {:>5}d  {}{}",
                    format_size(record.size),
                    age,
                    record.path.display(),
                    suffix
                );
            }
        }
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(records)?),
    }
    Ok(())
}

fn run_types(cache: &ScanCache, root: &Path, format: OutputFormat) -> Result<()> {
    let stats = cache.get_file_type_stats(root)?;
    match format {
        OutputFormat::Text => {
            for stat in &stats {
                println!(
                    " {:<12} {:>10} {:>8} files",
                    stat.extension,
                    format_size(stat.total_size),
                    stat.count
                );
            }
        }
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&stats)?),
    }
    Ok(())
}

fn run_categories(cache: &ScanCache, root: &Path, format: OutputFormat) -> Result<()> {
    let stats = cache.get_category_stats(root)?;
    match format {
        OutputFormat::Text => {
            let max_size = stats.iter().map(|s| s.total_size).max().unwrap_or(1).max(1);
            for stat in &stats {
                println!(
                    " {:<13} {:>10} {:>8} files  {}",
                    stat.category.to_string(),
                    format_size(stat.total_size),
                    stat.count,
                    make_bar(stat.total_size as f64 / max_size as f64, 20)
                );
            }
        }
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&stats)?),
    }
    Ok(())
}

fn run_duplicates(cache: &ScanCache, root: &Path, min_size: u64, format: OutputFormat) -> Result<()> {
    let groups = cache.get_size_duplicates(root, min_size)?;
    match format {
        OutputFormat::Text => {
            if groups.is_empty() {
                println!(" No same-size files found.");
                return Ok(());
            }
            let wasted: u64 = groups.iter().map(|g| g.wasted_bytes).sum();
            println!(
                " {} groups of same-size files, up to {} reclaimable",
                groups.len(),
                format_size(wasted)
            );
            println!();
            for (i, group) in groups.iter().enumerate() {
                println!(
                    " Group {} ({} files, {} each, {} wasted)",
                    i + 1,
                    group.count(),
                    format_size(group.size),
                    format_size(group.wasted_bytes)
                );
                for path in &group.paths {
                    println!("   {}", path.display());
                }
                println!();
            }
        }
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&groups)?),
    }
    Ok(())
}

/// Create a simple ASCII bar.
fn make_bar(ratio: f64, width: usize) -> String {
    let filled = ((ratio * width as f64).round() as usize).min(width);
    let empty = width - filled;
    format!("[{}{}]", "█".repeat(filled), "░".repeat(empty))
}

/// Format size in human-readable form.
fn format_size(bytes: u64) -> String {
    humansize::format_size(bytes, humansize::BINARY)
}

fn format_time(when: DateTime<Utc>) -> String {
    when.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Truncate a string to max length (in characters).
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_len - 1).collect();
        format!("{head}…")
    }
}

/// Parse a size string (e.g., "1KB", "10MB", "1GB").
fn parse_size(s: &str) -> Result<u64> {
    let s = s.trim().to_uppercase();
    let digits_end = s
        .find(|c: char| !c.is_ascii_digit() && c != '.')
        .unwrap_or(s.len());
    let (num, unit) = s.split_at(digits_end);
    let num: f64 = num.parse().with_context(|| format!("Invalid size {s:?}"))?;

    let multiplier: u64 = match unit.trim() {
        "" | "B" => 1,
        "K" | "KB" => 1024,
        "M" | "MB" => 1024 * 1024,
        "G" | "GB" => 1024 * 1024 * 1024,
        "T" | "TB" => 1024 * 1024 * 1024 * 1024,
        other => bail!("Unknown size unit {other:?}"),
    };

    Ok((num * multiplier as f64) as u64)
}

/// Parse a duration string (e.g., "90s", "30m", "1h", "2d").
fn parse_duration(s: &str) -> Result<Duration> {
    let s = s.trim().to_lowercase();
    let split = s
        .find(|c: char| !c.is_ascii_digit() && c != '.')
        .unwrap_or(s.len());
    let (num, unit) = s.split_at(split);
    let num: f64 = num.parse().with_context(|| format!("Invalid duration {s:?}"))?;

    let multiplier = match unit {
        "s" => 1.0,
        "m" => 60.0,
        "" | "h" => 60.0 * 60.0,
        "d" => 24.0 * 60.0 * 60.0,
        "w" => 7.0 * 24.0 * 60.0 * 60.0,
        other => bail!("Unknown duration unit {other:?}"),
    };

    Duration::try_from_secs_f64(num * multiplier)
        .with_context(|| format!("Duration out of range {s:?}"))
}
