//! Noise-directory filtering.

use std::collections::HashSet;

/// Names skipped wherever they appear: version-control metadata, dependency
/// and tool caches, OS artifacts and recycle bins.
const NOISE_NAMES: &[&str] = &[
    // Version control
    ".git",
    ".svn",
    ".hg",
    ".bzr",
    // Dependency caches and virtualenvs
    "node_modules",
    "__pycache__",
    ".pytest_cache",
    ".mypy_cache",
    ".hypothesis",
    ".tox",
    ".eggs",
    ".cache",
    ".pyre",
    ".pytype",
    ".venv",
    "venv",
    "env",
    "ENV",
    "env.bak",
    "venv.bak",
    "htmlcov",
    ".coverage",
    ".Python",
    // Editor state
    ".idea",
    ".vscode",
    ".spyderproject",
    ".spyproject",
    ".ropeproject",
    // OS artifacts
    ".DS_Store",
    "Thumbs.db",
    "desktop.ini",
    "System Volume Information",
    // Recycle bins
    "$RECYCLE.BIN",
    "$Recycle.Bin",
    "RECYCLER",
];

/// Number of `found.NNN` directories CHKDSK may create.
const FOUND_DIR_COUNT: u32 = 100;

/// Decides whether a directory entry is skipped by name.
///
/// Matching is exact and case-sensitive. Skipped entries never appear in
/// results or progress counts.
#[derive(Debug, Clone)]
pub struct PathFilter {
    names: HashSet<String>,
}

impl PathFilter {
    /// Create the filter with the built-in noise list.
    pub fn new() -> Self {
        let mut names: HashSet<String> = NOISE_NAMES.iter().map(|n| n.to_string()).collect();
        names.extend((0..FOUND_DIR_COUNT).map(|i| format!("found.{i:03}")));
        Self { names }
    }

    /// Create the filter with additional exact names.
    pub fn with_extra<I, S>(extra: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut filter = Self::new();
        filter.names.extend(extra.into_iter().map(Into::into));
        filter
    }

    /// Check whether an entry with this name should be skipped.
    pub fn should_skip(&self, name: &str) -> bool {
        self.names.contains(name)
    }
}

impl Default for PathFilter {
    fn default() -> Self {
        Self::new()
    }
}
