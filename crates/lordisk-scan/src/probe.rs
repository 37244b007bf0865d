//! Single-entry filesystem access.

use std::ffi::OsString;
use std::fs::{self, Metadata};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::debug;

use lordisk_core::{DirectoryEntry, FileEntry, ProbeError, ScanConfig};

/// What a probe found at a path.
#[derive(Debug, Clone, PartialEq)]
pub enum Probed {
    File(FileEntry),
    /// A directory stub: placeholder with timestamps, contents not walked.
    Directory(DirectoryEntry),
}

/// Filesystem access used by the scanner.
///
/// Each call is one listing or one stat. Implementations never return a
/// partially populated entry: either full data or a [`ProbeError`].
pub trait Probe: Send + Sync {
    /// Names of the immediate children of `dir`.
    fn list(&self, dir: &Path) -> Result<Vec<OsString>, ProbeError>;

    /// Stat and classify a single entry.
    fn probe(&self, path: &Path) -> Result<Probed, ProbeError>;

    /// A copy of this probe adjusted for `config`.
    fn for_config(&self, _config: &ScanConfig) -> Self
    where
        Self: Clone,
    {
        self.clone()
    }
}

/// [`Probe`] backed by `std::fs`.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsProbe {
    follow_symlinks: bool,
}

impl FsProbe {
    pub fn new(follow_symlinks: bool) -> Self {
        Self { follow_symlinks }
    }

    fn metadata(&self, path: &Path) -> std::io::Result<Metadata> {
        if self.follow_symlinks {
            fs::metadata(path)
        } else {
            fs::symlink_metadata(path)
        }
    }
}

impl Probe for FsProbe {
    fn list(&self, dir: &Path) -> Result<Vec<OsString>, ProbeError> {
        let read_dir = fs::read_dir(dir).map_err(|e| ProbeError::io(dir, e))?;
        let mut names = Vec::new();
        for entry in read_dir {
            match entry {
                Ok(entry) => names.push(entry.file_name()),
                Err(err) => debug!(dir = %dir.display(), error = %err, "skipping unreadable directory entry"),
            }
        }
        Ok(names)
    }

    fn probe(&self, path: &Path) -> Result<Probed, ProbeError> {
        let metadata = self.metadata(path).map_err(|e| ProbeError::io(path, e))?;
        let modified = metadata.modified().unwrap_or(UNIX_EPOCH);
        let created = created_at(&metadata);

        if metadata.is_file() {
            Ok(Probed::File(FileEntry::new(path, metadata.len(), modified, created)))
        } else if metadata.is_dir() {
            Ok(Probed::Directory(DirectoryEntry::placeholder(path, modified, created)))
        } else {
            // Unfollowed symlinks, sockets, devices, fifos
            Err(ProbeError::unsupported(path))
        }
    }

    fn for_config(&self, config: &ScanConfig) -> Self {
        Self::new(config.follow_symlinks)
    }
}

fn created_at(metadata: &Metadata) -> Option<SystemTime> {
    metadata.created().ok()
}
