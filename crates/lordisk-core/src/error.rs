//! Error types for scanning operations.

use std::io;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that abort a scan.
#[derive(Debug, Error)]
pub enum ScanError {
    /// Permission denied for a path.
    #[error("Permission denied: {path}")]
    PermissionDenied { path: PathBuf },

    /// Path not found.
    #[error("Path not found: {path}")]
    NotFound { path: PathBuf },

    /// Generic I/O error.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Root path is not a directory.
    #[error("Root path is not a directory: {path}")]
    NotADirectory { path: PathBuf },

    /// Operation was cancelled.
    #[error("Operation interrupted")]
    Interrupted,

    /// Another scan of the same root is still running.
    #[error("A scan of {path} is already in progress")]
    AlreadyScanning { path: PathBuf },

    /// Invalid configuration.
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    /// Other error.
    #[error("{message}")]
    Other { message: String },
}

impl ScanError {
    /// Create an I/O error with path context.
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        let path = path.into();
        match source.kind() {
            io::ErrorKind::PermissionDenied => Self::PermissionDenied { path },
            io::ErrorKind::NotFound => Self::NotFound { path },
            io::ErrorKind::NotADirectory => Self::NotADirectory { path },
            _ => Self::Io { path, source },
        }
    }
}

impl From<ProbeError> for ScanError {
    fn from(err: ProbeError) -> Self {
        match err.kind {
            ProbeErrorKind::PermissionDenied => Self::PermissionDenied { path: err.path },
            ProbeErrorKind::NotFound => Self::NotFound { path: err.path },
            ProbeErrorKind::Unsupported => Self::NotADirectory { path: err.path },
            ProbeErrorKind::SymlinkLoop | ProbeErrorKind::Io => match err.source {
                Some(source) => Self::Io { path: err.path, source },
                None => Self::Other {
                    message: format!("Cannot read {}", err.path.display()),
                },
            },
        }
    }
}

/// Why a single entry could not be probed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProbeErrorKind {
    PermissionDenied,
    /// The entry vanished between listing and stat.
    NotFound,
    SymlinkLoop,
    /// Neither a regular file nor a directory (socket, device, unfollowed link).
    Unsupported,
    Io,
}

/// Per-entry failure. Callers skip the entry and keep walking.
#[derive(Debug, Error)]
#[error("Cannot probe {path}: {kind:?}")]
pub struct ProbeError {
    pub path: PathBuf,
    pub kind: ProbeErrorKind,
    #[source]
    pub source: Option<io::Error>,
}

impl ProbeError {
    /// Classify an I/O error for `path`.
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        let kind = match source.kind() {
            io::ErrorKind::PermissionDenied => ProbeErrorKind::PermissionDenied,
            io::ErrorKind::NotFound => ProbeErrorKind::NotFound,
            _ if is_symlink_loop(&source) => ProbeErrorKind::SymlinkLoop,
            _ => ProbeErrorKind::Io,
        };
        Self {
            path: path.into(),
            kind,
            source: Some(source),
        }
    }

    /// The entry exists but is not something the scanner measures.
    pub fn unsupported(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            kind: ProbeErrorKind::Unsupported,
            source: None,
        }
    }
}

// ELOOP
#[cfg(any(target_os = "linux", target_os = "android"))]
fn is_symlink_loop(err: &io::Error) -> bool {
    err.raw_os_error() == Some(40)
}

#[cfg(any(target_os = "macos", target_os = "ios", target_os = "freebsd"))]
fn is_symlink_loop(err: &io::Error) -> bool {
    err.raw_os_error() == Some(62)
}

#[cfg(not(any(
    target_os = "linux",
    target_os = "android",
    target_os = "macos",
    target_os = "ios",
    target_os = "freebsd"
)))]
fn is_symlink_loop(_err: &io::Error) -> bool {
    false
}

/// Kind of scan warning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WarningKind {
    /// Permission was denied.
    PermissionDenied,
    /// Error reading metadata.
    MetadataError,
    /// A reported size was outside plausible bounds and was coerced to 0.
    SizeOverflow,
    /// A subdirectory could not be walked and was kept as a placeholder.
    SubtreeFailed,
}

/// Non-fatal warning encountered during scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanWarning {
    /// Path where the warning occurred.
    pub path: PathBuf,
    /// Human-readable message.
    pub message: String,
    /// Kind of warning.
    pub kind: WarningKind,
}

impl ScanWarning {
    /// Create a new scan warning.
    pub fn new(path: impl Into<PathBuf>, message: impl Into<String>, kind: WarningKind) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
            kind,
        }
    }

    /// Warning for an entry that failed its probe.
    pub fn from_probe(err: &ProbeError) -> Self {
        let kind = match err.kind {
            ProbeErrorKind::PermissionDenied => WarningKind::PermissionDenied,
            _ => WarningKind::MetadataError,
        };
        Self::new(&err.path, err.to_string(), kind)
    }

    /// Create a size overflow warning.
    pub fn size_overflow(path: impl Into<PathBuf>, size: u64) -> Self {
        let path = path.into();
        Self {
            message: format!("Implausible size {size} for {}", path.display()),
            path,
            kind: WarningKind::SizeOverflow,
        }
    }

    /// Create a warning for a subdirectory degraded to a placeholder.
    pub fn subtree_failed(path: impl Into<PathBuf>, error: &ProbeError) -> Self {
        let path = path.into();
        Self {
            message: format!("Could not walk directory: {error}"),
            path,
            kind: WarningKind::SubtreeFailed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_error_io() {
        let err = ScanError::io(
            "/test/path",
            io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        );
        assert!(matches!(err, ScanError::PermissionDenied { .. }));
    }

    #[test]
    fn test_probe_error_classification() {
        let err = ProbeError::io("/gone", io::Error::new(io::ErrorKind::NotFound, "gone"));
        assert_eq!(err.kind, ProbeErrorKind::NotFound);

        let root: ScanError = err.into();
        assert!(matches!(root, ScanError::NotFound { .. }));
    }

    #[test]
    fn test_scan_warning_creation() {
        let warning = ScanWarning::size_overflow("/test/big", u64::MAX);
        assert_eq!(warning.kind, WarningKind::SizeOverflow);
        assert!(warning.message.contains("Implausible"));
    }
}
