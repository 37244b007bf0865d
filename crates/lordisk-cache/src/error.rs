//! Cache error types.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by the scan cache.
///
/// Readers treat any of these as a cache miss; writers propagate them.
#[derive(Debug, Error)]
pub enum CacheError {
    /// Underlying SQLite failure.
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// A stored row could not be decoded.
    #[error("Corrupt cache record {path}: {message}")]
    Corrupt { path: String, message: String },

    /// The connection lock was poisoned by a panicking writer.
    #[error("Cache connection lock poisoned")]
    Poisoned,

    /// The cache location could not be prepared.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl CacheError {
    pub(crate) fn corrupt(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Corrupt {
            path: path.into(),
            message: message.into(),
        }
    }
}
