//! Core types for lordisk.
//!
//! This crate provides the data model shared by the scanner and the scan
//! cache: file and directory entries, scan results, the noise-name filter,
//! scan configuration and the error taxonomy.

mod category;
mod config;
mod error;
mod filter;
mod node;
mod tree;

pub use category::FileCategory;
pub use config::{ScanConfig, ScanConfigBuilder};
pub use error::{ProbeError, ProbeErrorKind, ScanError, ScanWarning, WarningKind};
pub use filter::PathFilter;
pub use node::{
    DirectoryEntry, Entry, EntryKind, FileEntry, MAX_PLAUSIBLE_SIZE, children_size, extension_of,
};
pub use tree::{ScanResult, TreeStats, Walk};
