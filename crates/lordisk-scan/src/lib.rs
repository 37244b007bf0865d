//! Staggered directory scanning engine for lordisk.
//!
//! # Overview
//!
//! `lordisk-scan` walks directory trees and aggregates sizes bottom-up:
//!
//! - **Probe seam** isolating every listing and stat call ([`Probe`], [`FsProbe`])
//! - **Depth-bounded recursion** in rayon-backed batches ([`RecursiveScanner`])
//! - **Staggered delivery**: a shallow immediate result first, then a
//!   throttled background pass streamed as events ([`StaggeredCoordinator`])
//! - **Progress** via an explicit shared tracker ([`ProgressTracker`])
//!
//! # Example
//!
//! ```rust,no_run
//! use lordisk_scan::{RecursiveScanner, ScanContext};
//!
//! let scanner = RecursiveScanner::new();
//! let result = scanner.scan("/path/to/scan".as_ref(), 3, &ScanContext::default()).unwrap();
//!
//! println!("Total size: {} bytes", result.total_size);
//! println!("Total files: {}", result.total_files());
//! ```
//!
//! # Staggered scans
//!
//! ```rust,no_run
//! use lordisk_scan::{ScanConfig, ScanEvent, StaggeredCoordinator};
//!
//! # async fn run() -> Result<(), lordisk_scan::ScanError> {
//! let coordinator = StaggeredCoordinator::new();
//! let mut scan = coordinator.scan(ScanConfig::new("/path/to/scan")).await?;
//! println!("first look: {} bytes", scan.result().total_size);
//!
//! while let Some(event) = scan.next_event().await {
//!     if let ScanEvent::DirectoryScanned { path, entry, .. } = &event {
//!         println!("{}: {} bytes", path.display(), entry.size);
//!     }
//!     if event.is_terminal() {
//!         break;
//!     }
//! }
//! # Ok(())
//! # }
//! ```

mod coordinator;
mod event;
mod probe;
mod progress;
mod scanner;

pub use coordinator::{StaggeredCoordinator, StaggeredScan};
pub use event::{ResultSource, ScanEvent};
pub use probe::{FsProbe, Probe, Probed};
pub use progress::{LevelProgress, ProgressTracker, ScanContext, ScanPhase, ScanProgress, ScanState};
pub use scanner::{DEFAULT_BATCH_SIZE, RecursiveScanner};

// Re-export core types for convenience
pub use lordisk_core::{
    DirectoryEntry, Entry, FileEntry, ProbeError, ScanConfig, ScanError, ScanResult, ScanWarning,
    WarningKind,
};
