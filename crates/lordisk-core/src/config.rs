//! Scan configuration types.

use std::path::PathBuf;
use std::time::Duration;

use derive_builder::Builder;
use serde::{Deserialize, Serialize};

use crate::error::ScanError;

/// Configuration for a staggered scan.
#[derive(Debug, Clone, Builder, Serialize, Deserialize)]
#[builder(setter(into), build_fn(validate = "Self::validate"))]
pub struct ScanConfig {
    /// Root path to scan.
    pub root: PathBuf,

    /// Depth of the fast first pass delivered to the caller.
    #[builder(default = "2")]
    #[serde(default = "default_immediate_depth")]
    pub immediate_depth: u32,

    /// Depth the background pass deepens to.
    #[builder(default = "5")]
    #[serde(default = "default_background_depth")]
    pub background_depth: u32,

    /// Hard depth cap applied to both passes (None = no extra cap).
    #[builder(default)]
    #[serde(default)]
    pub max_depth: Option<u32>,

    /// Number of subdirectories recursed concurrently per batch.
    #[builder(default = "10")]
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Number of background directories scanned per batch.
    #[builder(default = "50")]
    #[serde(default = "default_background_batch_size")]
    pub background_batch_size: usize,

    /// Pause between background batches.
    #[builder(default = "Duration::from_millis(10)")]
    #[serde(default = "default_batch_delay")]
    pub batch_delay: Duration,

    /// Follow symbolic links.
    #[builder(default = "false")]
    #[serde(default)]
    pub follow_symlinks: bool,

    /// Extra entry names to skip, on top of the built-in noise list.
    #[builder(default)]
    #[serde(default)]
    pub ignore_names: Vec<String>,

    /// Graft background results into the final result instead of
    /// re-emitting the immediate one.
    #[builder(default = "false")]
    #[serde(default)]
    pub merge_background: bool,

    /// Maximum age of a cached scan before it is rescanned.
    #[builder(default = "Duration::from_secs(60 * 60)")]
    #[serde(default = "default_cache_max_age")]
    pub cache_max_age: Duration,
}

fn default_immediate_depth() -> u32 {
    2
}

fn default_background_depth() -> u32 {
    5
}

fn default_batch_size() -> usize {
    10
}

fn default_background_batch_size() -> usize {
    50
}

fn default_batch_delay() -> Duration {
    Duration::from_millis(10)
}

fn default_cache_max_age() -> Duration {
    Duration::from_secs(60 * 60)
}

impl ScanConfigBuilder {
    fn validate(&self) -> Result<(), String> {
        if let Some(ref root) = self.root {
            if root.as_os_str().is_empty() {
                return Err("Root path cannot be empty".to_string());
            }
        } else {
            return Err("Root path is required".to_string());
        }
        if self.batch_size == Some(0) {
            return Err("Batch size must be at least 1".to_string());
        }
        if self.background_batch_size == Some(0) {
            return Err("Background batch size must be at least 1".to_string());
        }
        Ok(())
    }
}

impl ScanConfig {
    /// Create a new scan config builder.
    pub fn builder() -> ScanConfigBuilder {
        ScanConfigBuilder::default()
    }

    /// Create a simple config for scanning a path.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            immediate_depth: default_immediate_depth(),
            background_depth: default_background_depth(),
            max_depth: None,
            batch_size: default_batch_size(),
            background_batch_size: default_background_batch_size(),
            batch_delay: default_batch_delay(),
            follow_symlinks: false,
            ignore_names: Vec::new(),
            merge_background: false,
            cache_max_age: default_cache_max_age(),
        }
    }

    /// Depth of the immediate pass after applying `max_depth`.
    pub fn effective_immediate_depth(&self) -> u32 {
        self.immediate_depth.min(self.effective_background_depth())
    }

    /// Depth of the background pass after applying `max_depth`.
    pub fn effective_background_depth(&self) -> u32 {
        match self.max_depth {
            Some(cap) => self.background_depth.min(cap),
            None => self.background_depth,
        }
    }

    /// Whether a background pass has anything to do.
    pub fn has_background_pass(&self) -> bool {
        self.effective_background_depth() > self.effective_immediate_depth()
    }

    /// Check a config that did not come through the builder.
    pub fn validate(&self) -> Result<(), ScanError> {
        let invalid = |message: &str| -> Result<(), ScanError> {
            Err(ScanError::InvalidConfig {
                message: message.to_string(),
            })
        };
        if self.root.as_os_str().is_empty() {
            return invalid("Root path cannot be empty");
        }
        if self.batch_size == 0 {
            return invalid("Batch size must be at least 1");
        }
        if self.background_batch_size == 0 {
            return invalid("Background batch size must be at least 1");
        }
        Ok(())
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self::new(".")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builder() {
        let config = ScanConfig::builder()
            .root("/home/user")
            .immediate_depth(1u32)
            .background_depth(3u32)
            .follow_symlinks(true)
            .build()
            .unwrap();

        assert_eq!(config.root, PathBuf::from("/home/user"));
        assert_eq!(config.immediate_depth, 1);
        assert_eq!(config.background_depth, 3);
        assert_eq!(config.batch_size, 10);
        assert!(config.follow_symlinks);
    }

    #[test]
    fn test_config_simple() {
        let config = ScanConfig::new("/home/user");
        assert_eq!(config.root, PathBuf::from("/home/user"));
        assert_eq!(config.immediate_depth, 2);
        assert_eq!(config.background_batch_size, 50);
        assert_eq!(config.batch_delay, Duration::from_millis(10));
        assert!(!config.merge_background);
    }

    #[test]
    fn test_builder_rejects_zero_batch() {
        let result = ScanConfig::builder().root("/test").batch_size(0usize).build();
        assert!(result.is_err());

        let result = ScanConfig::builder().build();
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_hand_built_config() {
        assert!(ScanConfig::new("/test").validate().is_ok());

        let mut config = ScanConfig::new("/test");
        config.background_batch_size = 0;
        assert!(matches!(config.validate(), Err(ScanError::InvalidConfig { .. })));

        let config: ScanConfig = serde_json::from_str(r#"{"root": "", "batch_size": 4}"#).unwrap();
        assert!(matches!(config.validate(), Err(ScanError::InvalidConfig { .. })));
    }

    #[test]
    fn test_max_depth_caps_both_passes() {
        let mut config = ScanConfig::new("/test");
        config.immediate_depth = 3;
        config.background_depth = 6;
        config.max_depth = Some(2);

        assert_eq!(config.effective_background_depth(), 2);
        assert_eq!(config.effective_immediate_depth(), 2);
        assert!(!config.has_background_pass());
    }

    #[test]
    fn test_config_deserialize_defaults() {
        let config: ScanConfig = serde_json::from_str(r#"{"root": "/data"}"#).unwrap();
        assert_eq!(config.immediate_depth, 2);
        assert_eq!(config.background_depth, 5);
        assert_eq!(config.cache_max_age, Duration::from_secs(3600));
    }
}
