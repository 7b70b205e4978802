//! Storage configuration.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default retention window: one hour.
pub const DEFAULT_TTL_SECS: u64 = 3600;

/// Configuration for the blob store and its retention sweeper.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Flat directory holding every stored blob.
    pub upload_dir: PathBuf,
    /// Maximum age of a blob before the sweeper may delete it.
    pub ttl_secs: u64,
    /// Period between sweeper passes.
    pub sweep_interval_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            upload_dir: PathBuf::from("uploads"),
            ttl_secs: DEFAULT_TTL_SECS,
            sweep_interval_secs: DEFAULT_TTL_SECS,
        }
    }
}

impl StoreConfig {
    /// Creates a config rooted at `upload_dir` with default timings.
    pub fn new(upload_dir: impl Into<PathBuf>) -> Self {
        Self {
            upload_dir: upload_dir.into(),
            ..Self::default()
        }
    }

    /// Retention window as a `Duration`.
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    /// Sweep period as a `Duration`. Zero is clamped to one second.
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let config = StoreConfig::default();
        assert_eq!(config.upload_dir, PathBuf::from("uploads"));
        assert_eq!(config.ttl(), Duration::from_secs(3600));
        assert_eq!(config.sweep_interval(), Duration::from_secs(3600));
    }

    #[test]
    fn test_zero_interval_clamped() {
        let config = StoreConfig {
            sweep_interval_secs: 0,
            ..StoreConfig::default()
        };
        assert_eq!(config.sweep_interval(), Duration::from_secs(1));
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: StoreConfig = serde_json::from_str(r#"{"ttl_secs": 60}"#).unwrap();
        assert_eq!(config.ttl_secs, 60);
        assert_eq!(config.sweep_interval_secs, DEFAULT_TTL_SECS);
        assert_eq!(config.upload_dir, PathBuf::from("uploads"));
    }
}
