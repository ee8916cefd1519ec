//! Pipeline configuration.
//!
//! Stored as TOML. Every key is optional; missing keys take the defaults
//! below.
//!
//! ```toml
//! chunk_size = 1000
//! lock_ttl_ms = 30000
//! lock_wait_ms = 5000
//! commit_sample_size = 5
//! mapping_min_confidence = 0.6
//! retention_days = 30
//!
//! [retry]
//! max_attempts = 4
//! base_delay_ms = 50
//! max_delay_ms = 2000
//! ```

use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use roster_commit::CommitSettings;
use roster_store::RetryPolicy;

use crate::error::{PipelineError, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Rows per bulk write during commit.
    pub chunk_size: usize,
    /// Lifetime of a tenant commit lease without renewal.
    pub lock_ttl_ms: u64,
    /// How long one attempt waits for a busy tenant lease.
    pub lock_wait_ms: u64,
    /// Outcomes kept in the commit log preview.
    pub commit_sample_size: usize,
    /// Minimum header score for alias suggestions and mapping reuse.
    pub mapping_min_confidence: f64,
    /// Staging retention window.
    pub retention_days: u32,
    pub retry: RetryPolicy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            lock_ttl_ms: 30_000,
            lock_wait_ms: 5_000,
            commit_sample_size: 5,
            mapping_min_confidence: 0.6,
            retention_days: 30,
            retry: RetryPolicy::default(),
        }
    }
}

impl PipelineConfig {
    /// Reads and checks a config file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| PipelineError::ConfigIo {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self =
            toml::from_str(&content).map_err(|source| PipelineError::ConfigParse {
                path: path.to_path_buf(),
                source,
            })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |field, reason: &str| {
            Err(PipelineError::InvalidConfig {
                field,
                reason: reason.to_string(),
            })
        };
        if self.chunk_size == 0 {
            return invalid("chunk_size", "must be at least 1");
        }
        if self.lock_ttl_ms == 0 {
            return invalid("lock_ttl_ms", "must be at least 1");
        }
        if !(0.0..=1.0).contains(&self.mapping_min_confidence) {
            return invalid("mapping_min_confidence", "must be between 0 and 1");
        }
        if self.retry.max_attempts == 0 {
            return invalid("retry.max_attempts", "must be at least 1");
        }
        Ok(())
    }

    /// Pretty TOML with every key spelled out.
    pub fn to_toml(&self) -> std::result::Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    pub fn lock_ttl(&self) -> Duration {
        Duration::from_millis(self.lock_ttl_ms)
    }

    pub fn commit_settings(&self) -> CommitSettings {
        CommitSettings {
            chunk_size: self.chunk_size,
            sample_size: self.commit_sample_size,
            lock_wait: Duration::from_millis(self.lock_wait_ms),
            retry: self.retry,
        }
    }

    /// Batches created before this instant are due for purging.
    pub fn retention_cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - chrono::Duration::days(i64::from(self.retention_days))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config: PipelineConfig = toml::from_str(
            r#"
            chunk_size = 250
            [retry]
            max_attempts = 2
            "#,
        )
        .unwrap();
        assert_eq!(config.chunk_size, 250);
        assert_eq!(config.retry.max_attempts, 2);
        assert_eq!(config.retry.base_delay_ms, 50);
        assert_eq!(config.lock_ttl_ms, 30_000);
        assert_eq!(config.commit_settings().lock_wait, Duration::from_secs(5));
    }

    #[test]
    fn test_rejects_zero_chunk_size() {
        let config = PipelineConfig {
            chunk_size: 0,
            ..PipelineConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(PipelineError::InvalidConfig {
                field: "chunk_size",
                ..
            })
        ));
    }

    #[test]
    fn test_printed_defaults_parse_back() {
        let text = PipelineConfig::default().to_toml().unwrap();
        let parsed: PipelineConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed, PipelineConfig::default());
    }

    #[test]
    fn test_retention_cutoff_counts_days() {
        let now = Utc::now();
        let cutoff = PipelineConfig::default().retention_cutoff(now);
        assert_eq!((now - cutoff).num_days(), 30);
    }
}
