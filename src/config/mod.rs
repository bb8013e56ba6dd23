//! # Pipeline Configuration
//!
//! Every knob of a pull-update-push run lives in [`PipelineConfig`]. Values come
//! from code (`PipelineConfig::default()` plus struct update syntax), or from an
//! optional YAML/TOML file overlaid with `PULLPUSH__*` environment variables via
//! [`ConfigManager`].
//!
//! ## Usage
//!
//! ```rust,no_run
//! use pullpush::config::ConfigManager;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConfigManager::load_from_file("config/pullpush.yaml")?;
//! let pull_batch_size = manager.config().pull_batch_size;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod loader;

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::constants::{defaults, DEFAULT_ID_FIELD};
use crate::models::Filter;

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigManager;

/// Payload sizing targets used by the batch sizer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SizingConfig {
    /// Target payload per transfer, in megabytes
    pub target_chunk_mb: f64,
    /// Hard maximum number of records per batch
    pub max_chunk_size: usize,
}

impl Default for SizingConfig {
    fn default() -> Self {
        Self {
            target_chunk_mb: defaults::TARGET_CHUNK_MB,
            max_chunk_size: defaults::MAX_CHUNK_SIZE,
        }
    }
}

/// Complete configuration for one pipeline run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Upper bound on records requested per page
    pub pull_batch_size: usize,
    /// Records handed to the transform per call
    pub update_batch_size: usize,
    /// Records written per bulk write; sized from live data when absent
    pub push_batch_size: Option<usize>,
    pub update_workers: usize,
    pub push_workers: usize,
    /// Records held across both queues; 0 derives the capacity from memory
    pub buffer_size: usize,
    /// Fraction of available memory the queues may occupy
    pub ram_ratio: f64,
    /// Wait bound for blocked queue puts and all-at-once drains
    pub timeout_seconds: u64,
    /// Per-item wait while a pusher drains the outtake queue
    pub push_item_timeout_ms: u64,
    /// Per-item wait for updaters and readiness checks
    pub poll_interval_ms: u64,
    /// Ask the store to ingest written batches asynchronously
    pub ingest_in_background: bool,
    /// Join all workers before `run()` returns
    pub background_execution: bool,
    /// Hand the whole run to the transform as a single batch
    pub update_all_at_once: bool,
    pub id_field: String,
    pub filters: Vec<Filter>,
    pub select_fields: Vec<String>,
    pub sizing: SizingConfig,
    pub show_progress: bool,
    pub progress_log_step_percent: u8,
    /// Abandon a record after this many rejected writes; unbounded when absent
    pub max_push_retries: Option<u32>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            pull_batch_size: defaults::PULL_BATCH_SIZE,
            update_batch_size: defaults::UPDATE_BATCH_SIZE,
            push_batch_size: None,
            update_workers: defaults::UPDATE_WORKERS,
            push_workers: defaults::PUSH_WORKERS,
            buffer_size: 0,
            ram_ratio: defaults::RAM_RATIO,
            timeout_seconds: defaults::TIMEOUT_SECONDS,
            push_item_timeout_ms: defaults::PUSH_ITEM_TIMEOUT_MS,
            poll_interval_ms: defaults::POLL_INTERVAL_MS,
            ingest_in_background: false,
            background_execution: true,
            update_all_at_once: false,
            id_field: DEFAULT_ID_FIELD.to_string(),
            filters: Vec::new(),
            select_fields: Vec::new(),
            sizing: SizingConfig::default(),
            show_progress: true,
            progress_log_step_percent: defaults::PROGRESS_LOG_STEP_PERCENT,
            max_push_retries: None,
        }
    }
}

impl PipelineConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    pub fn push_item_timeout(&self) -> Duration {
        Duration::from_millis(self.push_item_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Validate settings that do not depend on the store
    pub fn validate(&self) -> ConfigResult<()> {
        let positive = [
            ("pull_batch_size", self.pull_batch_size),
            ("update_batch_size", self.update_batch_size),
            ("update_workers", self.update_workers),
            ("push_workers", self.push_workers),
            ("sizing.max_chunk_size", self.sizing.max_chunk_size),
        ];
        for (field, value) in positive {
            if value == 0 {
                return Err(ConfigurationError::invalid_value(
                    field,
                    "0",
                    "must be greater than zero",
                ));
            }
        }

        if self.push_batch_size == Some(0) {
            return Err(ConfigurationError::invalid_value(
                "push_batch_size",
                "0",
                "must be greater than zero when set",
            ));
        }

        if !(self.ram_ratio > 0.0 && self.ram_ratio <= 1.0) {
            return Err(ConfigurationError::invalid_value(
                "ram_ratio",
                self.ram_ratio.to_string(),
                "must be within (0, 1]",
            ));
        }

        if !(self.sizing.target_chunk_mb > 0.0 && self.sizing.target_chunk_mb.is_finite()) {
            return Err(ConfigurationError::invalid_value(
                "sizing.target_chunk_mb",
                self.sizing.target_chunk_mb.to_string(),
                "must be a positive number",
            ));
        }

        if self.timeout_seconds == 0 || self.push_item_timeout_ms == 0 || self.poll_interval_ms == 0
        {
            return Err(ConfigurationError::Conflict(
                "timeouts must be non-zero so idle workers can observe completion".to_string(),
            ));
        }

        if self.id_field.is_empty() {
            return Err(ConfigurationError::invalid_value(
                "id_field",
                "\"\"",
                "must name the identifier field",
            ));
        }

        if self.max_push_retries == Some(0) {
            return Err(ConfigurationError::invalid_value(
                "max_push_retries",
                "0",
                "must allow at least one retry when set",
            ));
        }

        Ok(())
    }

    /// Validate settings against the expected record count of a run
    pub fn validate_for_total(&self, total: u64) -> ConfigResult<()> {
        if self.update_all_at_once && self.buffer_size > 0 && (self.buffer_size as u64) < total {
            return Err(ConfigurationError::Conflict(format!(
                "update_all_at_once needs room for all {total} records but buffer_size is {}",
                self.buffer_size
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = PipelineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.id_field, "_id");
        assert!(config.background_execution);
        assert!(config.push_batch_size.is_none());
    }

    #[test]
    fn test_rejects_ram_ratio_outside_unit_interval() {
        for ratio in [0.0, -0.1, 1.5, f64::NAN] {
            let config = PipelineConfig {
                ram_ratio: ratio,
                ..PipelineConfig::default()
            };
            assert!(
                matches!(
                    config.validate(),
                    Err(ConfigurationError::InvalidValue { ref field, .. }) if field == "ram_ratio"
                ),
                "ratio {ratio} should be rejected"
            );
        }
    }

    #[test]
    fn test_rejects_zero_sizes() {
        let config = PipelineConfig {
            update_workers: 0,
            ..PipelineConfig::default()
        };
        assert!(config.validate().is_err());

        let config = PipelineConfig {
            push_batch_size: Some(0),
            ..PipelineConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_all_at_once_conflicts_with_small_buffer() {
        let config = PipelineConfig {
            update_all_at_once: true,
            buffer_size: 10,
            ..PipelineConfig::default()
        };
        assert!(config.validate().is_ok());
        assert!(matches!(
            config.validate_for_total(25),
            Err(ConfigurationError::Conflict(_))
        ));
        assert!(config.validate_for_total(10).is_ok());
    }

    #[test]
    fn test_durations() {
        let config = PipelineConfig {
            timeout_seconds: 2,
            push_item_timeout_ms: 250,
            ..PipelineConfig::default()
        };
        assert_eq!(config.timeout(), Duration::from_secs(2));
        assert_eq!(config.push_item_timeout(), Duration::from_millis(250));
    }
}
