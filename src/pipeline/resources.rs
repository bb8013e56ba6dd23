//! # System Resource Detection
//!
//! Memory detection used to bound queue capacity. Queues may hold at most
//! `available_memory × ram_ratio` worth of records.

use serde::{Deserialize, Serialize};
use sysinfo::System;
use tracing::{debug, info};

use crate::constants::MAX_RECORD_SIZE_BYTES;

/// Memory available to the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemResources {
    pub total_memory_bytes: u64,
    /// Effective available memory after the low-availability correction
    pub available_memory_bytes: u64,
}

impl SystemResources {
    /// Detect memory limits using sysinfo
    pub fn detect() -> Self {
        let mut sys = System::new();
        sys.refresh_memory();

        let total = sys.total_memory();
        let available = sys.available_memory();
        let used = sys.used_memory();

        // Some platforms count cache/buffers as unavailable; past that point
        // assume 70% of total minus what processes actually use.
        let available_percentage = if total > 0 {
            (available as f64 / total as f64) * 100.0
        } else {
            0.0
        };

        let effective_available = if available_percentage > 20.0 {
            available
        } else {
            let conservative_total = (total as f64 * 0.7) as u64;
            let realistic = conservative_total.saturating_sub(used);
            debug!(
                "RESOURCES: available memory ({} MB, {:.1}%) looks too low, using estimate of {} MB",
                available >> 20,
                available_percentage,
                realistic >> 20
            );
            realistic.max(available)
        };

        info!(
            total_mb = total >> 20,
            available_mb = effective_available >> 20,
            "RESOURCES: Detected memory limits"
        );

        Self {
            total_memory_bytes: total,
            available_memory_bytes: effective_available,
        }
    }

    pub fn with_available_memory(bytes: u64) -> Self {
        Self {
            total_memory_bytes: bytes,
            available_memory_bytes: bytes,
        }
    }

    /// Records the queues may hold in total given a memory share and record size
    pub fn record_budget(&self, ram_ratio: f64, average_record_bytes: f64) -> u64 {
        let estimated_max = if average_record_bytes > 0.0 && average_record_bytes.is_finite() {
            average_record_bytes.min(MAX_RECORD_SIZE_BYTES as f64)
        } else {
            MAX_RECORD_SIZE_BYTES as f64
        };
        (self.available_memory_bytes as f64 * ram_ratio / estimated_max) as u64
    }
}

/// Capacity of each of the two queues
///
/// `buffer_size` 0 means "derive from memory only"; otherwise the smaller of the
/// two wins. The total is split evenly between the queues and capped at the
/// expected record count since channel slots are allocated up front.
pub fn queue_capacity(
    buffer_size: usize,
    record_budget: u64,
    expected_records: u64,
) -> usize {
    let total = if buffer_size > 0 {
        (buffer_size as u64).min(record_budget)
    } else {
        record_budget
    };

    let per_queue = (total / 2).min(expected_records.max(1)).max(1);
    usize::try_from(per_queue).unwrap_or(usize::MAX)
}
