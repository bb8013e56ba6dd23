//! # Pipeline Constants
//!
//! Default values and fixed limits shared by the configuration layer and the
//! pipeline stages.

/// Field holding each record's unique identifier
pub const DEFAULT_ID_FIELD: &str = "_id";

/// Number of records sampled to estimate record size
pub const SIZE_SAMPLE_COUNT: usize = 10;

/// Upper bound assumed for a single record when deriving queue capacity (1 MiB)
pub const MAX_RECORD_SIZE_BYTES: u64 = 1 << 20;

/// Bytes per megabyte used for payload sizing
pub const BYTES_PER_MB: f64 = (1 << 20) as f64;

/// Batch size and worker defaults
pub mod defaults {
    pub const PULL_BATCH_SIZE: usize = 128;
    pub const UPDATE_BATCH_SIZE: usize = 128;
    pub const UPDATE_WORKERS: usize = 1;
    pub const PUSH_WORKERS: usize = 1;
    pub const RAM_RATIO: f64 = 0.25;
    pub const TIMEOUT_SECONDS: u64 = 30;
    pub const PUSH_ITEM_TIMEOUT_MS: u64 = 1000;
    pub const POLL_INTERVAL_MS: u64 = 100;
    pub const TARGET_CHUNK_MB: f64 = 100.0;
    pub const MAX_CHUNK_SIZE: usize = 2000;
    pub const PROGRESS_LOG_STEP_PERCENT: u8 = 10;
}

/// Defaults applied by operation runs
pub mod operation_defaults {
    pub const UPDATE_WORKERS: usize = 2;
    pub const PUSH_WORKERS: usize = 2;
    pub const UPDATE_BATCH_SIZE: usize = 32;
    pub const CHUNK_SIZE: usize = 100;
}

/// Thread names for the pipeline workers
pub mod threads {
    pub const PULLER: &str = "pullpush-pull";
    pub const UPDATER_PREFIX: &str = "pullpush-update";
    pub const PUSHER_PREFIX: &str = "pullpush-push";
}
