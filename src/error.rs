//! # Pipeline Errors
//!
//! Crate-wide error type for pipeline construction and execution. Queue timeouts
//! and per-record write rejections are deliberately absent: both are normal
//! control flow inside the worker loops and never surface as errors.

use crate::config::ConfigurationError;
use crate::store::StoreError;

/// Errors returned by pipeline construction, `run()` and `join()`
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// The run configuration was rejected before any worker started
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    /// The remote document store failed in a way the pipeline cannot recover from
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// The caller-supplied transform returned an error
    #[error("Transform failed in worker {worker_id}: {source}")]
    Transform {
        worker_id: usize,
        #[source]
        source: anyhow::Error,
    },

    /// The transform returned a batch that does not line up with its input
    #[error("Transform contract violated: {reason}")]
    TransformContract { reason: String },

    /// Records were abandoned after exhausting their write attempts
    #[error("{} record(s) abandoned after {max_retries} failed write attempts", .ids.len())]
    RetriesExhausted { ids: Vec<String>, max_retries: u32 },

    /// A worker thread could not be spawned or panicked
    #[error("Worker {worker} failed: {message}")]
    Worker { worker: String, message: String },
}

pub type Result<T> = std::result::Result<T, PipelineError>;
