//! Shared state of one run, handed to every worker thread behind an `Arc`.

use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;
use uuid::Uuid;

use super::progress::ProgressTracker;
use super::queue::QueuePair;
use super::sizing::BatchSizer;
use super::transform::Transform;
use crate::config::PipelineConfig;
use crate::models::RecordId;
use crate::store::DocumentStore;

/// Push-stage admission state, guarded by the push-batch lock
#[derive(Debug, Default)]
pub(crate) struct PushAdmission {
    /// Decided from the first live outtake sample when not configured
    pub batch_size: Option<usize>,
}

pub(crate) struct RunContext {
    pub run_id: Uuid,
    pub config: PipelineConfig,
    pub store: Arc<dyn DocumentStore>,
    pub transform: Arc<dyn Transform>,
    pub queues: QueuePair,
    pub progress: Arc<ProgressTracker>,
    pub sizer: BatchSizer,
    pub pull_batch_size: usize,
    pub update_batch_size: usize,
    /// Makes "take the next update batch" atomic across updaters
    pub update_batch_lock: Mutex<()>,
    /// Makes "take the next push batch" atomic across pushers
    pub push_admission: Mutex<PushAdmission>,
    /// Serializes transform calls when the transform is not concurrent-safe
    pub transform_lock: Option<Mutex<()>>,
    /// Failed write attempts per record, tracked only with a retry limit
    pub retry_attempts: DashMap<RecordId, u32>,
    pub abandoned: Mutex<Vec<RecordId>>,
}

impl RunContext {
    pub fn should_stop(&self) -> bool {
        self.progress.is_halted()
    }
}
