//! # Pull-Update-Push Pipeline
//!
//! A bounded, multi-threaded pipeline that pages records out of a
//! [`DocumentStore`](crate::store::DocumentStore), runs a caller-supplied
//! [`Transform`] over batches of them and bulk-writes the changed fields back.
//!
//! ## Stages
//!
//! ```text
//! puller (1) --> intake queue --> updaters (N) --> outtake queue --> pushers (M)
//!                                                       ^                |
//!                                                       +--- requeue ----+
//! ```
//!
//! - **Puller**: pages through the source with a cursor; blocks when intake is full
//! - **Updaters**: take batches from intake, transform them, drop unchanged fields
//! - **Pushers**: take batches from outtake, bulk-write them, requeue rejected records
//!
//! Both queues are bounded, so memory stays proportional to the queue capacity
//! rather than to the size of the source.

mod context;
pub mod orchestrator;
pub mod progress;
mod puller;
mod pusher;
pub mod queue;
pub mod resources;
pub mod sizing;
pub mod transform;
mod updater;

pub use orchestrator::{Pipeline, RunHandle, RunOutcome, RunPlan, RunReport};
pub use progress::{LoggingProgressObserver, ProgressObserver, ProgressSnapshot, ProgressTracker, Stage};
pub use queue::{QueuePair, RecordQueue};
pub use resources::{queue_capacity, SystemResources};
pub use sizing::{average_record_size, payload_size, record_size, BatchSizer};
pub use transform::{check_contract, exclusive, suppress_unchanged_fields, Exclusive, Transform};
