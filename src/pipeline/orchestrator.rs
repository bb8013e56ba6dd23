//! # Pipeline Orchestrator
//!
//! Plans a run (count, sizing, queue capacity), starts the stages in order and
//! joins them. The puller starts first; updaters start once the intake queue
//! signals its first record, pushers once the outtake queue does. Joining goes
//! pushers, then updaters, then the puller, since later stages drain what
//! earlier ones already produced.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info, info_span, warn};
use uuid::Uuid;

use super::context::{PushAdmission, RunContext};
use super::progress::{LoggingProgressObserver, ProgressObserver, ProgressSnapshot, ProgressTracker};
use super::queue::{QueuePair, RecordQueue};
use super::resources::{queue_capacity, SystemResources};
use super::sizing::{average_record_size, BatchSizer};
use super::transform::Transform;
use super::{puller, pusher, updater};
use crate::config::PipelineConfig;
use crate::constants::{threads, SIZE_SAMPLE_COUNT};
use crate::error::{PipelineError, Result};
use crate::store::DocumentStore;

/// Decisions made before any worker starts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RunPlan {
    /// Records the source reported for the run's filters
    pub total: u64,
    pub pull_batch_size: usize,
    pub update_batch_size: usize,
    /// Explicit push batch size, if configured
    pub push_batch_size: Option<usize>,
    pub queue_capacity: usize,
    pub update_workers: usize,
    pub push_workers: usize,
}

/// Final state of a joined run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub plan: RunPlan,
    pub progress: ProgressSnapshot,
    /// Push batch size actually used, configured or sampled
    pub push_batch_size: Option<usize>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Result of [`Pipeline::run`]
#[derive(Debug)]
pub enum RunOutcome {
    /// All workers were joined before returning
    Completed(RunReport),
    /// Workers are still running; join the handle to wait for them
    Detached(RunHandle),
}

impl RunOutcome {
    /// Wait for the run if needed and return its report
    pub fn wait(self) -> Result<RunReport> {
        match self {
            RunOutcome::Completed(report) => Ok(report),
            RunOutcome::Detached(handle) => handle.join(),
        }
    }
}

/// A configured pull-update-push run over one store and one transform
pub struct Pipeline {
    store: Arc<dyn DocumentStore>,
    transform: Arc<dyn Transform>,
    config: PipelineConfig,
    plan: RunPlan,
    sizer: BatchSizer,
    observer: Option<Arc<dyn ProgressObserver>>,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("plan", &self.plan)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Pipeline {
    /// Plan a run using detected system memory
    pub fn new(
        store: Arc<dyn DocumentStore>,
        transform: Arc<dyn Transform>,
        config: PipelineConfig,
    ) -> Result<Self> {
        let resources = SystemResources::detect();
        Self::with_resources(store, transform, config, resources)
    }

    /// Plan a run against explicit memory limits
    ///
    /// Validates the configuration, counts the source and samples it for sizing.
    /// Nothing is spawned here, so every configuration error surfaces before a
    /// thread starts.
    pub fn with_resources(
        store: Arc<dyn DocumentStore>,
        transform: Arc<dyn Transform>,
        config: PipelineConfig,
        resources: SystemResources,
    ) -> Result<Self> {
        config.validate()?;

        let total = store.count(&config.filters)?;
        config.validate_for_total(total)?;

        let sizer = BatchSizer::from_config(&config.sizing);
        let update_workers = if transform.concurrent_safe() {
            config.update_workers
        } else {
            if config.update_workers > 1 {
                warn!(
                    requested = config.update_workers,
                    "PIPELINE: Transform is not concurrent-safe, running a single updater"
                );
            }
            1
        };

        let plan = if total == 0 {
            RunPlan {
                total,
                pull_batch_size: 0,
                update_batch_size: 0,
                push_batch_size: config.push_batch_size,
                queue_capacity: 0,
                update_workers,
                push_workers: config.push_workers,
            }
        } else {
            let sample = store.sample(SIZE_SAMPLE_COUNT, &config.filters, &config.select_fields)?;
            let average = average_record_size(&sample);
            let clamp_to_total = |size: usize| {
                u64::try_from(size).map_or(total, |s| s.min(total)).max(1) as usize
            };

            let pull_batch_size = clamp_to_total(config.pull_batch_size.min(sizer.batch_size(&sample)));
            let update_batch_size = if config.update_all_at_once {
                clamp_to_total(usize::MAX)
            } else {
                clamp_to_total(config.update_batch_size)
            };
            let queue_capacity = if config.update_all_at_once {
                clamp_to_total(usize::MAX)
            } else {
                queue_capacity(
                    config.buffer_size,
                    resources.record_budget(config.ram_ratio, average),
                    total,
                )
            };

            RunPlan {
                total,
                pull_batch_size,
                update_batch_size,
                push_batch_size: config.push_batch_size,
                queue_capacity,
                update_workers,
                push_workers: config.push_workers,
            }
        };

        info!(
            total = plan.total,
            pull_batch_size = plan.pull_batch_size,
            update_batch_size = plan.update_batch_size,
            queue_capacity = plan.queue_capacity,
            update_workers = plan.update_workers,
            push_workers = plan.push_workers,
            "PIPELINE: Run planned"
        );

        let observer = config.show_progress.then(|| {
            Arc::new(LoggingProgressObserver::new(config.progress_log_step_percent))
                as Arc<dyn ProgressObserver>
        });

        Ok(Self {
            store,
            transform,
            config,
            plan,
            sizer,
            observer,
        })
    }

    /// Replace the progress observer
    pub fn with_observer(mut self, observer: Arc<dyn ProgressObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn plan(&self) -> &RunPlan {
        &self.plan
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run the pipeline, joining all workers when `background_execution` is set
    pub fn run(self) -> Result<RunOutcome> {
        let join = self.config.background_execution;
        let handle = self.start()?;
        if join {
            handle.join().map(RunOutcome::Completed)
        } else {
            Ok(RunOutcome::Detached(handle))
        }
    }

    /// Start the workers and return without joining them
    pub fn start(self) -> Result<RunHandle> {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let progress = Arc::new(ProgressTracker::new(self.plan.total, self.observer.clone()));

        let transform_lock = (!self.transform.concurrent_safe()).then(|| Mutex::new(()));
        let ctx = Arc::new(RunContext {
            run_id,
            store: self.store,
            transform: self.transform,
            queues: QueuePair::new(self.plan.queue_capacity),
            progress,
            sizer: self.sizer,
            pull_batch_size: self.plan.pull_batch_size,
            update_batch_size: self.plan.update_batch_size,
            update_batch_lock: Mutex::new(()),
            push_admission: Mutex::new(PushAdmission {
                batch_size: self.config.push_batch_size,
            }),
            transform_lock,
            retry_attempts: DashMap::new(),
            abandoned: Mutex::new(Vec::new()),
            config: self.config,
        });

        let mut handle = RunHandle {
            ctx: Arc::clone(&ctx),
            plan: self.plan,
            started_at,
            puller: None,
            updaters: Vec::new(),
            pushers: Vec::new(),
        };

        if self.plan.total == 0 {
            info!(run_id = %run_id, "PIPELINE: Nothing to process");
            return Ok(handle);
        }

        info!(run_id = %run_id, total = self.plan.total, "PIPELINE: Starting puller");
        handle.puller = Some(spawn_worker(&ctx, threads::PULLER.to_string(), puller::run)?);

        let poll = ctx.config.poll_interval();
        let puller_done = |h: &RunHandle| h.puller.as_ref().map_or(true, JoinHandle::is_finished);
        if !wait_for_stage(&ctx, &ctx.queues.intake, poll, || puller_done(&handle)) {
            debug!(run_id = %run_id, "PIPELINE: Intake never filled, skipping later stages");
            return Ok(handle);
        }

        info!(
            run_id = %run_id,
            workers = self.plan.update_workers,
            "PIPELINE: Intake ready, starting updaters"
        );
        for worker_id in 0..self.plan.update_workers {
            let name = format!("{}-{}", threads::UPDATER_PREFIX, worker_id);
            match spawn_worker(&ctx, name, move |ctx| updater::run(ctx, worker_id)) {
                Ok(worker) => handle.updaters.push(worker),
                Err(e) => return Err(abort_start(handle, e)),
            }
        }

        let updaters_done = |h: &RunHandle| h.updaters.iter().all(JoinHandle::is_finished);
        if !wait_for_stage(&ctx, &ctx.queues.outtake, poll, || updaters_done(&handle)) {
            debug!(run_id = %run_id, "PIPELINE: Outtake never filled, skipping pushers");
            return Ok(handle);
        }

        info!(
            run_id = %run_id,
            workers = self.plan.push_workers,
            "PIPELINE: Outtake ready, starting pushers"
        );
        for worker_id in 0..self.plan.push_workers {
            let name = format!("{}-{}", threads::PUSHER_PREFIX, worker_id);
            match spawn_worker(&ctx, name, move |ctx| pusher::run(ctx, worker_id)) {
                Ok(worker) => handle.pushers.push(worker),
                Err(e) => return Err(abort_start(handle, e)),
            }
        }

        Ok(handle)
    }
}

/// Wait for a queue's first record, giving up if upstream finished without one
fn wait_for_stage(
    ctx: &RunContext,
    queue: &RecordQueue,
    poll: Duration,
    upstream_finished: impl Fn() -> bool,
) -> bool {
    loop {
        if queue.wait_ready(poll) {
            return true;
        }
        if ctx.should_stop() {
            return false;
        }
        if upstream_finished() {
            return queue.is_ready();
        }
    }
}

type WorkerHandle = JoinHandle<Result<()>>;

fn spawn_worker<F>(ctx: &Arc<RunContext>, name: String, body: F) -> Result<WorkerHandle>
where
    F: FnOnce(&RunContext) -> Result<()> + Send + 'static,
{
    let ctx = Arc::clone(ctx);
    let thread_name = name.clone();
    thread::Builder::new()
        .name(name.clone())
        .spawn(move || {
            let _halt_on_panic = HaltOnPanic(&ctx.progress);
            let span = info_span!("worker", run_id = %ctx.run_id, worker = %thread_name);
            let _entered = span.enter();

            let result = body(&ctx);
            if let Err(e) = &result {
                error!(error = %e, "PIPELINE: Worker failed, halting run");
                ctx.progress.halt();
            }
            result
        })
        .map_err(|e| PipelineError::Worker {
            worker: name,
            message: e.to_string(),
        })
}

/// Halts the run if the owning worker thread unwinds
struct HaltOnPanic<'a>(&'a ProgressTracker);

impl Drop for HaltOnPanic<'_> {
    fn drop(&mut self) {
        if thread::panicking() {
            self.0.halt();
        }
    }
}

fn abort_start(handle: RunHandle, err: PipelineError) -> PipelineError {
    handle.ctx.progress.halt();
    if let Err(join_err) = handle.join() {
        debug!(error = %join_err, "PIPELINE: Worker error while aborting start");
    }
    err
}

/// Running workers of one pipeline run
pub struct RunHandle {
    ctx: Arc<RunContext>,
    plan: RunPlan,
    started_at: DateTime<Utc>,
    puller: Option<WorkerHandle>,
    updaters: Vec<WorkerHandle>,
    pushers: Vec<WorkerHandle>,
}

impl std::fmt::Debug for RunHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunHandle")
            .field("run_id", &self.ctx.run_id)
            .field("plan", &self.plan)
            .field("progress", &self.progress())
            .finish_non_exhaustive()
    }
}

impl RunHandle {
    pub fn run_id(&self) -> Uuid {
        self.ctx.run_id
    }

    pub fn plan(&self) -> &RunPlan {
        &self.plan
    }

    /// Live pulled/updated/pushed counters
    pub fn progress(&self) -> ProgressSnapshot {
        self.ctx.progress.snapshot()
    }

    pub fn is_finished(&self) -> bool {
        self.puller.as_ref().map_or(true, JoinHandle::is_finished)
            && self.updaters.iter().all(JoinHandle::is_finished)
            && self.pushers.iter().all(JoinHandle::is_finished)
    }

    /// Join pushers, then updaters, then the puller
    ///
    /// Returns the first worker error in that order; a transform failure
    /// therefore wins over the halts it caused downstream.
    pub fn join(self) -> Result<RunReport> {
        let RunHandle {
            ctx,
            plan,
            started_at,
            puller,
            updaters,
            pushers,
        } = self;

        let mut first_error: Option<PipelineError> = None;
        let workers = pushers.into_iter().chain(updaters).chain(puller);
        for worker in workers {
            let name = worker.thread().name().unwrap_or("worker").to_string();
            let outcome = match worker.join() {
                Ok(result) => result,
                Err(_) => Err(PipelineError::Worker {
                    worker: name,
                    message: "worker thread panicked".to_string(),
                }),
            };
            if let Err(e) = outcome {
                first_error.get_or_insert(e);
            }
        }

        if let Some(err) = first_error {
            return Err(err);
        }

        let abandoned = std::mem::take(&mut *ctx.abandoned.lock());
        if let Some(max_retries) = ctx.config.max_push_retries {
            if !abandoned.is_empty() {
                return Err(PipelineError::RetriesExhausted {
                    ids: abandoned,
                    max_retries,
                });
            }
        }

        let report = RunReport {
            run_id: ctx.run_id,
            plan,
            progress: ctx.progress.snapshot(),
            push_batch_size: ctx.push_admission.lock().batch_size,
            started_at,
            finished_at: Utc::now(),
        };

        info!(
            run_id = %report.run_id,
            pulled = report.progress.pulled,
            updated = report.progress.updated,
            pushed = report.progress.pushed,
            requeued = report.progress.requeued,
            elapsed_ms = (report.finished_at - report.started_at).num_milliseconds(),
            "PIPELINE: Run complete"
        );
        Ok(report)
    }
}
