//! # Updater Pool
//!
//! Each updater takes a batch from the intake queue, runs the transform on it,
//! strips fields the transform did not change and forwards the result to the
//! outtake queue. Loops end once `updated` reaches the source total.

use tracing::{debug, error, warn};

use super::context::RunContext;
use super::transform::{check_contract, suppress_unchanged_fields};
use crate::error::{PipelineError, Result};
use crate::models::Batch;

pub(crate) fn run(ctx: &RunContext, worker_id: usize) -> Result<()> {
    let mut batches = 0usize;

    loop {
        if ctx.should_stop() || ctx.progress.snapshot().is_update_complete() {
            break;
        }

        let batch = {
            let _admission = ctx.update_batch_lock.lock();
            if ctx.config.update_all_at_once {
                drain_all(ctx)
            } else {
                drain_available(ctx)
            }
        };
        if ctx.should_stop() {
            break;
        }
        if batch.is_empty() {
            continue;
        }

        let batch_len = batch.len();
        let originals = batch.clone();
        let output = invoke_transform(ctx, worker_id, batch)?;

        if let Err(reason) = check_contract(&originals, &output, &ctx.config.id_field) {
            error!(worker_id = worker_id, reason = %reason, "UPDATER: Transform broke the batch contract");
            return Err(PipelineError::TransformContract { reason });
        }

        let output = suppress_unchanged_fields(output, &originals, &ctx.config.id_field);
        drop(originals);

        // Counted before any record reaches the outtake queue, so pushers never overtake it
        batches += 1;
        let snapshot = ctx.progress.record_updated(batch_len as u64);
        debug!(
            worker_id = worker_id,
            batch_len = batch_len,
            updated = snapshot.updated,
            total = snapshot.source_total,
            "UPDATER: Batch transformed"
        );

        for record in output {
            let queued =
                ctx.queues
                    .outtake
                    .put_blocking(record, ctx.config.timeout(), || ctx.should_stop());
            if !queued {
                debug!(worker_id = worker_id, "UPDATER: Run halted while outtake queue was full");
                return Ok(());
            }
        }
    }

    debug!(worker_id = worker_id, batches = batches, "UPDATER: Finished");
    Ok(())
}

/// Take up to `update_batch_size` records, accepting a short batch once the queue runs dry
fn drain_available(ctx: &RunContext) -> Batch {
    let queue = &ctx.queues.intake;
    let Some(first) = queue.get(ctx.config.poll_interval()) else {
        return Vec::new();
    };

    let mut batch = Vec::with_capacity(ctx.update_batch_size);
    batch.push(first);
    while batch.len() < ctx.update_batch_size {
        match queue.try_get() {
            Some(record) => batch.push(record),
            None => break,
        }
    }
    batch
}

/// Block until every remaining source record has arrived
///
/// The target is re-read on each idle wait so a source that turns out smaller
/// than its count still releases the batch.
fn drain_all(ctx: &RunContext) -> Batch {
    let queue = &ctx.queues.intake;
    let remaining = |ctx: &RunContext| {
        let snapshot = ctx.progress.snapshot();
        snapshot.source_total.saturating_sub(snapshot.updated) as usize
    };

    let mut target = remaining(ctx);
    let mut batch = Vec::with_capacity(target);
    while batch.len() < target {
        match queue.get(ctx.config.poll_interval()) {
            Some(record) => batch.push(record),
            None => {
                if ctx.should_stop() {
                    break;
                }
                target = remaining(ctx);
            }
        }
    }
    batch
}

fn invoke_transform(ctx: &RunContext, worker_id: usize, batch: Batch) -> Result<Batch> {
    let result = match &ctx.transform_lock {
        Some(lock) => {
            let _exclusive = lock.lock();
            ctx.transform.transform(batch)
        }
        None => ctx.transform.transform(batch),
    };

    result.map_err(|source| {
        warn!(worker_id = worker_id, error = %source, "UPDATER: Transform failed");
        PipelineError::Transform { worker_id, source }
    })
}
