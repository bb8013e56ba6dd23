//! # Pusher Pool
//!
//! Each pusher takes a batch from the outtake queue and writes it back with one
//! bulk write. Records the store rejects are matched by id, counted as extra
//! work and requeued; everything else counts as pushed. Loops end once written,
//! requeued and abandoned attempts together reach the total, which grows with
//! every requeued failure.

use std::collections::HashSet;
use tracing::{debug, info, warn};

use super::context::{PushAdmission, RunContext};
use super::sizing::payload_size;
use crate::constants::SIZE_SAMPLE_COUNT;
use crate::error::Result;
use crate::models::{record_id, Batch, Record, RecordId};

pub(crate) fn run(ctx: &RunContext, worker_id: usize) -> Result<()> {
    let mut batches = 0usize;

    loop {
        if ctx.should_stop() || ctx.progress.snapshot().is_push_complete() {
            break;
        }

        let batch = {
            let mut admission = ctx.push_admission.lock();
            drain_batch(ctx, &mut admission)
        };
        if batch.is_empty() {
            continue;
        }

        write_batch(ctx, worker_id, batch);
        batches += 1;
    }

    debug!(worker_id = worker_id, batches = batches, "PUSHER: Finished");
    Ok(())
}

/// Take the next push batch, sizing it from live data on first use
fn drain_batch(ctx: &RunContext, admission: &mut PushAdmission) -> Batch {
    let queue = &ctx.queues.outtake;
    let timeout = ctx.config.push_item_timeout();
    let mut batch = Vec::new();

    let batch_size = match admission.batch_size {
        Some(size) => size,
        None => {
            while batch.len() < SIZE_SAMPLE_COUNT {
                match queue.get(timeout) {
                    Some(record) => batch.push(record),
                    None => break,
                }
            }
            if batch.is_empty() {
                return batch;
            }

            let size = ctx.sizer.batch_size(&batch);
            info!(
                push_batch_size = size,
                sample = batch.len(),
                "PUSHER: Sized push batches from live sample"
            );
            admission.batch_size = Some(size);
            size
        }
    };

    while batch.len() < batch_size {
        match queue.get(timeout) {
            Some(record) => batch.push(record),
            None => break,
        }
    }
    batch
}

fn write_batch(ctx: &RunContext, worker_id: usize, batch: Batch) {
    let batch_len = batch.len();
    debug!(
        worker_id = worker_id,
        batch_len = batch_len,
        payload_bytes = payload_size(&batch),
        "PUSHER: Writing batch"
    );

    let failed_ids: HashSet<RecordId> =
        match ctx.store.bulk_write(&batch, ctx.config.ingest_in_background) {
            Ok(response) => response.failed.into_iter().map(|f| f.id).collect(),
            Err(e) => {
                warn!(
                    worker_id = worker_id,
                    error = %e,
                    "PUSHER: Bulk write failed, treating the whole batch as rejected"
                );
                batch
                    .iter()
                    .filter_map(|record| record_id(record, &ctx.config.id_field))
                    .collect()
            }
        };

    let (failed, _written): (Vec<Record>, Vec<Record>) = batch.into_iter().partition(|record| {
        record_id(record, &ctx.config.id_field).is_some_and(|id| failed_ids.contains(&id))
    });

    let (retry, abandoned) = apply_retry_policy(ctx, failed);
    let written = batch_len - retry.len() - abandoned.len();

    // Count the retries before they become visible to other pushers
    let snapshot = ctx.progress.record_push_outcome(
        written as u64,
        retry.len() as u64,
        abandoned.len() as u64,
    );

    if !retry.is_empty() || !abandoned.is_empty() {
        warn!(
            worker_id = worker_id,
            requeued = retry.len(),
            abandoned = abandoned.len(),
            total = snapshot.total_expected,
            "PUSHER: Store rejected records"
        );
    }

    for record in retry {
        ctx.queues.outtake.requeue(record);
    }
    if !abandoned.is_empty() {
        ctx.abandoned.lock().extend(abandoned);
    }

    debug!(
        worker_id = worker_id,
        written = written,
        pushed = snapshot.pushed,
        total = snapshot.total_expected,
        "PUSHER: Batch written"
    );
}

/// Split rejected records into those to retry and ids to give up on
fn apply_retry_policy(ctx: &RunContext, failed: Vec<Record>) -> (Vec<Record>, Vec<RecordId>) {
    let Some(max_retries) = ctx.config.max_push_retries else {
        return (failed, Vec::new());
    };

    let mut retry = Vec::with_capacity(failed.len());
    let mut abandoned = Vec::new();
    for record in failed {
        let Some(id) = record_id(&record, &ctx.config.id_field) else {
            continue;
        };
        let attempts = {
            let mut entry = ctx.retry_attempts.entry(id.clone()).or_insert(0);
            *entry += 1;
            *entry
        };
        if attempts > max_retries {
            abandoned.push(id);
        } else {
            retry.push(record);
        }
    }
    (retry, abandoned)
}
