//! # Puller
//!
//! The single worker that pages through the source and feeds the intake queue.
//! A full intake queue blocks it, which is the only backpressure the pipeline
//! applies to the source.

use tracing::{debug, error, info};

use super::context::RunContext;
use crate::error::Result;
use crate::store::{Cursor, PageRequest};

pub(crate) fn run(ctx: &RunContext) -> Result<()> {
    let mut cursor: Option<Cursor> = None;
    let mut pages = 0usize;

    loop {
        if ctx.should_stop() {
            debug!("PULLER: Run halted, stopping");
            return Ok(());
        }

        let page = ctx
            .store
            .get_page(PageRequest {
                cursor: cursor.as_ref(),
                page_size: ctx.pull_batch_size,
                filters: &ctx.config.filters,
                fields: &ctx.config.select_fields,
            })
            .map_err(|e| {
                error!(error = %e, pages = pages, "PULLER: Page request failed");
                e
            })?;

        let page_len = page.records.len();
        if page_len == 0 {
            break;
        }
        pages += 1;

        let snapshot = ctx.progress.record_pulled(page_len as u64);
        debug!(
            page = pages,
            page_len = page_len,
            pulled = snapshot.pulled,
            total = snapshot.source_total,
            "PULLER: Fetched page"
        );

        for record in page.records {
            let queued =
                ctx.queues
                    .intake
                    .put_blocking(record, ctx.config.timeout(), || ctx.should_stop());
            if !queued {
                debug!("PULLER: Run halted while intake queue was full");
                return Ok(());
            }
        }

        match page.next_cursor {
            Some(next) => cursor = Some(next),
            None => break,
        }
    }

    let snapshot = ctx.progress.reconcile_source_total();
    info!(
        pages = pages,
        pulled = snapshot.pulled,
        "PULLER: Source exhausted"
    );
    Ok(())
}
