use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use super::backlog::Backlog;
use super::fan_in::Producer;
use crate::extract::{ExtractError, Extractor, UnitSink};
use crate::metrics::PipelineMetrics;
use crate::source::Fetcher;

/// Shared handles every worker of a run needs.
pub(crate) struct WorkerContext<F: ?Sized, E> {
    pub(crate) backlog: Arc<Backlog>,
    pub(crate) fetcher: Arc<F>,
    pub(crate) extractor: Arc<E>,
    pub(crate) metrics: Arc<PipelineMetrics>,
    pub(crate) cancel: CancellationToken,
}

/// Per-worker tally returned when a worker exits.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct WorkerSummary {
    pub(crate) processed: usize,
    pub(crate) failed: usize,
}

/// Claim items until the backlog is empty, pushing every extracted unit into `producer`.
///
/// A failing item is logged and skipped. The worker stops early when the run is cancelled, the
/// consumer has gone away, or the backlog cannot be claimed from.
pub(crate) async fn run_worker<F, E>(
    ctx: WorkerContext<F, E>,
    producer: Producer<E::Unit>,
) -> WorkerSummary
where
    F: Fetcher + ?Sized + 'static,
    E: Extractor,
{
    let worker_id = producer.id();
    let mut summary = WorkerSummary::default();
    tracing::trace!(worker_id, "Worker starting");

    loop {
        if ctx.cancel.is_cancelled() {
            tracing::debug!(worker_id, "Worker cancelled");
            break;
        }
        let item = match ctx.backlog.claim_next() {
            Ok(Some(item)) => item,
            Ok(None) => break,
            Err(error) => {
                tracing::error!(worker_id, error = %error, "Failed to claim from backlog; stopping worker");
                break;
            }
        };
        ctx.metrics.record_claim();

        let mut sink = UnitSink::new(&producer, &ctx.cancel);
        let outcome = tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => Err(ExtractError::Cancelled),
            outcome = process_item(&ctx, &item, &mut sink) => outcome,
        };
        let emitted = sink.emitted() as u64;

        match outcome {
            Ok(()) => {
                summary.processed += 1;
                ctx.metrics.record_completed(emitted);
                tracing::trace!(worker_id, item = %item, units = emitted, "Item extracted");
            }
            Err(error) if error.is_terminal() => {
                ctx.metrics.record_interrupted(emitted);
                tracing::debug!(worker_id, item = %item, error = %error, "Worker stopping");
                break;
            }
            Err(error) => {
                summary.failed += 1;
                ctx.metrics.record_failed(emitted);
                tracing::warn!(
                    worker_id,
                    item = %item,
                    units = emitted,
                    error = %error,
                    "Failed to extract item; skipping"
                );
            }
        }
    }

    tracing::trace!(
        worker_id,
        processed = summary.processed,
        failed = summary.failed,
        "Worker finished"
    );
    producer.mark_worker_done();
    summary
}

async fn process_item<F, E>(
    ctx: &WorkerContext<F, E>,
    item: &str,
    sink: &mut UnitSink<'_, E::Unit>,
) -> Result<(), ExtractError>
where
    F: Fetcher + ?Sized,
    E: Extractor,
{
    let content = ctx.fetcher.fetch(item).await?;
    ctx.extractor.extract(item, content, sink).await
}
