//! Pipeline driver: backlog, worker pool, and the consumer-facing unit sequence.

use std::sync::Arc;
use std::time::Instant;

use async_stream::stream;
use futures_core::Stream;
use serde::Serialize;
use thiserror::Error;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;

use super::backlog::Backlog;
use super::fan_in::{self, FanIn};
use super::worker::{WorkerContext, WorkerSummary, run_worker};
use crate::extract::Extractor;
use crate::metrics::{MetricsSnapshot, PipelineMetrics};
use crate::source::{Enumerator, Fetcher, SourceError, filter_by_suffix};

/// Worker-pool size used when none is configured.
pub const DEFAULT_WORKERS: usize = 4;

/// Errors raised before a pipeline run starts.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The worker pool must contain at least one worker.
    #[error("worker count must be greater than zero")]
    InvalidWorkerCount,
    /// The source could not enumerate its items.
    #[error("Failed to list items: {0}")]
    Listing(#[from] SourceError),
}

/// Tunables for a pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineSettings {
    /// Number of concurrent workers.
    pub workers: usize,
    /// Maximum number of buffered units; `None` leaves the buffer unbounded.
    pub buffer_capacity: Option<usize>,
    /// Listed identifiers must end with this suffix to be processed; empty keeps everything.
    pub suffix: String,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            buffer_capacity: None,
            suffix: String::new(),
        }
    }
}

/// Summary of a finished run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PipelineReport {
    /// Identifiers placed in the backlog.
    pub items_total: usize,
    /// Size of the worker pool.
    pub workers: usize,
    /// Worker tasks that panicked instead of finishing.
    pub workers_panicked: usize,
    /// Counters accumulated during the run.
    #[serde(flatten)]
    pub counts: MetricsSnapshot,
    /// Wall-clock duration of the run in milliseconds.
    pub elapsed_ms: u64,
}

/// Fans extraction of many items out over a worker pool and back into one unit sequence.
///
/// The same coordination serves every source: local and remote runs differ only in the
/// [`Fetcher`] supplied here.
pub struct Pipeline<F: ?Sized, E> {
    fetcher: Arc<F>,
    extractor: Arc<E>,
    settings: PipelineSettings,
}

impl<F, E> Pipeline<F, E>
where
    F: Fetcher + ?Sized + 'static,
    E: Extractor,
{
    /// Build a pipeline pulling content from `fetcher` and splitting it with `extractor`.
    pub fn new(
        fetcher: Arc<F>,
        extractor: E,
        settings: PipelineSettings,
    ) -> Result<Self, PipelineError> {
        if settings.workers == 0 {
            return Err(PipelineError::InvalidWorkerCount);
        }
        Ok(Self {
            fetcher,
            extractor: Arc::new(extractor),
            settings,
        })
    }

    /// Settings this pipeline runs with.
    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// List items from `enumerator`, keep those matching the configured suffix, and start a run.
    ///
    /// A listing failure is returned before any worker starts.
    pub async fn run_from<S>(&self, enumerator: &S) -> Result<PipelineRun<E::Unit>, PipelineError>
    where
        S: Enumerator + ?Sized,
    {
        let listed = enumerator.list().await?;
        let listed_count = listed.len();
        let items = filter_by_suffix(listed, &self.settings.suffix);
        tracing::info!(
            listed = listed_count,
            selected = items.len(),
            suffix = %self.settings.suffix,
            "Listed source items"
        );
        Ok(self.run(items))
    }

    /// Start workers over `items` and return the lazy unit sequence immediately.
    ///
    /// Must be called from within a tokio runtime.
    pub fn run(&self, items: Vec<String>) -> PipelineRun<E::Unit> {
        let started = Instant::now();
        let backlog = Arc::new(Backlog::new(items));
        let items_total = backlog.remaining();
        let metrics = Arc::new(PipelineMetrics::new());
        let cancel = CancellationToken::new();
        let workers = self.settings.workers;
        let (producers, units) = fan_in::channel(workers, self.settings.buffer_capacity);

        tracing::debug!(
            items = items_total,
            workers,
            buffer_capacity = ?self.settings.buffer_capacity,
            "Starting pipeline run"
        );

        let mut pool = JoinSet::new();
        for producer in producers {
            let ctx = WorkerContext {
                backlog: Arc::clone(&backlog),
                fetcher: Arc::clone(&self.fetcher),
                extractor: Arc::clone(&self.extractor),
                metrics: Arc::clone(&metrics),
                cancel: cancel.clone(),
            };
            pool.spawn(run_worker(ctx, producer));
        }

        let supervisor = tokio::spawn(supervise(
            pool,
            Arc::clone(&metrics),
            items_total,
            workers,
            started,
        ));

        PipelineRun {
            units,
            supervisor: Some(supervisor),
            cancel,
            metrics,
            items_total,
            workers,
            started,
        }
    }
}

async fn supervise(
    mut pool: JoinSet<WorkerSummary>,
    metrics: Arc<PipelineMetrics>,
    items_total: usize,
    workers: usize,
    started: Instant,
) -> PipelineReport {
    let mut workers_panicked = 0;
    while let Some(joined) = pool.join_next().await {
        match joined {
            Ok(summary) => tracing::trace!(
                processed = summary.processed,
                failed = summary.failed,
                "Worker joined"
            ),
            Err(error) => {
                workers_panicked += 1;
                tracing::error!(error = %error, "Worker task failed");
            }
        }
    }

    let report = PipelineReport {
        items_total,
        workers,
        workers_panicked,
        counts: metrics.snapshot(),
        elapsed_ms: elapsed_ms(started),
    };
    tracing::info!(
        items = report.items_total,
        completed = report.counts.items_completed,
        failed = report.counts.items_failed,
        units = report.counts.units_emitted,
        elapsed_ms = report.elapsed_ms,
        "Pipeline workers finished"
    );
    report
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

/// Handle on a running pipeline: a single-pass, pull-based sequence of units.
///
/// Only this handle can read units, so there is never more than one consumer. Dropping it, or
/// the stream produced by [`PipelineRun::into_stream`], cancels outstanding work.
pub struct PipelineRun<U> {
    units: FanIn<U>,
    supervisor: Option<JoinHandle<PipelineReport>>,
    cancel: CancellationToken,
    metrics: Arc<PipelineMetrics>,
    items_total: usize,
    workers: usize,
    started: Instant,
}

impl<U: Send + 'static> PipelineRun<U> {
    /// Next unit in arrival order, or `None` once every worker is done and all units are read.
    pub async fn next(&mut self) -> Option<U> {
        self.units.next().await
    }

    /// Turn the run into a `Stream` of units.
    pub fn into_stream(self) -> impl Stream<Item = U> + Send + 'static {
        stream! {
            let mut run = self;
            while let Some(unit) = run.next().await {
                yield unit;
            }
        }
    }

    /// Ask workers to stop claiming items and abandon in-flight ones.
    ///
    /// Units already buffered can still be read; the sequence then ends.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// True once every worker finished and the consumer read the last unit.
    pub fn is_complete(&self) -> bool {
        self.units.tracker().is_complete()
    }

    /// Identifiers placed in the backlog for this run.
    pub fn items_total(&self) -> usize {
        self.items_total
    }

    /// Live snapshot of the run's counters.
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Stop outstanding work, wait for every worker, and return the run summary.
    ///
    /// Call after draining the sequence to get the final counts; units not yet read are
    /// discarded.
    pub async fn finish(mut self) -> PipelineReport {
        self.cancel.cancel();
        let Some(supervisor) = self.supervisor.take() else {
            return self.fallback_report();
        };
        match supervisor.await {
            Ok(report) => report,
            Err(error) => {
                tracing::error!(error = %error, "Pipeline supervisor failed");
                self.fallback_report()
            }
        }
    }

    fn fallback_report(&self) -> PipelineReport {
        PipelineReport {
            items_total: self.items_total,
            workers: self.workers,
            workers_panicked: 0,
            counts: self.metrics.snapshot(),
            elapsed_ms: elapsed_ms(self.started),
        }
    }
}

impl<U> Drop for PipelineRun<U> {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
