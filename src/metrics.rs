use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters describing pipeline activity.
#[derive(Default)]
pub struct PipelineMetrics {
    items_claimed: AtomicU64,
    items_completed: AtomicU64,
    items_failed: AtomicU64,
    units_emitted: AtomicU64,
}

impl PipelineMetrics {
    /// Create an empty metrics accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that a worker claimed an item from the backlog.
    pub fn record_claim(&self) {
        self.items_claimed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a fully extracted item and the number of units it produced.
    pub fn record_completed(&self, unit_count: u64) {
        self.items_completed.fetch_add(1, Ordering::Relaxed);
        self.units_emitted.fetch_add(unit_count, Ordering::Relaxed);
    }

    /// Record an item whose fetch or extraction failed after emitting `unit_count` units.
    pub fn record_failed(&self, unit_count: u64) {
        self.items_failed.fetch_add(1, Ordering::Relaxed);
        self.units_emitted.fetch_add(unit_count, Ordering::Relaxed);
    }

    /// Record units pushed by an item that was cut short by cancellation.
    pub fn record_interrupted(&self, unit_count: u64) {
        self.units_emitted.fetch_add(unit_count, Ordering::Relaxed);
    }

    /// Return a snapshot of the current counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            items_claimed: self.items_claimed.load(Ordering::Relaxed),
            items_completed: self.items_completed.load(Ordering::Relaxed),
            items_failed: self.items_failed.load(Ordering::Relaxed),
            units_emitted: self.units_emitted.load(Ordering::Relaxed),
        }
    }
}

/// Immutable view of pipeline counters used for reporting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct MetricsSnapshot {
    /// Items taken from the backlog by any worker.
    pub items_claimed: u64,
    /// Items whose units were all extracted and pushed.
    pub items_completed: u64,
    /// Items that failed to fetch or extract.
    pub items_failed: u64,
    /// Units pushed to the output sequence.
    pub units_emitted: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_items_and_units() {
        let metrics = PipelineMetrics::new();
        metrics.record_claim();
        metrics.record_claim();
        metrics.record_completed(2);
        metrics.record_failed(1);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.items_claimed, 2);
        assert_eq!(snapshot.items_completed, 1);
        assert_eq!(snapshot.items_failed, 1);
        assert_eq!(snapshot.units_emitted, 3);
    }

    #[test]
    fn snapshot_starts_empty() {
        assert_eq!(PipelineMetrics::new().snapshot(), MetricsSnapshot::default());
    }
}
