//! Many-producer, single-consumer buffer with a completion tracker.
//!
//! Each worker owns one [`Producer`]; the pipeline's consumer owns the single [`FanIn`]. The
//! buffer sits on a tokio mpsc channel, so the end of the sequence is the channel closing once
//! every producer handle is gone. The runtime delivers every value sent before a sender is
//! dropped ahead of the close, which means `next()` can never report the end while units are
//! still buffered.
//!
//! The buffer is unbounded unless a capacity is supplied, in which case `push` suspends while
//! the buffer is full. The consumer never waits on worker completion while units are buffered,
//! so a full buffer cannot deadlock the pool.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use thiserror::Error;
use tokio::sync::mpsc;

/// Returned by [`Producer::push`] when the consumer has gone away.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("fan-in buffer closed: the consumer is gone")]
pub struct BufferClosed;

/// Records how many producers have finished and whether the consumer saw the end.
#[derive(Debug)]
pub struct CompletionTracker {
    pool_size: usize,
    finished: AtomicUsize,
    drained: AtomicBool,
}

impl CompletionTracker {
    fn new(pool_size: usize) -> Self {
        Self {
            pool_size,
            finished: AtomicUsize::new(0),
            drained: AtomicBool::new(false),
        }
    }

    /// Number of producers attached to the buffer.
    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    /// Producers that have marked themselves done so far.
    pub fn finished_workers(&self) -> usize {
        self.finished.load(Ordering::SeqCst)
    }

    /// True once every producer has marked itself done.
    pub fn all_workers_done(&self) -> bool {
        self.finished_workers() >= self.pool_size
    }

    /// True once every producer is done and the consumer has drained the buffer.
    ///
    /// Never reverts to `false`.
    pub fn is_complete(&self) -> bool {
        self.drained.load(Ordering::SeqCst)
    }

    fn mark_worker_done(&self) -> usize {
        self.finished.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn mark_drained(&self) {
        self.drained.store(true, Ordering::SeqCst);
    }
}

enum Outlet<U> {
    Bounded(mpsc::Sender<U>),
    Unbounded(mpsc::UnboundedSender<U>),
}

impl<U> Clone for Outlet<U> {
    fn clone(&self) -> Self {
        match self {
            Self::Bounded(tx) => Self::Bounded(tx.clone()),
            Self::Unbounded(tx) => Self::Unbounded(tx.clone()),
        }
    }
}

enum Inlet<U> {
    Bounded(mpsc::Receiver<U>),
    Unbounded(mpsc::UnboundedReceiver<U>),
}

/// Write handle owned by exactly one worker.
///
/// Dropping the handle counts as marking the worker done, so a worker that unwinds still lets
/// the consumer reach the end of the sequence.
pub struct Producer<U> {
    id: usize,
    outlet: Option<Outlet<U>>,
    tracker: Arc<CompletionTracker>,
}

impl<U> Producer<U> {
    /// Index of this producer within the pool.
    pub fn id(&self) -> usize {
        self.id
    }

    /// Append `unit` to the tail of the buffer, waking the consumer.
    ///
    /// Suspends while a bounded buffer is full.
    pub async fn push(&self, unit: U) -> Result<(), BufferClosed> {
        match &self.outlet {
            Some(Outlet::Bounded(tx)) => tx.send(unit).await.map_err(|_| BufferClosed),
            Some(Outlet::Unbounded(tx)) => tx.send(unit).map_err(|_| BufferClosed),
            None => Err(BufferClosed),
        }
    }

    /// True when the consumer has dropped its end of the buffer.
    pub fn is_closed(&self) -> bool {
        match &self.outlet {
            Some(Outlet::Bounded(tx)) => tx.is_closed(),
            Some(Outlet::Unbounded(tx)) => tx.is_closed(),
            None => true,
        }
    }

    /// Signal that this worker will push nothing further.
    pub fn mark_worker_done(mut self) {
        self.finish();
    }

    fn finish(&mut self) {
        // Count first, then release the sender: the close the consumer observes must come
        // after the tracker update.
        if let Some(outlet) = self.outlet.take() {
            let finished = self.tracker.mark_worker_done();
            tracing::trace!(
                producer = self.id,
                finished,
                pool_size = self.tracker.pool_size(),
                "Producer finished"
            );
            drop(outlet);
        }
    }
}

impl<U> Drop for Producer<U> {
    fn drop(&mut self) {
        self.finish();
    }
}

/// Read handle for the single consumer of the buffer.
pub struct FanIn<U> {
    inlet: Inlet<U>,
    tracker: Arc<CompletionTracker>,
    exhausted: bool,
}

impl<U> FanIn<U> {
    /// Pop the next unit, suspending while the buffer is empty and producers remain.
    ///
    /// Returns `None` once every producer is done and the buffer is empty, and keeps returning
    /// `None` after that.
    pub async fn next(&mut self) -> Option<U> {
        if self.exhausted {
            return None;
        }
        let unit = match &mut self.inlet {
            Inlet::Bounded(rx) => rx.recv().await,
            Inlet::Unbounded(rx) => rx.recv().await,
        };
        if unit.is_none() {
            debug_assert!(self.tracker.all_workers_done());
            self.exhausted = true;
            self.tracker.mark_drained();
        }
        unit
    }

    /// Units currently buffered and not yet consumed.
    pub fn buffered(&self) -> usize {
        match &self.inlet {
            Inlet::Bounded(rx) => rx.len(),
            Inlet::Unbounded(rx) => rx.len(),
        }
    }

    /// Shared completion state of this buffer.
    pub fn tracker(&self) -> &CompletionTracker {
        &self.tracker
    }
}

/// Create a buffer fed by `producers` handles.
///
/// `capacity` bounds the number of buffered units (a zero bound is treated as one); `None`
/// leaves the buffer unbounded.
pub fn channel<U>(producers: usize, capacity: Option<usize>) -> (Vec<Producer<U>>, FanIn<U>) {
    let (outlet, inlet) = match capacity {
        Some(capacity) => {
            let (tx, rx) = mpsc::channel(capacity.max(1));
            (Outlet::Bounded(tx), Inlet::Bounded(rx))
        }
        None => {
            let (tx, rx) = mpsc::unbounded_channel();
            (Outlet::Unbounded(tx), Inlet::Unbounded(rx))
        }
    };
    let tracker = Arc::new(CompletionTracker::new(producers));
    let handles = (0..producers)
        .map(|id| Producer {
            id,
            outlet: Some(outlet.clone()),
            tracker: Arc::clone(&tracker),
        })
        .collect();
    drop(outlet);

    (
        handles,
        FanIn {
            inlet,
            tracker,
            exhausted: false,
        },
    )
}
