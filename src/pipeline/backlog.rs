use std::collections::VecDeque;
use std::sync::Mutex;

use thiserror::Error;

/// Raised when the backlog can no longer be claimed from.
#[derive(Debug, Error)]
pub enum BacklogError {
    /// A worker panicked while holding the backlog lock.
    #[error("backlog lock poisoned")]
    Poisoned,
}

/// Shared queue of item identifiers that no worker has claimed yet.
///
/// Populated once before workers start; afterwards it only shrinks.
#[derive(Debug, Default)]
pub struct Backlog {
    pending: Mutex<VecDeque<String>>,
}

impl Backlog {
    /// Backlog serving `items` in the given order.
    pub fn new(items: impl IntoIterator<Item = String>) -> Self {
        Self {
            pending: Mutex::new(items.into_iter().collect()),
        }
    }

    /// Atomically remove and return the next identifier, or `None` once empty.
    pub fn claim_next(&self) -> Result<Option<String>, BacklogError> {
        let mut pending = self.pending.lock().map_err(|_| BacklogError::Poisoned)?;
        Ok(pending.pop_front())
    }

    /// Identifiers not yet claimed.
    pub fn remaining(&self) -> usize {
        self.pending.lock().map(|pending| pending.len()).unwrap_or(0)
    }
}
