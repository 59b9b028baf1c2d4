//! Execution slot limiter: the counting gate that bounds how many synthesis
//! jobs run at once.
//!
//! Built on `tokio::sync::Semaphore` with owned permits so a slot is
//! released exactly once, on drop, regardless of how the holding job ends —
//! success, adapter error, or panic unwind. An `in_use` gauge is kept
//! alongside the semaphore for stats snapshots.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use super::error::GateError;

/// Counting admission gate with a fixed capacity.
#[derive(Clone)]
pub struct SlotLimiter {
    semaphore: Arc<Semaphore>,
    capacity: usize,
    in_use: Arc<AtomicUsize>,
}

/// One unit of execution capacity, returned to the limiter on drop.
pub struct SlotPermit {
    _permit: OwnedSemaphorePermit,
    in_use: Arc<AtomicUsize>,
}

impl Drop for SlotPermit {
    fn drop(&mut self) {
        self.in_use.fetch_sub(1, Ordering::Release);
    }
}

impl SlotLimiter {
    /// Create a limiter with `capacity` concurrent slots.
    ///
    /// A zero capacity would deadlock every submission; configuration
    /// validation rejects it before this constructor runs.
    pub fn new(capacity: usize) -> Self {
        debug_assert!(capacity > 0, "slot capacity must be positive");
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
            in_use: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Acquire a slot, suspending until one is free.
    pub async fn acquire(&self) -> Result<SlotPermit, GateError> {
        let permit = Arc::clone(&self.semaphore)
            .acquire_owned()
            .await
            .map_err(|_| GateError::QueueClosed)?;
        self.in_use.fetch_add(1, Ordering::Acquire);
        Ok(SlotPermit {
            _permit: permit,
            in_use: Arc::clone(&self.in_use),
        })
    }

    /// Acquire a slot without suspending; `None` when all slots are held.
    pub fn try_acquire(&self) -> Option<SlotPermit> {
        let permit = Arc::clone(&self.semaphore).try_acquire_owned().ok()?;
        self.in_use.fetch_add(1, Ordering::Acquire);
        Some(SlotPermit {
            _permit: permit,
            in_use: Arc::clone(&self.in_use),
        })
    }

    /// Configured capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Slots currently free.
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Slots currently held.
    pub fn in_use(&self) -> usize {
        self.in_use.load(Ordering::Acquire)
    }
}
