//! Concurrency gate
//!
//! Admission control for physical HTTP requests. At most `max_concurrent`
//! permits are outstanding at any instant; waiters are admitted in FIFO
//! order by the underlying semaphore. A permit releases its slot when
//! dropped, so every exit path (success, error, timeout, cancellation)
//! gives the slot back.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::error::{GaryError, Result};

#[derive(Debug)]
struct Counters {
    active: AtomicUsize,
    peak: AtomicUsize,
}

/// Bounded admission gate for in-flight requests
#[derive(Debug, Clone)]
pub struct ConcurrencyGate {
    semaphore: Arc<Semaphore>,
    counters: Arc<Counters>,
    max_concurrent: usize,
}

/// Slot held while one physical request is in flight
#[derive(Debug)]
pub struct GatePermit {
    _permit: OwnedSemaphorePermit,
    counters: Arc<Counters>,
}

impl Drop for GatePermit {
    fn drop(&mut self) {
        self.counters.active.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ConcurrencyGate {
    /// Create a gate admitting `max_concurrent` requests (at least one)
    pub fn new(max_concurrent: usize) -> Self {
        let max_concurrent = max_concurrent.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(max_concurrent)),
            counters: Arc::new(Counters {
                active: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
            }),
            max_concurrent,
        }
    }

    /// Wait for a free slot
    pub async fn acquire(&self) -> Result<GatePermit> {
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| GaryError::Configuration("Concurrency gate closed".to_string()))?;

        let active = self.counters.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.counters.peak.fetch_max(active, Ordering::SeqCst);

        Ok(GatePermit {
            _permit: permit,
            counters: self.counters.clone(),
        })
    }

    /// Requests currently holding a slot
    pub fn active(&self) -> usize {
        self.counters.active.load(Ordering::SeqCst)
    }

    /// Highest number of simultaneous slots observed since the last reset
    pub fn peak(&self) -> usize {
        self.counters.peak.load(Ordering::SeqCst)
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    /// Reset the high-water mark to the current load
    pub fn reset_peak(&self) {
        self.counters.peak.store(self.active(), Ordering::SeqCst);
    }
}
