//! Admission control for transfers
//!
//! Every item passes through the [`AdmissionGate`] before it starts
//! streaming, so at most `max` items are active at once no matter how many
//! targets are queued. Waiters are served in arrival order.

use crate::error::{Error, Result};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Counting gate bounding simultaneously active transfers
#[derive(Clone, Debug)]
pub struct AdmissionGate {
    semaphore: Arc<Semaphore>,
    max: usize,
    active: Arc<AtomicUsize>,
}

/// Slot held by one active transfer; dropping it admits the next waiter
#[derive(Debug)]
pub struct AdmissionPermit {
    _permit: OwnedSemaphorePermit,
    active: Arc<AtomicUsize>,
}

impl Drop for AdmissionPermit {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}

impl AdmissionGate {
    /// Gate admitting at most `max` transfers (at least one)
    pub fn new(max: usize) -> Self {
        let max = max.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(max)),
            max,
            active: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Wait for a free slot
    pub async fn acquire(&self) -> Result<AdmissionPermit> {
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| Error::ShuttingDown)?;
        Ok(self.admit(permit))
    }

    fn admit(&self, permit: OwnedSemaphorePermit) -> AdmissionPermit {
        self.active.fetch_add(1, Ordering::SeqCst);
        AdmissionPermit {
            _permit: permit,
            active: Arc::clone(&self.active),
        }
    }

    /// Number of slots currently held
    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Configured bound
    pub fn max(&self) -> usize {
        self.max
    }
}
