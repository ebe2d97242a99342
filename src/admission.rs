//! Admission control.
//!
//! A fixed pool of processing slots. The accept loop asks for a slot before
//! handing a connection to a worker; when none is free the connection is
//! answered with 429 instead of waiting. Slots are returned when the
//! [`AdmissionSlot`] guard is dropped, on every exit path of the worker.

use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore, TryAcquireError};

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("all {capacity} processing slots are in use")]
pub struct CapacityExceeded {
    pub capacity: usize,
}

/// Shared counter of free processing slots.
///
/// Cloning yields another handle onto the same pool.
#[derive(Debug, Clone)]
pub struct AdmissionController {
    slots: Arc<Semaphore>,
    capacity: usize,
}

/// Holds one processing slot until dropped.
#[derive(Debug)]
pub struct AdmissionSlot {
    _permit: OwnedSemaphorePermit,
}

impl AdmissionController {
    /// A pool of `capacity` slots. Zero is raised to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            slots: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    /// Take a slot without waiting.
    ///
    /// The check and the decrement are a single atomic step, so concurrent
    /// callers can never push the pool below zero.
    pub fn try_admit(&self) -> Result<AdmissionSlot, CapacityExceeded> {
        match Arc::clone(&self.slots).try_acquire_owned() {
            Ok(permit) => Ok(AdmissionSlot { _permit: permit }),
            Err(TryAcquireError::NoPermits | TryAcquireError::Closed) => Err(CapacityExceeded {
                capacity: self.capacity,
            }),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Free slots right now.
    pub fn available(&self) -> usize {
        self.slots.available_permits()
    }

    pub fn in_flight(&self) -> usize {
        self.capacity - self.available()
    }
}
