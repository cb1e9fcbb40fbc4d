//! Process-wide admission gate.
//!
//! Hard limit of one concurrent job. There is no waiting queue: a
//! second job is rejected synchronously with a distinct "queue full"
//! error and its caller must retry later. The slot is released when
//! the permit drops, whatever the outcome of the run.

use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::error::{EngineError, EngineResult};

const MAX_CONCURRENT_JOBS: usize = 1;

/// Single-job admission gate.
#[derive(Clone)]
pub struct AdmissionQueue {
    permits: Arc<Semaphore>,
}

/// Held for the lifetime of a job run; dropping it frees the slot.
pub struct AdmissionPermit {
    _permit: OwnedSemaphorePermit,
}

impl AdmissionQueue {
    pub fn new() -> Self {
        Self {
            permits: Arc::new(Semaphore::new(MAX_CONCURRENT_JOBS)),
        }
    }

    /// Try to take the single job slot without waiting.
    pub fn try_admit(&self) -> EngineResult<AdmissionPermit> {
        let permit = Arc::clone(&self.permits)
            .try_acquire_owned()
            .map_err(|_| EngineError::QueueFull)?;
        Ok(AdmissionPermit { _permit: permit })
    }
}

impl Default for AdmissionQueue {
    fn default() -> Self {
        Self::new()
    }
}
