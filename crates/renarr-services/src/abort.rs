//! Cooperative cancellation.
//!
//! A watch channel pair: the handle flips the flag, signals observe it
//! at pipeline checkpoints. Abort is advisory, in-flight external calls
//! run to completion and the next checkpoint stops the pipeline.

use tokio::sync::watch;

use crate::error::{ServiceError, ServiceResult};

/// Sender half. Owned by whoever can cancel a job.
#[derive(Debug, Clone)]
pub struct AbortHandle {
    tx: watch::Sender<bool>,
}

impl AbortHandle {
    pub fn abort(&self) {
        let _ = self.tx.send(true);
    }

    pub fn signal(&self) -> AbortSignal {
        AbortSignal {
            rx: self.tx.subscribe(),
        }
    }
}

/// Receiver half. Cheap to clone into every segment pipeline.
#[derive(Debug, Clone)]
pub struct AbortSignal {
    rx: watch::Receiver<bool>,
}

impl AbortSignal {
    /// A signal that never fires, for callers without a canceller.
    pub fn never() -> Self {
        // Dropping the sender is fine: the receiver keeps borrowing
        // the last value, which stays false forever.
        let (_tx, rx) = watch::channel(false);
        Self { rx }
    }

    pub fn is_aborted(&self) -> bool {
        *self.rx.borrow()
    }

    /// Checkpoint: error out if an abort was requested.
    pub fn check(&self) -> ServiceResult<()> {
        if self.is_aborted() {
            Err(ServiceError::Aborted)
        } else {
            Ok(())
        }
    }
}

/// Create a connected handle/signal pair.
pub fn abort_pair() -> (AbortHandle, AbortSignal) {
    let (tx, rx) = watch::channel(false);
    (AbortHandle { tx }, AbortSignal { rx })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_abort_reaches_all_clones() {
        let (handle, signal) = abort_pair();
        let other = signal.clone();
        assert!(signal.check().is_ok());

        handle.abort();
        assert!(signal.check().is_err());
        assert!(other.is_aborted());
    }

    #[test]
    fn test_never_signal_stays_quiet() {
        let signal = AbortSignal::never();
        assert!(signal.check().is_ok());
    }
}
