//! Idempotent cancellation handles.
//!
//! A [`CancelHandle`] retracts one registration — a subscription task or a
//! scheduled timer. Invoking it more than once is permitted; only the first
//! call takes effect. The owning task holds the matching [`CancelSignal`]
//! and races it against its own work.

use std::sync::Arc;

use tokio::sync::watch;

/// Cancels the paired registration. Clonable; all clones share one state.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<bool>>,
}

/// The task-side receiver for a [`CancelHandle`].
#[derive(Debug)]
pub struct CancelSignal {
    rx: watch::Receiver<bool>,
}

impl CancelHandle {
    pub fn new() -> (CancelHandle, CancelSignal) {
        let (tx, rx) = watch::channel(false);
        (CancelHandle { tx: Arc::new(tx) }, CancelSignal { rx })
    }

    /// Signal cancellation. Idempotent.
    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }
}

impl CancelSignal {
    /// Resolves once the handle is cancelled. Dropping every handle counts
    /// as cancellation, so an abandoned registration cannot leak its task.
    pub async fn cancelled(&mut self) {
        while !*self.rx.borrow() {
            if self.rx.changed().await.is_err() {
                break;
            }
        }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_cancel_resolves_signal() {
        let (handle, mut signal) = CancelHandle::new();
        assert!(!signal.is_cancelled());
        handle.cancel();
        signal.cancelled().await;
        assert!(signal.is_cancelled());
    }

    #[tokio::test]
    async fn test_cancel_is_idempotent() {
        let (handle, mut signal) = CancelHandle::new();
        handle.cancel();
        handle.cancel();
        signal.cancelled().await;
        assert!(handle.is_cancelled());
    }

    #[tokio::test]
    async fn test_dropping_handles_cancels() {
        let (handle, mut signal) = CancelHandle::new();
        drop(handle);
        signal.cancelled().await;
    }
}
