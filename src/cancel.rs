//! Cooperative cancellation.
//!
//! The pipeline runs sequentially and must remain responsive to shutdown:
//! the token is checked between fetches and raced against every sleep, so an
//! in-flight retry budget is abandoned promptly instead of being drained.

use tokio::sync::watch;

/// Sending half: flips all clones of the paired [`CancelToken`].
#[derive(Debug)]
pub struct CancelGuard {
    tx: watch::Sender<bool>,
}

impl CancelGuard {
    /// Signal cancellation to every token.
    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }
}

/// Receiving half, cloned into each pipeline component.
#[derive(Debug, Clone)]
pub struct CancelToken {
    rx: watch::Receiver<bool>,
}

impl CancelToken {
    /// Create a linked guard/token pair.
    pub fn new() -> (CancelGuard, CancelToken) {
        let (tx, rx) = watch::channel(false);
        (CancelGuard { tx }, CancelToken { rx })
    }

    /// A token that can never fire. Useful for tests and one-shot tools.
    pub fn never() -> CancelToken {
        let (tx, rx) = watch::channel(false);
        // Keep the sender alive forever so the channel never closes.
        std::mem::forget(tx);
        CancelToken { rx }
    }

    /// Whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once cancellation is requested. If the guard is gone without
    /// firing, cancellation can no longer happen and this pends forever;
    /// callers race it against real work with `tokio::select!`.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        loop {
            if *rx.borrow() {
                return;
            }
            if rx.changed().await.is_err() {
                futures::future::pending::<()>().await;
            }
        }
    }
}
