//! Caller cancellation.
//!
//! A [`CancelHandle`] / [`CancelToken`] pair wraps a `tokio::sync::watch`
//! channel. The token is cheap to clone and is passed into every remote
//! operation; once cancelled it stays cancelled.

use tokio::sync::watch;

/// The sending half; cancels every token subscribed to it.
#[derive(Debug)]
pub struct CancelHandle(watch::Sender<bool>);

impl CancelHandle {
    /// Cancel all tokens created from this handle.
    pub fn cancel(&self) {
        self.0.send_replace(true);
    }

    /// Create another token observing this handle.
    #[must_use]
    pub fn token(&self) -> CancelToken {
        CancelToken(self.0.subscribe())
    }
}

/// The receiving half observed by operations.
#[derive(Debug, Clone)]
pub struct CancelToken(watch::Receiver<bool>);

impl CancelToken {
    /// A token that is never cancelled.
    #[must_use]
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self(rx)
    }

    /// Returns true once the caller has cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.0.borrow()
    }

    /// Resolve when the caller cancels. Never resolves for tokens whose
    /// handle was dropped without cancelling.
    pub async fn cancelled(&self) {
        let mut rx = self.0.clone();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::never()
    }
}

/// Create a new cancellation pair.
#[must_use]
pub fn cancel_pair() -> (CancelHandle, CancelToken) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle(tx), CancelToken(rx))
}
