//! Shutdown signaling primitives for pipeline stages.
//!
//! Each stage of a pipeline owns one shutdown token. The sending half lives with the
//! pipeline coordinator, the receiving half with the stage task. Closing the token is
//! idempotent, so the failure cascade and an external shutdown can race without the
//! signal being delivered twice.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::watch;

/// Receiving half of a shutdown token.
///
/// Stages await [`watch::Receiver::changed`] on this to observe the close. The watch
/// value itself carries no data, only the edge matters.
pub type ShutdownRx = watch::Receiver<()>;

#[derive(Debug)]
struct ShutdownInner {
    closed: AtomicBool,
    tx: watch::Sender<()>,
}

/// Sending half of a shutdown token.
///
/// Cloning is cheap and all clones refer to the same token. The first call to
/// [`ShutdownTx::shutdown`] across all clones delivers the signal, every later call
/// is a no-op.
#[derive(Debug, Clone)]
pub struct ShutdownTx {
    inner: Arc<ShutdownInner>,
}

impl ShutdownTx {
    /// Closes the token, waking the stage that holds the receiving half.
    ///
    /// Returns `true` if this call performed the close and `false` if the token was
    /// already closed. The signal is delivered exactly once no matter how many clones
    /// call this method concurrently.
    pub fn shutdown(&self) -> bool {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return false;
        }

        // The send fails only when the receiving half is gone, meaning the stage has
        // already exited and there is nobody left to signal.
        let _ = self.inner.tx.send(());

        true
    }
}

/// Creates a fresh shutdown token, returning its sending and receiving halves.
pub fn create_shutdown_channel() -> (ShutdownTx, ShutdownRx) {
    let (tx, rx) = watch::channel(());

    let shutdown_tx = ShutdownTx {
        inner: Arc::new(ShutdownInner {
            closed: AtomicBool::new(false),
            tx,
        }),
    };

    (shutdown_tx, rx)
}

/// Outcome of an operation that can be interrupted by a shutdown signal.
///
/// `T` is the value produced when the operation completes normally, `U` carries any
/// partial state worth returning when the operation is cut short.
#[derive(Debug)]
pub enum ShutdownResult<T, U> {
    /// The operation completed before the shutdown signal arrived.
    Ok(T),
    /// The shutdown signal arrived before the operation could complete.
    Shutdown(U),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_shutdown_wakes_receiver() {
        let (shutdown_tx, mut shutdown_rx) = create_shutdown_channel();

        assert!(shutdown_tx.shutdown());
        assert!(shutdown_rx.changed().await.is_ok());
    }

    #[tokio::test]
    async fn test_shutdown_is_idempotent() {
        let (shutdown_tx, _shutdown_rx) = create_shutdown_channel();

        assert!(shutdown_tx.shutdown());
        assert!(!shutdown_tx.shutdown());
        assert!(!shutdown_tx.shutdown());
    }

    #[tokio::test]
    async fn test_clones_share_the_same_token() {
        let (shutdown_tx, _shutdown_rx) = create_shutdown_channel();
        let clone = shutdown_tx.clone();

        assert!(clone.shutdown());
        assert!(!shutdown_tx.shutdown());
    }

    #[tokio::test]
    async fn test_shutdown_with_dropped_receiver_does_not_panic() {
        let (shutdown_tx, shutdown_rx) = create_shutdown_channel();
        drop(shutdown_rx);

        assert!(shutdown_tx.shutdown());
    }

    #[tokio::test]
    async fn test_receiver_sees_close_that_happened_before_waiting() {
        let (shutdown_tx, mut shutdown_rx) = create_shutdown_channel();

        shutdown_tx.shutdown();

        // The close is latched in the watch channel, so a receiver that starts
        // waiting afterwards still observes it.
        assert!(shutdown_rx.has_changed().unwrap_or(false));
        assert!(shutdown_rx.changed().await.is_ok());
    }
}
