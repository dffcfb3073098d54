//! Shutdown-aware channel operations for stage loops.
//!
//! Stages block on bounded channels in two places, sending downstream and receiving
//! from upstream. Both operations must abort promptly once the stage's shutdown token
//! closes, otherwise a stage whose neighbor has stopped draining would hang forever on
//! a full or empty channel. The helpers in this module fold the shutdown signal into
//! the channel operation itself.

use tokio::sync::mpsc;

use crate::concurrency::shutdown::{ShutdownResult, ShutdownRx};

/// Sends `value` on `tx`, aborting if the shutdown token closes first.
///
/// A send that fails because the receiving half was dropped is reported as
/// [`ShutdownResult::Shutdown`] as well, since a vanished downstream stage means the
/// pipeline is winding down and the value has nowhere to go.
pub async fn send_with_shutdown<T>(
    tx: &mpsc::Sender<T>,
    value: T,
    shutdown_rx: &mut ShutdownRx,
) -> ShutdownResult<(), ()> {
    tokio::select! {
        biased;

        _ = shutdown_rx.changed() => ShutdownResult::Shutdown(()),
        result = tx.send(value) => match result {
            Ok(()) => ShutdownResult::Ok(()),
            Err(_) => ShutdownResult::Shutdown(()),
        },
    }
}

/// Receives the next value from `rx`, aborting if the shutdown token closes first.
///
/// Returns `Ok(None)` once the channel is closed and fully drained, which is how a
/// stage learns that its upstream neighbor finished cleanly.
pub async fn recv_with_shutdown<T>(
    rx: &mut mpsc::Receiver<T>,
    shutdown_rx: &mut ShutdownRx,
) -> ShutdownResult<Option<T>, ()> {
    tokio::select! {
        biased;

        _ = shutdown_rx.changed() => ShutdownResult::Shutdown(()),
        value = rx.recv() => ShutdownResult::Ok(value),
    }
}
