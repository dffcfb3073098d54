//! Commit stage, acknowledges cookies back to the source.

use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::bail;
use crate::concurrency::channel::recv_with_shutdown;
use crate::concurrency::shutdown::{ShutdownResult, ShutdownRx};
use crate::error::{ConveyorResult, ErrorKind};
use crate::source::Source;
use crate::types::{Stage, StageError};

/// Stage that confirms processed work back to the source.
///
/// [`CommitStage`] receives cookies from the process stage and acknowledges each one
/// in receipt order. An acknowledgement failure stops the stage immediately, cookies
/// still buffered in the channel at that point are never acknowledged.
#[derive(Debug)]
pub struct CommitStage<Src: Source> {
    source: Src,
    cookie_rx: mpsc::Receiver<Src::Cookie>,
    error_tx: mpsc::Sender<StageError>,
    shutdown_rx: ShutdownRx,
}

impl<Src> CommitStage<Src>
where
    Src: Source + Clone + Send + Sync + 'static,
{
    /// Creates a new commit stage with the given channels and shutdown token.
    pub fn new(
        source: Src,
        cookie_rx: mpsc::Receiver<Src::Cookie>,
        error_tx: mpsc::Sender<StageError>,
        shutdown_rx: ShutdownRx,
    ) -> Self {
        Self {
            source,
            cookie_rx,
            error_tx,
            shutdown_rx,
        }
    }

    /// Runs the stage until the cookie channel closes, an acknowledgement fails, or
    /// shutdown.
    ///
    /// A failure is reported once to the coordinator before the stage exits.
    pub async fn run(mut self) {
        info!("starting commit stage");

        if let Err(err) = self.commit_loop().await {
            error!(error = %err, "commit stage failed");

            // One slot per stage and at most one report per stage, so this send can
            // never block.
            let _ = self
                .error_tx
                .send(StageError::new(Stage::Commit, err))
                .await;

            return;
        }

        info!("commit stage completed");
    }

    async fn commit_loop(&mut self) -> ConveyorResult<()> {
        loop {
            let cookie =
                match recv_with_shutdown(&mut self.cookie_rx, &mut self.shutdown_rx).await {
                    ShutdownResult::Ok(Some(cookie)) => cookie,
                    ShutdownResult::Ok(None) => {
                        info!("cookie channel closed, no more cookies to acknowledge");

                        return Ok(());
                    }
                    ShutdownResult::Shutdown(_) => {
                        info!("shutting down commit stage");

                        return Ok(());
                    }
                };

            if let Err(err) = self.source.acknowledge(cookie).await {
                let detail = err.to_string();
                bail!(
                    ErrorKind::CommitFailed,
                    "Failed to acknowledge cookie to the source",
                    detail = detail,
                    source: err
                );
            }

            debug!("cookie acknowledged");
        }
    }
}
