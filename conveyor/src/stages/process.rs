//! Process stage, writes sealed batches to the destination.

use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::bail;
use crate::concurrency::channel::{recv_with_shutdown, send_with_shutdown};
use crate::concurrency::shutdown::{ShutdownResult, ShutdownRx};
use crate::destination::Destination;
use crate::error::{ConveyorResult, ErrorKind};
use crate::types::{Batch, Stage, StageError};

/// Stage that hands sealed batches to the destination.
///
/// [`ProcessStage`] consumes batches from the fetch stage one at a time. After a
/// batch has been written successfully, its cookies are forwarded to the commit
/// stage individually and in fetch order. A write failure stops the stage before
/// any cookie of the failed batch is forwarded.
#[derive(Debug)]
pub struct ProcessStage<Dst: Destination, C> {
    destination: Dst,
    batch_rx: mpsc::Receiver<Batch<Dst::Item, C>>,
    cookie_tx: mpsc::Sender<C>,
    error_tx: mpsc::Sender<StageError>,
    shutdown_rx: ShutdownRx,
}

impl<Dst, C> ProcessStage<Dst, C>
where
    Dst: Destination + Clone + Send + Sync + 'static,
    C: Send + 'static,
{
    /// Creates a new process stage with the given channels and shutdown token.
    pub fn new(
        destination: Dst,
        batch_rx: mpsc::Receiver<Batch<Dst::Item, C>>,
        cookie_tx: mpsc::Sender<C>,
        error_tx: mpsc::Sender<StageError>,
        shutdown_rx: ShutdownRx,
    ) -> Self {
        Self {
            destination,
            batch_rx,
            cookie_tx,
            error_tx,
            shutdown_rx,
        }
    }

    /// Runs the stage until the batch channel closes, a write fails, or shutdown.
    ///
    /// A failure is reported once to the coordinator before the stage exits. The
    /// cookie channel closes when the stage drops, on every exit path, so the commit
    /// stage always observes completion.
    pub async fn run(mut self) {
        info!("starting process stage");

        if let Err(err) = self.process_loop().await {
            error!(error = %err, "process stage failed");

            // One slot per stage and at most one report per stage, so this send can
            // never block.
            let _ = self
                .error_tx
                .send(StageError::new(Stage::Process, err))
                .await;

            return;
        }

        info!("process stage completed");
    }

    async fn process_loop(&mut self) -> ConveyorResult<()> {
        loop {
            let batch =
                match recv_with_shutdown(&mut self.batch_rx, &mut self.shutdown_rx).await {
                    ShutdownResult::Ok(Some(batch)) => batch,
                    ShutdownResult::Ok(None) => {
                        info!("batch channel closed, no more batches to process");

                        return Ok(());
                    }
                    ShutdownResult::Shutdown(_) => {
                        info!("shutting down process stage");

                        return Ok(());
                    }
                };

            let (items, cookies) = batch.into_parts();

            debug!(
                items = items.len(),
                cookies = cookies.len(),
                "writing batch to destination"
            );

            if let Err(err) = self.destination.write_batch(items).await {
                let detail = err.to_string();
                bail!(
                    ErrorKind::ProcessFailed,
                    "Failed to write batch to the destination",
                    detail = detail,
                    source: err
                );
            }

            // Cookies are forwarded only once the whole batch is durable, one at a
            // time and in fetch order.
            for cookie in cookies {
                if let ShutdownResult::Shutdown(_) =
                    send_with_shutdown(&self.cookie_tx, cookie, &mut self.shutdown_rx).await
                {
                    info!("shutting down process stage");

                    return Ok(());
                }
            }
        }
    }
}
