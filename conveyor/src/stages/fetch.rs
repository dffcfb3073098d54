//! Fetch stage, pulls pages from the source and accumulates them into batches.

use std::mem;
use std::sync::Arc;

use conveyor_config::shared::PipelineConfig;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::bail;
use crate::concurrency::channel::send_with_shutdown;
use crate::concurrency::shutdown::{ShutdownResult, ShutdownRx};
use crate::error::{ConveyorResult, ErrorKind};
use crate::source::{FetchResult, Source};
use crate::types::{Batch, Stage, StageError};

/// Stage that turns the source's pages into sealed batches.
///
/// [`FetchStage`] repeatedly calls [`Source::fetch`] and grows a batch buffer until
/// appending the next page would exceed the configured size limit. The full buffer is
/// then sent downstream and a fresh one is started with the page that did not fit.
/// End of stream flushes whatever items are still buffered and terminates the stage
/// successfully.
#[derive(Debug)]
pub struct FetchStage<Src: Source> {
    config: Arc<PipelineConfig>,
    source: Src,
    batch_tx: mpsc::Sender<Batch<Src::Item, Src::Cookie>>,
    error_tx: mpsc::Sender<StageError>,
    shutdown_rx: ShutdownRx,
}

impl<Src> FetchStage<Src>
where
    Src: Source + Clone + Send + Sync + 'static,
{
    /// Creates a new fetch stage with the given channels and shutdown token.
    pub fn new(
        config: Arc<PipelineConfig>,
        source: Src,
        batch_tx: mpsc::Sender<Batch<Src::Item, Src::Cookie>>,
        error_tx: mpsc::Sender<StageError>,
        shutdown_rx: ShutdownRx,
    ) -> Self {
        Self {
            config,
            source,
            batch_tx,
            error_tx,
            shutdown_rx,
        }
    }

    /// Runs the stage until end of stream, failure, or shutdown.
    ///
    /// A failure is reported once to the coordinator before the stage exits. The
    /// batch channel closes when the stage drops, letting the process stage drain
    /// to completion.
    pub async fn run(mut self) {
        info!("starting fetch stage");

        if let Err(err) = self.fetch_loop().await {
            error!(error = %err, "fetch stage failed");

            // One slot per stage and at most one report per stage, so this send can
            // never block.
            let _ = self
                .error_tx
                .send(StageError::new(Stage::Fetch, err))
                .await;

            return;
        }

        info!("fetch stage completed");
    }

    async fn fetch_loop(&mut self) -> ConveyorResult<()> {
        let max_size = self.config.batch.max_size;
        let mut buffer = Batch::new();

        loop {
            // We poll the shutdown token between fetches, so a cancellation arriving
            // while no channel operation is pending is still observed promptly.
            if self.shutdown_rx.has_changed().unwrap_or(false) {
                info!("shutting down fetch stage");

                return Ok(());
            }

            let fetch_result = match self.source.fetch().await {
                Ok(fetch_result) => fetch_result,
                Err(err) => {
                    let detail = err.to_string();
                    bail!(
                        ErrorKind::FetchFailed,
                        "Failed to fetch the next page from the source",
                        detail = detail,
                        source: err
                    );
                }
            };

            let (items, cookie) = match fetch_result {
                FetchResult::Page { items, cookie } => (items, cookie),
                FetchResult::EndOfStream => {
                    // The final flush is best effort. End of stream terminates the
                    // stage successfully whether or not the batch could still be
                    // delivered before shutdown.
                    if !buffer.is_empty() {
                        debug!(
                            items = buffer.len(),
                            cookies = buffer.cookie_count(),
                            "flushing final batch"
                        );

                        let _ =
                            send_with_shutdown(&self.batch_tx, buffer, &mut self.shutdown_rx).await;
                    }

                    info!("source reached end of stream");

                    return Ok(());
                }
            };

            if buffer.would_overflow(items.len(), max_size) {
                let full = mem::replace(&mut buffer, Batch::new());

                debug!(
                    items = full.len(),
                    cookies = full.cookie_count(),
                    "flushing full batch"
                );

                if let ShutdownResult::Shutdown(_) =
                    send_with_shutdown(&self.batch_tx, full, &mut self.shutdown_rx).await
                {
                    info!("shutting down fetch stage");

                    return Ok(());
                }
            }

            // The page lands after any flush, so its cookie always travels with the
            // batch that holds its items.
            buffer.push_page(items, cookie);
        }
    }
}
