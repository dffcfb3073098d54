use std::sync::Arc;

use conveyor_config::shared::PipelineConfig;
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{Instrument, debug, error, info};

use crate::concurrency::shutdown::{ShutdownTx, create_shutdown_channel};
use crate::conveyor_error;
use crate::destination::Destination;
use crate::error::{ConveyorError, ConveyorResult, ErrorKind};
use crate::source::Source;
use crate::stages::commit::CommitStage;
use crate::stages::fetch::FetchStage;
use crate::stages::process::ProcessStage;
use crate::types::{PipelineId, Stage, StageError};

/// Capacity of the batch channel between the fetch and process stages.
///
/// One slot means at most one sealed batch waits while the next one is being
/// accumulated, which makes this channel the pipeline's backpressure point.
const BATCH_CHANNEL_SIZE: usize = 1;

#[derive(Debug)]
enum PipelineState {
    NotStarted,
    Started {
        /// Shutdown tokens indexed by stage, so the cascade can address them by
        /// failing stage index.
        shutdown_txs: Vec<ShutdownTx>,
        /// Owns the three spawned stage tasks.
        stage_tasks: JoinSet<()>,
        /// Task draining stage failure reports and driving the cascade.
        errors_watcher: JoinHandle<Vec<ConveyorError>>,
    },
}

/// Coordinator running the fetch, process, and commit stages of one pipeline.
///
/// [`Pipeline`] owns the stage lifecycle and the cascading cancellation policy. The
/// stages run concurrently and communicate only through bounded channels. When a
/// stage fails, the coordinator closes the shutdown tokens of that stage and every
/// stage upstream of it, while downstream stages drain the work already in flight to
/// natural completion. All failures raised during a run are aggregated into a single
/// error returned from [`Pipeline::wait`].
#[derive(Debug)]
pub struct Pipeline<Src, Dst> {
    id: PipelineId,
    config: Arc<PipelineConfig>,
    source: Src,
    destination: Dst,
    state: PipelineState,
}

impl<Src, Dst> Pipeline<Src, Dst>
where
    Src: Source + Clone + Send + Sync + 'static,
    Dst: Destination<Item = Src::Item> + Clone + Send + Sync + 'static,
{
    /// Creates a new pipeline in the not-started state.
    pub fn new(id: PipelineId, config: PipelineConfig, source: Src, destination: Dst) -> Self {
        Self {
            id,
            config: Arc::new(config),
            source,
            destination,
            state: PipelineState::NotStarted,
        }
    }

    /// Returns the identifier of this pipeline.
    pub fn id(&self) -> PipelineId {
        self.id
    }

    /// Starts the three stages and the errors watcher.
    ///
    /// Fails if the configuration is invalid. Once this returns, the pipeline is
    /// running and [`Pipeline::wait`] collects its outcome.
    pub async fn start(&mut self) -> ConveyorResult<()> {
        info!("starting pipeline with id {}", self.id);

        self.config.validate()?;

        // One slot per stage and every stage reports at most once, so no stage can
        // ever block on reporting its failure.
        let (error_tx, error_rx) = mpsc::channel(Stage::COUNT);

        let (batch_tx, batch_rx) = mpsc::channel(BATCH_CHANNEL_SIZE);
        let (cookie_tx, cookie_rx) = mpsc::channel(self.config.ack_buffer_size);

        // We create one shutdown token per stage, in stage index order. Per-stage
        // tokens are what lets the cascade stop the failing stage and its upstream
        // neighbors while leaving downstream stages free to drain.
        let (fetch_shutdown_tx, fetch_shutdown_rx) = create_shutdown_channel();
        let (process_shutdown_tx, process_shutdown_rx) = create_shutdown_channel();
        let (commit_shutdown_tx, commit_shutdown_rx) = create_shutdown_channel();
        let shutdown_txs = vec![fetch_shutdown_tx, process_shutdown_tx, commit_shutdown_tx];

        let fetch_stage = FetchStage::new(
            self.config.clone(),
            self.source.clone(),
            batch_tx,
            error_tx.clone(),
            fetch_shutdown_rx,
        );
        let process_stage = ProcessStage::new(
            self.destination.clone(),
            batch_rx,
            cookie_tx,
            error_tx.clone(),
            process_shutdown_rx,
        );
        let commit_stage = CommitStage::new(
            self.source.clone(),
            cookie_rx,
            error_tx.clone(),
            commit_shutdown_rx,
        );

        // Only the stages may hold senders for the error channel, the watcher ends
        // when the last stage drops its clone.
        drop(error_tx);

        let mut stage_tasks = JoinSet::new();
        stage_tasks.spawn(
            fetch_stage
                .run()
                .instrument(tracing::info_span!("fetch_stage", pipeline_id = self.id).or_current()),
        );
        stage_tasks.spawn(process_stage.run().instrument(
            tracing::info_span!("process_stage", pipeline_id = self.id).or_current(),
        ));
        stage_tasks.spawn(
            commit_stage
                .run()
                .instrument(tracing::info_span!("commit_stage", pipeline_id = self.id).or_current()),
        );

        // The watcher runs detached from the wait barrier, so cascading can happen
        // while the caller is still waiting for stages to finish.
        let errors_watcher = tokio::spawn(
            watch_stage_errors(error_rx, shutdown_txs.clone()).instrument(
                tracing::info_span!("errors_watcher", pipeline_id = self.id).or_current(),
            ),
        );

        self.state = PipelineState::Started {
            shutdown_txs,
            stage_tasks,
            errors_watcher,
        };

        Ok(())
    }

    /// Waits for the pipeline to terminate and returns its aggregated outcome.
    ///
    /// Returns `Ok` only if every stage reached natural completion without failure.
    /// If one or more stages failed, all reported errors are combined into a single
    /// aggregate error whose kinds can be inspected individually.
    pub async fn wait(self) -> ConveyorResult<()> {
        let PipelineState::Started {
            shutdown_txs,
            mut stage_tasks,
            errors_watcher,
        } = self.state
        else {
            info!("pipeline was not started, nothing to wait for");

            return Ok(());
        };

        info!("waiting for pipeline stages to complete");

        let mut errors = vec![];

        // We wait for the stages first. Once every stage has exited, the watcher is
        // left without senders and finishes right after.
        while let Some(result) = stage_tasks.join_next().await {
            if let Err(err) = result {
                if err.is_cancelled() {
                    debug!("stage task was cancelled");
                } else {
                    // A panicked stage never reports through the error channel, so
                    // the cascade does not run for it. Stopping intake is enough,
                    // the surviving stages drain and exit through channel closures.
                    shutdown_txs[Stage::Fetch.index()].shutdown();

                    errors.push(conveyor_error!(
                        ErrorKind::StagePanic,
                        "Pipeline stage panicked",
                        err
                    ));
                }
            }
        }

        match errors_watcher.await {
            Ok(stage_errors) => errors.extend(stage_errors),
            Err(err) => errors.push(conveyor_error!(
                ErrorKind::StagePanic,
                "Pipeline errors watcher panicked",
                err
            )),
        }

        if !errors.is_empty() {
            return Err(errors.into());
        }

        info!("pipeline completed successfully");

        Ok(())
    }

    /// Requests a stop of the whole pipeline.
    ///
    /// Closes every stage's shutdown token. Stages abandon whatever channel
    /// operation they are blocked on and exit cleanly, and a subsequent
    /// [`Pipeline::wait`] returns success.
    pub fn shutdown(&self) {
        let PipelineState::Started { shutdown_txs, .. } = &self.state else {
            info!("pipeline was not started, nothing to shut down");

            return;
        };

        info!("shutting down pipeline");

        // Highest index first, the same direction the failure cascade walks.
        for shutdown_tx in shutdown_txs.iter().rev() {
            shutdown_tx.shutdown();
        }
    }

    /// Requests a stop and waits for the pipeline to terminate.
    pub async fn shutdown_and_wait(self) -> ConveyorResult<()> {
        self.shutdown();
        self.wait().await
    }

    /// Runs the pipeline to completion.
    ///
    /// Equivalent to [`Pipeline::start`] followed by [`Pipeline::wait`].
    pub async fn run(mut self) -> ConveyorResult<()> {
        self.start().await?;
        self.wait().await
    }
}

/// Drains stage failure reports and drives the cancellation cascade.
///
/// For a failure in stage `i`, the shutdown tokens of all stages with index `<= i`
/// are closed, the failing stage itself and everything upstream of it. Downstream
/// stages are deliberately left running, they observe the resulting channel closures
/// and drain the work already in flight to natural completion. Cancelling them too
/// could strand buffered work and deadlock the drain.
async fn watch_stage_errors(
    mut error_rx: mpsc::Receiver<StageError>,
    shutdown_txs: Vec<ShutdownTx>,
) -> Vec<ConveyorError> {
    let mut errors = vec![];

    while let Some(stage_error) = error_rx.recv().await {
        if errors.is_empty() {
            info!(stage = %stage_error.stage, "stage failed, draining pipeline");
        }

        error!(
            stage = %stage_error.stage,
            error = %stage_error.error,
            "stage reported a failure"
        );

        for shutdown_tx in shutdown_txs[..=stage_error.stage.index()].iter().rev() {
            shutdown_tx.shutdown();
        }

        errors.push(stage_error.error);
    }

    errors
}
