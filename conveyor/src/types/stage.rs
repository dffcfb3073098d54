//! Stage identification used for cascading cancellation.

use std::fmt;

use crate::error::ConveyorError;

/// One concurrently executing phase of the pipeline.
///
/// Stages are ordered by the direction of data flow. The numeric index is what the
/// coordinator's cancellation cascade operates on, a failure in the stage with index
/// `i` closes the shutdown tokens of every stage with index `<= i`.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Stage {
    /// Pulls pages from the source and accumulates them into batches.
    Fetch,
    /// Writes sealed batches to the destination.
    Process,
    /// Acknowledges cookies back to the source.
    Commit,
}

impl Stage {
    /// Number of stages in the pipeline.
    pub const COUNT: usize = 3;

    /// Returns the stable index of this stage, `0` for fetch through `2` for commit.
    pub fn index(&self) -> usize {
        match self {
            Stage::Fetch => 0,
            Stage::Process => 1,
            Stage::Commit => 2,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Fetch => write!(f, "fetch"),
            Stage::Process => write!(f, "process"),
            Stage::Commit => write!(f, "commit"),
        }
    }
}

/// Failure report sent from a stage to the coordinator.
///
/// This pair is the only state shared between stage logic and the coordinator's
/// cascading decision. Each stage reports at most one of these before exiting.
#[derive(Debug)]
pub struct StageError {
    /// The stage that failed.
    pub stage: Stage,
    /// The failure that made it stop.
    pub error: ConveyorError,
}

impl StageError {
    /// Creates a new failure report for `stage`.
    pub fn new(stage: Stage, error: ConveyorError) -> Self {
        Self { stage, error }
    }
}
