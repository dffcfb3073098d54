//! Common types used throughout the pipeline.
//!
//! Re-exports the batch buffer and the stage identification types used across the
//! fetch, process, and commit stages and the coordinator.

mod batch;
mod pipeline;
mod stage;

pub use batch::*;
pub use pipeline::*;
pub use stage::*;
