//! Shared configuration structures for conveyor pipelines.

mod base;
mod batch;
mod pipeline;

pub use base::ValidationError;
pub use batch::BatchConfig;
pub use pipeline::PipelineConfig;
