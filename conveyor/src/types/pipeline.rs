//! Pipeline identification.

/// Unique identifier for a pipeline instance.
///
/// The id is attached to every tracing span the pipeline creates, so multiple
/// pipelines can share a process without their logs blending together.
pub type PipelineId = u64;
