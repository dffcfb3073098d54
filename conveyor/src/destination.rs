//! Data destination abstraction for pipelines.
//!
//! This module provides the core [`Destination`] trait for systems that receive
//! batched data from a pipeline.

use std::future::Future;

use crate::error::ConveyorResult;

/// Trait for systems that durably write batches of items.
///
/// [`Destination`] implementations define where batched data ends up. The pipeline
/// hands over one sealed batch at a time and only acknowledges the source once the
/// write has succeeded, so implementations should return an error whenever the data
/// cannot be considered durable.
///
/// Batches arrive in fetch order and at most one write is in flight at a time.
pub trait Destination {
    /// Unit of payload received from the source.
    type Item: Send + 'static;

    /// Writes one batch of items to the destination.
    ///
    /// Item order within the batch is fetch order. An error terminates the pipeline
    /// with a process failure and none of the batch's cookies are acknowledged.
    fn write_batch(&self, items: Vec<Self::Item>) -> impl Future<Output = ConveyorResult<()>> + Send;
}
