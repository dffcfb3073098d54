//! Data source abstraction for pipelines.
//!
//! This module provides the core [`Source`] trait for systems that hand out paginated
//! data and expect per-page acknowledgements once that data has been durably written.

use std::future::Future;

use crate::error::ConveyorResult;

/// Outcome of a single [`Source::fetch`] call.
///
/// End of stream is a dedicated variant rather than a reserved cookie value, so a
/// source can never be misread as exhausted because of the cookie it produced.
#[derive(Debug)]
pub enum FetchResult<I, C> {
    /// One fetched page, its items and the cookie that acknowledges them.
    ///
    /// A page may carry zero items. The cookie is still valid and must be
    /// acknowledged once the batch it ends up in has been processed.
    Page { items: Vec<I>, cookie: C },
    /// The source has no more pages. Terminates the pipeline normally.
    EndOfStream,
}

/// Trait for systems that produce paginated data for pipelines.
///
/// [`Source`] implementations hand out pages of items, each paired with an opaque
/// acknowledgement cookie. The pipeline guarantees that [`Source::acknowledge`] is
/// called exactly once per cookie, in fetch order, and only after the batch holding
/// that cookie's items has been successfully written to the destination.
///
/// Fetching and acknowledging run concurrently from different stages, which is why
/// implementations must be cloneable and safe to share across tasks.
pub trait Source {
    /// Unit of payload handed to the destination. Content is opaque to the pipeline,
    /// only order and batch membership matter.
    type Item: Send + 'static;

    /// Opaque acknowledgement token tied to one fetch call.
    type Cookie: Send + 'static;

    /// Fetches the next page from the source.
    ///
    /// Returns [`FetchResult::EndOfStream`] when the source is exhausted. An error
    /// terminates the pipeline with a fetch failure, nothing fetched by this call or
    /// any later call reaches the destination.
    fn fetch(&self) -> impl Future<Output = ConveyorResult<FetchResult<Self::Item, Self::Cookie>>> + Send;

    /// Acknowledges one cookie back to the source.
    ///
    /// Called in fetch order, after the batch containing the cookie's items has been
    /// written. An error terminates the pipeline with a commit failure and no further
    /// cookie is acknowledged.
    fn acknowledge(&self, cookie: Self::Cookie) -> impl Future<Output = ConveyorResult<()>> + Send;
}
