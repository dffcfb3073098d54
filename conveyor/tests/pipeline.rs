#![cfg(feature = "test-utils")]

use std::sync::Arc;

use conveyor::destination::Destination;
use conveyor::error::{ConveyorResult, ErrorKind};
use conveyor::pipeline::Pipeline;
use conveyor::source::{FetchResult, Source};
use conveyor::test_utils::destination::MemoryDestination;
use conveyor::test_utils::source::MemorySource;
use conveyor::types::PipelineId;
use conveyor_config::shared::{BatchConfig, PipelineConfig};
use conveyor_telemetry::tracing::init_test_tracing;
use rand::random;
use tokio::sync::Mutex;

/// Creates a pipeline over the given source and destination with a batch size limit.
fn create_pipeline<Src, Dst>(max_size: usize, source: Src, destination: Dst) -> Pipeline<Src, Dst>
where
    Src: Source + Clone + Send + Sync + 'static,
    Dst: Destination<Item = Src::Item> + Clone + Send + Sync + 'static,
{
    let pipeline_id: PipelineId = random();
    let config = PipelineConfig {
        id: pipeline_id,
        batch: BatchConfig { max_size },
        ack_buffer_size: PipelineConfig::DEFAULT_ACK_BUFFER_SIZE,
    };

    Pipeline::new(pipeline_id, config, source, destination)
}

struct EndlessInner {
    next_cookie: u64,
    fetched_cookies: Vec<u64>,
    acknowledged_cookies: Vec<u64>,
}

/// Source that never reaches end of stream, used for shutdown tests.
#[derive(Clone)]
struct EndlessSource {
    inner: Arc<Mutex<EndlessInner>>,
}

impl EndlessSource {
    fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(EndlessInner {
                next_cookie: 0,
                fetched_cookies: Vec::new(),
                acknowledged_cookies: Vec::new(),
            })),
        }
    }

    async fn fetched_cookies(&self) -> Vec<u64> {
        let inner = self.inner.lock().await;
        inner.fetched_cookies.clone()
    }

    async fn acknowledged_cookies(&self) -> Vec<u64> {
        let inner = self.inner.lock().await;
        inner.acknowledged_cookies.clone()
    }
}

impl Source for EndlessSource {
    type Item = u64;
    type Cookie = u64;

    async fn fetch(&self) -> ConveyorResult<FetchResult<u64, u64>> {
        let mut inner = self.inner.lock().await;

        inner.next_cookie += 1;
        let cookie = inner.next_cookie;
        inner.fetched_cookies.push(cookie);

        Ok(FetchResult::Page {
            items: vec![cookie],
            cookie,
        })
    }

    async fn acknowledge(&self, cookie: u64) -> ConveyorResult<()> {
        let mut inner = self.inner.lock().await;
        inner.acknowledged_cookies.push(cookie);

        Ok(())
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn pipeline_processes_single_batch_and_acknowledges_in_order() {
    init_test_tracing();

    let source = MemorySource::new(vec![(vec!["a", "b", "c"], 1), (vec!["d", "e"], 2)]);
    let destination = MemoryDestination::new();

    let pipeline = create_pipeline(10, source.clone(), destination.clone());
    pipeline.run().await.unwrap();

    assert_eq!(
        destination.batches().await,
        vec![vec!["a", "b", "c", "d", "e"]]
    );
    assert_eq!(source.acknowledged_cookies().await, vec![1, 2]);
}

#[tokio::test(flavor = "multi_thread")]
async fn pipeline_splits_batches_on_overflow() {
    init_test_tracing();

    let source = MemorySource::new(vec![
        (vec!["a", "b", "c"], 1),
        (vec!["d", "e"], 2),
        (vec!["f", "g", "h"], 3),
    ]);
    let destination = MemoryDestination::new();

    let pipeline = create_pipeline(5, source.clone(), destination.clone());
    pipeline.run().await.unwrap();

    // The third page would overflow the batch, so it starts a fresh one.
    assert_eq!(
        destination.batches().await,
        vec![vec!["a", "b", "c", "d", "e"], vec!["f", "g", "h"]]
    );
    assert_eq!(source.acknowledged_cookies().await, vec![1, 2, 3]);
}

#[tokio::test(flavor = "multi_thread")]
async fn pipeline_does_not_flush_on_exact_fit() {
    init_test_tracing();

    let source = MemorySource::new(vec![(vec!["a", "b", "c"], 1), (vec!["d", "e"], 2)]);
    let destination = MemoryDestination::new();

    let pipeline = create_pipeline(5, source.clone(), destination.clone());
    pipeline.run().await.unwrap();

    // The second page fills the batch to exactly the limit and is folded in.
    assert_eq!(
        destination.batches().await,
        vec![vec!["a", "b", "c", "d", "e"]]
    );
    assert_eq!(source.acknowledged_cookies().await, vec![1, 2]);
}

#[tokio::test(flavor = "multi_thread")]
async fn pipeline_passes_oversized_page_through_unsplit() {
    init_test_tracing();

    let source = MemorySource::new(vec![(vec!["a", "b", "c"], 1)]);
    let destination = MemoryDestination::new();

    let pipeline = create_pipeline(2, source.clone(), destination.clone());
    pipeline.run().await.unwrap();

    // A page bigger than the limit flushes the current buffer, even an empty one,
    // and is then delivered as a single oversized batch.
    assert_eq!(
        destination.batches().await,
        vec![vec![], vec!["a", "b", "c"]]
    );
    assert_eq!(source.acknowledged_cookies().await, vec![1]);
}

#[tokio::test(flavor = "multi_thread")]
async fn pipeline_succeeds_with_empty_source() {
    init_test_tracing();

    let source: MemorySource<&'static str> = MemorySource::new(vec![]);
    let destination = MemoryDestination::new();

    let pipeline = create_pipeline(5, source.clone(), destination.clone());
    pipeline.run().await.unwrap();

    assert!(destination.batches().await.is_empty());
    assert!(source.acknowledged_cookies().await.is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn pipeline_delivers_cookie_of_empty_page() {
    init_test_tracing();

    let source = MemorySource::new(vec![(vec!["a"], 1), (vec![], 2), (vec!["b"], 3)]);
    let destination = MemoryDestination::new();

    let pipeline = create_pipeline(3, source.clone(), destination.clone());
    pipeline.run().await.unwrap();

    // The empty page contributes no items but its cookie is still acknowledged.
    assert_eq!(destination.batches().await, vec![vec!["a", "b"]]);
    assert_eq!(source.acknowledged_cookies().await, vec![1, 2, 3]);
}

#[tokio::test(flavor = "multi_thread")]
async fn pipeline_drops_cookie_only_buffer_at_end_of_stream() {
    init_test_tracing();

    let source: MemorySource<&'static str> = MemorySource::new(vec![(vec![], 1), (vec![], 2)]);
    let destination = MemoryDestination::new();

    let pipeline = create_pipeline(3, source.clone(), destination.clone());
    pipeline.run().await.unwrap();

    // A buffer holding only cookies has nothing to write, so end of stream drops
    // it and the cookies are never acknowledged.
    assert!(destination.batches().await.is_empty());
    assert!(source.acknowledged_cookies().await.is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn pipeline_reports_fetch_failure() {
    init_test_tracing();

    let source = MemorySource::new(vec![(vec!["a", "b"], 1)]);
    source.fail_on_fetch(1).await;
    let destination = MemoryDestination::new();

    let pipeline = create_pipeline(10, source.clone(), destination.clone());
    let err = pipeline.run().await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::FetchFailed);

    // The buffer was never sealed, so nothing reached the destination and no
    // cookie was acknowledged.
    assert!(destination.batches().await.is_empty());
    assert!(source.acknowledged_cookies().await.is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn pipeline_processes_batches_sealed_before_fetch_failure() {
    init_test_tracing();

    let source = MemorySource::new(vec![(vec!["a", "b"], 1), (vec!["c"], 2)]);
    source.fail_on_fetch(2).await;
    let destination = MemoryDestination::new();

    let pipeline = create_pipeline(2, source.clone(), destination.clone());
    let err = pipeline.run().await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::FetchFailed);

    // The first batch was sealed and sent before the failing fetch, so the
    // downstream stages drain it to completion.
    assert_eq!(destination.batches().await, vec![vec!["a", "b"]]);
    assert_eq!(source.acknowledged_cookies().await, vec![1]);
}

#[tokio::test(flavor = "multi_thread")]
async fn pipeline_reports_process_failure_without_acknowledgements() {
    init_test_tracing();

    let source = MemorySource::new(vec![(vec!["x", "y"], 1), (vec!["z"], 2)]);
    let destination = MemoryDestination::new();
    destination.fail_on_write(0).await;

    let pipeline = create_pipeline(2, source.clone(), destination.clone());
    let err = pipeline.run().await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::ProcessFailed);

    // The failing write recorded nothing and no cookie of the failed batch, or
    // any later batch, was ever acknowledged.
    assert!(destination.batches().await.is_empty());
    assert!(source.acknowledged_cookies().await.is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn pipeline_keeps_acknowledgements_made_before_process_failure() {
    init_test_tracing();

    let source = MemorySource::new(vec![(vec!["x", "y"], 1), (vec!["z"], 2)]);
    let destination = MemoryDestination::new();
    destination.fail_on_write(1).await;

    let pipeline = create_pipeline(2, source.clone(), destination.clone());
    let err = pipeline.run().await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::ProcessFailed);

    // The first batch was written and its cookie forwarded before the second
    // write failed, so its acknowledgement survives.
    assert_eq!(destination.batches().await, vec![vec!["x", "y"]]);
    assert_eq!(source.acknowledged_cookies().await, vec![1]);
}

#[tokio::test(flavor = "multi_thread")]
async fn pipeline_reports_commit_failure_and_stops_acknowledging() {
    init_test_tracing();

    let source = MemorySource::new(vec![(vec!["a"], 1), (vec!["b"], 2), (vec!["c"], 3)]);
    source.fail_on_acknowledge(2).await;
    let destination = MemoryDestination::new();

    let pipeline = create_pipeline(1, source.clone(), destination.clone());
    let err = pipeline.run().await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::CommitFailed);

    // Cookies acknowledged before the failure remain acknowledged, cookies after
    // it are never delivered.
    assert_eq!(source.acknowledged_cookies().await, vec![1]);
}

#[tokio::test(flavor = "multi_thread")]
async fn pipeline_aggregates_failures_from_multiple_stages() {
    init_test_tracing();

    let source = MemorySource::new(vec![(vec!["x", "y"], 1), (vec!["z"], 2)]);
    source.fail_on_fetch(2).await;
    let destination = MemoryDestination::new();
    destination.fail_on_write(0).await;

    let pipeline = create_pipeline(2, source.clone(), destination.clone());
    let err = pipeline.run().await.unwrap_err();

    // The fetch stage fails after sealing the first batch and the process stage
    // fails writing that same batch, so both failures must be visible in the
    // aggregate.
    let kinds = err.kinds();
    assert_eq!(kinds.len(), 2);
    assert!(kinds.contains(&ErrorKind::FetchFailed));
    assert!(kinds.contains(&ErrorKind::ProcessFailed));

    assert!(destination.batches().await.is_empty());
    assert!(source.acknowledged_cookies().await.is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn pipeline_shutdown_stops_endless_source() {
    init_test_tracing();

    let source = EndlessSource::new();
    let destination = MemoryDestination::new();

    let mut pipeline = create_pipeline(3, source.clone(), destination.clone());
    pipeline.start().await.unwrap();

    // Let the pipeline make progress before stopping it.
    destination.wait_for_batches(1).await;

    pipeline.shutdown_and_wait().await.unwrap();

    // Whatever was acknowledged must be a prefix, in fetch order, of what was
    // handed out.
    let fetched = source.fetched_cookies().await;
    let acknowledged = source.acknowledged_cookies().await;

    assert!(!fetched.is_empty());
    assert!(acknowledged.len() <= fetched.len());
    assert_eq!(acknowledged.as_slice(), &fetched[..acknowledged.len()]);
}

#[tokio::test(flavor = "multi_thread")]
async fn pipeline_wait_before_start_returns_ok() {
    init_test_tracing();

    let source: MemorySource<&'static str> = MemorySource::new(vec![]);
    let destination = MemoryDestination::new();

    let pipeline = create_pipeline(5, source, destination);

    pipeline.shutdown();
    pipeline.wait().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn pipeline_rejects_invalid_configuration() {
    init_test_tracing();

    let source: MemorySource<&'static str> = MemorySource::new(vec![]);
    let destination = MemoryDestination::new();

    let pipeline = create_pipeline(0, source, destination);
    let err = pipeline.run().await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::ConfigError);
}
