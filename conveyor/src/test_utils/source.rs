use std::collections::VecDeque;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::info;

use crate::conveyor_error;
use crate::error::{ConveyorResult, ErrorKind};
use crate::source::{FetchResult, Source};

struct Inner<I> {
    pages: VecDeque<(Vec<I>, u64)>,
    fetch_calls: usize,
    fail_on_fetch: Option<usize>,
    fail_on_acknowledge: Option<u64>,
    fetched_cookies: Vec<u64>,
    acknowledged_cookies: Vec<u64>,
}

/// In-memory source for tests that serves a scripted sequence of pages.
///
/// Pages are handed out in script order, followed by end of stream once the script
/// is exhausted. The source records the cookies it handed out and the cookies that
/// were acknowledged, so tests can assert on the exact acknowledgement order after
/// a pipeline has terminated.
///
/// Faults can be injected at a specific fetch call or at the acknowledgement of a
/// specific cookie.
#[derive(Clone)]
pub struct MemorySource<I> {
    inner: Arc<Mutex<Inner<I>>>,
}

impl<I> MemorySource<I>
where
    I: Send + 'static,
{
    /// Creates a new source serving the given `(items, cookie)` pages in order.
    pub fn new(pages: Vec<(Vec<I>, u64)>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                pages: pages.into(),
                fetch_calls: 0,
                fail_on_fetch: None,
                fail_on_acknowledge: None,
                fetched_cookies: Vec::new(),
                acknowledged_cookies: Vec::new(),
            })),
        }
    }

    /// Makes the fetch with the given zero-based call index fail.
    pub async fn fail_on_fetch(&self, call_index: usize) {
        let mut inner = self.inner.lock().await;
        inner.fail_on_fetch = Some(call_index);
    }

    /// Makes the acknowledgement of the given cookie fail.
    pub async fn fail_on_acknowledge(&self, cookie: u64) {
        let mut inner = self.inner.lock().await;
        inner.fail_on_acknowledge = Some(cookie);
    }

    /// Returns the cookies handed out so far, in fetch order.
    pub async fn fetched_cookies(&self) -> Vec<u64> {
        let inner = self.inner.lock().await;
        inner.fetched_cookies.clone()
    }

    /// Returns the cookies acknowledged so far, in acknowledgement order.
    pub async fn acknowledged_cookies(&self) -> Vec<u64> {
        let inner = self.inner.lock().await;
        inner.acknowledged_cookies.clone()
    }
}

impl<I> Source for MemorySource<I>
where
    I: Send + 'static,
{
    type Item = I;
    type Cookie = u64;

    async fn fetch(&self) -> ConveyorResult<FetchResult<I, u64>> {
        let mut inner = self.inner.lock().await;

        let call_index = inner.fetch_calls;
        inner.fetch_calls += 1;

        if inner.fail_on_fetch == Some(call_index) {
            return Err(conveyor_error!(
                ErrorKind::Unknown,
                "Injected fetch failure",
                format!("fetch call {call_index} was set up to fail")
            ));
        }

        let Some((items, cookie)) = inner.pages.pop_front() else {
            info!("memory source reached end of stream");

            return Ok(FetchResult::EndOfStream);
        };

        inner.fetched_cookies.push(cookie);

        info!(items = items.len(), cookie, "serving page from memory source");

        Ok(FetchResult::Page { items, cookie })
    }

    async fn acknowledge(&self, cookie: u64) -> ConveyorResult<()> {
        let mut inner = self.inner.lock().await;

        if inner.fail_on_acknowledge == Some(cookie) {
            return Err(conveyor_error!(
                ErrorKind::Unknown,
                "Injected acknowledgement failure",
                format!("acknowledgement of cookie {cookie} was set up to fail")
            ));
        }

        inner.acknowledged_cookies.push(cookie);

        info!(cookie, "acknowledged cookie in memory source");

        Ok(())
    }
}
