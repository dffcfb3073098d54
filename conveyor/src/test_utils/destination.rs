use std::sync::Arc;

use tokio::sync::{Mutex, Notify};
use tracing::info;

use crate::conveyor_error;
use crate::destination::Destination;
use crate::error::{ConveyorResult, ErrorKind};
use crate::test_utils::notify::TimedNotify;

type BatchCondition<I> = Box<dyn Fn(&[Vec<I>]) -> bool + Send + Sync>;

struct Inner<I> {
    batches: Vec<Vec<I>>,
    write_calls: usize,
    fail_on_write: Option<usize>,
    batch_conditions: Vec<(BatchCondition<I>, Arc<Notify>)>,
}

impl<I: Clone> Inner<I> {
    fn check_conditions(&mut self) {
        let batches = self.batches.clone();
        self.batch_conditions.retain(|(condition, notify)| {
            let should_retain = !condition(&batches);
            if !should_retain {
                notify.notify_one();
            }
            should_retain
        });
    }
}

/// In-memory destination for tests that records every written batch.
///
/// Batches are stored in write order, so after a pipeline has terminated a test can
/// assert on exactly which item sequences were handed over and how they were split.
/// A specific write call can be told to fail, and tests can wait until a number of
/// batches has arrived before acting on a running pipeline.
#[derive(Clone)]
pub struct MemoryDestination<I> {
    inner: Arc<Mutex<Inner<I>>>,
}

impl<I> MemoryDestination<I>
where
    I: Clone + Send + 'static,
{
    /// Creates a new empty memory destination.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                batches: Vec::new(),
                write_calls: 0,
                fail_on_write: None,
                batch_conditions: Vec::new(),
            })),
        }
    }

    /// Makes the write with the given zero-based call index fail.
    ///
    /// The failing write records nothing, from the pipeline's point of view that
    /// batch was never durably written.
    pub async fn fail_on_write(&self, call_index: usize) {
        let mut inner = self.inner.lock().await;
        inner.fail_on_write = Some(call_index);
    }

    /// Returns all batches written so far, in write order.
    pub async fn batches(&self) -> Vec<Vec<I>> {
        let inner = self.inner.lock().await;
        inner.batches.clone()
    }

    /// Waits until at least `count` batches have been written.
    ///
    /// Returns immediately if the condition already holds. Panics after a timeout,
    /// so a test waiting on a pipeline that stalled fails fast instead of hanging.
    pub async fn wait_for_batches(&self, count: usize) {
        let notify = {
            let mut inner = self.inner.lock().await;

            let notify = Arc::new(Notify::new());
            inner
                .batch_conditions
                .push((Box::new(move |batches| batches.len() >= count), notify.clone()));

            // The condition may already hold, in which case this stores the permit
            // that makes the wait below return immediately.
            inner.check_conditions();

            notify
        };

        TimedNotify::new(notify).notified().await;
    }
}

impl<I> Default for MemoryDestination<I>
where
    I: Clone + Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<I> Destination for MemoryDestination<I>
where
    I: Clone + Send + 'static,
{
    type Item = I;

    async fn write_batch(&self, items: Vec<I>) -> ConveyorResult<()> {
        let mut inner = self.inner.lock().await;

        let call_index = inner.write_calls;
        inner.write_calls += 1;

        if inner.fail_on_write == Some(call_index) {
            return Err(conveyor_error!(
                ErrorKind::Unknown,
                "Injected write failure",
                format!("write call {call_index} was set up to fail")
            ));
        }

        info!(items = items.len(), "writing batch to memory destination");

        inner.batches.push(items);
        inner.check_conditions();

        Ok(())
    }
}
