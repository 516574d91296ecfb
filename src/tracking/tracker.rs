use std::{
    any::Any,
    future::Future,
    panic::AssertUnwindSafe,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use futures::{FutureExt, future::BoxFuture};
use log::warn;
use parking_lot::Mutex;
use tokio::{sync::Semaphore, time};

use crate::error::{Result, TrainErr};

/// How often cooperative waits check the remaining units again.
pub const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// A type erased unit consumer.
pub type Consumer<T> = Arc<dyn Fn(T) -> BoxFuture<'static, Result<()>> + Send + Sync>;

/// Completion bookkeeping shared between a tracker and its in-flight units.
#[derive(Debug, Default)]
pub(super) struct Ledger {
    remains: AtomicUsize,
    first_err: Mutex<Option<TrainErr>>,
}

impl Ledger {
    /// Registers a new in-flight unit.
    ///
    /// # Returns
    /// The unit's `Completion`, it must travel with the unit.
    pub(super) fn open(self: &Arc<Self>) -> Completion {
        self.remains.fetch_add(1, Ordering::AcqRel);
        Completion {
            ledger: Arc::clone(self),
        }
    }

    pub(super) fn remains(&self) -> usize {
        self.remains.load(Ordering::Acquire)
    }

    /// Takes the first error recorded since the last call.
    pub(super) fn take_err(&self) -> Option<TrainErr> {
        self.first_err.lock().take()
    }

    fn record(&self, err: TrainErr) {
        warn!("unit completed with an error: {err}");

        let mut first = self.first_err.lock();
        if first.is_none() {
            *first = Some(err);
        }
    }
}

/// The completion signal of one unit.
///
/// Dropping it marks the unit as completed, so it happens exactly once
/// whichever way the unit ends.
#[derive(Debug)]
pub(super) struct Completion {
    ledger: Arc<Ledger>,
}

impl Completion {
    /// Completes the unit with `res`.
    pub(super) fn finish(self, res: Result<()>) {
        if let Err(e) = res {
            self.ledger.record(e);
        }
    }
}

impl Drop for Completion {
    fn drop(&mut self) {
        self.ledger.remains.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Runs a unit's future, a panic inside it becomes a `UnitFailed` error.
pub(super) async fn run_unit(fut: BoxFuture<'static, Result<()>>) -> Result<()> {
    match AssertUnwindSafe(fut).catch_unwind().await {
        Ok(res) => res,
        Err(panic) => Err(TrainErr::UnitFailed(panic_message(panic.as_ref()))),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|msg| msg.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unit panicked".to_string())
}

/// Tracks asynchronous units of work handed to a registered consumer.
///
/// Every added unit runs as its own task. `num_remains` counts the units
/// added minus the units completed, for backpressure only.
pub struct Tracker<T> {
    consumer: Option<Consumer<T>>,
    ledger: Arc<Ledger>,
    permits: Option<Arc<Semaphore>>,
}

impl<T: Send + 'static> Default for Tracker<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Send + 'static> Tracker<T> {
    /// Creates a new `Tracker` without a consumer.
    pub fn new() -> Self {
        Self {
            consumer: None,
            ledger: Arc::new(Ledger::default()),
            permits: None,
        }
    }

    /// Caps how many units run their consumer at the same time.
    ///
    /// Waiting units still count as remaining.
    pub fn with_concurrency(mut self, n: usize) -> Self {
        self.permits = Some(Arc::new(Semaphore::new(n.max(1))));
        self
    }

    /// Registers the consumer every unit is dispatched to.
    ///
    /// The unit completes when the returned future resolves, its error (or
    /// panic) is surfaced through `wait_drained`.
    pub fn set_consumer<F, Fut>(&mut self, f: F)
    where
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.consumer = Some(Arc::new(move |unit| f(unit).boxed()));
    }

    /// Dispatches `units` to the consumer.
    ///
    /// Must be called from within a tokio runtime. Order of execution is not
    /// the order of submission.
    ///
    /// # Returns
    /// `Uninitialized` if no consumer was registered.
    pub fn add<I>(&self, units: I) -> Result<()>
    where
        I: IntoIterator<Item = T>,
    {
        let consumer = self
            .consumer
            .as_ref()
            .ok_or(TrainErr::Uninitialized("tracker consumer"))?;

        for unit in units {
            let done = self.ledger.open();
            let consumer = Arc::clone(consumer);
            let permits = self.permits.clone();

            tokio::spawn(async move {
                let _permit = match permits {
                    Some(permits) => permits.acquire_owned().await.ok(),
                    None => None,
                };

                let res = run_unit(async move { consumer(unit).await }.boxed()).await;
                done.finish(res);
            });
        }

        Ok(())
    }

    /// The amount of added units that haven't completed yet.
    pub fn num_remains(&self) -> usize {
        self.ledger.remains()
    }

    /// Yields until fewer than `threshold` units remain.
    ///
    /// # Arguments
    /// * `threshold` - The bound, at least 1.
    /// * `poll` - How long to sleep between checks.
    pub async fn wait_below(&self, threshold: usize, poll: Duration) {
        let threshold = threshold.max(1);
        while self.num_remains() >= threshold {
            time::sleep(poll).await;
        }
    }

    /// Yields until every added unit completed.
    ///
    /// # Returns
    /// The first unit error seen since the last drain.
    pub async fn wait_drained(&self, poll: Duration) -> Result<()> {
        self.wait_below(1, poll).await;
        self.take_error().map_or(Ok(()), Err)
    }

    /// Takes the first unit error seen since the last call.
    pub fn take_error(&self) -> Option<TrainErr> {
        self.ledger.take_err()
    }
}
