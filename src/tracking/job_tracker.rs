use std::{
    future::Future,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use futures::FutureExt;
use log::debug;
use tokio::sync::mpsc;
use tokio_util::task::TaskTracker;

use super::{
    Job, Tracker,
    tracker::{Completion, Consumer, Ledger, run_unit},
};
use crate::{
    config::{DispatchKind, Mode},
    error::{Result, TrainErr},
};

/// Picks which worker executes a job.
pub trait Dispatch: Send + Sync {
    /// # Returns
    /// A worker index in `0..num_workers`.
    fn assign(&self, job: &Job, num_workers: usize) -> usize;
}

/// Hands jobs to the workers in turns.
#[derive(Debug, Default)]
pub struct RoundRobin {
    next: AtomicUsize,
}

impl Dispatch for RoundRobin {
    fn assign(&self, _job: &Job, num_workers: usize) -> usize {
        self.next.fetch_add(1, Ordering::Relaxed) % num_workers
    }
}

/// Pins every partition to one worker, `part_idx % num_workers`.
#[derive(Debug, Default)]
pub struct ByPart;

impl Dispatch for ByPart {
    fn assign(&self, job: &Job, num_workers: usize) -> usize {
        job.part_idx % num_workers
    }
}

/// Creates the `Dispatch` strategy for `kind`.
pub fn create_dispatch(kind: DispatchKind) -> Box<dyn Dispatch> {
    match kind {
        DispatchKind::RoundRobin => Box::new(RoundRobin::default()),
        DispatchKind::ByPart => Box::new(ByPart),
    }
}

type Queue = mpsc::UnboundedSender<(Job, Completion)>;

/// A set of workers, each running the jobs of its own queue one at a time.
pub struct WorkerPool {
    num_workers: usize,
    dispatch: Box<dyn Dispatch>,
    queues: Vec<Queue>,
    ledger: Arc<Ledger>,
    tasks: TaskTracker,
}

impl WorkerPool {
    /// Creates a new `WorkerPool`, workers start with the consumer.
    ///
    /// # Arguments
    /// * `num_workers` - The amount of workers, at least one.
    /// * `dispatch` - The job assignment strategy.
    pub fn new(num_workers: usize, dispatch: Box<dyn Dispatch>) -> Self {
        Self {
            num_workers: num_workers.max(1),
            dispatch,
            queues: Vec::new(),
            ledger: Arc::new(Ledger::default()),
            tasks: TaskTracker::new(),
        }
    }

    fn set_consumer(&mut self, consumer: Consumer<Job>) {
        // previous workers finish their queues and exit
        self.queues.clear();

        let queues = (0..self.num_workers)
            .map(|worker_id| self.spawn(worker_id, Arc::clone(&consumer)))
            .collect();
        self.queues = queues;
    }

    fn spawn(&self, worker_id: usize, consumer: Consumer<Job>) -> Queue {
        let (tx, mut rx) = mpsc::unbounded_channel::<(Job, Completion)>();

        let task = async move {
            while let Some((job, done)) = rx.recv().await {
                debug!(worker_id = worker_id, epoch = job.epoch, part = job.part_idx; "running job");

                let consumer = Arc::clone(&consumer);
                let res = run_unit(async move { consumer(job).await }.boxed()).await;
                done.finish(res);
            }

            debug!(worker_id = worker_id; "worker stopped");
        };

        self.tasks.spawn(task);
        tx
    }

    fn add(&self, jobs: Vec<Job>) -> Result<()> {
        if self.queues.is_empty() {
            return Err(TrainErr::Uninitialized("job consumer"));
        }

        for job in jobs {
            let worker_id = self.dispatch.assign(&job, self.queues.len());
            let done = self.ledger.open();

            if let Err(mpsc::error::SendError((job, done))) = self.queues[worker_id].send((job, done)) {
                done.finish(Err(TrainErr::TaskFailed(format!(
                    "worker {worker_id} stopped before part {} of epoch {}",
                    job.part_idx, job.epoch
                ))));
            }
        }

        Ok(())
    }

    async fn close(mut self) {
        self.queues.clear();
        self.tasks.close();
        self.tasks.wait().await;
    }
}

/// Schedules `Job`s on a local or a distributed backend behind one interface.
pub enum JobTracker {
    /// Jobs run as in-process tasks.
    Local(Tracker<Job>),
    /// Jobs are assigned to a pool of workers.
    Dist(WorkerPool),
}

impl JobTracker {
    /// Creates the `JobTracker` for `mode`.
    ///
    /// # Arguments
    /// * `mode` - Selects the backend.
    /// * `num_workers` - The local job concurrency, or the amount of workers.
    /// * `dispatch` - How the distributed backend assigns jobs to workers.
    pub fn create(mode: Mode, num_workers: usize, dispatch: DispatchKind) -> Self {
        match mode {
            Mode::Local => JobTracker::Local(Tracker::new().with_concurrency(num_workers)),
            Mode::Distributed => {
                JobTracker::Dist(WorkerPool::new(num_workers, create_dispatch(dispatch)))
            }
        }
    }

    /// Registers the job handler, invoked once per job on whichever worker runs it.
    pub fn set_consumer<F, Fut>(&mut self, f: F)
    where
        F: Fn(Job) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        match self {
            JobTracker::Local(tracker) => tracker.set_consumer(f),
            JobTracker::Dist(pool) => pool.set_consumer(Arc::new(move |job| f(job).boxed())),
        }
    }

    /// Submits `jobs`.
    ///
    /// # Returns
    /// `Uninitialized` if no consumer was registered.
    pub fn add(&self, jobs: Vec<Job>) -> Result<()> {
        match self {
            JobTracker::Local(tracker) => tracker.add(jobs),
            JobTracker::Dist(pool) => pool.add(jobs),
        }
    }

    /// The amount of submitted jobs that haven't completed yet.
    pub fn num_remains(&self) -> usize {
        match self {
            JobTracker::Local(tracker) => tracker.num_remains(),
            JobTracker::Dist(pool) => pool.ledger.remains(),
        }
    }

    /// Takes the first job error seen since the last call.
    pub fn take_error(&self) -> Option<TrainErr> {
        match self {
            JobTracker::Local(tracker) => tracker.take_error(),
            JobTracker::Dist(pool) => pool.ledger.take_err(),
        }
    }

    /// Yields until every submitted job completed.
    ///
    /// # Returns
    /// The first job error seen since the last drain.
    pub async fn wait_drained(&self, poll: Duration) -> Result<()> {
        while self.num_remains() > 0 {
            tokio::time::sleep(poll).await;
        }

        self.take_error().map_or(Ok(()), Err)
    }

    /// Shuts the backend down, waiting for the distributed workers to exit.
    pub async fn close(self) {
        if let JobTracker::Dist(pool) = self {
            pool.close().await;
        }
    }
}
