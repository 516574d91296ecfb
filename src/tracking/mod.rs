mod job;
mod job_tracker;
mod tracker;

pub use job::{Job, JobType};
pub use job_tracker::{ByPart, Dispatch, JobTracker, RoundRobin, WorkerPool, create_dispatch};
pub use tracker::{Consumer, POLL_INTERVAL, Tracker};
