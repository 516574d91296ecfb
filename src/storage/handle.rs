use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use parking_lot::Mutex;
use tokio::task::{self, JoinHandle};

use crate::{
    data::{FeaId, Real},
    error::{Result, TrainErr},
    storage::{Channel, Store},
};

/// Identifies an issued push until it's waited on.
pub type Timestamp = u64;

/// The result of a pull, positional to the requested feature ids.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Pulled {
    pub vals: Vec<Real>,
    pub lens: Vec<u32>,
}

/// The asynchronous interface to a `Store`.
///
/// It bridges the async runtime with the blocking CPU-bound implementation of the store.
/// Buffers handed to a request are moved into it and dropped once it completes.
#[derive(Clone)]
pub struct StoreHandle {
    store: Arc<dyn Store>,
    pending: Arc<Mutex<HashMap<Timestamp, JoinHandle<Result<()>>>>>,
    clock: Arc<AtomicU64>,
}

impl StoreHandle {
    /// Creates a new `StoreHandle`.
    ///
    /// # Arguments
    /// * `store` - The underlying parameter store.
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            pending: Arc::new(Mutex::new(HashMap::new())),
            clock: Arc::new(AtomicU64::new(0)),
        }
    }

    /// The underlying store.
    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// Fetches the current values of `feaids`.
    ///
    /// Resolves once the values are valid, so any push completed before this
    /// call is observed.
    ///
    /// # Arguments
    /// * `channel` - What to read, weights or feature counts.
    /// * `feaids` - The keys, shared with the caller for the request's lifetime.
    pub async fn pull(&self, channel: Channel, feaids: Arc<[FeaId]>) -> Result<Pulled> {
        let store = Arc::clone(&self.store);

        let job = task::spawn_blocking(move || {
            let mut pulled = Pulled::default();
            store.pull(channel, &feaids, &mut pulled.vals, &mut pulled.lens)?;
            Ok(pulled)
        });

        job.await.map_err(|e| TrainErr::TaskFailed(e.to_string()))?
    }

    /// Issues a push in the background.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Arguments
    /// * `channel` - What `vals` are.
    /// * `feaids` - The keys, shared with the caller for the request's lifetime.
    /// * `vals` - One value per key, owned by the request.
    /// * `lens` - Empty or the length of every value.
    ///
    /// # Returns
    /// The `Timestamp` to `wait` on, exactly once.
    pub fn push(
        &self,
        channel: Channel,
        feaids: Arc<[FeaId]>,
        vals: Vec<Real>,
        lens: Vec<u32>,
    ) -> Timestamp {
        let ts = self.clock.fetch_add(1, Ordering::Relaxed);
        let job = self.spawn_push(channel, feaids, vals, lens);
        self.pending.lock().insert(ts, job);
        ts
    }

    /// Waits until the push identified by `ts` completes.
    ///
    /// # Returns
    /// The push's own result, or `UnknownTimestamp` if `ts` was never issued
    /// or was already waited on.
    pub async fn wait(&self, ts: Timestamp) -> Result<()> {
        let job = self
            .pending
            .lock()
            .remove(&ts)
            .ok_or(TrainErr::UnknownTimestamp(ts))?;

        job.await.map_err(|e| TrainErr::TaskFailed(e.to_string()))?
    }

    /// Issues a push and waits for it.
    pub async fn push_and_wait(
        &self,
        channel: Channel,
        feaids: Arc<[FeaId]>,
        vals: Vec<Real>,
        lens: Vec<u32>,
    ) -> Result<()> {
        let ts = self.push(channel, feaids, vals, lens);
        self.wait(ts).await
    }

    /// The amount of issued pushes nobody waited on yet.
    pub fn num_pending(&self) -> usize {
        self.pending.lock().len()
    }

    fn spawn_push(
        &self,
        channel: Channel,
        feaids: Arc<[FeaId]>,
        vals: Vec<Real>,
        lens: Vec<u32>,
    ) -> JoinHandle<Result<()>> {
        let store = Arc::clone(&self.store);
        task::spawn_blocking(move || store.push(channel, &feaids, &vals, &lens))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{optimization::Sgd, storage::LocalStore};

    fn create_test_handle() -> StoreHandle {
        StoreHandle::new(Arc::new(LocalStore::new(4, 0., || Sgd::new(1., 0.))))
    }

    #[tokio::test]
    async fn completed_push_is_observed_by_pull() {
        let handle = create_test_handle();
        let feaids: Arc<[FeaId]> = Arc::from(vec![3, 1, 2]);

        let ts = handle.push(Channel::Gradient, Arc::clone(&feaids), vec![-1., -2., -3.], vec![]);
        handle.wait(ts).await.unwrap();

        let pulled = handle.pull(Channel::Weight, feaids).await.unwrap();
        assert_eq!(pulled.vals, [1., 2., 3.]);
        assert_eq!(pulled.lens, [1, 1, 1]);
    }

    #[tokio::test]
    async fn wait_is_exactly_once() {
        let handle = create_test_handle();
        let ts = handle.push(Channel::FeatureCount, Arc::from(vec![1]), vec![1.], vec![]);

        handle.wait(ts).await.unwrap();
        assert!(matches!(
            handle.wait(ts).await,
            Err(TrainErr::UnknownTimestamp(t)) if t == ts
        ));
        assert_eq!(handle.num_pending(), 0);
    }

    #[tokio::test]
    async fn failed_push_surfaces_through_wait() {
        let handle = create_test_handle();
        let res = handle
            .push_and_wait(Channel::Gradient, Arc::from(vec![1, 2]), vec![1.], vec![])
            .await;
        assert!(matches!(res, Err(TrainErr::SizeMismatch { .. })));
    }

    #[tokio::test]
    async fn timestamps_are_unique() {
        let handle = create_test_handle();
        let a = handle.push(Channel::FeatureCount, Arc::from(vec![1]), vec![1.], vec![]);
        let b = handle.push(Channel::FeatureCount, Arc::from(vec![1]), vec![1.], vec![]);
        assert_ne!(a, b);

        handle.wait(b).await.unwrap();
        handle.wait(a).await.unwrap();

        let pulled = handle.pull(Channel::FeatureCount, Arc::from(vec![1])).await.unwrap();
        assert_eq!(pulled.vals, [2.]);
    }
}
