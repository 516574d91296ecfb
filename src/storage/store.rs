use std::sync::Arc;

use crate::{
    config::{Config, Mode, OptimizerKind},
    data::{FeaId, Real},
    error::{Result, TrainErr},
    optimization::{AdaGrad, Sgd},
    storage::{DistStore, LocalStore},
};

/// A category of traffic between the workers and the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    /// Model weights, pulled before computing a batch.
    Weight,
    /// Gradients, pushed after computing a training batch.
    Gradient,
    /// Feature occurrence counts, pushed once while reading the first training epoch.
    FeatureCount,
}

/// The blocking, CPU-bound interface of a parameter store keyed by feature id.
///
/// Every request is positional: the `i`-th value belongs to the `i`-th feature id.
/// Requests on disjoint keys may run concurrently, implementors serialize
/// conflicting requests to the same key.
pub trait Store: Send + Sync {
    /// Merges `vals` into the store.
    ///
    /// # Arguments
    /// * `channel` - What `vals` are: gradients, counts or raw weights.
    /// * `feaids` - The keys.
    /// * `vals` - One value per key.
    /// * `lens` - Empty, or the length of every key's value (always 1).
    ///
    /// # Returns
    /// A `SizeMismatch` if the buffers don't line up with `feaids`.
    fn push(&self, channel: Channel, feaids: &[FeaId], vals: &[Real], lens: &[u32]) -> Result<()>;

    /// Reads the current state of `feaids`, in order, into `vals` and `lens`.
    ///
    /// Unknown keys read as zero.
    fn pull(
        &self,
        channel: Channel,
        feaids: &[FeaId],
        vals: &mut Vec<Real>,
        lens: &mut Vec<u32>,
    ) -> Result<()>;

    /// The amount of keys held.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every non-zero weight, sorted by key.
    fn dump(&self) -> Vec<(FeaId, Real)>;

    /// Overwrites the weights of the given keys.
    fn restore(&self, weights: &[(FeaId, Real)]) -> Result<()>;
}

/// Builds the store backend for `mode`.
///
/// Distributed mode partitions the keys over `num_servers` server nodes.
pub fn create_store(mode: Mode, cfg: &Config) -> Arc<dyn Store> {
    match mode {
        Mode::Local => create_local(cfg),
        Mode::Distributed => {
            let nodes = (0..cfg.num_servers).map(|_| create_local(cfg)).collect();
            Arc::new(DistStore::new(nodes))
        }
    }
}

fn create_local(cfg: &Config) -> Arc<dyn Store> {
    let nshards = cfg.num_threads * 4;
    let Config {
        learning_rate: lr,
        l2,
        min_count,
        ..
    } = *cfg;

    match cfg.optimizer {
        OptimizerKind::Sgd => Arc::new(LocalStore::new(nshards, min_count, || Sgd::new(lr, l2))),
        OptimizerKind::AdaGrad => Arc::new(LocalStore::new(nshards, min_count, || {
            AdaGrad::new(lr, l2, 1.)
        })),
    }
}

/// Checks that the buffers of a push line up with its keys.
pub(super) fn check_push(feaids: &[FeaId], vals: &[Real], lens: &[u32]) -> Result<()> {
    if vals.len() != feaids.len() {
        return Err(TrainErr::SizeMismatch {
            expected: feaids.len(),
            got: vals.len(),
        });
    }

    if !lens.is_empty() && lens.len() != feaids.len() {
        return Err(TrainErr::SizeMismatch {
            expected: feaids.len(),
            got: lens.len(),
        });
    }

    Ok(())
}
