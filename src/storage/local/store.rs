use std::sync::Arc;

use rayon::prelude::*;

use super::LocalShard;
use crate::{
    data::{FeaId, Real},
    error::Result,
    optimization::Optimizer,
    storage::{Channel, Store, store::check_push},
};

/// An in-process store that partitions the key space in shards and
/// leverages parallelization to serve every request shard by shard.
#[derive(Debug)]
pub struct LocalStore<O: Optimizer> {
    shards: Arc<[LocalShard<O>]>,
}

impl<O: Optimizer> Clone for LocalStore<O> {
    fn clone(&self) -> Self {
        Self {
            shards: Arc::clone(&self.shards),
        }
    }
}

impl<O: Optimizer> LocalStore<O> {
    /// Creates a new `LocalStore`.
    ///
    /// # Arguments
    /// * `nshards` - The amount of shards, at least one is created.
    /// * `min_count` - Keys seen fewer times than this ignore gradients and read as zero.
    /// * `optimizer_factory` - An `Optimizer` factory closure, called once per shard.
    pub fn new<F>(nshards: usize, min_count: Real, mut optimizer_factory: F) -> Self
    where
        F: FnMut() -> O,
    {
        let shards: Vec<_> = (0..nshards.max(1))
            .map(|_| LocalShard::new(optimizer_factory(), min_count))
            .collect();

        Self {
            shards: Arc::from(shards),
        }
    }

    /// The shard owning `id`.
    ///
    /// Ids are mixed first so strided key sets, e.g. the slice of a distributed
    /// node, still spread over every shard.
    #[inline]
    fn shard_of(&self, id: FeaId) -> usize {
        let mixed = id.wrapping_mul(0x9E37_79B9_7F4A_7C15) >> 32;
        (mixed % self.shards.len() as u64) as usize
    }

    /// Groups the positions of `feaids` by owning shard.
    fn buckets(&self, feaids: &[FeaId]) -> Vec<Vec<usize>> {
        let mut buckets = vec![Vec::new(); self.shards.len()];
        for (pos, &id) in feaids.iter().enumerate() {
            buckets[self.shard_of(id)].push(pos);
        }

        buckets
    }
}

impl<O: Optimizer> Store for LocalStore<O> {
    fn push(&self, channel: Channel, feaids: &[FeaId], vals: &[Real], lens: &[u32]) -> Result<()> {
        check_push(feaids, vals, lens)?;

        self.shards
            .par_iter()
            .zip(self.buckets(feaids))
            .try_for_each(|(shard, bucket)| {
                shard.push(channel, bucket.iter().map(|&pos| (feaids[pos], vals[pos])))
            })
    }

    fn pull(
        &self,
        channel: Channel,
        feaids: &[FeaId],
        vals: &mut Vec<Real>,
        lens: &mut Vec<u32>,
    ) -> Result<()> {
        let buckets = self.buckets(feaids);

        let pulled = self
            .shards
            .par_iter()
            .zip(&buckets)
            .map(|(shard, bucket)| shard.pull(channel, bucket.iter().map(|&pos| &feaids[pos])))
            .collect::<Result<Vec<_>>>()?;

        vals.clear();
        vals.resize(feaids.len(), 0.);
        for (bucket, shard_vals) in buckets.iter().zip(pulled) {
            for (&pos, v) in bucket.iter().zip(shard_vals) {
                vals[pos] = v;
            }
        }

        lens.clear();
        lens.resize(feaids.len(), 1);
        Ok(())
    }

    fn len(&self) -> usize {
        self.shards.iter().map(LocalShard::len).sum()
    }

    fn dump(&self) -> Vec<(FeaId, Real)> {
        let mut weights: Vec<_> = self
            .shards
            .par_iter()
            .flat_map_iter(LocalShard::weights)
            .collect();

        weights.sort_unstable_by_key(|&(id, _)| id);
        weights
    }

    fn restore(&self, weights: &[(FeaId, Real)]) -> Result<()> {
        let (ids, vals): (Vec<_>, Vec<_>) = weights.iter().copied().unzip();
        self.push(Channel::Weight, &ids, &vals, &[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{error::TrainErr, optimization::Sgd};

    fn create_test_store(nshards: usize) -> LocalStore<Sgd> {
        LocalStore::new(nshards, 0., || Sgd::new(1., 0.))
    }

    fn pull(store: &LocalStore<Sgd>, channel: Channel, feaids: &[FeaId]) -> Vec<Real> {
        let (mut vals, mut lens) = (Vec::new(), Vec::new());
        store.pull(channel, feaids, &mut vals, &mut lens).unwrap();
        assert_eq!(lens.len(), feaids.len());
        vals
    }

    #[test]
    fn pull_follows_request_order() {
        let store = create_test_store(4);
        let feaids: Vec<FeaId> = (0..50).collect();
        let grads: Vec<Real> = feaids.iter().map(|&id| -(id as Real)).collect();

        store.push(Channel::Gradient, &feaids, &grads, &[]).unwrap();

        let reversed: Vec<_> = feaids.iter().rev().copied().collect();
        let vals = pull(&store, Channel::Weight, &reversed);
        let expected: Vec<_> = reversed.iter().map(|&id| id as Real).collect();
        assert_eq!(vals, expected);
        assert_eq!(store.len(), 50);
    }

    #[test]
    fn size_mismatch_is_rejected() {
        let store = create_test_store(2);
        let err = store.push(Channel::Gradient, &[1, 2], &[1.], &[]).unwrap_err();
        assert!(matches!(err, TrainErr::SizeMismatch { expected: 2, got: 1 }));
        assert!(store.is_empty());
    }

    #[test]
    fn dump_and_restore() {
        let store = create_test_store(3);
        store.push(Channel::Gradient, &[9, 3, 5], &[1., -2., 0.], &[]).unwrap();
        assert_eq!(store.dump(), [(3, 2.), (9, -1.)]);

        let other = create_test_store(1);
        other.restore(&store.dump()).unwrap();
        assert_eq!(pull(&other, Channel::Weight, &[9, 3, 5]), [-1., 2., 0.]);
    }
}
