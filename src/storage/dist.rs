use std::sync::Arc;

use log::debug;
use rayon::prelude::*;

use crate::{
    data::{FeaId, Real},
    error::{Result, TrainErr},
    storage::{Channel, Store, store::check_push},
};

/// A store front-end that partitions the key space over several server nodes.
///
/// Key `id` lives on node `id % nodes`. Every request is split per node and
/// pulled values are gathered back into the caller's order. How a node is
/// reached is up to its `Store` implementation.
pub struct DistStore {
    nodes: Vec<Arc<dyn Store>>,
}

/// One node's share of a request.
struct Slice {
    positions: Vec<usize>,
    feaids: Vec<FeaId>,
}

impl DistStore {
    /// Creates a new `DistStore`.
    ///
    /// # Arguments
    /// * `nodes` - The server nodes, at least one.
    pub fn new(nodes: Vec<Arc<dyn Store>>) -> Self {
        debug!(nodes = nodes.len(); "created distributed store");
        Self { nodes }
    }

    fn check_nodes(&self) -> Result<()> {
        if self.nodes.is_empty() {
            return Err(TrainErr::StoreUnavailable(
                "no server nodes configured".to_string(),
            ));
        }

        Ok(())
    }

    fn split(&self, feaids: &[FeaId]) -> Vec<Slice> {
        let n = self.nodes.len();
        let mut slices: Vec<_> = (0..n)
            .map(|_| Slice {
                positions: Vec::new(),
                feaids: Vec::new(),
            })
            .collect();

        for (pos, &id) in feaids.iter().enumerate() {
            let slice = &mut slices[(id % n as u64) as usize];
            slice.positions.push(pos);
            slice.feaids.push(id);
        }

        slices
    }
}

impl Store for DistStore {
    fn push(&self, channel: Channel, feaids: &[FeaId], vals: &[Real], lens: &[u32]) -> Result<()> {
        self.check_nodes()?;
        check_push(feaids, vals, lens)?;

        self.nodes
            .par_iter()
            .zip(self.split(feaids))
            .filter(|(_, slice)| !slice.feaids.is_empty())
            .try_for_each(|(node, slice)| {
                let vals: Vec<_> = slice.positions.iter().map(|&pos| vals[pos]).collect();
                let lens: Vec<_> = if lens.is_empty() {
                    Vec::new()
                } else {
                    slice.positions.iter().map(|&pos| lens[pos]).collect()
                };

                node.push(channel, &slice.feaids, &vals, &lens)
            })
    }

    fn pull(
        &self,
        channel: Channel,
        feaids: &[FeaId],
        vals: &mut Vec<Real>,
        lens: &mut Vec<u32>,
    ) -> Result<()> {
        self.check_nodes()?;
        let slices = self.split(feaids);

        let pulled = self
            .nodes
            .par_iter()
            .zip(&slices)
            .map(|(node, slice)| {
                let (mut vals, mut lens) = (Vec::new(), Vec::new());
                if !slice.feaids.is_empty() {
                    node.pull(channel, &slice.feaids, &mut vals, &mut lens)?;
                }
                Ok((vals, lens))
            })
            .collect::<Result<Vec<_>>>()?;

        vals.clear();
        vals.resize(feaids.len(), 0.);
        lens.clear();
        lens.resize(feaids.len(), 1);

        for (slice, (node_vals, node_lens)) in slices.iter().zip(pulled) {
            if node_vals.len() != slice.positions.len() {
                return Err(TrainErr::SizeMismatch {
                    expected: slice.positions.len(),
                    got: node_vals.len(),
                });
            }

            for (i, &pos) in slice.positions.iter().enumerate() {
                vals[pos] = node_vals[i];
                if let Some(&len) = node_lens.get(i) {
                    lens[pos] = len;
                }
            }
        }

        Ok(())
    }

    fn len(&self) -> usize {
        self.nodes.iter().map(|node| node.len()).sum()
    }

    fn dump(&self) -> Vec<(FeaId, Real)> {
        let mut weights: Vec<_> = self.nodes.iter().flat_map(|node| node.dump()).collect();
        weights.sort_unstable_by_key(|&(id, _)| id);
        weights
    }

    fn restore(&self, weights: &[(FeaId, Real)]) -> Result<()> {
        self.check_nodes()?;
        let n = self.nodes.len() as u64;

        self.nodes
            .par_iter()
            .enumerate()
            .try_for_each(|(i, node)| {
                let owned: Vec<_> = weights
                    .iter()
                    .copied()
                    .filter(|&(id, _)| id % n == i as u64)
                    .collect();
                node.restore(&owned)
            })
    }
}
