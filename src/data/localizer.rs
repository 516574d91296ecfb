use rayon::prelude::*;

use super::{FeaId, Real, RowBlock};

/// A raw batch remapped to a contiguous local index space.
#[derive(Debug, Clone, PartialEq)]
pub struct Compacted {
    /// The rows, indexing positions of `feaids`.
    pub data: RowBlock<u32>,
    /// The distinct feature ids of the batch, ascending.
    pub feaids: Vec<FeaId>,
    /// Occurrences of every feature id, in `feaids` order.
    pub counts: Option<Vec<Real>>,
}

/// Maps the global feature ids of a batch into `0..feaids.len()`.
#[derive(Debug, Clone, Copy)]
pub struct Localizer {
    threads: usize,
}

impl Localizer {
    /// Creates a new `Localizer`.
    ///
    /// # Arguments
    /// * `threads` - Above 1 the sort and remap passes run in parallel.
    pub fn new(threads: usize) -> Self {
        Self { threads }
    }

    /// Compacts `raw` into a localized block.
    ///
    /// # Arguments
    /// * `raw` - The batch as read from disk.
    /// * `count` - Whether to also count the occurrences of every feature id.
    pub fn compact(&self, raw: &RowBlock<FeaId>, count: bool) -> Compacted {
        let parallel = self.threads > 1;

        let mut sorted = raw.index.clone();
        if parallel {
            sorted.par_sort_unstable();
        } else {
            sorted.sort_unstable();
        }

        let mut feaids: Vec<FeaId> = Vec::new();
        let mut counts: Vec<Real> = Vec::new();
        for id in sorted {
            if feaids.last() == Some(&id) {
                if let Some(c) = counts.last_mut() {
                    *c += 1.;
                }
            } else {
                feaids.push(id);
                counts.push(1.);
            }
        }

        // every id is present in `feaids`, so the search can't miss
        let position = |id: &FeaId| feaids.binary_search(id).unwrap_or_default() as u32;
        let index = if parallel {
            raw.index.par_iter().map(position).collect()
        } else {
            raw.index.iter().map(position).collect()
        };

        let data = RowBlock {
            label: raw.label.clone(),
            offset: raw.offset.clone(),
            index,
            value: raw.value.clone(),
        };

        Compacted {
            data,
            feaids,
            counts: count.then_some(counts),
        }
    }
}
