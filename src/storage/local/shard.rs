use std::collections::HashMap;

use parking_lot::{Mutex, RwLock};

use crate::{
    data::{FeaId, Real},
    error::{Result, TrainErr},
    optimization::{Optimizer, Slot},
    storage::Channel,
};

/// The state of one key.
#[derive(Debug, Default, Clone, Copy)]
struct Entry {
    slot: Slot,
    count: Real,
    /// Set through the weight channel, readable whatever its count.
    assigned: bool,
}

impl Entry {
    fn active(&self, min_count: Real) -> bool {
        self.assigned || self.count >= min_count
    }
}

/// A lock protected slice of the key space.
///
/// Entries are created lazily, readers share the map while pushes take it exclusively.
#[derive(Debug)]
pub struct LocalShard<O: Optimizer> {
    entries: RwLock<HashMap<FeaId, Entry>>,
    optimizer: Mutex<O>,
    min_count: Real,
}

impl<O: Optimizer> LocalShard<O> {
    /// Creates a new empty `LocalShard`.
    ///
    /// # Arguments
    /// * `optimizer` - The update rule for gradients.
    /// * `min_count` - Keys seen fewer times than this ignore gradients and read as zero.
    pub fn new(optimizer: O, min_count: Real) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            optimizer: Mutex::new(optimizer),
            min_count,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Merges `(key, value)` pairs into the shard.
    pub fn push<I>(&self, channel: Channel, pairs: I) -> Result<()>
    where
        I: IntoIterator<Item = (FeaId, Real)>,
    {
        let mut entries = self.entries.write();

        match channel {
            Channel::Weight => {
                for (id, w) in pairs {
                    let entry = entries.entry(id).or_default();
                    entry.slot.weight = w;
                    entry.assigned = true;
                }
            }
            Channel::FeatureCount => {
                for (id, c) in pairs {
                    entries.entry(id).or_default().count += c;
                }
            }
            Channel::Gradient => {
                let mut optimizer = self.optimizer.lock();
                for (id, g) in pairs {
                    if self.min_count > 0. {
                        match entries.get_mut(&id) {
                            Some(entry) if entry.active(self.min_count) => {
                                optimizer.update(g, &mut entry.slot)
                            }
                            _ => {}
                        }
                    } else {
                        optimizer.update(g, &mut entries.entry(id).or_default().slot);
                    }
                }
            }
        }

        Ok(())
    }

    /// Reads the value of every key in `ids`, in order.
    pub fn pull<'a, I>(&self, channel: Channel, ids: I) -> Result<Vec<Real>>
    where
        I: IntoIterator<Item = &'a FeaId>,
    {
        let entries = self.entries.read();

        let read: fn(&Entry, Real) -> Real = match channel {
            Channel::Weight => |e: &Entry, min_count: Real| {
                if e.active(min_count) { e.slot.weight } else { 0. }
            },
            Channel::FeatureCount => |e: &Entry, _: Real| e.count,
            Channel::Gradient => {
                return Err(TrainErr::InvalidConfig(
                    "gradients can be pushed, not pulled".to_string(),
                ));
            }
        };

        let vals = ids
            .into_iter()
            .map(|id| entries.get(id).map_or(0., |e| read(e, self.min_count)))
            .collect();

        Ok(vals)
    }

    /// Every non-zero weight in the shard.
    pub fn weights(&self) -> Vec<(FeaId, Real)> {
        self.entries
            .read()
            .iter()
            .filter(|(_, e)| e.slot.weight != 0.)
            .map(|(&id, e)| (id, e.slot.weight))
            .collect()
    }
}
