use crate::data::Real;

/// The trainable state of a single key in the store.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct Slot {
    pub weight: Real,
    /// Optimizer owned accumulator, unused by stateless rules.
    pub accum: Real,
}

/// Defines the strategy for updating a model parameter based on its gradient.
pub trait Optimizer: Send {
    /// Updates `slot` in place.
    ///
    /// # Arguments
    /// * `grad` - The gradient of the slot's weight.
    /// * `slot` - The key's state.
    fn update(&mut self, grad: Real, slot: &mut Slot);
}
