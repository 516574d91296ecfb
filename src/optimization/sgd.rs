use super::{Optimizer, Slot};
use crate::data::Real;

/// Plain stochastic gradient descent with optional l2 regularization.
#[derive(Debug, Clone, Copy)]
pub struct Sgd {
    learning_rate: Real,
    l2: Real,
}

impl Sgd {
    /// Creates a new `Sgd` optimizer.
    ///
    /// # Arguments
    /// * `learning_rate` - The small coefficient that modulates the amount of training per update.
    /// * `l2` - The l2 penalty added to every gradient.
    pub fn new(learning_rate: Real, l2: Real) -> Self {
        Self { learning_rate, l2 }
    }
}

impl Optimizer for Sgd {
    fn update(&mut self, grad: Real, slot: &mut Slot) {
        let g = grad + self.l2 * slot.weight;
        slot.weight -= self.learning_rate * g;
    }
}
