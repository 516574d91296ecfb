use super::{Optimizer, Slot};
use crate::data::Real;

/// Adaptive gradient descent, every key scales its step by its own gradient history.
#[derive(Debug, Clone, Copy)]
pub struct AdaGrad {
    learning_rate: Real,
    l2: Real,
    beta: Real,
}

impl AdaGrad {
    /// Creates a new `AdaGrad` optimizer.
    ///
    /// # Arguments
    /// * `learning_rate` - The small coefficient that modulates the amount of training per update.
    /// * `l2` - The l2 penalty added to every gradient.
    /// * `beta` - Smooths the step of keys with a short history, must be positive.
    pub fn new(learning_rate: Real, l2: Real, beta: Real) -> Self {
        Self {
            learning_rate,
            l2,
            beta,
        }
    }
}

impl Optimizer for AdaGrad {
    fn update(&mut self, grad: Real, slot: &mut Slot) {
        let Self {
            learning_rate: lr,
            l2,
            beta,
        } = *self;

        let g = grad + l2 * slot.weight;
        slot.accum += g * g;
        slot.weight -= lr * g / (beta + slot.accum.sqrt());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_shrinks_with_history() {
        let mut opt = AdaGrad::new(1., 0., 1.);
        let mut slot = Slot::default();

        opt.update(1., &mut slot);
        let first = -slot.weight;
        assert!((first - 0.5).abs() < 1e-6);

        let before = slot.weight;
        opt.update(1., &mut slot);
        let second = before - slot.weight;
        assert!(second < first);
        assert_eq!(slot.accum, 2.);
    }
}
