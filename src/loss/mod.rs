mod logit;
mod progress;

use std::sync::Arc;

pub use logit::LogitLoss;
pub use progress::Progress;

use crate::{
    data::{Real, RowBlock},
    error::{Result, TrainErr},
};

/// The model math applied to a localized batch.
///
/// Implementations are shared by every in-flight batch, so they hold no
/// per-batch state: the margins computed by `init_data` are handed back to
/// the other methods.
pub trait Loss: Send + Sync {
    /// Computes the margin of every row of `data`.
    ///
    /// # Arguments
    /// * `data` - The batch, indexing `weights` by position.
    /// * `weights` - The pulled weights.
    /// * `lens` - Empty or the length of every weight.
    fn init_data(&self, data: &RowBlock<u32>, weights: &[Real], lens: &[u32]) -> Result<Vec<Real>>;

    /// Evaluates the objective of `data` given its margins.
    fn evaluate(&self, data: &RowBlock<u32>, margins: &[Real]) -> Progress;

    /// Overwrites `grad`, laid out like the pulled weights, with the gradient of `data`.
    fn calc_grad(&self, data: &RowBlock<u32>, margins: &[Real], grad: &mut [Real]) -> Result<()>;

    /// Turns margins into predictions.
    fn predict(&self, margins: &[Real]) -> Vec<Real>;
}

/// Creates the loss named `name`.
///
/// # Returns
/// An `InvalidConfig` for unknown names.
pub fn create(name: &str, threads: usize) -> Result<Arc<dyn Loss>> {
    match name {
        "logit" => Ok(Arc::new(LogitLoss::new(threads))),
        other => Err(TrainErr::InvalidConfig(format!("unknown loss '{other}'"))),
    }
}
