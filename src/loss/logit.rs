use super::{Loss, Progress};
use crate::{
    data::{Real, RowBlock},
    error::{Result, TrainErr},
    spmm,
};

/// Logistic loss of a linear model over labels in `{-1, +1}`.
#[derive(Debug, Clone, Copy)]
pub struct LogitLoss {
    threads: usize,
}

impl LogitLoss {
    /// Creates a new `LogitLoss`.
    ///
    /// # Arguments
    /// * `threads` - The parallelism of the matrix products.
    pub fn new(threads: usize) -> Self {
        Self {
            threads: threads.max(1),
        }
    }
}

/// `ln(1 + e^z)` without overflowing for large `z`.
#[inline]
fn softplus(z: f64) -> f64 {
    if z > 0. {
        z + (-z).exp().ln_1p()
    } else {
        z.exp().ln_1p()
    }
}

#[inline]
fn sigmoid(z: Real) -> Real {
    1. / (1. + (-z).exp())
}

impl Loss for LogitLoss {
    fn init_data(&self, data: &RowBlock<u32>, weights: &[Real], lens: &[u32]) -> Result<Vec<Real>> {
        if let Some(&len) = lens.iter().find(|&&len| len != 1) {
            return Err(TrainErr::InvalidConfig(format!(
                "logit loss expects one weight per feature, got {len}"
            )));
        }

        if let Some(&col) = data.index.iter().find(|&&col| col as usize >= weights.len()) {
            return Err(TrainErr::SizeMismatch {
                expected: col as usize + 1,
                got: weights.len(),
            });
        }

        let mut margins = vec![0.; data.len()];
        spmm::times(&data.as_spmat()?, weights, &mut margins, 1, self.threads)?;
        Ok(margins)
    }

    fn evaluate(&self, data: &RowBlock<u32>, margins: &[Real]) -> Progress {
        let mut prog = Progress::default();

        for (&y, &m) in data.label.iter().zip(margins) {
            prog.num_examples += 1;
            prog.objective += softplus(-(y as f64) * m as f64);
            if (m >= 0.) == (y > 0.) {
                prog.correct += 1;
            }
        }

        prog
    }

    fn calc_grad(&self, data: &RowBlock<u32>, margins: &[Real], grad: &mut [Real]) -> Result<()> {
        if data.is_empty() {
            grad.fill(0.);
            return Ok(());
        }

        let dual: Vec<Real> = data
            .label
            .iter()
            .zip(margins)
            .map(|(&y, &m)| -y / (1. + (y * m).exp()))
            .collect();

        spmm::trans_times(&data.as_spmat()?, &dual, 0., None, grad, 1, self.threads)
    }

    fn predict(&self, margins: &[Real]) -> Vec<Real> {
        margins.iter().map(|&m| sigmoid(m)).collect()
    }
}
