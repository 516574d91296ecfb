mod adagrad;
mod optimizer;
mod sgd;

pub use adagrad::AdaGrad;
pub use optimizer::{Optimizer, Slot};
pub use sgd::Sgd;
