pub mod config;
pub mod data;
pub mod error;
pub mod learner;
pub mod loss;
pub mod optimization;
pub mod range;
pub mod spmm;
pub mod storage;
pub mod tracking;

pub use config::{Config, Mode};
pub use error::{Result, TrainErr};
pub use learner::Learner;
pub use range::Range;
