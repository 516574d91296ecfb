mod context;
mod learner;
mod pipeline;
mod sink;

use context::Context;

pub use learner::{ContCallback, EpochCallback, Learner};
pub use sink::{FileSink, NullSink, PredictionSink, create_sink};
