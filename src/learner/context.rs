use std::sync::Arc;

use parking_lot::Mutex;

use super::PredictionSink;
use crate::{config::Config, loss::Loss, loss::Progress, storage::StoreHandle};

/// What every job of a learner shares.
pub(super) struct Context {
    pub(super) config: Config,
    pub(super) store: StoreHandle,
    pub(super) loss: Arc<dyn Loss>,
    pub(super) sink: Arc<dyn PredictionSink>,
    /// The progress of the running phase.
    pub(super) progress: Mutex<Progress>,
}
