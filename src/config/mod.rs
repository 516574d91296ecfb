mod kwargs;
mod params;

pub use kwargs::{KwArgs, parse_kwargs};
pub use params::{Config, DispatchKind, Mode, OptimizerKind};
