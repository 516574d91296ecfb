mod batch_iter;
mod localizer;
mod row_block;

pub use batch_iter::BatchIter;
pub use localizer::{Compacted, Localizer};
pub use row_block::{FeaId, Real, RowBlock};
