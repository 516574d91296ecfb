mod shard;
mod store;

pub use shard::LocalShard;
pub use store::LocalStore;
