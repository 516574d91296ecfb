mod dist;
mod handle;
mod local;
mod model;
mod store;

pub use dist::DistStore;
pub use handle::{Pulled, StoreHandle, Timestamp};
pub use local::{LocalShard, LocalStore};
pub use model::{load_model, save_model};
pub use store::{Channel, Store, create_store};
