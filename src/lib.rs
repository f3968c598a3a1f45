mod batch_function;
mod cache;
mod error;
mod loader;
mod loader_op;
mod loader_worker;
pub mod schedule;
pub mod stitch;
#[cfg(feature = "stats")]
mod worker_stats;

pub use batch_function::BatchFunction;
pub use error::LoadError;
pub use loader::{Loader, LoaderOptions};
pub use loader_op::LoadResult;
