//! Storage interfaces of the sync committee, independent of the backend.

mod errors;
mod iter;
pub mod traits;
pub mod types;

pub use errors::{DbError, DbResult};
pub use iter::StopOnError;
pub use traits::{BlockBatchDatabase, DbIter, TaskDatabase};
pub use types::{BatchEntry, BlockEntry};
