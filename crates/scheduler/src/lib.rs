//! Task scheduler façade of the sync committee.
//!
//! [`TaskScheduler`] serves proof tasks to remote executors out of a [`TaskDatabase`], applies
//! their results and notifies a [`TaskStateChangeHandler`] of every task that reached a
//! terminal status. A background loop puts tasks whose executor went silent back in the queue.
//!
//! [`TaskDatabase`]: committee_db_types::TaskDatabase

mod config;
mod debug;
mod errors;
mod handler;
mod scheduler;

pub use config::SchedulerConfig;
pub use debug::MAX_TREE_DEPTH;
pub use errors::{SchedulerError, SchedulerResult};
pub use handler::TaskStateChangeHandler;
pub use scheduler::TaskScheduler;
