//! Task model of the proof scheduler.
//!
//! A [`Task`] is a unit of provable work. Storage wraps it in a [`TaskEntry`] that tracks the
//! execution status, the owning executor and the results of the tasks it depends on.

mod entry;
mod errors;
mod task;

pub use entry::{TaskEntry, TaskResult, TaskStatus};
pub use errors::TaskStateError;
pub use task::{Task, TaskType};
