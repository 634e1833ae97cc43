use committee_primitives::{ExecutorId, TaskId};
use thiserror::Error;

use crate::TaskStatus;

/// A caller tried to move a task along a transition its state machine does not allow.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TaskStateError {
    #[error("task {task_id} is {actual}, expected {expected}")]
    InvalidStatus {
        task_id: TaskId,
        expected: TaskStatus,
        actual: TaskStatus,
    },

    #[error("task {task_id} is owned by {owner}, not by {sender}")]
    WrongOwner {
        task_id: TaskId,
        owner: ExecutorId,
        sender: ExecutorId,
    },

    #[error("result for task {result_task_id} submitted against task {task_id}")]
    ForeignResult {
        task_id: TaskId,
        result_task_id: TaskId,
    },
}
