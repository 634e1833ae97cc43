use std::{collections::BTreeMap, fmt, time::Duration};

use borsh::{BorshDeserialize, BorshSerialize};
use committee_primitives::{time::elapsed, ExecutorId, TaskId};
use serde::{Deserialize, Serialize};

use crate::{Task, TaskStateError};

/// Execution status of a stored task.
///
/// ```text
/// WaitingForInput -> WaitingForExecutor -> Running -> Completed (entry removed)
///                           ^                 |   \-> Failed
///                           \--- reschedule --/
/// ```
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    BorshSerialize,
    BorshDeserialize,
    Serialize,
    Deserialize,
)]
#[borsh(use_discriminant = true)]
#[repr(u8)]
pub enum TaskStatus {
    WaitingForInput = 1,
    WaitingForExecutor = 2,
    Running = 3,
    Failed = 4,
    Completed = 5,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Failed | TaskStatus::Completed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::WaitingForInput => "waiting_for_input",
            TaskStatus::WaitingForExecutor => "waiting_for_executor",
            TaskStatus::Running => "running",
            TaskStatus::Failed => "failed",
            TaskStatus::Completed => "completed",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a task as reported by the executor that ran it.
#[derive(
    Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize,
)]
pub struct TaskResult {
    pub task_id: TaskId,
    pub sender: ExecutorId,
    pub is_success: bool,
    #[serde(default)]
    pub error_text: String,
    #[serde(default)]
    pub output_artifacts: BTreeMap<String, String>,
    #[serde(default)]
    pub data: Vec<u8>,
}

impl TaskResult {
    pub fn success(task_id: TaskId, sender: ExecutorId, data: Vec<u8>) -> Self {
        Self {
            task_id,
            sender,
            is_success: true,
            error_text: String::new(),
            output_artifacts: BTreeMap::new(),
            data,
        }
    }

    pub fn failure(task_id: TaskId, sender: ExecutorId, error_text: impl Into<String>) -> Self {
        Self {
            task_id,
            sender,
            is_success: false,
            error_text: error_text.into(),
            output_artifacts: BTreeMap::new(),
            data: Vec::new(),
        }
    }

    pub fn with_artifact(mut self, name: impl Into<String>, location: impl Into<String>) -> Self {
        self.output_artifacts.insert(name.into(), location.into());
        self
    }
}

/// Persisted wrapper around a [`Task`].
#[derive(
    Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize,
)]
pub struct TaskEntry {
    pub task: Task,
    pub status: TaskStatus,
    pub owner: ExecutorId,
    /// Tasks waiting on this task's result.
    pub pending_deps: Vec<TaskId>,
    /// Results of the tasks this task depends on.
    pub dependencies: BTreeMap<TaskId, TaskResult>,
    pub created_ms: u64,
    pub started_ms: Option<u64>,
    pub finished_ms: Option<u64>,
}

impl TaskEntry {
    /// Wraps a freshly created task, runnable right away if it depends on nothing.
    pub fn new(task: Task, now_ms: u64) -> Self {
        let status = if task.dependency_num == 0 {
            TaskStatus::WaitingForExecutor
        } else {
            TaskStatus::WaitingForInput
        };

        Self {
            task,
            status,
            owner: ExecutorId::UNKNOWN,
            pending_deps: Vec::new(),
            dependencies: BTreeMap::new(),
            created_ms: now_ms,
            started_ms: None,
            finished_ms: None,
        }
    }

    pub fn with_pending_deps(mut self, pending_deps: Vec<TaskId>) -> Self {
        self.pending_deps = pending_deps;
        self
    }

    pub fn id(&self) -> TaskId {
        self.task.id
    }

    pub fn is_ready(&self) -> bool {
        self.status == TaskStatus::WaitingForExecutor
    }

    /// Hands the task to `executor`.
    pub fn start(&mut self, executor: ExecutorId, now_ms: u64) -> Result<(), TaskStateError> {
        self.expect_status(TaskStatus::WaitingForExecutor)?;
        self.status = TaskStatus::Running;
        self.owner = executor;
        self.started_ms = Some(now_ms);
        Ok(())
    }

    /// Checks that `result` was sent by the executor currently running this task.
    pub fn validate_result(&self, result: &TaskResult) -> Result<(), TaskStateError> {
        if result.task_id != self.task.id {
            return Err(TaskStateError::ForeignResult {
                task_id: self.task.id,
                result_task_id: result.task_id,
            });
        }
        self.expect_status(TaskStatus::Running)?;
        if self.owner != result.sender {
            return Err(TaskStateError::WrongOwner {
                task_id: self.task.id,
                owner: self.owner,
                sender: result.sender,
            });
        }
        Ok(())
    }

    pub fn fail(&mut self, now_ms: u64) {
        self.status = TaskStatus::Failed;
        self.finished_ms = Some(now_ms);
    }

    /// Folds the result of one of this task's dependencies into the entry.
    ///
    /// Returns `true` when this result was the last one missing and the task became runnable.
    pub fn add_dependency_result(&mut self, result: TaskResult) -> Result<bool, TaskStateError> {
        self.expect_status(TaskStatus::WaitingForInput)?;

        self.dependencies.insert(result.task_id, result);
        if self.dependencies.len() as u64 == u64::from(self.task.dependency_num) {
            self.status = TaskStatus::WaitingForExecutor;
            return Ok(true);
        }
        Ok(false)
    }

    /// Whether the task is running for longer than `timeout`.
    pub fn is_hanging(&self, now_ms: u64, timeout: Duration) -> bool {
        match (self.status, self.started_ms) {
            (TaskStatus::Running, Some(started)) => elapsed(started, now_ms) > timeout,
            _ => false,
        }
    }

    /// Puts a running task back in the queue, dropping its owner.
    pub fn reset_running(&mut self) -> Result<(), TaskStateError> {
        self.expect_status(TaskStatus::Running)?;
        self.status = TaskStatus::WaitingForExecutor;
        self.owner = ExecutorId::UNKNOWN;
        self.started_ms = None;
        Ok(())
    }

    /// Time spent running so far, or until failure.
    pub fn execution_time(&self, now_ms: u64) -> Option<Duration> {
        let started = self.started_ms?;
        Some(elapsed(started, self.finished_ms.unwrap_or(now_ms)))
    }

    fn expect_status(&self, expected: TaskStatus) -> Result<(), TaskStateError> {
        if self.status != expected {
            return Err(TaskStateError::InvalidStatus {
                task_id: self.task.id,
                expected,
                actual: self.status,
            });
        }
        Ok(())
    }
}
