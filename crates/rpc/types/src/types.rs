//! Request and view types of the task RPC namespaces.

use committee_primitives::{BatchId, ExecutorId, Hash, ShardId, TaskId};
use committee_task_types::{TaskEntry, TaskStatus, TaskType};
use serde::{Deserialize, Serialize};

/// Default number of entries returned by a debug listing.
pub const DEFAULT_DEBUG_LIMIT: usize = 20;

/// Body of `TaskRequestHandler_GetTask`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskRequest {
    pub executor_id: ExecutorId,
}

impl TaskRequest {
    pub fn new(executor_id: ExecutorId) -> Self {
        Self { executor_id }
    }
}

/// Sort key of a debug task listing.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskDebugOrder {
    #[default]
    CreatedAt,
    StartedAt,
    BlockNum,
    ExecutionTime,
}

/// Filter and ordering of `DebugTasks_GetTasks`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskDebugRequest {
    #[serde(default)]
    pub status: Option<TaskStatus>,
    #[serde(default)]
    pub task_type: Option<TaskType>,
    #[serde(default)]
    pub owner: Option<ExecutorId>,
    #[serde(default)]
    pub order: TaskDebugOrder,
    #[serde(default)]
    pub ascending: bool,
    #[serde(default = "default_debug_limit")]
    pub limit: usize,
}

fn default_debug_limit() -> usize {
    DEFAULT_DEBUG_LIMIT
}

impl Default for TaskDebugRequest {
    fn default() -> Self {
        Self {
            status: None,
            task_type: None,
            owner: None,
            order: TaskDebugOrder::default(),
            ascending: false,
            limit: DEFAULT_DEBUG_LIMIT,
        }
    }
}

impl TaskDebugRequest {
    /// Whether `entry` passes every filter set on the request.
    pub fn matches(&self, entry: &TaskEntry) -> bool {
        self.status.map_or(true, |s| s == entry.status)
            && self.task_type.map_or(true, |t| t == entry.task.task_type)
            && self.owner.map_or(true, |o| o == entry.owner)
    }
}

/// Flattened view of a stored task.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskView {
    pub id: TaskId,
    pub batch_id: BatchId,
    pub shard_id: ShardId,
    pub block_num: u64,
    pub block_hash: Hash,
    pub task_type: TaskType,
    pub parent_task_id: Option<TaskId>,
    pub dependency_num: u32,
    pub dependencies_done: u32,
    pub status: TaskStatus,
    pub owner: ExecutorId,
    pub created_ms: u64,
    pub started_ms: Option<u64>,
    pub execution_time_ms: Option<u64>,
}

impl TaskView {
    pub fn from_entry(entry: &TaskEntry, now_ms: u64) -> Self {
        let task = &entry.task;
        Self {
            id: task.id,
            batch_id: task.batch_id,
            shard_id: task.shard_id,
            block_num: task.block_num,
            block_hash: task.block_hash,
            task_type: task.task_type,
            parent_task_id: task.parent_task_id,
            dependency_num: task.dependency_num,
            dependencies_done: entry.dependencies.len() as u32,
            status: entry.status,
            owner: entry.owner,
            created_ms: entry.created_ms,
            started_ms: entry.started_ms,
            execution_time_ms: entry
                .execution_time(now_ms)
                .map(|d| d.as_millis() as u64),
        }
    }
}

/// A task and the tasks it depends on.
///
/// Dependencies that already completed are gone from storage; only their folded result is
/// left, so they show up without a [`TaskView`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskTreeView {
    pub task_id: TaskId,
    pub status: TaskStatus,
    pub task: Option<TaskView>,
    pub result_error_text: Option<String>,
    pub children: Vec<TaskTreeView>,
}

impl TaskTreeView {
    pub fn stored(view: TaskView) -> Self {
        Self {
            task_id: view.id,
            status: view.status,
            task: Some(view),
            result_error_text: None,
            children: Vec::new(),
        }
    }

    pub fn terminated(task_id: TaskId, error_text: String) -> Self {
        Self {
            task_id,
            status: TaskStatus::Completed,
            task: None,
            result_error_text: Some(error_text),
            children: Vec::new(),
        }
    }

    /// Number of nodes in the tree, this one included.
    pub fn size(&self) -> usize {
        1 + self.children.iter().map(TaskTreeView::size).sum::<usize>()
    }
}
