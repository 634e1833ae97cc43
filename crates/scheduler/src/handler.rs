use async_trait::async_trait;
use committee_task_types::{Task, TaskResult};

/// Reacts to tasks reaching a terminal status.
///
/// Called once per accepted result, after the result is committed to storage. Implementations
/// match on [`TaskType`](committee_task_types::TaskType) exhaustively, so a new task type does
/// not compile until every handler decides what its outcome means.
#[async_trait]
pub trait TaskStateChangeHandler: Send + Sync + 'static {
    async fn on_task_terminated(&self, task: &Task, result: &TaskResult) -> anyhow::Result<()>;
}
