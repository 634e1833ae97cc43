//! JSON-RPC API definitions of the sync committee.

use committee_primitives::{Block, Hash, ShardId, TaskId};
use committee_rpc_types::{TaskDebugRequest, TaskRequest, TaskTreeView, TaskView};
use committee_task_types::{Task, TaskResult};
use jsonrpsee::{core::RpcResult, proc_macros::rpc};

/// Methods remote proof executors call to pull work and report outcomes.
#[cfg_attr(not(feature = "client"), rpc(server, namespace = "TaskRequestHandler"))]
#[cfg_attr(feature = "client", rpc(server, client, namespace = "TaskRequestHandler"))]
pub trait TaskRequestHandlerApi {
    /// Claims the next task for the requesting executor, if any is runnable.
    #[method(name = "GetTask")]
    async fn get_task(&self, request: TaskRequest) -> RpcResult<Option<Task>>;

    /// Reports the outcome of a task previously handed out by `GetTask`.
    #[method(name = "SetTaskResult")]
    async fn set_task_result(&self, result: TaskResult) -> RpcResult<()>;
}

/// Read-only inspection of the task storage.
#[cfg_attr(not(feature = "client"), rpc(server, namespace = "DebugTasks"))]
#[cfg_attr(feature = "client", rpc(server, client, namespace = "DebugTasks"))]
pub trait DebugTasksApi {
    #[method(name = "GetTasks")]
    async fn get_tasks(&self, request: TaskDebugRequest) -> RpcResult<Vec<TaskView>>;

    /// Expands the dependency tree of a task. `None` if the task is not stored.
    #[method(name = "GetTaskTree")]
    async fn get_task_tree(&self, task_id: TaskId) -> RpcResult<Option<TaskTreeView>>;
}

/// Block access served by the shard nodes.
#[cfg_attr(not(feature = "client"), rpc(server, namespace = "shard"))]
#[cfg_attr(feature = "client", rpc(server, client, namespace = "shard"))]
pub trait ShardApi {
    #[method(name = "getBlock")]
    async fn get_block(&self, shard_id: ShardId, hash: Hash) -> RpcResult<Option<Block>>;

    /// Blocks numbered `from..to` of the shard's canonical chain.
    #[method(name = "getBlocksRange")]
    async fn get_blocks_range(&self, shard_id: ShardId, from: u64, to: u64)
        -> RpcResult<Vec<Block>>;
}
