//! Bootstraps the RPC server executors and operators talk to.

use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use async_trait::async_trait;
use committee_db_store_sled::TaskDBSled;
use committee_primitives::TaskId;
use committee_rpc_api::{DebugTasksApiServer, TaskRequestHandlerApiServer};
use committee_rpc_types::{RpcServerError, TaskDebugRequest, TaskRequest, TaskTreeView, TaskView};
use committee_scheduler::{SchedulerError, TaskScheduler};
use committee_task_types::{Task, TaskResult};
use jsonrpsee::{
    core::RpcResult, server::ServerHandle, types::ErrorObjectOwned, RpcModule,
};
use tracing::*;

pub(crate) async fn start(
    rpc_impl: CommitteeRpc,
    rpc_url: &str,
    enable_debug_rpc: bool,
) -> anyhow::Result<(ServerHandle, SocketAddr)> {
    let mut rpc_module = RpcModule::new(());
    rpc_module
        .merge(TaskRequestHandlerApiServer::into_rpc(rpc_impl.clone()))
        .context("merge task request handler api")?;
    if enable_debug_rpc {
        rpc_module
            .merge(DebugTasksApiServer::into_rpc(rpc_impl))
            .context("merge debug tasks api")?;
    }

    let rpc_server = jsonrpsee::server::ServerBuilder::new()
        .build(rpc_url)
        .await
        .with_context(|| format!("binding RPC server to {rpc_url}"))?;
    let addr = rpc_server.local_addr().context("reading RPC server address")?;
    let handle = rpc_server.start(rpc_module);
    info!(%addr, %enable_debug_rpc, "RPC server started");

    Ok((handle, addr))
}

fn to_rpc_error(err: SchedulerError) -> ErrorObjectOwned {
    RpcServerError::from(err).into()
}

/// Serves the scheduler over JSON-RPC.
#[derive(Debug, Clone)]
pub(crate) struct CommitteeRpc {
    scheduler: Arc<TaskScheduler<TaskDBSled>>,
}

impl CommitteeRpc {
    pub(crate) fn new(scheduler: Arc<TaskScheduler<TaskDBSled>>) -> Self {
        Self { scheduler }
    }
}

#[async_trait]
impl TaskRequestHandlerApiServer for CommitteeRpc {
    async fn get_task(&self, request: TaskRequest) -> RpcResult<Option<Task>> {
        let task = self
            .scheduler
            .get_task(request.executor_id)
            .await
            .map_err(to_rpc_error)?;
        if let Some(task) = &task {
            debug!(task_id = %task.id, executor = %request.executor_id, "task handed out");
        }
        Ok(task)
    }

    async fn set_task_result(&self, result: TaskResult) -> RpcResult<()> {
        self.scheduler
            .set_task_result(result)
            .await
            .map_err(to_rpc_error)
    }
}

#[async_trait]
impl DebugTasksApiServer for CommitteeRpc {
    async fn get_tasks(&self, request: TaskDebugRequest) -> RpcResult<Vec<TaskView>> {
        self.scheduler
            .get_tasks(request)
            .await
            .map_err(to_rpc_error)
    }

    async fn get_task_tree(&self, task_id: TaskId) -> RpcResult<Option<TaskTreeView>> {
        self.scheduler
            .get_task_tree(task_id)
            .await
            .map_err(to_rpc_error)
    }
}
