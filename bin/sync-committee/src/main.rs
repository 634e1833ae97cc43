//! Sync committee node.

use std::sync::Arc;

use anyhow::Context;
use args::Args;
use committee_common::logging::{self, LoggerConfig};
use committee_core::{
    Aggregator, BatchResetter, BatchStateHandler, L1Contract, LocalL1Contract, Proposer,
    Sha256BatchEncoder,
};
use committee_db_store_sled::{open_sled_backend, SLED_NAME};
use committee_scheduler::TaskScheduler;
use config::{Config, L1Mode};
use rpc_server::CommitteeRpc;
use shard_client::ShardRpcClient;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::*;

mod args;
mod config;
mod metrics_server;
mod rpc_server;
mod shard_client;

const SERVICE_NAME: &str = "sync-committee";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Args = argh::from_env();
    if let Err(e) = main_inner(args).await {
        eprintln!("FATAL ERROR: {e:?}");

        return Err(e);
    }

    Ok(())
}

async fn main_inner(args: Args) -> anyhow::Result<()> {
    let config = args
        .resolve_config()
        .context("Failed to resolve configuration")?;
    init_logging(&config);
    debug!(?config, "running sync committee");

    let cancel = CancellationToken::new();
    let backend = open_sled_backend(
        &config.datadir,
        SLED_NAME,
        config.db_config(),
        config.batch.capacity_limit,
    )
    .context("Failed to open the sled database")?;
    let batch_db = backend.batch_db();
    let task_db = backend.task_db();

    let resetter = Arc::new(BatchResetter::new(
        batch_db.clone(),
        task_db.clone(),
        cancel.clone(),
    ));
    let state_handler = Arc::new(BatchStateHandler::new(
        batch_db.clone(),
        resetter.clone(),
        cancel.clone(),
    ));
    let scheduler = Arc::new(TaskScheduler::new(
        task_db.clone(),
        state_handler,
        config.scheduler_config(),
        cancel.clone(),
    ));

    let source = Arc::new(ShardRpcClient::new(&config.aggregator.block_source_url)?);
    let aggregator = Aggregator::new(
        batch_db.clone(),
        task_db,
        source,
        Arc::new(Sha256BatchEncoder),
        resetter.clone(),
        config.aggregator_config(),
        cancel.clone(),
    );

    let l1: Arc<dyn L1Contract> = match config.l1.mode {
        L1Mode::Local => {
            info!(genesis_root = %config.l1.genesis_root, "using local L1 contract");
            Arc::new(LocalL1Contract::new(config.l1.genesis_root))
        }
    };
    let proposer = Proposer::new(
        batch_db,
        l1,
        resetter,
        config.proposer_config(),
        cancel.clone(),
    );

    let (rpc_handle, _) = rpc_server::start(
        CommitteeRpc::new(scheduler.clone()),
        &config.rpc_listen_addr(),
        config.rpc.enable_debug_rpc,
    )
    .await
    .context("Failed to start the RPC server")?;

    let mut services: JoinSet<anyhow::Result<()>> = JoinSet::new();
    services.spawn(async move {
        scheduler.run_reschedule_loop().await;
        Ok(())
    });
    services.spawn(async move {
        aggregator.run().await;
        Ok(())
    });
    services.spawn(async move {
        proposer.run().await;
        Ok(())
    });
    if config.metrics.enabled {
        services.spawn(metrics_server::serve(config.metrics_addr()?, cancel.clone()));
    }

    wait_for_shutdown(&cancel).await?;

    if rpc_handle.stop().is_err() {
        warn!("rpc server already stopped");
    }
    rpc_handle.stopped().await;

    while let Some(joined) = services.join_next().await {
        match joined {
            Ok(Ok(())) => {}
            Ok(Err(err)) => error!(?err, "service failed"),
            Err(err) => error!(?err, "service panicked"),
        }
    }

    info!("sync committee stopped");
    Ok(())
}

fn init_logging(config: &Config) {
    let mut logger = LoggerConfig::new(SERVICE_NAME).with_json_format(config.logging.json_format);
    if let Some(dir) = &config.logging.log_dir {
        logger = logger.with_log_dir(dir.clone(), config.logging.log_file_prefix.as_deref());
    }
    logging::init(logger);
}

/// Waits for ctrl-c, then cancels every service and in-flight storage operation.
async fn wait_for_shutdown(cancel: &CancellationToken) -> anyhow::Result<()> {
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for the shutdown signal")?;
    info!("shutdown requested");
    cancel.cancel();
    Ok(())
}
