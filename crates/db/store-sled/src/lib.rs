//! Sled store for the sync committee.

pub mod batch;
mod config;
mod init;
mod lexicographic;
pub mod macros;
pub mod task;
mod utils;
mod versioned;

use std::{path::Path, sync::Arc};

pub use batch::{BatchDBSled, DEFAULT_BATCH_CAPACITY};
use committee_db_types::DbResult;
pub use config::SledDbConfig;
pub use task::TaskDBSled;
use typed_sled::SledDb;

#[cfg(any(test, feature = "test-utils"))]
pub use crate::init::open_temporary_backend;
pub use crate::init::{init_core_dbs, open_sled_database};

pub const SLED_NAME: &str = "sync-committee";

/// Opens a complete Sled backend from datadir with all database types
pub fn open_sled_backend(
    datadir: &Path,
    dbname: &'static str,
    ops_config: SledDbConfig,
    capacity_limit: u32,
) -> anyhow::Result<Arc<SledBackend>> {
    let sled_db = open_sled_database(datadir, dbname)?;
    SledBackend::new(sled_db, ops_config, capacity_limit)
        .map_err(|e| anyhow::anyhow!("Failed to initialize sled backend: {}", e))
        .map(Arc::new)
}

/// Complete Sled backend with all database types
#[derive(Debug)]
pub struct SledBackend {
    task_db: Arc<TaskDBSled>,
    batch_db: Arc<BatchDBSled>,
}

impl SledBackend {
    pub fn new(sled_db: Arc<SledDb>, config: SledDbConfig, capacity_limit: u32) -> DbResult<Self> {
        let task_db = Arc::new(TaskDBSled::new(sled_db.clone(), config.clone())?);
        let batch_db =
            Arc::new(BatchDBSled::new(sled_db, config)?.with_capacity_limit(capacity_limit));
        Ok(Self { task_db, batch_db })
    }

    pub fn task_db(&self) -> Arc<TaskDBSled> {
        self.task_db.clone()
    }

    pub fn batch_db(&self) -> Arc<BatchDBSled> {
        self.batch_db.clone()
    }
}
