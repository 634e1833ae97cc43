use std::{fs, path::Path, sync::Arc};

use anyhow::Context;
use committee_db_types::DbResult;
use typed_sled::SledDb;

use crate::{SledBackend, SledDbConfig};

// Opens sled database instance from datadir
pub fn open_sled_database(datadir: &Path, dbname: &'static str) -> anyhow::Result<Arc<SledDb>> {
    let mut database_dir = datadir.to_path_buf();
    database_dir.push("sled");
    database_dir.push(dbname);

    if !database_dir.exists() {
        fs::create_dir_all(&database_dir)
            .with_context(|| format!("creating {}", database_dir.display()))?;
    }

    let sled_db = sled::open(&database_dir).context("opening sled database")?;

    let db = SledDb::new(Arc::new(sled_db))
        .map_err(|e| anyhow::anyhow!("Failed to create sled db: {}", e))?;
    Ok(Arc::new(db))
}

pub fn init_core_dbs(
    sled_db: Arc<SledDb>,
    config: SledDbConfig,
    capacity_limit: u32,
) -> DbResult<Arc<SledBackend>> {
    SledBackend::new(sled_db, config, capacity_limit).map(Arc::new)
}

/// In-memory backend that is dropped with its last handle.
#[cfg(any(test, feature = "test-utils"))]
pub fn open_temporary_backend(capacity_limit: u32) -> anyhow::Result<Arc<SledBackend>> {
    let sled_db = sled::Config::new()
        .temporary(true)
        .open()
        .context("opening temporary sled database")?;
    let db = SledDb::new(Arc::new(sled_db))
        .map_err(|e| anyhow::anyhow!("Failed to create sled db: {}", e))?;
    init_core_dbs(Arc::new(db), SledDbConfig::test(), capacity_limit)
        .map_err(|e| anyhow::anyhow!("Failed to initialize sled backend: {}", e))
}
