use std::sync::Arc;

use committee_db_types::{DbError, DbResult};

/// Runs a blocking storage call on the blocking pool.
pub(crate) async fn run_blocking<D, R, F>(db: &Arc<D>, f: F) -> DbResult<R>
where
    D: Send + Sync + 'static,
    R: Send + 'static,
    F: FnOnce(&D) -> DbResult<R> + Send + 'static,
{
    let db = db.clone();
    tokio::task::spawn_blocking(move || f(&db))
        .await
        .map_err(|e| DbError::Other(format!("storage worker failed: {e}")))?
}
