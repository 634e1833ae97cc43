use std::{fmt, sync::Arc};

use anyhow::Context;
use committee_db_types::{BlockBatchDatabase, TaskDatabase};
use committee_primitives::BatchId;
use tokio_util::sync::CancellationToken;
use tracing::*;

use crate::utils::run_blocking;

/// Purges batches from storage together with the proof tasks planned for them.
pub struct BatchResetter<B, T> {
    batch_db: Arc<B>,
    task_db: Arc<T>,
    cancel: CancellationToken,
}

impl<B, T> fmt::Debug for BatchResetter<B, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchResetter").finish_non_exhaustive()
    }
}

impl<B: BlockBatchDatabase, T: TaskDatabase> BatchResetter<B, T> {
    pub fn new(batch_db: Arc<B>, task_db: Arc<T>, cancel: CancellationToken) -> Self {
        Self {
            batch_db,
            task_db,
            cancel,
        }
    }

    /// Purges `batch_id` and every batch stored after it. A batch that is already gone is left
    /// alone.
    #[instrument(skip(self), fields(%batch_id))]
    pub async fn reset_from(&self, batch_id: BatchId) -> anyhow::Result<Vec<BatchId>> {
        let exists = run_blocking(&self.batch_db, move |db| db.batch_exists(batch_id))
            .await
            .context("checking batch existence")?;
        if !exists {
            debug!("batch already purged");
            return Ok(Vec::new());
        }

        let cancel = self.cancel.clone();
        let purged = run_blocking(&self.batch_db, move |db| {
            db.reset_batches_range(batch_id, &cancel)
        })
        .await
        .with_context(|| format!("resetting batches from {batch_id}"))?;

        self.remove_tasks(&purged).await?;
        Ok(purged)
    }

    /// Purges every batch that can no longer be proposed on top of the proved state root.
    pub async fn reset_not_proved(&self) -> anyhow::Result<Vec<BatchId>> {
        let cancel = self.cancel.clone();
        let purged = run_blocking(&self.batch_db, move |db| {
            db.reset_batches_not_proved(&cancel)
        })
        .await
        .context("resetting batches that are not proved")?;

        self.remove_tasks(&purged).await?;
        Ok(purged)
    }

    /// Removes every stored task of the given batches.
    pub async fn remove_tasks(&self, batches: &[BatchId]) -> anyhow::Result<usize> {
        let batches = batches.to_vec();
        let cancel = self.cancel.clone();
        let removed = run_blocking(&self.task_db, move |db| {
            let mut removed = 0;
            for batch_id in batches {
                for task_id in db.get_task_ids_for_batch(batch_id)? {
                    if db.remove_task_entry(task_id, &cancel)? {
                        removed += 1;
                    }
                }
            }
            Ok(removed)
        })
        .await
        .context("removing tasks of purged batches")?;

        if removed > 0 {
            info!(%removed, "removed tasks of purged batches");
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use committee_db_types::DbError;

    use super::*;
    use crate::test_utils::TestEnv;

    #[tokio::test]
    async fn test_reset_removes_batches_and_tasks() {
        let env = TestEnv::new(8);
        let first = env.store_sealed_batch(2);
        let second = env.store_sealed_batch(1);
        assert_eq!(env.task_count(), 5 + 3);

        let purged = env.resetter.reset_from(first).await.unwrap();
        assert_eq!(purged, vec![second, first]);
        assert_eq!(env.task_count(), 0);
        assert!(!env.batch_db.batch_exists(first).unwrap());

        // second reset of the same batch is a no-op
        assert!(env.resetter.reset_from(first).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_reset_not_proved_purges_unproved_batches() {
        let env = TestEnv::new(8);
        let first = env.store_sealed_batch(1);
        env.batch_db
            .set_batch_as_proved(first, &env.cancel)
            .unwrap();
        let second = env.store_sealed_batch(1);

        let purged = env.resetter.reset_not_proved().await.unwrap();
        assert_eq!(purged, vec![second]);
        assert!(env.batch_db.batch_exists(first).unwrap());
        assert!(env
            .task_db
            .get_task_ids_for_batch(second)
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_reset_surfaces_error() {
        let env = TestEnv::new(8);
        let first = env.store_sealed_batch(1);
        env.cancel.cancel();

        let err = env.resetter.reset_from(first).await.unwrap_err();
        assert_eq!(err.downcast_ref::<DbError>(), Some(&DbError::Cancelled));
        assert!(env.batch_db.try_get_batch(first).unwrap().is_some());
    }
}
