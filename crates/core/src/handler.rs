use std::{fmt, sync::Arc};

use anyhow::Context;
use async_trait::async_trait;
use committee_db_types::{BlockBatchDatabase, DbError, TaskDatabase};
use committee_scheduler::TaskStateChangeHandler;
use committee_task_types::{Task, TaskResult, TaskType};
use tokio_util::sync::CancellationToken;
use tracing::*;

use crate::{utils::run_blocking, BatchResetter};

/// Applies the outcome of proof tasks to the batches they belong to.
pub struct BatchStateHandler<B, T> {
    batch_db: Arc<B>,
    resetter: Arc<BatchResetter<B, T>>,
    cancel: CancellationToken,
}

impl<B, T> fmt::Debug for BatchStateHandler<B, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchStateHandler").finish_non_exhaustive()
    }
}

impl<B: BlockBatchDatabase, T: TaskDatabase> BatchStateHandler<B, T> {
    pub fn new(
        batch_db: Arc<B>,
        resetter: Arc<BatchResetter<B, T>>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            batch_db,
            resetter,
            cancel,
        }
    }
}

#[async_trait]
impl<B: BlockBatchDatabase, T: TaskDatabase> TaskStateChangeHandler for BatchStateHandler<B, T> {
    async fn on_task_terminated(&self, task: &Task, result: &TaskResult) -> anyhow::Result<()> {
        let batch_id = task.batch_id;

        if !result.is_success {
            warn!(
                task_id = %task.id,
                %batch_id,
                task_type = %task.task_type,
                error = %result.error_text,
                "proof task failed, resetting its batch"
            );
            self.resetter.reset_from(batch_id).await?;
            return Ok(());
        }

        match task.task_type {
            TaskType::AggregateProofs => {
                let cancel = self.cancel.clone();
                let proved = run_blocking(&self.batch_db, move |db| {
                    db.set_batch_as_proved(batch_id, &cancel)
                })
                .await;
                match proved {
                    Ok(_) => {}
                    Err(DbError::BatchNotFound(_)) => {
                        warn!(%batch_id, "proved batch was purged meanwhile");
                    }
                    Err(err) => {
                        return Err(err).with_context(|| format!("marking {batch_id} as proved"))
                    }
                }
            }
            TaskType::ProofBlock => {
                // folded into the aggregate task by storage
                debug!(task_id = %task.id, %batch_id, "block proof completed");
            }
        }
        Ok(())
    }
}
