use std::{fmt, sync::Arc};

use committee_db_types::{DbResult, TaskDatabase};
use committee_primitives::{time::now_millis, ExecutorId};
use committee_task_types::{Task, TaskResult};
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::*;

use crate::{SchedulerConfig, SchedulerError, SchedulerResult, TaskStateChangeHandler};

/// Hands out proof tasks and applies their results.
///
/// Every storage call runs on the blocking pool and observes the scheduler's cancellation
/// token, so shutdown aborts in-flight transactions instead of waiting on them.
pub struct TaskScheduler<D> {
    db: Arc<D>,
    handler: Arc<dyn TaskStateChangeHandler>,
    config: SchedulerConfig,
    cancel: CancellationToken,
}

impl<D> fmt::Debug for TaskScheduler<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskScheduler")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<D: TaskDatabase> TaskScheduler<D> {
    pub fn new(
        db: Arc<D>,
        handler: Arc<dyn TaskStateChangeHandler>,
        config: SchedulerConfig,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            db,
            handler,
            config,
            cancel,
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Runs a storage operation on the blocking pool.
    pub(crate) async fn run_blocking<R, F>(
        &self,
        op: &'static str,
        key: String,
        f: F,
    ) -> SchedulerResult<R>
    where
        R: Send + 'static,
        F: FnOnce(&D, &CancellationToken) -> DbResult<R> + Send + 'static,
    {
        let db = self.db.clone();
        let cancel = self.cancel.clone();
        tokio::task::spawn_blocking(move || f(&db, &cancel))
            .await?
            .map_err(SchedulerError::storage(op, key))
    }

    /// Claims the best runnable task for `executor`.
    #[instrument(skip_all, fields(%executor))]
    pub async fn get_task(&self, executor: ExecutorId) -> SchedulerResult<Option<Task>> {
        self.run_blocking(
            "request_task_to_execute",
            executor.to_string(),
            move |db, cancel| db.request_task_to_execute(executor, now_millis(), cancel),
        )
        .await
    }

    /// Applies an executor's result, then notifies the state change handler.
    ///
    /// A failing handler does not undo the stored result; the failure is logged.
    #[instrument(skip_all, fields(task_id = %result.task_id, sender = %result.sender))]
    pub async fn set_task_result(&self, result: TaskResult) -> SchedulerResult<()> {
        let task_id = result.task_id;
        let stored = result.clone();
        let entry = self
            .run_blocking("process_task_result", task_id.to_string(), move |db, cancel| {
                db.process_task_result(stored, now_millis(), cancel)
            })
            .await?;

        if let Err(err) = self.handler.on_task_terminated(&entry.task, &result).await {
            error!(%task_id, task_type = %entry.task.task_type, ?err, "task state change handler failed");
        }
        Ok(())
    }

    /// Puts tasks running for longer than the execution timeout back in the queue.
    pub async fn reschedule_hanging_tasks(&self) -> SchedulerResult<usize> {
        let timeout = self.config.execution_timeout;
        self.run_blocking(
            "reschedule_hanging_tasks",
            format!("timeout={timeout:?}"),
            move |db, cancel| db.reschedule_hanging_tasks(now_millis(), timeout, cancel),
        )
        .await
    }

    /// Periodically reschedules hanging tasks until the scheduler is cancelled.
    pub async fn run_reschedule_loop(&self) {
        info!(
            interval = ?self.config.reschedule_interval,
            timeout = ?self.config.execution_timeout,
            "reschedule loop started"
        );
        let mut ticker = interval(self.config.reschedule_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            match self.reschedule_hanging_tasks().await {
                Ok(0) => {}
                Ok(count) => debug!(%count, "reschedule tick done"),
                Err(err) => {
                    if self.cancel.is_cancelled() {
                        break;
                    }
                    error!(?err, "failed to reschedule hanging tasks");
                }
            }
        }

        info!("reschedule loop stopped");
    }
}
