use std::time::Duration;

use committee_common::metrics;
use committee_db_types::{traits::TaskDatabase, DbError, DbIter, DbResult, StopOnError};
use committee_primitives::{BatchId, ExecutorId, TaskId};
use committee_task_types::{Task, TaskEntry, TaskResult, TaskStatus};
use tokio_util::sync::CancellationToken;
use tracing::*;

use super::schemas::{TaskEntrySchema, TaskQueueKey, TaskQueueSchema};
use crate::{
    define_sled_database,
    utils::{abort, first},
};

/// Number of queue keys looked at per claim attempt.
const CLAIM_CANDIDATES: usize = 16;

define_sled_database!(
    pub struct TaskDBSled {
        task_tree: TaskEntrySchema,
        queue_tree: TaskQueueSchema,
    }
);

impl TaskDBSled {
    /// Best claim candidates according to the queue.
    fn queue_candidates(&self) -> DbResult<Vec<TaskQueueKey>> {
        let mut keys = Vec::with_capacity(CLAIM_CANDIDATES);
        for item in self.queue_tree.iter().take(CLAIM_CANDIDATES) {
            keys.push(first(item?));
        }
        Ok(keys)
    }

    /// One claim attempt. Range scans cannot run inside a sled transaction, so candidates are
    /// read first and rechecked inside it; [`DbError::Busy`] means they were all stale.
    fn try_claim(
        &self,
        executor: ExecutorId,
        now_ms: u64,
        cancel: &CancellationToken,
    ) -> DbResult<Option<Task>> {
        let candidates = self.queue_candidates()?;
        if candidates.is_empty() {
            return Ok(None);
        }

        let claimed = self
            .config
            .with_retry((&self.task_tree, &self.queue_tree), cancel, |(tt, qt)| {
                for key in &candidates {
                    if !qt.contains_key(key)? {
                        continue;
                    }
                    let entry = tt.get(&key.task_id)?;
                    let Some(mut entry) = entry.filter(TaskEntry::is_ready) else {
                        // dangling key, drop it
                        qt.remove(key)?;
                        continue;
                    };

                    if let Err(err) = entry.start(executor, now_ms) {
                        return abort(err);
                    }
                    tt.insert(&key.task_id, &entry)?;
                    qt.remove(key)?;
                    return Ok(Some(entry.task));
                }
                Ok(None)
            })?;

        claimed.map(Some).ok_or(DbError::Busy)
    }
}

impl TaskDatabase for TaskDBSled {
    fn add_task_entries(
        &self,
        entries: Vec<TaskEntry>,
        cancel: &CancellationToken,
    ) -> DbResult<()> {
        self.config
            .with_retry((&self.task_tree, &self.queue_tree), cancel, |(tt, qt)| {
                for entry in &entries {
                    // the old entry may sit in the queue under a different key
                    if let Some(old) = tt.get(&entry.id())? {
                        qt.remove(&TaskQueueKey::for_entry(&old))?;
                    }
                    tt.insert(&entry.id(), entry)?;
                    if entry.is_ready() {
                        qt.insert(&TaskQueueKey::for_entry(entry), &())?;
                    }
                }
                Ok(())
            })?;

        metrics::TASKS_ADDED_TOTAL.inc_by(entries.len() as u64);
        debug!(count = entries.len(), "added task entries");
        Ok(())
    }

    fn try_get_task_entry(&self, id: TaskId) -> DbResult<Option<TaskEntry>> {
        Ok(self.task_tree.get(&id)?)
    }

    fn request_task_to_execute(
        &self,
        executor: ExecutorId,
        now_ms: u64,
        cancel: &CancellationToken,
    ) -> DbResult<Option<Task>> {
        let claimed = self
            .config
            .retry_operation(|| self.try_claim(executor, now_ms, cancel))?;

        if let Some(task) = &claimed {
            metrics::TASKS_STARTED_TOTAL.inc();
            debug!(task_id = %task.id, %executor, task_type = %task.task_type, "task claimed");
        }
        Ok(claimed)
    }

    fn process_task_result(
        &self,
        result: TaskResult,
        now_ms: u64,
        cancel: &CancellationToken,
    ) -> DbResult<TaskEntry> {
        let task_id = result.task_id;
        let entry = self
            .config
            .with_retry((&self.task_tree, &self.queue_tree), cancel, |(tt, qt)| {
                let Some(mut entry) = tt.get(&task_id)? else {
                    return abort(DbError::TaskNotFound(task_id));
                };
                if let Err(err) = entry.validate_result(&result) {
                    return abort(err);
                }

                if !result.is_success {
                    entry.fail(now_ms);
                    tt.insert(&task_id, &entry)?;
                    return Ok(entry);
                }

                for dep_id in &entry.pending_deps {
                    let Some(mut dependent) = tt.get(dep_id)? else {
                        return abort(DbError::TaskNotFound(*dep_id));
                    };
                    let became_ready = match dependent.add_dependency_result(result.clone()) {
                        Ok(ready) => ready,
                        Err(err) => return abort(err),
                    };
                    tt.insert(dep_id, &dependent)?;
                    if became_ready {
                        qt.insert(&TaskQueueKey::for_entry(&dependent), &())?;
                    }
                }

                tt.remove(&task_id)?;
                Ok(entry)
            })?;

        let status = if result.is_success {
            TaskStatus::Completed
        } else {
            TaskStatus::Failed
        };
        metrics::record_task_terminated(status.as_str());
        info!(%task_id, task_type = %entry.task.task_type, %status, "task terminated");
        Ok(entry)
    }

    fn reschedule_hanging_tasks(
        &self,
        now_ms: u64,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> DbResult<usize> {
        let mut hanging = Vec::new();
        for item in self.task_tree.iter() {
            let (id, entry) = item?;
            if entry.is_hanging(now_ms, timeout) {
                hanging.push(id);
            }
        }

        if hanging.is_empty() {
            return Ok(0);
        }

        let rescheduled = self
            .config
            .with_retry((&self.task_tree, &self.queue_tree), cancel, |(tt, qt)| {
                let mut rescheduled = 0;
                for id in &hanging {
                    let Some(mut entry) = tt.get(id)? else {
                        continue;
                    };
                    // might have finished since the scan
                    if !entry.is_hanging(now_ms, timeout) {
                        continue;
                    }
                    if let Err(err) = entry.reset_running() {
                        return abort(err);
                    }
                    tt.insert(id, &entry)?;
                    qt.insert(&TaskQueueKey::for_entry(&entry), &())?;
                    rescheduled += 1;
                }
                Ok(rescheduled)
            })?;

        metrics::TASKS_RESCHEDULED_TOTAL.inc_by(rescheduled as u64);
        if rescheduled > 0 {
            warn!(count = rescheduled, "rescheduled hanging tasks");
        }
        Ok(rescheduled)
    }

    fn remove_task_entry(&self, id: TaskId, cancel: &CancellationToken) -> DbResult<bool> {
        self.config
            .with_retry((&self.task_tree, &self.queue_tree), cancel, |(tt, qt)| {
                let Some(entry) = tt.get(&id)? else {
                    return Ok(false);
                };
                tt.remove(&id)?;
                qt.remove(&TaskQueueKey::for_entry(&entry))?;
                Ok(true)
            })
    }

    fn get_task_entries(&self) -> DbIter<'_, TaskEntry> {
        let iter = self
            .task_tree
            .iter()
            .map(|item| item.map(|(_, entry)| entry).map_err(DbError::from));
        Box::new(StopOnError::new(iter))
    }

    fn get_task_ids_for_batch(&self, batch_id: BatchId) -> DbResult<Vec<TaskId>> {
        let mut ids = Vec::new();
        for item in self.task_tree.iter() {
            let (id, entry) = item?;
            if entry.task.batch_id == batch_id {
                ids.push(id);
            }
        }
        Ok(ids)
    }
}
