//! Trait definitions for the storage interfaces of the task scheduler and the batch pipeline.
//!
//! Every mutating operation takes a [`CancellationToken`]; a cancelled token aborts the
//! operation at its next attempt boundary with [`DbError::Cancelled`](crate::DbError) and
//! leaves storage untouched.

use std::{collections::BTreeMap, time::Duration};

use committee_batch_types::{BlockBatch, ProposalData};
use committee_primitives::{BatchId, BlockRef, ExecutorId, Hash, ShardId, TaskId};
use committee_task_types::{Task, TaskEntry, TaskResult};
use tokio_util::sync::CancellationToken;

use crate::{BatchEntry, DbResult};

/// Iterator over stored entries that ends after the first error it yields.
pub type DbIter<'a, T> = Box<dyn Iterator<Item = DbResult<T>> + 'a>;

/// Persistent store of proof tasks and their execution state.
pub trait TaskDatabase: Send + Sync + 'static {
    /// Inserts or replaces entries by id, atomically. Entries waiting for an executor become
    /// claimable.
    fn add_task_entries(&self, entries: Vec<TaskEntry>, cancel: &CancellationToken)
        -> DbResult<()>;

    /// Gets an entry by task id.
    fn try_get_task_entry(&self, id: TaskId) -> DbResult<Option<TaskEntry>>;

    /// Claims the highest priority task waiting for an executor on behalf of `executor`.
    ///
    /// Returns `None` if nothing is claimable.
    fn request_task_to_execute(
        &self,
        executor: ExecutorId,
        now_ms: u64,
        cancel: &CancellationToken,
    ) -> DbResult<Option<Task>>;

    /// Applies an executor's result to a running task.
    ///
    /// A failure marks the task failed. A success removes the entry and hands the result to
    /// every dependent task. Returns the entry as it was before the update.
    fn process_task_result(
        &self,
        result: TaskResult,
        now_ms: u64,
        cancel: &CancellationToken,
    ) -> DbResult<TaskEntry>;

    /// Puts every task running for longer than `timeout` back in the queue.
    ///
    /// Returns the number of rescheduled tasks.
    fn reschedule_hanging_tasks(
        &self,
        now_ms: u64,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> DbResult<usize>;

    /// Deletes an entry whatever its status. Returns if it really existed.
    fn remove_task_entry(&self, id: TaskId, cancel: &CancellationToken) -> DbResult<bool>;

    /// Iterates over every stored entry.
    fn get_task_entries(&self) -> DbIter<'_, TaskEntry>;

    /// Ids of every stored task of `batch_id`.
    fn get_task_ids_for_batch(&self, batch_id: BatchId) -> DbResult<Vec<TaskId>>;
}

/// Persistent store of block batches, fetched blocks and the proved state root.
pub trait BlockBatchDatabase: Send + Sync + 'static {
    /// Stores a new batch on top of the current head, or updates the head batch.
    fn put_block_batch(
        &self,
        batch: &BlockBatch,
        now_ms: u64,
        cancel: &CancellationToken,
    ) -> DbResult<()>;

    /// Marks a batch as proved. Returns whether the flag flipped.
    fn set_batch_as_proved(&self, batch_id: BatchId, cancel: &CancellationToken)
        -> DbResult<bool>;

    /// Finds the proved batch built on the current proved state root.
    fn try_get_next_proposal_data(&self) -> DbResult<Option<ProposalData>>;

    /// Drops a proposed batch and advances the proved state root past it.
    fn set_batch_as_proposed(&self, batch_id: BatchId, cancel: &CancellationToken)
        -> DbResult<()>;

    /// Purges the head batch and its ancestors down to `first_batch_to_purge` (inclusive).
    ///
    /// Returns the purged ids, newest first.
    fn reset_batches_range(
        &self,
        first_batch_to_purge: BatchId,
        cancel: &CancellationToken,
    ) -> DbResult<Vec<BatchId>>;

    /// Purges every batch that cannot be proposed anymore after the proved state root moved.
    ///
    /// Returns the purged ids.
    fn reset_batches_not_proved(&self, cancel: &CancellationToken) -> DbResult<Vec<BatchId>>;

    fn set_proved_state_root(&self, root: Hash, cancel: &CancellationToken) -> DbResult<()>;

    fn try_get_proved_state_root(&self) -> DbResult<Option<Hash>>;

    /// Latest stored block ref of every shard.
    fn get_latest_fetched(&self) -> DbResult<BTreeMap<ShardId, BlockRef>>;

    /// Moves the fetch point of a shard, e.g. to initialize it.
    fn set_latest_fetched(&self, block_ref: BlockRef, cancel: &CancellationToken)
        -> DbResult<()>;

    fn try_get_latest_batch_id(&self) -> DbResult<Option<BatchId>>;

    /// Loads a batch together with its blocks.
    fn try_get_batch(&self, batch_id: BatchId) -> DbResult<Option<BlockBatch>>;

    fn batch_exists(&self, batch_id: BatchId) -> DbResult<bool>;

    /// Number of batches that can still be stored before hitting the capacity limit.
    fn get_free_space_batch_count(&self) -> DbResult<u32>;

    /// Iterates over every stored batch entry, oldest first.
    fn get_batches(&self) -> DbIter<'_, BatchEntry>;
}
