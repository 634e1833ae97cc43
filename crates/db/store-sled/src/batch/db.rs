use std::collections::{BTreeMap, BTreeSet};

use committee_batch_types::{BlockBatch, ProposalData};
use committee_common::metrics::{self, BatchEvent};
use committee_db_types::{
    traits::BlockBatchDatabase, BatchEntry, BlockEntry, DbError, DbIter, DbResult, StopOnError,
};
use committee_primitives::{time::now_millis, BatchId, BlockRef, Hash, ShardId};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::*;

use super::schemas::{
    BatchCountSchema, BatchEntrySchema, BlockEntrySchema, LatestBatchIdSchema,
    LatestFetchedSchema, ProvedStateRootSchema,
};
use crate::{
    define_sled_database,
    utils::{abort, first, second},
};

/// Maximum number of batches stored at once unless configured otherwise.
pub const DEFAULT_BATCH_CAPACITY: u32 = 100;

define_sled_database!(
    pub struct BatchDBSled {
        batch_tree: BatchEntrySchema,
        block_tree: BlockEntrySchema,
        latest_fetched_tree: LatestFetchedSchema,
        proved_root_tree: ProvedStateRootSchema,
        latest_batch_tree: LatestBatchIdSchema,
        batch_count_tree: BatchCountSchema,
    }
    extra {
        reset_guard: Mutex<()> = Mutex::new(()),
        capacity_limit: u32 = DEFAULT_BATCH_CAPACITY,
    }
);

/// Hash of the latest main-shard block referenced by the entry: the state root the batch
/// leads to.
fn main_tip(entry: &BatchEntry) -> DbResult<Hash> {
    entry
        .block_ids
        .iter()
        .rfind(|id| id.shard_id.is_main())
        .map(|id| id.hash)
        .ok_or_else(|| DbError::Other(format!("batch {} has no main shard blocks", entry.id)))
}

fn main_block_count(entry: &BatchEntry) -> u64 {
    entry
        .block_ids
        .iter()
        .filter(|id| id.shard_id.is_main())
        .count() as u64
}

/// Shards touched by an entry: its own blocks and the refs it was built upon.
fn touched_shards(entry: &BatchEntry) -> BTreeSet<ShardId> {
    entry
        .block_ids
        .iter()
        .map(|id| id.shard_id)
        .chain(entry.parent_refs.keys().copied())
        .collect()
}

impl BatchDBSled {
    pub fn with_capacity_limit(mut self, capacity_limit: u32) -> Self {
        self.capacity_limit = capacity_limit;
        self
    }

    /// Shards that currently have a latest-fetched pointer.
    fn known_shards(&self) -> DbResult<Vec<ShardId>> {
        let mut shards = Vec::new();
        for item in self.latest_fetched_tree.iter() {
            shards.push(first(item?));
        }
        Ok(shards)
    }

    fn load_blocks(&self, entry: &BatchEntry) -> DbResult<Vec<BlockEntry>> {
        entry
            .block_ids
            .iter()
            .map(|id| {
                self.block_tree
                    .get(id)?
                    .ok_or(DbError::BlockNotFound(*id))
            })
            .collect()
    }

    fn proposal_data(&self, entry: BatchEntry, old_root: Hash) -> DbResult<ProposalData> {
        let blocks = self.load_blocks(&entry)?;
        let new_root = main_tip(&entry)?;
        let first_block_fetched_at_ms = blocks
            .iter()
            .map(|b| b.fetched_at_ms)
            .min()
            .unwrap_or(entry.created_at_ms);

        Ok(ProposalData {
            batch_id: entry.id,
            old_proved_state_root: old_root,
            new_proved_state_root: new_root,
            main_block_count: main_block_count(&entry),
            first_block_fetched_at_ms,
            data_proofs: entry.data_proofs,
        })
    }
}

impl BlockBatchDatabase for BatchDBSled {
    #[instrument(skip_all, fields(batch_id = %batch.id, blocks = batch.blocks_count()))]
    fn put_block_batch(
        &self,
        batch: &BlockBatch,
        now_ms: u64,
        cancel: &CancellationToken,
    ) -> DbResult<()> {
        batch.blocks.validate()?;
        let known_shards = self.known_shards()?;
        let capacity_limit = self.capacity_limit;

        let stored = self.config.with_retry(
            (
                &self.batch_tree,
                &self.block_tree,
                &self.latest_fetched_tree,
                &self.latest_batch_tree,
                &self.batch_count_tree,
            ),
            cancel,
            |(bt, blt, lft, lbt, cnt)| {
                let head = lbt.get(&())?;
                let existing = bt.get(&batch.id)?;
                let is_new = existing.is_none();

                let mut entry = match existing {
                    // resubmission of what is already stored
                    Some(entry) if entry.matches(batch) => return Ok(None),
                    Some(entry) => {
                        if head != Some(batch.id) || entry.is_sealed {
                            return abort(DbError::BatchMismatch(format!(
                                "batch {} is not the open head batch",
                                batch.id
                            )));
                        }
                        if entry.parent_id != batch.parent_id {
                            return abort(DbError::BatchMismatch(format!(
                                "batch {} changed its parent",
                                batch.id
                            )));
                        }
                        entry
                    }
                    None => {
                        if batch.parent_id != head {
                            return abort(DbError::BatchMismatch(format!(
                                "batch {} names parent {:?}, head is {:?}",
                                batch.id, batch.parent_id, head
                            )));
                        }

                        let count = cnt.get(&())?.unwrap_or(0);
                        if count >= capacity_limit {
                            return abort(DbError::CapacityLimitReached(capacity_limit));
                        }
                        cnt.insert(&(), &(count + 1))?;

                        let shards: BTreeSet<ShardId> = known_shards
                            .iter()
                            .copied()
                            .chain(batch.blocks.shards())
                            .collect();
                        let mut parent_refs = BTreeMap::new();
                        for shard in shards {
                            if let Some(block_ref) = lft.get(&shard)? {
                                parent_refs.insert(shard, block_ref);
                            }
                        }
                        BatchEntry::new(batch, parent_refs)
                    }
                };

                for shard in batch.blocks.shards() {
                    let mut latest = lft.get(&shard)?;
                    let mut earliest_new = true;

                    for block in batch.blocks.segment(shard) {
                        let block_id = block.id();
                        if let Some(stored) = blt.get(&block_id)? {
                            if stored.batch_id != batch.id {
                                return abort(DbError::BatchMismatch(format!(
                                    "block {block_id} already belongs to batch {}",
                                    stored.batch_id
                                )));
                            }
                            continue;
                        }

                        if let Some(tip) = &latest {
                            let checked = if earliest_new {
                                tip.validate_next(block)
                            } else {
                                tip.validate_child(block)
                            };
                            if let Err(err) = checked {
                                return abort(DbError::BatchMismatch(format!(
                                    "batch {}: {err}",
                                    batch.id
                                )));
                            }
                        }
                        earliest_new = false;

                        blt.insert(&block_id, &BlockEntry::new(block.clone(), batch.id, now_ms))?;
                        latest = Some(block.to_ref());
                    }

                    if let Some(tip) = latest {
                        lft.insert(&shard, &tip)?;
                    }
                }

                if !is_new {
                    entry.update_from(batch);
                }
                bt.insert(&batch.id, &entry)?;
                lbt.insert(&(), &batch.id)?;
                Ok(Some(is_new))
            },
        )?;

        let Some(is_new) = stored else {
            debug!("batch already stored");
            return Ok(());
        };
        if is_new {
            metrics::record_batch_event(BatchEvent::Created, 1);
        }
        if batch.is_sealed {
            metrics::record_batch_event(BatchEvent::Sealed, 1);
            info!("batch sealed");
        } else {
            debug!(%is_new, "batch stored");
        }
        Ok(())
    }

    fn set_batch_as_proved(&self, batch_id: BatchId, cancel: &CancellationToken) -> DbResult<bool> {
        let flipped = self
            .config
            .with_retry((&self.batch_tree,), cancel, |(bt,)| {
                let Some(mut entry) = bt.get(&batch_id)? else {
                    return abort(DbError::BatchNotFound(batch_id));
                };
                if entry.is_proved {
                    return Ok(false);
                }
                entry.is_proved = true;
                bt.insert(&batch_id, &entry)?;
                Ok(true)
            })?;

        if flipped {
            metrics::record_batch_event(BatchEvent::Proved, 1);
            info!(%batch_id, "batch proved");
        }
        Ok(flipped)
    }

    fn try_get_next_proposal_data(&self) -> DbResult<Option<ProposalData>> {
        let root = self
            .proved_root_tree
            .get(&())?
            .ok_or(DbError::ProvedStateRootNotInitialized)?;

        for item in self.batch_tree.iter() {
            let entry = second(item?);
            if !entry.is_proved || entry.parent_main_ref().map(|r| r.hash) != Some(root) {
                continue;
            }
            return self.proposal_data(entry, root).map(Some);
        }
        Ok(None)
    }

    fn set_batch_as_proposed(&self, batch_id: BatchId, cancel: &CancellationToken) -> DbResult<()> {
        let (first_fetched_ms, new_root) = self.config.with_retry(
            (
                &self.batch_tree,
                &self.block_tree,
                &self.proved_root_tree,
                &self.batch_count_tree,
            ),
            cancel,
            |(bt, blt, prt, cnt)| {
                let Some(entry) = bt.get(&batch_id)? else {
                    return abort(DbError::BatchNotFound(batch_id));
                };
                if !entry.is_proved {
                    return abort(DbError::BatchNotProved(batch_id));
                }
                let Some(root) = prt.get(&())? else {
                    return abort(DbError::ProvedStateRootNotInitialized);
                };
                let parent_root = entry.parent_main_ref().map_or(Hash::ZERO, |r| r.hash);
                if parent_root != root {
                    return abort(DbError::StateRootMismatch {
                        expected: root,
                        actual: parent_root,
                    });
                }
                let new_root = match main_tip(&entry) {
                    Ok(new_root) => new_root,
                    Err(err) => return abort(err),
                };

                let mut first_fetched_ms = entry.created_at_ms;
                for block_id in &entry.block_ids {
                    if let Some(block) = blt.get(block_id)? {
                        first_fetched_ms = first_fetched_ms.min(block.fetched_at_ms);
                    }
                    blt.remove(block_id)?;
                }
                bt.remove(&batch_id)?;

                let count = cnt.get(&())?.unwrap_or(0);
                cnt.insert(&(), &count.saturating_sub(1))?;
                prt.insert(&(), &new_root)?;

                Ok((first_fetched_ms, new_root))
            },
        )?;

        let latency_ms = now_millis().saturating_sub(first_fetched_ms);
        metrics::BATCH_PROPOSAL_LATENCY.observe(latency_ms as f64 / 1000.0);
        metrics::record_batch_event(BatchEvent::Proposed, 1);
        info!(%batch_id, %new_root, %latency_ms, "batch proposed");
        Ok(())
    }

    #[instrument(skip(self, cancel))]
    fn reset_batches_range(
        &self,
        first_batch_to_purge: BatchId,
        cancel: &CancellationToken,
    ) -> DbResult<Vec<BatchId>> {
        let _guard = self.reset_guard.try_lock().ok_or(DbError::ResetInProgress)?;

        let purged = self.config.with_retry(
            (
                &self.batch_tree,
                &self.block_tree,
                &self.latest_fetched_tree,
                &self.latest_batch_tree,
                &self.batch_count_tree,
            ),
            cancel,
            |(bt, blt, lft, lbt, cnt)| {
                let mut purged = Vec::new();
                let mut visited = BTreeSet::new();
                let mut current = lbt.get(&())?;

                loop {
                    let Some(batch_id) = current else {
                        return abort(DbError::BatchNotFound(first_batch_to_purge));
                    };
                    if !visited.insert(batch_id) {
                        return abort(DbError::BatchChainCycle(batch_id));
                    }
                    let Some(entry) = bt.get(&batch_id)? else {
                        return abort(DbError::BatchNotFound(batch_id));
                    };

                    for shard in touched_shards(&entry) {
                        match entry.parent_refs.get(&shard) {
                            Some(block_ref) => lft.insert(&shard, block_ref)?,
                            None => {
                                lft.remove(&shard)?;
                            }
                        }
                    }
                    for block_id in &entry.block_ids {
                        blt.remove(block_id)?;
                    }
                    bt.remove(&batch_id)?;
                    purged.push(batch_id);

                    current = entry.parent_id;
                    if batch_id == first_batch_to_purge {
                        break;
                    }
                }

                match current {
                    Some(parent_id) => lbt.insert(&(), &parent_id)?,
                    None => {
                        lbt.remove(&())?;
                    }
                }
                let count = cnt.get(&())?.unwrap_or(0);
                cnt.insert(&(), &count.saturating_sub(purged.len() as u32))?;

                Ok(purged)
            },
        )?;

        metrics::record_batch_event(BatchEvent::Reset, purged.len() as u64);
        warn!(count = purged.len(), "purged batches");
        Ok(purged)
    }

    #[instrument(skip_all)]
    fn reset_batches_not_proved(&self, cancel: &CancellationToken) -> DbResult<Vec<BatchId>> {
        let _guard = self.reset_guard.try_lock().ok_or(DbError::ResetInProgress)?;

        let known_shards = self.known_shards()?;
        let mut batch_ids = Vec::new();
        for item in self.batch_tree.iter() {
            batch_ids.push(first(item?));
        }

        let purged = self.config.with_retry(
            (
                &self.batch_tree,
                &self.block_tree,
                &self.latest_fetched_tree,
                &self.latest_batch_tree,
                &self.batch_count_tree,
            ),
            cancel,
            |(bt, blt, lft, lbt, cnt)| {
                for shard in &known_shards {
                    lft.remove(shard)?;
                }

                let mut purged: Vec<BatchId> = Vec::new();
                let mut survivor = None;
                let mut orphan_parent = None;

                // ids sort by creation time, so parents come first
                for batch_id in &batch_ids {
                    let Some(entry) = bt.get(batch_id)? else {
                        continue;
                    };
                    let orphaned = entry.parent_id.is_some_and(|p| purged.contains(&p));
                    if entry.is_proved && !orphaned {
                        survivor = Some(*batch_id);
                        continue;
                    }

                    if purged.is_empty() {
                        orphan_parent = entry.parent_id;
                    }
                    for block_id in &entry.block_ids {
                        blt.remove(block_id)?;
                    }
                    bt.remove(batch_id)?;
                    purged.push(*batch_id);
                }

                if !purged.is_empty() {
                    match survivor.or(orphan_parent) {
                        Some(head) => lbt.insert(&(), &head)?,
                        None => {
                            lbt.remove(&())?;
                        }
                    }
                    let count = cnt.get(&())?.unwrap_or(0);
                    cnt.insert(&(), &count.saturating_sub(purged.len() as u32))?;
                }

                Ok(purged)
            },
        )?;

        metrics::record_batch_event(BatchEvent::Reset, purged.len() as u64);
        warn!(count = purged.len(), "purged batches that were not proved");
        Ok(purged)
    }

    fn set_proved_state_root(&self, root: Hash, cancel: &CancellationToken) -> DbResult<()> {
        self.config
            .with_retry((&self.proved_root_tree,), cancel, |(prt,)| {
                prt.insert(&(), &root)?;
                Ok(())
            })?;
        info!(%root, "proved state root updated");
        Ok(())
    }

    fn try_get_proved_state_root(&self) -> DbResult<Option<Hash>> {
        Ok(self.proved_root_tree.get(&())?)
    }

    fn get_latest_fetched(&self) -> DbResult<BTreeMap<ShardId, BlockRef>> {
        let mut refs = BTreeMap::new();
        for item in self.latest_fetched_tree.iter() {
            let (shard, block_ref) = item?;
            refs.insert(shard, block_ref);
        }
        Ok(refs)
    }

    fn set_latest_fetched(&self, block_ref: BlockRef, cancel: &CancellationToken) -> DbResult<()> {
        self.config
            .with_retry((&self.latest_fetched_tree,), cancel, |(lft,)| {
                lft.insert(&block_ref.shard_id, &block_ref)?;
                Ok(())
            })
    }

    fn try_get_latest_batch_id(&self) -> DbResult<Option<BatchId>> {
        Ok(self.latest_batch_tree.get(&())?)
    }

    fn try_get_batch(&self, batch_id: BatchId) -> DbResult<Option<BlockBatch>> {
        let Some(entry) = self.batch_tree.get(&batch_id)? else {
            return Ok(None);
        };
        let blocks = self
            .load_blocks(&entry)?
            .into_iter()
            .map(|b| b.block)
            .collect();
        entry.into_batch(blocks).map(Some)
    }

    fn batch_exists(&self, batch_id: BatchId) -> DbResult<bool> {
        Ok(self.batch_tree.contains_key(&batch_id)?)
    }

    fn get_free_space_batch_count(&self) -> DbResult<u32> {
        let count = self.batch_count_tree.get(&())?.unwrap_or(0);
        Ok(self.capacity_limit.saturating_sub(count))
    }

    fn get_batches(&self) -> DbIter<'_, BatchEntry> {
        let iter = self
            .batch_tree
            .iter()
            .map(|item| item.map(second).map_err(DbError::from));
        Box::new(StopOnError::new(iter))
    }
}
