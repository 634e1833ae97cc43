//! Module for database local types

use std::collections::BTreeMap;

use borsh::{BorshDeserialize, BorshSerialize};
use committee_batch_types::{BlockBatch, ChainSegments};
use committee_primitives::{BatchId, Block, BlockId, BlockRef, ShardId};
use serde::{Deserialize, Serialize};

use crate::{DbError, DbResult};

/// On-disk projection of a [`BlockBatch`]. Blocks are stored separately and referenced by id.
#[derive(
    Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize,
)]
pub struct BatchEntry {
    pub id: BatchId,
    pub parent_id: Option<BatchId>,
    /// Latest-fetched refs as they were before this batch was first stored.
    pub parent_refs: BTreeMap<ShardId, BlockRef>,
    pub block_ids: Vec<BlockId>,
    pub data_proofs: Vec<u8>,
    pub is_sealed: bool,
    pub is_proved: bool,
    pub created_at_ms: u64,
    pub updated_at_ms: u64,
}

impl BatchEntry {
    pub fn new(batch: &BlockBatch, parent_refs: BTreeMap<ShardId, BlockRef>) -> Self {
        Self {
            id: batch.id,
            parent_id: batch.parent_id,
            parent_refs,
            block_ids: batch.blocks.iter_blocks().map(Block::id).collect(),
            data_proofs: batch.data_proofs.clone(),
            is_sealed: batch.is_sealed,
            is_proved: false,
            created_at_ms: batch.created_at_ms,
            updated_at_ms: batch.updated_at_ms,
        }
    }

    /// Refreshes the mutable part of the entry from a newer version of the same batch.
    pub fn update_from(&mut self, batch: &BlockBatch) {
        self.block_ids = batch.blocks.iter_blocks().map(Block::id).collect();
        self.data_proofs = batch.data_proofs.clone();
        self.is_sealed = batch.is_sealed;
        self.updated_at_ms = batch.updated_at_ms;
    }

    /// Whether storing `batch` would leave this entry as it is.
    pub fn matches(&self, batch: &BlockBatch) -> bool {
        self.id == batch.id
            && self.parent_id == batch.parent_id
            && self.is_sealed == batch.is_sealed
            && self.data_proofs == batch.data_proofs
            && self.block_ids.len() == batch.blocks_count()
            && self
                .block_ids
                .iter()
                .zip(batch.blocks.iter_blocks())
                .all(|(id, block)| *id == block.id())
    }

    /// State root the batch was built upon.
    pub fn parent_main_ref(&self) -> Option<&BlockRef> {
        self.parent_refs.get(&ShardId::MAIN)
    }

    /// Rebuilds the full batch from the entry and its loaded blocks.
    pub fn into_batch(self, blocks: Vec<Block>) -> DbResult<BlockBatch> {
        if blocks.len() != self.block_ids.len() {
            return Err(DbError::Other(format!(
                "batch {} expects {} blocks, got {}",
                self.id,
                self.block_ids.len(),
                blocks.len()
            )));
        }
        let segments = ChainSegments::from_blocks(blocks)?;

        Ok(BlockBatch {
            id: self.id,
            parent_id: self.parent_id,
            blocks: segments,
            data_proofs: self.data_proofs,
            is_sealed: self.is_sealed,
            created_at_ms: self.created_at_ms,
            updated_at_ms: self.updated_at_ms,
        })
    }
}

/// A stored block and the batch that owns it.
#[derive(
    Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize,
)]
pub struct BlockEntry {
    pub block: Block,
    pub batch_id: BatchId,
    pub fetched_at_ms: u64,
}

impl BlockEntry {
    pub fn new(block: Block, batch_id: BatchId, fetched_at_ms: u64) -> Self {
        Self {
            block,
            batch_id,
            fetched_at_ms,
        }
    }
}
