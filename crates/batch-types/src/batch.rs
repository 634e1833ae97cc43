use borsh::{BorshDeserialize, BorshSerialize};
use committee_primitives::{BatchId, Block, BlockRef, ShardId};
use committee_task_types::{Task, TaskEntry};
use serde::{Deserialize, Serialize};

use crate::{BatchError, ChainSegments};

/// A group of main-shard blocks and the child-shard blocks they commit to, proved and proposed
/// as one unit.
#[derive(
    Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize,
)]
pub struct BlockBatch {
    pub id: BatchId,
    /// The batch this one was applied on top of.
    pub parent_id: Option<BatchId>,
    pub blocks: ChainSegments,
    pub data_proofs: Vec<u8>,
    pub is_sealed: bool,
    pub created_at_ms: u64,
    pub updated_at_ms: u64,
}

impl BlockBatch {
    pub fn new(parent_id: Option<BatchId>, now_ms: u64) -> Self {
        Self {
            id: BatchId::new_time_ordered(),
            parent_id,
            blocks: ChainSegments::new(),
            data_proofs: Vec::new(),
            is_sealed: false,
            created_at_ms: now_ms,
            updated_at_ms: now_ms,
        }
    }

    /// Appends one main-shard block together with the child blocks it commits to.
    ///
    /// The batch is left untouched when the new blocks do not line up.
    pub fn append(
        &mut self,
        main_block: Block,
        child_blocks: Vec<Block>,
        now_ms: u64,
    ) -> Result<(), BatchError> {
        if self.is_sealed {
            return Err(BatchError::Sealed(self.id));
        }
        if !main_block.shard_id.is_main() {
            return Err(BatchError::NotMainBlock(main_block.shard_id));
        }

        let mut blocks = self.blocks.clone();
        for block in child_blocks {
            blocks.push(block)?;
        }
        blocks.push(main_block)?;
        blocks.validate()?;

        self.blocks = blocks;
        self.updated_at_ms = now_ms;
        Ok(())
    }

    pub fn seal(&mut self, data_proofs: Vec<u8>, now_ms: u64) -> Result<(), BatchError> {
        if self.is_sealed {
            return Err(BatchError::Sealed(self.id));
        }
        self.data_proofs = data_proofs;
        self.is_sealed = true;
        self.updated_at_ms = now_ms;
        Ok(())
    }

    pub fn blocks_count(&self) -> usize {
        self.blocks.blocks_count()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn latest_main_ref(&self) -> Option<BlockRef> {
        self.blocks.latest(ShardId::MAIN).map(Block::to_ref)
    }

    /// Plans the proof tasks of a sealed batch.
    ///
    /// Every block gets a `ProofBlock` task; one `AggregateProofs` task, anchored at the latest
    /// main block, waits for all of them.
    pub fn create_proof_tasks(&self, now_ms: u64) -> Result<Vec<TaskEntry>, BatchError> {
        if !self.is_sealed {
            return Err(BatchError::NotSealed(self.id));
        }
        let latest_main = self
            .blocks
            .latest(ShardId::MAIN)
            .ok_or(BatchError::Empty(self.id))?;

        let aggregate = Task::new_aggregate_proofs(
            self.id,
            latest_main.number,
            latest_main.hash,
            self.blocks_count() as u32,
        );
        let aggregate_id = aggregate.id;

        let mut entries = Vec::with_capacity(self.blocks_count() + 1);
        entries.push(TaskEntry::new(aggregate, now_ms));
        for block in self.blocks.iter_blocks() {
            let task = Task::new_block_proof(
                self.id,
                block.shard_id,
                block.number,
                block.hash,
                aggregate_id,
            );
            entries.push(TaskEntry::new(task, now_ms).with_pending_deps(vec![aggregate_id]));
        }

        Ok(entries)
    }
}
