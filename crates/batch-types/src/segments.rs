use std::collections::BTreeMap;

use borsh::{BorshDeserialize, BorshSerialize};
use committee_primitives::{Block, BlockRef, ShardId};
use serde::{Deserialize, Serialize};

use crate::BatchError;

/// Per-shard block sequences of a batch. Every sequence is contiguous.
#[derive(
    Clone, Debug, Default, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize,
)]
pub struct ChainSegments(BTreeMap<ShardId, Vec<Block>>);

impl ChainSegments {
    pub fn new() -> Self {
        Self::default()
    }

    /// Groups `blocks` by shard, keeping their relative order, and validates the result.
    pub fn from_blocks(blocks: impl IntoIterator<Item = Block>) -> Result<Self, BatchError> {
        let mut segments = Self::new();
        for block in blocks {
            segments.push(block)?;
        }
        segments.validate()?;
        Ok(segments)
    }

    pub fn segment(&self, shard: ShardId) -> &[Block] {
        self.0.get(&shard).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn main(&self) -> &[Block] {
        self.segment(ShardId::MAIN)
    }

    pub fn shards(&self) -> impl Iterator<Item = ShardId> + '_ {
        self.0.keys().copied()
    }

    pub fn earliest(&self, shard: ShardId) -> Option<&Block> {
        self.segment(shard).first()
    }

    pub fn latest(&self, shard: ShardId) -> Option<&Block> {
        self.segment(shard).last()
    }

    /// Tip of every non-empty segment.
    pub fn latest_refs(&self) -> BTreeMap<ShardId, BlockRef> {
        self.0
            .iter()
            .filter_map(|(shard, blocks)| blocks.last().map(|b| (*shard, b.to_ref())))
            .collect()
    }

    pub fn blocks_count(&self) -> usize {
        self.0.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks_count() == 0
    }

    /// All blocks, shard by shard, each segment in chain order.
    pub fn iter_blocks(&self) -> impl Iterator<Item = &Block> + '_ {
        self.0.values().flatten()
    }

    /// Appends `block` to its shard's segment, which it must directly extend.
    pub(crate) fn push(&mut self, block: Block) -> Result<(), BatchError> {
        let segment = self.0.entry(block.shard_id).or_default();
        if let Some(tip) = segment.last() {
            tip.to_ref().validate_child(&block)?;
        }
        segment.push(block);
        Ok(())
    }

    /// Checks segment contiguity and that child segments agree with the child refs carried by
    /// the main-shard blocks.
    pub fn validate(&self) -> Result<(), BatchError> {
        for (shard, blocks) in &self.0 {
            let Some(first) = blocks.first() else {
                return Err(BatchError::EmptySegment(*shard));
            };
            if first.shard_id != *shard {
                return Err(BatchError::ChildMismatch {
                    shard: *shard,
                    reason: format!("holds a block of shard {}", first.shard_id),
                });
            }
            for pair in blocks.windows(2) {
                pair[0].to_ref().validate_child(&pair[1])?;
            }
        }

        let main = self.main();
        for (shard, blocks) in self.0.iter().filter(|(shard, _)| !shard.is_main()) {
            validate_child_segment(*shard, blocks, main)?;
        }

        Ok(())
    }
}

fn validate_child_segment(
    shard: ShardId,
    blocks: &[Block],
    main: &[Block],
) -> Result<(), BatchError> {
    let mismatch = |reason: String| BatchError::ChildMismatch { shard, reason };

    let Some(last_main) = main.last() else {
        return Err(mismatch("no main block commits to it".to_string()));
    };
    let (first, tip) = match (blocks.first(), blocks.last()) {
        (Some(first), Some(tip)) => (first.number, tip.to_ref()),
        _ => return Err(BatchError::EmptySegment(shard)),
    };

    match last_main.child_ref(shard) {
        Some(r) if *r == tip => {}
        Some(r) => {
            return Err(mismatch(format!(
                "segment tip {tip} differs from main block ref {r}"
            )))
        }
        None => {
            return Err(mismatch(format!(
                "main block #{} carries no ref for it",
                last_main.number
            )))
        }
    }

    for main_block in main {
        let Some(r) = main_block.child_ref(shard) else {
            continue;
        };
        if r.number < first {
            // committed to a block of an earlier batch
            continue;
        }
        let idx = (r.number - first) as usize;
        match blocks.get(idx) {
            Some(block) if block.to_ref() == *r => {}
            _ => {
                return Err(mismatch(format!(
                    "main block #{} refs {r} which is not in the segment",
                    main_block.number
                )))
            }
        }
    }

    Ok(())
}
