use std::fmt;

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{Hash, ShardId};

/// Lightweight pointer to a block, used to check chain continuity without loading the block.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    BorshSerialize,
    BorshDeserialize,
    Serialize,
    Deserialize,
)]
pub struct BlockRef {
    pub shard_id: ShardId,
    pub hash: Hash,
    pub number: u64,
}

/// Why a block does not continue the chain a [`BlockRef`] points into.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SequenceError {
    #[error("shard mismatch: expected {expected}, got {actual}")]
    ShardMismatch { expected: ShardId, actual: ShardId },

    #[error("block number gap on shard {shard}: expected {expected}, got {actual}")]
    NumberGap {
        shard: ShardId,
        expected: u64,
        actual: u64,
    },

    #[error("parent hash mismatch on shard {shard} at #{number}: expected {expected}, got {actual}")]
    ParentMismatch {
        shard: ShardId,
        number: u64,
        expected: Hash,
        actual: Hash,
    },

    #[error("fork on shard {shard} at #{number}: known {known}, got {actual}")]
    Fork {
        shard: ShardId,
        number: u64,
        known: Hash,
        actual: Hash,
    },
}

impl BlockRef {
    pub fn new(shard_id: ShardId, hash: Hash, number: u64) -> Self {
        Self {
            shard_id,
            hash,
            number,
        }
    }

    /// Checks that `block` is the direct child of the referenced block.
    pub fn validate_child(&self, block: &Block) -> Result<(), SequenceError> {
        self.check_shard(block)?;

        let Some(expected) = self.number.checked_add(1) else {
            // nothing follows the last representable number
            return Err(SequenceError::NumberGap {
                shard: self.shard_id,
                expected: self.number,
                actual: block.number,
            });
        };
        if block.number != expected {
            return Err(SequenceError::NumberGap {
                shard: self.shard_id,
                expected,
                actual: block.number,
            });
        }

        if block.parent_hash != self.hash {
            return Err(SequenceError::ParentMismatch {
                shard: self.shard_id,
                number: block.number,
                expected: self.hash,
                actual: block.parent_hash,
            });
        }

        Ok(())
    }

    /// Checks that `block` may be applied on top of the referenced block: either it is its
    /// direct child, or it is the referenced block itself.
    pub fn validate_next(&self, block: &Block) -> Result<(), SequenceError> {
        self.check_shard(block)?;

        if block.number == self.number {
            if block.hash != self.hash {
                return Err(SequenceError::Fork {
                    shard: self.shard_id,
                    number: block.number,
                    known: self.hash,
                    actual: block.hash,
                });
            }
            return Ok(());
        }

        self.validate_child(block)
    }

    fn check_shard(&self, block: &Block) -> Result<(), SequenceError> {
        if block.shard_id != self.shard_id {
            return Err(SequenceError::ShardMismatch {
                expected: self.shard_id,
                actual: block.shard_id,
            });
        }
        Ok(())
    }
}

impl fmt::Display for BlockRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}({})", self.shard_id, self.number, self.hash)
    }
}

/// Storage identity of a block.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    BorshSerialize,
    BorshDeserialize,
    Serialize,
    Deserialize,
)]
pub struct BlockId {
    pub shard_id: ShardId,
    pub hash: Hash,
}

impl BlockId {
    pub fn new(shard_id: ShardId, hash: Hash) -> Self {
        Self { shard_id, hash }
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.shard_id, self.hash)
    }
}

/// An L2 block as produced by a shard.
///
/// Main-shard blocks reference, for every child shard, the latest child block they commit to.
#[derive(
    Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize,
)]
pub struct Block {
    pub shard_id: ShardId,
    pub number: u64,
    pub hash: Hash,
    pub parent_hash: Hash,
    #[serde(default)]
    pub child_blocks: Vec<BlockRef>,
    pub timestamp_ms: u64,
    #[serde(default)]
    pub payload: Vec<u8>,
}

impl Block {
    pub fn id(&self) -> BlockId {
        BlockId::new(self.shard_id, self.hash)
    }

    pub fn to_ref(&self) -> BlockRef {
        BlockRef::new(self.shard_id, self.hash, self.number)
    }

    /// The child ref this block carries for `shard`, if any.
    pub fn child_ref(&self, shard: ShardId) -> Option<&BlockRef> {
        self.child_blocks.iter().find(|r| r.shard_id == shard)
    }
}
