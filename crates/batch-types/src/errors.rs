use committee_primitives::{BatchId, SequenceError, ShardId};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BatchError {
    #[error("batch {0} is sealed")]
    Sealed(BatchId),

    #[error("batch {0} is not sealed")]
    NotSealed(BatchId),

    #[error("batch {0} has no blocks")]
    Empty(BatchId),

    #[error("expected a main shard block, got a block of shard {0}")]
    NotMainBlock(ShardId),

    #[error("segment of shard {0} is empty")]
    EmptySegment(ShardId),

    #[error("child segment of shard {shard} does not match main blocks: {reason}")]
    ChildMismatch { shard: ShardId, reason: String },

    #[error("sequencing: {0}")]
    Sequencing(#[from] SequenceError),
}
