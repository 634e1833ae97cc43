//! Primitive types shared by every sync committee crate.

pub mod block;
pub mod hash;
pub mod ids;
pub mod shard;
pub mod time;

pub use block::{Block, BlockId, BlockRef, SequenceError};
pub use hash::Hash;
pub use ids::{BatchId, ExecutorId, TaskId};
pub use shard::ShardId;
