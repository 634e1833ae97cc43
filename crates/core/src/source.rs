use async_trait::async_trait;
use committee_primitives::{Block, Hash, ShardId};

/// Read access to the blocks produced by the shards.
#[async_trait]
pub trait BlockSource: Send + Sync + 'static {
    async fn get_block(&self, shard_id: ShardId, hash: Hash) -> anyhow::Result<Option<Block>>;

    /// Blocks numbered `from..to` of the shard, in order. Shorter than requested when the
    /// shard has not produced them yet.
    async fn get_blocks_range(
        &self,
        shard_id: ShardId,
        from: u64,
        to: u64,
    ) -> anyhow::Result<Vec<Block>>;
}
