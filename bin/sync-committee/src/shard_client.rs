//! Block source backed by a shard node's JSON-RPC API.

use anyhow::Context;
use async_trait::async_trait;
use committee_core::BlockSource;
use committee_primitives::{Block, Hash, ShardId};
use committee_rpc_api::ShardApiClient;
use jsonrpsee::http_client::{HttpClient, HttpClientBuilder};

#[derive(Debug)]
pub(crate) struct ShardRpcClient {
    client: HttpClient,
}

impl ShardRpcClient {
    pub(crate) fn new(url: &str) -> anyhow::Result<Self> {
        let client = HttpClientBuilder::default()
            .build(url)
            .with_context(|| format!("Failed to create the block source client for {url}"))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl BlockSource for ShardRpcClient {
    async fn get_block(&self, shard_id: ShardId, hash: Hash) -> anyhow::Result<Option<Block>> {
        ShardApiClient::get_block(&self.client, shard_id, hash)
            .await
            .with_context(|| format!("shard_getBlock({shard_id}, {hash})"))
    }

    async fn get_blocks_range(
        &self,
        shard_id: ShardId,
        from: u64,
        to: u64,
    ) -> anyhow::Result<Vec<Block>> {
        ShardApiClient::get_blocks_range(&self.client, shard_id, from, to)
            .await
            .with_context(|| format!("shard_getBlocksRange({shard_id}, {from}, {to})"))
    }
}
