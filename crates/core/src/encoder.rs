use committee_batch_types::BlockBatch;
use sha2::{Digest, Sha256};

/// Produces the data availability payload committed to L1 for a sealed batch.
pub trait BatchEncoder: Send + Sync + 'static {
    fn encode(&self, batch: &BlockBatch) -> anyhow::Result<Vec<u8>>;
}

/// Commits to the ordered list of block ids of a batch with SHA-256.
#[derive(Clone, Copy, Debug, Default)]
pub struct Sha256BatchEncoder;

impl BatchEncoder for Sha256BatchEncoder {
    fn encode(&self, batch: &BlockBatch) -> anyhow::Result<Vec<u8>> {
        if batch.is_empty() {
            anyhow::bail!("batch {} has no blocks to encode", batch.id);
        }

        let mut hasher = Sha256::new();
        hasher.update(batch.id.as_bytes());
        for block in batch.blocks.iter_blocks() {
            hasher.update(block.shard_id.0.to_be_bytes());
            hasher.update(block.number.to_be_bytes());
            hasher.update(block.hash.as_bytes());
        }
        Ok(hasher.finalize().to_vec())
    }
}
