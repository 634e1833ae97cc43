//! Deterministic multi-shard chains for tests.

use std::collections::BTreeMap;

use committee_primitives::{Block, BlockRef, Hash, ShardId};

/// Builds blocks on a main shard and a set of child shards, tracking every shard's tip.
#[derive(Debug, Clone)]
pub struct TestChain {
    tips: BTreeMap<ShardId, BlockRef>,
    fork_salt: u8,
}

/// Hash of block `number` on `shard`; `salt` distinguishes competing forks.
pub fn block_hash(shard: ShardId, number: u64, salt: u8) -> Hash {
    let mut bytes = [0u8; 32];
    bytes[..4].copy_from_slice(&shard.0.to_be_bytes());
    bytes[4..12].copy_from_slice(&number.to_be_bytes());
    bytes[12] = salt;
    bytes[31] = 0x5c;
    Hash::new(bytes)
}

impl TestChain {
    /// Starts every shard at a genesis block numbered `0`.
    pub fn new(child_shards: &[u32]) -> Self {
        let tips = std::iter::once(ShardId::MAIN)
            .chain(child_shards.iter().copied().map(ShardId))
            .map(|shard| (shard, BlockRef::new(shard, block_hash(shard, 0, 0), 0)))
            .collect();
        Self { tips, fork_salt: 0 }
    }

    pub fn tip(&self, shard: ShardId) -> BlockRef {
        self.tips[&shard]
    }

    /// The main block every shard starts from. Only meaningful before any block is built.
    pub fn genesis_main_block(&self) -> Block {
        Block {
            shard_id: ShardId::MAIN,
            number: 0,
            hash: block_hash(ShardId::MAIN, 0, 0),
            parent_hash: Hash::ZERO,
            child_blocks: self.child_tips(),
            timestamp_ms: 0,
            payload: Vec::new(),
        }
    }

    /// Every block built from now on lives on a different fork than the ones before.
    pub fn fork(&mut self) {
        self.fork_salt = self.fork_salt.wrapping_add(1);
    }

    /// Produces the next block of `shard` and moves the shard's tip onto it.
    pub fn next_block(&mut self, shard: ShardId) -> Block {
        let parent = self.tip(shard);
        let block = self.block_on(parent, parent.number + 1, Vec::new());
        self.tips.insert(shard, block.to_ref());
        block
    }

    /// Produces `count` blocks on each listed child shard, then a main block committing to
    /// the tip of every child shard.
    pub fn next_main(&mut self, children: &[(u32, usize)]) -> (Block, Vec<Block>) {
        let mut child_blocks = Vec::new();
        for (shard, count) in children {
            for _ in 0..*count {
                child_blocks.push(self.next_block(ShardId(*shard)));
            }
        }

        let refs = self.child_tips();
        let parent = self.tip(ShardId::MAIN);
        let main = self.block_on(parent, parent.number + 1, refs);
        self.tips.insert(ShardId::MAIN, main.to_ref());

        (main, child_blocks)
    }

    fn child_tips(&self) -> Vec<BlockRef> {
        self.tips
            .values()
            .filter(|r| !r.shard_id.is_main())
            .copied()
            .collect()
    }

    fn block_on(&self, parent: BlockRef, number: u64, child_blocks: Vec<BlockRef>) -> Block {
        Block {
            shard_id: parent.shard_id,
            number,
            hash: block_hash(parent.shard_id, number, self.fork_salt),
            parent_hash: parent.hash,
            child_blocks,
            timestamp_ms: number * 1_000,
            payload: number.to_be_bytes().to_vec(),
        }
    }
}
