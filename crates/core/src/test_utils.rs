use std::{collections::BTreeMap, sync::Arc};

use async_trait::async_trait;
use committee_batch_types::{test_utils::TestChain, BlockBatch};
use committee_db_store_sled::{open_temporary_backend, BatchDBSled, TaskDBSled};
use committee_db_types::{BatchEntry, BlockBatchDatabase, DbResult, TaskDatabase};
use committee_primitives::{time::now_millis, BatchId, Block, Hash, ShardId};
use committee_task_types::Task;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::{BatchResetter, BatchStateHandler, BlockSource};

/// Temporary storage with a test chain of one child shard on top of it.
pub(crate) struct TestEnv {
    pub batch_db: Arc<BatchDBSled>,
    pub task_db: Arc<TaskDBSled>,
    pub resetter: Arc<BatchResetter<BatchDBSled, TaskDBSled>>,
    pub cancel: CancellationToken,
    pub chain: Mutex<TestChain>,
}

impl TestEnv {
    /// Opens empty storage whose proved state root is the genesis main block.
    pub fn new(capacity_limit: u32) -> Self {
        let env = Self::without_root(capacity_limit);
        env.batch_db
            .set_proved_state_root(env.genesis_root(), &env.cancel)
            .unwrap();
        env
    }

    pub fn without_root(capacity_limit: u32) -> Self {
        let backend = open_temporary_backend(capacity_limit).unwrap();
        let cancel = CancellationToken::new();
        let batch_db = backend.batch_db();
        let task_db = backend.task_db();

        Self {
            resetter: Arc::new(BatchResetter::new(
                batch_db.clone(),
                task_db.clone(),
                cancel.clone(),
            )),
            batch_db,
            task_db,
            cancel,
            chain: Mutex::new(TestChain::new(&[1])),
        }
    }

    pub fn genesis_root(&self) -> Hash {
        self.chain.lock().genesis_main_block().hash
    }

    /// Stores a sealed batch of `main_blocks` main blocks, each committing to one new child
    /// block, on top of the current head and plans its tasks.
    pub fn store_sealed_batch(&self, main_blocks: usize) -> BatchId {
        let now = now_millis();
        if self.batch_db.get_latest_fetched().unwrap().is_empty() {
            let genesis = self.chain.lock().genesis_main_block();
            for block_ref in std::iter::once(genesis.to_ref()).chain(genesis.child_blocks) {
                self.batch_db
                    .set_latest_fetched(block_ref, &self.cancel)
                    .unwrap();
            }
        }

        let head = self.batch_db.try_get_latest_batch_id().unwrap();
        let mut batch = BlockBatch::new(head, now);
        {
            let mut chain = self.chain.lock();
            for _ in 0..main_blocks {
                let (main, children) = chain.next_main(&[(1, 1)]);
                batch.append(main, children, now).unwrap();
            }
        }
        batch.seal(vec![0xda; 32], now).unwrap();

        self.batch_db
            .put_block_batch(&batch, now, &self.cancel)
            .unwrap();
        self.task_db
            .add_task_entries(batch.create_proof_tasks(now).unwrap(), &self.cancel)
            .unwrap();
        batch.id
    }

    pub fn task_count(&self) -> usize {
        self.task_db.get_task_entries().count()
    }

    pub fn tasks_of(&self, batch_id: BatchId) -> Vec<Task> {
        self.task_db
            .get_task_ids_for_batch(batch_id)
            .unwrap()
            .into_iter()
            .filter_map(|id| self.task_db.try_get_task_entry(id).unwrap())
            .map(|entry| entry.task)
            .collect()
    }

    pub fn batch_entry(&self, batch_id: BatchId) -> Option<BatchEntry> {
        self.batch_db
            .get_batches()
            .collect::<DbResult<Vec<_>>>()
            .unwrap()
            .into_iter()
            .find(|entry| entry.id == batch_id)
    }

    pub fn batch_ids(&self) -> Vec<BatchId> {
        self.batch_db
            .get_batches()
            .map(|entry| entry.map(|e| e.id))
            .collect::<DbResult<Vec<_>>>()
            .unwrap()
    }

    pub fn state_handler(&self) -> BatchStateHandler<BatchDBSled, TaskDBSled> {
        BatchStateHandler::new(
            self.batch_db.clone(),
            self.resetter.clone(),
            self.cancel.clone(),
        )
    }
}

/// Block source serving blocks kept in memory, per shard by number.
#[derive(Debug, Default)]
pub(crate) struct MemoryBlockSource {
    shards: Mutex<BTreeMap<ShardId, BTreeMap<u64, Block>>>,
}

impl MemoryBlockSource {
    pub fn new(blocks: impl IntoIterator<Item = Block>) -> Self {
        let source = Self::default();
        source.extend(blocks);
        source
    }

    /// Adds blocks, replacing any block of the same shard and number.
    pub fn extend(&self, blocks: impl IntoIterator<Item = Block>) {
        let mut shards = self.shards.lock();
        for block in blocks {
            shards
                .entry(block.shard_id)
                .or_default()
                .insert(block.number, block);
        }
    }
}

#[async_trait]
impl BlockSource for MemoryBlockSource {
    async fn get_block(&self, shard_id: ShardId, hash: Hash) -> anyhow::Result<Option<Block>> {
        Ok(self
            .shards
            .lock()
            .get(&shard_id)
            .and_then(|blocks| blocks.values().find(|b| b.hash == hash).cloned()))
    }

    async fn get_blocks_range(
        &self,
        shard_id: ShardId,
        from: u64,
        to: u64,
    ) -> anyhow::Result<Vec<Block>> {
        let shards = self.shards.lock();
        let Some(blocks) = shards.get(&shard_id) else {
            return Ok(Vec::new());
        };

        // stop at the first gap, like a node that has not produced the rest yet
        let mut range = Vec::new();
        for number in from..to {
            match blocks.get(&number) {
                Some(block) => range.push(block.clone()),
                None => break,
            }
        }
        Ok(range)
    }
}
