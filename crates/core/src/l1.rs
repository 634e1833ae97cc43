use std::collections::BTreeMap;

use async_trait::async_trait;
use committee_primitives::{BatchId, Hash};
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use tracing::*;

pub type TxHash = Hash;

/// Arguments of the L1 state transition applying one proved batch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UpdateStateParams {
    pub batch_id: BatchId,
    pub old_state_root: Hash,
    pub new_state_root: Hash,
    pub data_proofs: Vec<u8>,
    pub main_block_count: u64,
}

/// The rollup contract on L1.
#[async_trait]
pub trait L1Contract: Send + Sync + 'static {
    /// State root of the latest batch applied on L1 and finalized there.
    async fn finalized_state_root(&self) -> anyhow::Result<Hash>;

    /// Publishes the data availability payload of a batch.
    async fn commit_batch(&self, batch_id: BatchId, data_proofs: &[u8]) -> anyhow::Result<TxHash>;

    /// Moves the contract's state root over a committed batch.
    async fn update_state(&self, params: UpdateStateParams) -> anyhow::Result<TxHash>;
}

#[derive(Debug)]
struct LocalL1State {
    state_root: Hash,
    commitments: BTreeMap<BatchId, Vec<u8>>,
    tx_count: u64,
}

impl LocalL1State {
    fn next_tx_hash(&mut self, batch_id: BatchId) -> TxHash {
        self.tx_count += 1;
        let mut hasher = Sha256::new();
        hasher.update(batch_id.as_bytes());
        hasher.update(self.tx_count.to_be_bytes());
        Hash::new(hasher.finalize().into())
    }
}

/// In-process rollup contract, finalizing every state update immediately.
///
/// Enforces what the real contract checks: a batch is committed before it is applied and
/// updates chain on the current root.
#[derive(Debug)]
pub struct LocalL1Contract {
    state: Mutex<LocalL1State>,
}

impl LocalL1Contract {
    pub fn new(genesis_root: Hash) -> Self {
        Self {
            state: Mutex::new(LocalL1State {
                state_root: genesis_root,
                commitments: BTreeMap::new(),
                tx_count: 0,
            }),
        }
    }

    /// Forces the state root, as a reorg or another committee would.
    pub fn set_state_root(&self, root: Hash) {
        self.state.lock().state_root = root;
    }

    pub fn is_committed(&self, batch_id: BatchId) -> bool {
        self.state.lock().commitments.contains_key(&batch_id)
    }
}

#[async_trait]
impl L1Contract for LocalL1Contract {
    async fn finalized_state_root(&self) -> anyhow::Result<Hash> {
        Ok(self.state.lock().state_root)
    }

    async fn commit_batch(&self, batch_id: BatchId, data_proofs: &[u8]) -> anyhow::Result<TxHash> {
        let mut state = self.state.lock();
        if let Some(existing) = state.commitments.get(&batch_id) {
            if existing.as_slice() != data_proofs {
                anyhow::bail!("batch {batch_id} already committed with other data");
            }
        }
        state.commitments.insert(batch_id, data_proofs.to_vec());
        let tx_hash = state.next_tx_hash(batch_id);
        debug!(%batch_id, %tx_hash, "batch committed on local L1");
        Ok(tx_hash)
    }

    async fn update_state(&self, params: UpdateStateParams) -> anyhow::Result<TxHash> {
        let mut state = self.state.lock();
        let Some(committed) = state.commitments.get(&params.batch_id) else {
            anyhow::bail!("batch {} is not committed", params.batch_id);
        };
        if *committed != params.data_proofs {
            anyhow::bail!("data proofs of batch {} differ from commitment", params.batch_id);
        }
        if state.state_root != params.old_state_root {
            anyhow::bail!(
                "old state root {} does not match contract root {}",
                params.old_state_root,
                state.state_root
            );
        }

        state.state_root = params.new_state_root;
        let tx_hash = state.next_tx_hash(params.batch_id);
        info!(
            batch_id = %params.batch_id,
            new_root = %params.new_state_root,
            main_blocks = params.main_block_count,
            "local L1 state updated"
        );
        Ok(tx_hash)
    }
}
