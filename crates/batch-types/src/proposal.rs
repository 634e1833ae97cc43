use committee_primitives::{BatchId, Hash};
use serde::{Deserialize, Serialize};

/// Everything the proposer needs to move L1 from one proved state root to the next.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposalData {
    pub batch_id: BatchId,
    pub old_proved_state_root: Hash,
    pub new_proved_state_root: Hash,
    pub data_proofs: Vec<u8>,
    pub main_block_count: u64,
    /// Fetch time of the oldest block in the batch.
    pub first_block_fetched_at_ms: u64,
}
