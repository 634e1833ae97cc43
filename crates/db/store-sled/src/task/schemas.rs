use committee_primitives::{BatchId, TaskId};
use committee_task_types::{TaskEntry, TaskType};

use crate::{define_table, lexicographic::LexicographicKey, versioned::VersionedValue};

/// Claim priority of a ready task. Byte order of the encoded key is the claim order: older
/// batches first, then lower blocks, then block proofs before aggregation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub(crate) struct TaskQueueKey {
    pub(crate) batch_id: BatchId,
    pub(crate) block_num: u64,
    pub(crate) task_type: TaskType,
    pub(crate) task_id: TaskId,
}

impl TaskQueueKey {
    pub(crate) fn for_entry(entry: &TaskEntry) -> Self {
        Self {
            batch_id: entry.task.batch_id,
            block_num: entry.task.block_num,
            task_type: entry.task.task_type,
            task_id: entry.task.id,
        }
    }
}

impl LexicographicKey for TaskQueueKey {
    fn encode_lexicographic(&self, out: &mut Vec<u8>) {
        self.batch_id.encode_lexicographic(out);
        self.block_num.encode_lexicographic(out);
        self.task_type.encode_lexicographic(out);
        self.task_id.encode_lexicographic(out);
    }

    fn decode_lexicographic(data: &mut &[u8]) -> anyhow::Result<Self> {
        Ok(Self {
            batch_id: BatchId::decode_lexicographic(data)?,
            block_num: u64::decode_lexicographic(data)?,
            task_type: TaskType::decode_lexicographic(data)?,
            task_id: TaskId::decode_lexicographic(data)?,
        })
    }
}

impl VersionedValue for TaskEntry {
    const VERSION: u8 = 1;
}

define_table!(
    /// Every task known to the committee
    (TaskEntrySchema) TaskId => versioned TaskEntry
);

define_table!(
    /// Index of the tasks waiting for an executor, in claim order
    (TaskQueueSchema) TaskQueueKey => borsh ()
);
