use std::fmt;

use borsh::{BorshDeserialize, BorshSerialize};
use committee_primitives::{BatchId, Hash, ShardId, TaskId};
use serde::{Deserialize, Serialize};

/// Kind of proof work a task asks for.
///
/// The discriminant is part of the persisted priority key: block proofs of a batch sort
/// before its aggregation.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    BorshSerialize,
    BorshDeserialize,
    Serialize,
    Deserialize,
)]
#[borsh(use_discriminant = true)]
#[repr(u8)]
pub enum TaskType {
    /// Prove the execution of a single block.
    ProofBlock = 1,
    /// Fold every block proof of a batch into one batch proof.
    AggregateProofs = 2,
}

impl TaskType {
    pub const ALL: [TaskType; 2] = [TaskType::ProofBlock, TaskType::AggregateProofs];

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn from_u8(value: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_u8() == value)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskType::ProofBlock => "proof_block",
            TaskType::AggregateProofs => "aggregate_proofs",
        }
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A unit of provable work.
#[derive(
    Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize,
)]
pub struct Task {
    pub id: TaskId,
    pub batch_id: BatchId,
    pub shard_id: ShardId,
    pub block_num: u64,
    pub block_hash: Hash,
    pub task_type: TaskType,
    /// The task waiting on this task's result.
    pub parent_task_id: Option<TaskId>,
    /// Number of dependency results required before this task can run.
    pub dependency_num: u32,
}

impl Task {
    pub fn new_block_proof(
        batch_id: BatchId,
        shard_id: ShardId,
        block_num: u64,
        block_hash: Hash,
        parent_task_id: TaskId,
    ) -> Self {
        Self {
            id: TaskId::new_random(),
            batch_id,
            shard_id,
            block_num,
            block_hash,
            task_type: TaskType::ProofBlock,
            parent_task_id: Some(parent_task_id),
            dependency_num: 0,
        }
    }

    pub fn new_aggregate_proofs(
        batch_id: BatchId,
        block_num: u64,
        block_hash: Hash,
        dependency_num: u32,
    ) -> Self {
        Self {
            id: TaskId::new_random(),
            batch_id,
            shard_id: ShardId::MAIN,
            block_num,
            block_hash,
            task_type: TaskType::AggregateProofs,
            parent_task_id: None,
            dependency_num,
        }
    }
}
