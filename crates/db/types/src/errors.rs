use committee_batch_types::BatchError;
use committee_primitives::{BatchId, BlockId, ExecutorId, Hash, TaskId};
use committee_task_types::{TaskStateError, TaskStatus};
use thiserror::Error;
use typed_sled::{error::Error, CodecError};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DbError {
    #[error("task {task_id} has invalid status {status}")]
    TaskInvalidStatus { task_id: TaskId, status: TaskStatus },

    #[error("task {task_id} is owned by {expected}, result sent by {actual}")]
    TaskWrongOwner {
        task_id: TaskId,
        expected: ExecutorId,
        actual: ExecutorId,
    },

    #[error("batch mismatch: {0}")]
    BatchMismatch(String),

    #[error("batch {0} is already sealed")]
    BatchSealed(BatchId),

    #[error("missing task (id {0})")]
    TaskNotFound(TaskId),

    #[error("missing batch (id {0})")]
    BatchNotFound(BatchId),

    #[error("missing block (id {0})")]
    BlockNotFound(BlockId),

    #[error("codec error {0}")]
    CodecError(String),

    #[error("transaction gave up after {0} attempts")]
    RetriesExhausted(u16),

    #[error("batch capacity limit of {0} reached")]
    CapacityLimitReached(u32),

    #[error("batch {0} is not proved")]
    BatchNotProved(BatchId),

    #[error("state root mismatch: expected {expected}, got {actual}")]
    StateRootMismatch { expected: Hash, actual: Hash },

    #[error("proved state root is not initialized")]
    ProvedStateRootNotInitialized,

    #[error("batch chain revisits batch {0}")]
    BatchChainCycle(BatchId),

    #[error("another reset is in progress")]
    ResetInProgress,

    #[error("operation cancelled")]
    Cancelled,

    /// Transient condition, e.g. every claim candidate was taken by a concurrent writer between
    /// the index scan and the transaction.
    #[error("resource busy")]
    Busy,

    #[error("transaction error {0}")]
    TransactionError(String),

    #[error("{0}")]
    Other(String),
}

impl DbError {
    /// Whether rerunning the whole operation may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, DbError::Busy)
    }
}

impl From<CodecError> for DbError {
    fn from(value: CodecError) -> Self {
        Self::CodecError(value.to_string())
    }
}

impl From<Error> for DbError {
    fn from(value: Error) -> Self {
        match value {
            Error::CodecError(err) => err.into(),
            Error::TransactionError(err) => Self::TransactionError(err.to_string()),
            Error::SledError(err) => Self::Other(format!("sled error: {err:?}")),
        }
    }
}

impl From<TaskStateError> for DbError {
    fn from(value: TaskStateError) -> Self {
        match value {
            TaskStateError::InvalidStatus {
                task_id, actual, ..
            } => Self::TaskInvalidStatus {
                task_id,
                status: actual,
            },
            TaskStateError::WrongOwner {
                task_id,
                owner,
                sender,
            } => Self::TaskWrongOwner {
                task_id,
                expected: owner,
                actual: sender,
            },
            err @ TaskStateError::ForeignResult { .. } => Self::Other(err.to_string()),
        }
    }
}

impl From<BatchError> for DbError {
    fn from(value: BatchError) -> Self {
        match value {
            BatchError::Sealed(id) => Self::BatchSealed(id),
            err => Self::BatchMismatch(err.to_string()),
        }
    }
}

pub type DbResult<T> = Result<T, DbError>;
