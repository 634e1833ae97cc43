use committee_db_types::DbError;
use committee_rpc_types::RpcServerError;
use thiserror::Error;
use tokio::task::JoinError;

pub type SchedulerResult<T> = Result<T, SchedulerError>;

#[derive(Debug, Error)]
pub enum SchedulerError {
    /// A storage operation failed; `key` names what it was applied to.
    #[error("{op} failed for {key}: {source}")]
    Storage {
        op: &'static str,
        key: String,
        #[source]
        source: DbError,
    },

    #[error("storage worker panicked or was cancelled: {0}")]
    Join(#[from] JoinError),
}

impl SchedulerError {
    pub(crate) fn storage(op: &'static str, key: String) -> impl FnOnce(DbError) -> Self {
        move |source| Self::Storage { op, key, source }
    }

    /// The storage error behind this one, if any.
    pub fn db_error(&self) -> Option<&DbError> {
        match self {
            Self::Storage { source, .. } => Some(source),
            Self::Join(_) => None,
        }
    }
}

impl From<SchedulerError> for RpcServerError {
    fn from(err: SchedulerError) -> Self {
        let msg = err.to_string();
        match err.db_error() {
            Some(DbError::TaskWrongOwner { .. } | DbError::TaskInvalidStatus { .. }) => {
                RpcServerError::RejectedResult(msg)
            }
            Some(DbError::TaskNotFound(_)) => RpcServerError::UnknownTask(msg),
            Some(DbError::Busy | DbError::RetriesExhausted(_)) => RpcServerError::Busy(msg),
            Some(DbError::Cancelled) => RpcServerError::ShuttingDown,
            _ => RpcServerError::Internal(msg),
        }
    }
}
