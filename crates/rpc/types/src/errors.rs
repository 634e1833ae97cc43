use jsonrpsee::types::{
    error::{INTERNAL_ERROR_CODE, INVALID_PARAMS_CODE},
    ErrorObjectOwned,
};
use thiserror::Error;

/// Errors surfaced to RPC clients.
///
/// Codes are stable: executors match on them to decide whether to drop a result or retry.
#[derive(Debug, Error)]
pub enum RpcServerError {
    /// The result does not apply to the task as stored, e.g. its owner changed after a
    /// reschedule.
    #[error("rejected task result: {0}")]
    RejectedResult(String),

    #[error("unknown task: {0}")]
    UnknownTask(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Storage is momentarily contended; the call may be repeated.
    #[error("storage busy: {0}")]
    Busy(String),

    #[error("node is shutting down")]
    ShuttingDown,

    #[error("internal error: {0}")]
    Internal(String),
}

impl RpcServerError {
    pub fn code(&self) -> i32 {
        match self {
            RpcServerError::RejectedResult(_) => -32010,
            RpcServerError::UnknownTask(_) => -32011,
            RpcServerError::InvalidRequest(_) => INVALID_PARAMS_CODE,
            RpcServerError::Busy(_) => -32012,
            RpcServerError::ShuttingDown => -32013,
            RpcServerError::Internal(_) => INTERNAL_ERROR_CODE,
        }
    }
}

impl From<RpcServerError> for ErrorObjectOwned {
    fn from(err: RpcServerError) -> Self {
        ErrorObjectOwned::owned(err.code(), err.to_string(), None::<()>)
    }
}
