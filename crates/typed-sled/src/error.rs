use sled::{
    Error as SledError,
    transaction::{ConflictableTransactionError, TransactionError, UnabortableTransactionError},
};

use crate::CodecError;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Codec error
    #[error("Codec Error: {0}")]
    CodecError(#[from] CodecError),

    /// Sled database error
    #[error("Database error: {0}")]
    SledError(#[from] SledError),

    /// Sled transaction error
    #[error("Db transaction error: {0}")]
    TransactionError(#[from] TransactionError),
}

pub type Result<T> = core::result::Result<T, Error>;

/// Error raised by operations on a tree inside a transaction closure.
///
/// Converts into [`ConflictableTransactionError`] so it can be propagated with `?` from any
/// closure whose abort type can absorb a [`CodecError`].
#[derive(Debug, thiserror::Error)]
pub enum TxError {
    #[error("Codec Error: {0}")]
    Codec(#[from] CodecError),

    #[error("Db transaction error: {0}")]
    Unabortable(#[from] UnabortableTransactionError),
}

pub type TxResult<T> = core::result::Result<T, TxError>;

impl<E: From<CodecError>> From<TxError> for ConflictableTransactionError<E> {
    fn from(err: TxError) -> Self {
        match err {
            TxError::Codec(err) => ConflictableTransactionError::Abort(err.into()),
            TxError::Unabortable(UnabortableTransactionError::Conflict) => {
                ConflictableTransactionError::Conflict
            }
            TxError::Unabortable(UnabortableTransactionError::Storage(err)) => {
                ConflictableTransactionError::Storage(err)
            }
        }
    }
}
