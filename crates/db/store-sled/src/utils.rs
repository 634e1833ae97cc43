use committee_db_types::DbError;
use sled::transaction::{ConflictableTransactionError, ConflictableTransactionResult};
use typed_sled::transaction::RetryError;

pub(crate) fn first<P, Q>((first, _): (P, Q)) -> P {
    first
}

pub(crate) fn second<P, Q>((_, second): (P, Q)) -> Q {
    second
}

/// Aborts the enclosing transaction with `err`.
pub(crate) fn abort<T>(err: impl Into<DbError>) -> ConflictableTransactionResult<T, DbError> {
    Err(ConflictableTransactionError::Abort(err.into()))
}

pub(crate) fn to_db_error(err: RetryError<DbError>) -> DbError {
    match err {
        RetryError::Abort(err) => err,
        RetryError::RetriesExhausted(attempts) => DbError::RetriesExhausted(attempts),
        RetryError::Storage(err) => DbError::TransactionError(err.to_string()),
    }
}
