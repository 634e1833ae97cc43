use std::{sync::Arc, thread};

use committee_db_types::{DbError, DbResult};
use sled::transaction::{ConflictableTransactionError, ConflictableTransactionResult};
use tokio_util::sync::CancellationToken;
use typed_sled::transaction::{Backoff, ConstantBackoff, JitterBackoff, SledTransactional};

use crate::utils::to_db_error;

// Configuration constants
pub(crate) const DEFAULT_RETRY_COUNT: u16 = 10;
pub(crate) const DEFAULT_BACKOFF_MIN_MS: u64 = 20;
pub(crate) const DEFAULT_BACKOFF_MAX_MS: u64 = 100;
pub(crate) const TEST_RETRY_COUNT: u16 = 50;
pub(crate) const TEST_RETRY_DELAY_MS: u64 = 1; // Faster for tests

/// database operations configuration
#[derive(Debug, Clone)]
pub struct SledDbConfig {
    pub retry_count: u16,
    pub backoff: Arc<dyn Backoff>,
}

impl SledDbConfig {
    pub fn new(retry_count: u16, backoff: Arc<dyn Backoff>) -> Self {
        Self {
            retry_count,
            backoff,
        }
    }

    pub fn new_with_constant_backoff(retry_count: u16, delay: u64) -> Self {
        Self::new(retry_count, Arc::new(ConstantBackoff::new(delay)))
    }

    pub fn new_with_jitter_backoff(retry_count: u16, min_ms: u64, max_ms: u64) -> Self {
        Self::new(retry_count, Arc::new(JitterBackoff::new(min_ms, max_ms)))
    }

    /// Create production configuration with default values
    pub fn production() -> Self {
        Self::new_with_jitter_backoff(
            DEFAULT_RETRY_COUNT,
            DEFAULT_BACKOFF_MIN_MS,
            DEFAULT_BACKOFF_MAX_MS,
        )
    }

    /// Create test configuration with faster retry delays
    pub fn test() -> Self {
        Self::new_with_constant_backoff(TEST_RETRY_COUNT, TEST_RETRY_DELAY_MS)
    }

    /// Execute a transaction with retry logic using this config's settings.
    ///
    /// Write conflicts and aborts with a retryable [`DbError`] rerun `f`. A cancelled token
    /// aborts before the next attempt touches anything.
    pub fn with_retry<Trees, F, R>(
        &self,
        trees: Trees,
        cancel: &CancellationToken,
        f: F,
    ) -> DbResult<R>
    where
        Trees: SledTransactional,
        F: Fn(Trees::View) -> ConflictableTransactionResult<R, DbError>,
    {
        trees
            .transaction_with_retry(
                self.backoff.as_ref(),
                self.retry_count,
                DbError::is_retryable,
                |view| {
                    if cancel.is_cancelled() {
                        return Err(ConflictableTransactionError::Abort(DbError::Cancelled));
                    }
                    f(view)
                },
            )
            .map_err(to_db_error)
    }

    /// Reruns a whole operation while it fails with a retryable [`DbError`], waiting the
    /// configured backoff in between.
    ///
    /// Used where the retryable condition is only known after a transaction committed, e.g.
    /// when candidates read outside of it turned out to be stale.
    pub fn retry_operation<R>(&self, mut op: impl FnMut() -> DbResult<R>) -> DbResult<R> {
        let mut attempt: u16 = 0;
        loop {
            match op() {
                Err(err) if err.is_retryable() => {
                    attempt = attempt.saturating_add(1);
                    if attempt > self.retry_count {
                        return Err(DbError::RetriesExhausted(attempt));
                    }
                    thread::sleep(self.backoff.delay(attempt));
                }
                res => return res,
            }
        }
    }
}
