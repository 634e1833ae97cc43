//! Multi-tree transactions and the bounded retry combinator built on top of them.

use std::{cell::Cell, fmt::Debug, thread, time::Duration};

use rand::Rng;
use sled::{
    Transactional,
    transaction::{
        ConflictableTransactionError, ConflictableTransactionResult, TransactionError,
        TransactionResult,
    },
};

use crate::{Schema, SledTree, tree::SledTransactionalTree};

/// Delay policy applied between transaction attempts.
pub trait Backoff: Debug + Send + Sync {
    /// Returns how long to wait before retry number `attempt` (the first retry is `1`).
    fn delay(&self, attempt: u16) -> Duration;
}

/// Waits the same amount of time before every retry.
#[derive(Debug, Clone, Copy)]
pub struct ConstantBackoff {
    delay: Duration,
}

impl ConstantBackoff {
    pub fn new(delay_ms: u64) -> Self {
        Self {
            delay: Duration::from_millis(delay_ms),
        }
    }
}

impl Backoff for ConstantBackoff {
    fn delay(&self, _attempt: u16) -> Duration {
        self.delay
    }
}

/// Waits a uniformly random delay in `[min_ms, max_ms]` before every retry.
///
/// Randomizing the delay keeps competing writers from colliding on the same rhythm again.
#[derive(Debug, Clone, Copy)]
pub struct JitterBackoff {
    min_ms: u64,
    max_ms: u64,
}

impl JitterBackoff {
    pub fn new(min_ms: u64, max_ms: u64) -> Self {
        Self {
            min_ms: min_ms.min(max_ms),
            max_ms: max_ms.max(min_ms),
        }
    }
}

impl Backoff for JitterBackoff {
    fn delay(&self, _attempt: u16) -> Duration {
        let millis = rand::thread_rng().gen_range(self.min_ms..=self.max_ms);
        Duration::from_millis(millis)
    }
}

/// Outcome of a transaction that was run through [`SledTransactional::transaction_with_retry`].
#[derive(Debug, thiserror::Error)]
pub enum RetryError<E> {
    /// The closure aborted with a non-retryable error.
    #[error("transaction aborted: {0}")]
    Abort(E),

    /// Every attempt ended in a conflict or a retryable abort.
    #[error("transaction gave up after {0} attempts")]
    RetriesExhausted(u16),

    #[error("storage error: {0}")]
    Storage(#[from] sled::Error),
}

/// Internal abort reason used to break out of sled's own conflict loop.
enum Attempt<E> {
    Abort(E),
    Retry,
}

/// Trait for performing transactions on typed sled trees.
pub trait SledTransactional {
    type View;

    /// Executes a function within a transaction context.
    fn transaction<F, R, E>(&self, func: F) -> TransactionResult<R, E>
    where
        F: Fn(Self::View) -> ConflictableTransactionResult<R, E>;

    /// Executes `func` in a transaction, rerunning it on write conflicts and on aborts that
    /// `is_retryable` accepts, waiting `backoff` between attempts.
    ///
    /// Sled reruns a transaction closure on its own when the commit detects a conflict; the
    /// second invocation within one call is therefore turned into an explicit retry so the
    /// attempt bound and the backoff are honored.
    fn transaction_with_retry<F, R, E, P>(
        &self,
        backoff: &dyn Backoff,
        retry_count: u16,
        is_retryable: P,
        func: F,
    ) -> Result<R, RetryError<E>>
    where
        F: Fn(Self::View) -> ConflictableTransactionResult<R, E>,
        P: Fn(&E) -> bool,
    {
        let mut attempt: u16 = 0;
        loop {
            let invoked = Cell::new(false);
            let outcome = self.transaction(|view| {
                if invoked.replace(true) {
                    return Err(ConflictableTransactionError::Abort(Attempt::Retry));
                }

                func(view).map_err(|err| match err {
                    ConflictableTransactionError::Abort(err) if is_retryable(&err) => {
                        ConflictableTransactionError::Abort(Attempt::Retry)
                    }
                    ConflictableTransactionError::Abort(err) => {
                        ConflictableTransactionError::Abort(Attempt::Abort(err))
                    }
                    ConflictableTransactionError::Conflict => ConflictableTransactionError::Conflict,
                    ConflictableTransactionError::Storage(err) => {
                        ConflictableTransactionError::Storage(err)
                    }
                })
            });

            match outcome {
                Ok(res) => return Ok(res),
                Err(TransactionError::Abort(Attempt::Abort(err))) => {
                    return Err(RetryError::Abort(err));
                }
                Err(TransactionError::Storage(err)) => return Err(RetryError::Storage(err)),
                Err(TransactionError::Abort(Attempt::Retry)) => {
                    attempt = attempt.saturating_add(1);
                    if attempt > retry_count {
                        return Err(RetryError::RetriesExhausted(attempt));
                    }
                    thread::sleep(backoff.delay(attempt));
                }
            }
        }
    }
}

macro_rules! impl_sled_transactional {
    ($(($idx:tt, $schema:ident, $var:ident)),+) => {
        impl<'a, $($schema: Schema),+> SledTransactional for ($(&'a SledTree<$schema>),+,) {
            type View = ($(SledTransactionalTree<$schema>),+,);

            fn transaction<F, R, E>(&self, func: F) -> TransactionResult<R, E>
            where
                F: Fn(Self::View) -> ConflictableTransactionResult<R, E>,
            {
                ($(&*self.$idx.inner),+,).transaction(|($($var),+,)| {
                    func(($(SledTransactionalTree::<$schema>::new($var.clone())),+,))
                })
            }
        }
    };
}

impl_sled_transactional!((0, S0, t0));
impl_sled_transactional!((0, S0, t0), (1, S1, t1));
impl_sled_transactional!((0, S0, t0), (1, S1, t1), (2, S2, t2));
impl_sled_transactional!((0, S0, t0), (1, S1, t1), (2, S2, t2), (3, S3, t3));
impl_sled_transactional!(
    (0, S0, t0),
    (1, S1, t1),
    (2, S2, t2),
    (3, S3, t3),
    (4, S4, t4)
);
impl_sled_transactional!(
    (0, S0, t0),
    (1, S1, t1),
    (2, S2, t2),
    (3, S3, t3),
    (4, S4, t4),
    (5, S5, t5)
);
impl_sled_transactional!(
    (0, S0, t0),
    (1, S1, t1),
    (2, S2, t2),
    (3, S3, t3),
    (4, S4, t4),
    (5, S5, t5),
    (6, S6, t6)
);
