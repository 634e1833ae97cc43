use crate::DbResult;

/// Wraps a fallible iterator so that it yields at most one error and then ends.
#[derive(Debug)]
pub struct StopOnError<I> {
    inner: I,
    failed: bool,
}

impl<I> StopOnError<I> {
    pub fn new(inner: I) -> Self {
        Self {
            inner,
            failed: false,
        }
    }
}

impl<T, I: Iterator<Item = DbResult<T>>> Iterator for StopOnError<I> {
    type Item = DbResult<T>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        let item = self.inner.next()?;
        self.failed = item.is_err();
        Some(item)
    }
}
