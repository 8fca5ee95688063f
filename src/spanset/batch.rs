use bytes::Bytes;

use crate::base::{SpanLatchResult, Timestamp};
use crate::engine::{Batch, EngineIterator, IterOptions, Reader, Writer};
use crate::spanset::{AccessChecker, GuardedIterator, SpanAccess, SpanSet};

/// Wraps an engine batch and checks every read and write against a [`SpanSet`] before
/// forwarding it. Denied calls return the error and leave the batch untouched.
///
/// Commit is not checked: whoever handed out the batch authorized it.
#[derive(Debug)]
pub struct GuardedBatch<'a, B> {
    inner: B,
    checker: AccessChecker<'a>,
}

impl<'a, B> GuardedBatch<'a, B> {
    /// Guards `inner` for non-versioned access.
    pub fn new(inner: B, spans: &'a SpanSet) -> Self {
        Self::with_checker(inner, AccessChecker::new(spans))
    }

    /// Guards `inner` for versioned access at `ts`.
    pub fn at(inner: B, spans: &'a SpanSet, ts: Timestamp) -> Self {
        Self::with_checker(inner, AccessChecker::at(spans, ts))
    }

    pub fn with_checker(inner: B, checker: AccessChecker<'a>) -> Self {
        Self { inner, checker }
    }

    pub fn checker(&self) -> AccessChecker<'a> {
        self.checker
    }

    #[cfg(test)]
    pub(crate) fn inner(&self) -> &B {
        &self.inner
    }
}

impl<'a, B: Reader> Reader for GuardedBatch<'a, B> {
    type Iterator = GuardedIterator<'a, B::Iterator>;

    fn get(&self, key: &[u8]) -> SpanLatchResult<Option<Bytes>> {
        self.checker.check_read_key(key)?;
        self.inner.get(key)
    }

    /// The whole of `[start, end)` must be declared; a partially declared range is denied
    /// outright rather than scanned in part.
    fn scan<F>(&self, start: &[u8], end: &[u8], f: F) -> SpanLatchResult<()>
    where
        F: FnMut(&[u8], &[u8]) -> SpanLatchResult<bool>,
    {
        self.checker.check_range(SpanAccess::ReadOnly, start, end)?;
        self.inner.scan(start, end, f)
    }

    fn new_iterator(&self, opts: IterOptions) -> Self::Iterator {
        GuardedIterator::new(self.inner.new_iterator(opts), self.checker)
    }
}

impl<B: Writer> Writer for GuardedBatch<'_, B> {
    fn put(&mut self, key: &[u8], value: &[u8]) -> SpanLatchResult<()> {
        self.checker.check_write_key(key)?;
        self.inner.put(key, value)
    }

    fn delete(&mut self, key: &[u8]) -> SpanLatchResult<()> {
        self.checker.check_write_key(key)?;
        self.inner.delete(key)
    }

    fn delete_range(&mut self, start: &[u8], end: &[u8]) -> SpanLatchResult<()> {
        self.checker.check_range(SpanAccess::ReadWrite, start, end)?;
        self.inner.delete_range(start, end)
    }

    fn merge(&mut self, key: &[u8], value: &[u8]) -> SpanLatchResult<()> {
        self.checker.check_write_key(key)?;
        self.inner.merge(key, value)
    }

    /// Checks write access to all of `[start, end)` up front, independent of whatever checks
    /// `iter` performs while it is positioned.
    fn clear_iter_range<I>(
        &mut self,
        iter: &mut I,
        start: &[u8],
        end: &[u8],
    ) -> SpanLatchResult<()>
    where
        I: EngineIterator,
    {
        self.checker.check_range(SpanAccess::ReadWrite, start, end)?;
        self.inner.clear_iter_range(iter, start, end)
    }
}

impl<B: Batch> Batch for GuardedBatch<'_, B> {
    fn commit(&mut self, sync: bool) -> SpanLatchResult<()> {
        self.inner.commit(sync)
    }
}
