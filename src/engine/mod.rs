//! The capabilities consumed from a storage engine.
//!
//! The traits here are deliberately small: point reads, bounded scans, iterators, and batched
//! writes. [`GuardedBatch`] and [`GuardedIterator`] implement every one of them, and none carry
//! default implementations, so a method added here fails to compile until the guard checks it.
//!
//! [`GuardedBatch`]: crate::spanset::GuardedBatch
//! [`GuardedIterator`]: crate::spanset::GuardedIterator

use bytes::Bytes;

use crate::base::SpanLatchResult;

mod batch;
mod config;
mod memory;

pub use batch::{BatchRecord, WriteBatch};
pub use config::EngineConfig;
pub use memory::{MemBatch, MemEngine, MemIterator};

/// Bounds applied to a new iterator. Keys outside `[lower_bound, upper_bound)` are never visible.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IterOptions {
    pub lower_bound: Option<Bytes>,
    pub upper_bound: Option<Bytes>,
}

impl IterOptions {
    /// Options for an iterator bounded above by `upper`.
    pub fn upper_bound(upper: impl AsRef<[u8]>) -> Self {
        Self {
            lower_bound: None,
            upper_bound: Some(Bytes::copy_from_slice(upper.as_ref())),
        }
    }

    pub fn with_lower_bound(mut self, lower: impl AsRef<[u8]>) -> Self {
        self.lower_bound = Some(Bytes::copy_from_slice(lower.as_ref()));
        self
    }
}

/// A positioned cursor over engine keys. Dropping the iterator closes it.
pub trait EngineIterator {
    /// Positions at the first key `>= key`.
    fn seek_ge(&mut self, key: &[u8]);

    /// Positions at the last key `< key`.
    fn seek_lt(&mut self, key: &[u8]);

    fn next(&mut self);

    fn prev(&mut self);

    /// `Ok(true)` while positioned at a key, `Ok(false)` once exhausted.
    fn valid(&self) -> SpanLatchResult<bool>;

    /// The current key, if positioned.
    fn key(&self) -> Option<&[u8]>;

    /// The current value, if positioned.
    fn value(&self) -> Option<&[u8]>;

    /// Replaces the exclusive upper bound. Unpositions the iterator.
    fn set_upper_bound(&mut self, upper: &[u8]);
}

pub trait Reader {
    type Iterator: EngineIterator;

    fn get(&self, key: &[u8]) -> SpanLatchResult<Option<Bytes>>;

    /// Calls `f` for every key-value pair in `[start, end)`, in key order.
    /// Returning `Ok(true)` from `f` stops the scan early.
    fn scan<F>(&self, start: &[u8], end: &[u8], f: F) -> SpanLatchResult<()>
    where
        F: FnMut(&[u8], &[u8]) -> SpanLatchResult<bool>;

    fn new_iterator(&self, opts: IterOptions) -> Self::Iterator;
}

pub trait Writer {
    fn put(&mut self, key: &[u8], value: &[u8]) -> SpanLatchResult<()>;

    fn delete(&mut self, key: &[u8]) -> SpanLatchResult<()>;

    /// Deletes every key in `[start, end)`.
    fn delete_range(&mut self, start: &[u8], end: &[u8]) -> SpanLatchResult<()>;

    /// Combines `value` with the current value of `key` through the engine's merge operator.
    fn merge(&mut self, key: &[u8], value: &[u8]) -> SpanLatchResult<()>;

    /// Deletes every key in `[start, end)` that `iter` yields.
    fn clear_iter_range<I>(
        &mut self,
        iter: &mut I,
        start: &[u8],
        end: &[u8],
    ) -> SpanLatchResult<()>
    where
        I: EngineIterator;
}

pub trait Batch: Reader + Writer {
    /// Applies all writes of this batch atomically.
    fn commit(&mut self, sync: bool) -> SpanLatchResult<()>;
}

pub trait Engine: Reader + Writer {
    type Batch: Batch;

    fn new_batch(&self) -> Self::Batch;
}

/// Drives `iter` over `[start, end)` and hands every key to `delete`.
///
/// The iterator is bounded at `end` first, so it is never positioned outside the range, even
/// when the engine holds keys right past it.
pub(crate) fn clear_keys_in_range<I, F>(
    iter: &mut I,
    start: &[u8],
    end: &[u8],
    mut delete: F,
) -> SpanLatchResult<()>
where
    I: EngineIterator,
    F: FnMut(&[u8]) -> SpanLatchResult<()>,
{
    if end <= start {
        return Ok(());
    }
    iter.set_upper_bound(end);
    iter.seek_ge(start);
    while iter.valid()? {
        let Some(key) = iter.key() else { break };
        if key >= end {
            break;
        }
        delete(key)?;
        iter.next();
    }
    Ok(())
}
