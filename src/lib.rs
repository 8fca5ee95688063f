//! Runtime enforcement of declared key spans for storage batches and iterators.
//!
//! A concurrency-control layer reserves the key ranges ("latches") an operation is going to touch
//! before it lets the operation run. This crate checks, on every single call, that the operation
//! stays inside that reservation:
//!
//! - [`spanset`]: the [`SpanSet`](spanset::SpanSet) of declarations, the
//!   [`AccessChecker`](spanset::AccessChecker), and the guarded wrappers around engine batches
//!   and iterators.
//! - [`engine`]: the storage capabilities the wrappers consume, plus an in-memory engine.
//! - [`mvcc`]: iterator-driven intent resolution over a key range.
//! - [`base`]: sequence numbers, timestamps, and the error types.
//!
//! A call outside the declared footprint fails with
//! [`SpanLatchError::UndeclaredRead`](base::SpanLatchError::UndeclaredRead) or
//! [`SpanLatchError::UndeclaredWrite`](base::SpanLatchError::UndeclaredWrite) before it reaches
//! the engine.

#[macro_use]
extern crate derive_more;
#[macro_use]
extern crate tracing;

pub mod base;
pub mod engine;
pub mod mvcc;
pub mod spanset;

pub use base::{SpanLatchError, SpanLatchResult, Timestamp};
pub use spanset::{GuardedBatch, GuardedIterator, Span, SpanAccess, SpanSet};

#[cfg(test)]
pub(crate) mod tests {
    pub fn setup_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::TRACE)
            .with_test_writer()
            .try_init();
    }
}
