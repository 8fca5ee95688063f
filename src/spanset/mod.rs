//! Declared key spans and the guards that enforce them.
//!
//! A [`SpanSet`] records the footprint an operation declared before it started: which key ranges
//! it will touch, whether it only reads or also writes them, and optionally the timestamp the
//! reservation was taken at. Wrapping an engine batch or iterator with [`GuardedBatch`] or
//! [`GuardedIterator`] checks every access against that footprint before it reaches the engine.
//!
//! ```
//! use spanlatch::engine::{Engine, MemEngine, Reader, Writer};
//! use spanlatch::spanset::{Span, SpanAccess, SpanSet, wrap_batch};
//!
//! let engine = MemEngine::new();
//! let mut spans = SpanSet::new();
//! spans.declare(SpanAccess::ReadWrite, Span::range("c", "g"));
//!
//! let mut batch = wrap_batch(engine.new_batch(), &spans);
//! batch.put(b"d", b"value").unwrap();
//! assert!(batch.put(b"a", b"value").is_err());
//! assert_eq!(batch.get(b"d").unwrap().as_deref(), Some(&b"value"[..]));
//! ```

use std::fmt;

use itertools::Itertools;

use crate::base::{SpanLatchError, SpanLatchResult, Timestamp};
use crate::engine::EngineIterator;

mod batch;
mod checker;
mod iterator;
mod span;

#[cfg(test)]
mod tests;

pub use batch::GuardedBatch;
pub use checker::AccessChecker;
pub use iterator::{GuardedIterator, IterPosition};
pub use span::Span;

/// The level of access a declaration grants. `ReadWrite` subsumes `ReadOnly`.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SpanAccess {
    #[display("ro")]
    ReadOnly,
    #[display("rw")]
    ReadWrite,
}

impl SpanAccess {
    /// Returns `true` if a declaration at this level satisfies a request for `requested`.
    #[inline]
    pub fn covers(&self, requested: SpanAccess) -> bool {
        *self >= requested
    }
}

/// Which access timestamps a declaration protects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimestampPolicy {
    /// Protects access at any timestamp, including non-versioned access.
    Unconditional,
    /// Protects reads at or below the timestamp and writes at exactly the timestamp.
    BoundTo(Timestamp),
}

impl TimestampPolicy {
    /// Applies the timestamp rule for an access at `access_ts` with level `access`.
    pub fn permits(&self, access: SpanAccess, access_ts: Option<Timestamp>) -> bool {
        match (self, access_ts) {
            (TimestampPolicy::Unconditional, _) => true,
            // versioned declarations never protect non-versioned access
            (TimestampPolicy::BoundTo(_), None) => false,
            (TimestampPolicy::BoundTo(declared), Some(at)) => match access {
                SpanAccess::ReadOnly => at <= *declared,
                SpanAccess::ReadWrite => at == *declared,
            },
        }
    }
}

impl fmt::Display for TimestampPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimestampPolicy::Unconditional => write!(f, "*"),
            TimestampPolicy::BoundTo(ts) => write!(f, "{ts}"),
        }
    }
}

/// A single entry of a [`SpanSet`].
#[derive(Debug, Display, Clone, PartialEq, Eq, Hash)]
#[display("{access} {span} @ {policy}")]
pub struct Declaration {
    pub span: Span,
    pub access: SpanAccess,
    pub policy: TimestampPolicy,
}

impl Declaration {
    /// Returns `true` if this declaration alone allows `access` to `span` at `access_ts`.
    pub fn allows(&self, access: SpanAccess, span: &Span, access_ts: Option<Timestamp>) -> bool {
        self.access.covers(access)
            && self.span.contains(span)
            && self.policy.permits(access, access_ts)
    }
}

/// An append-only registry of the key spans an operation declared.
///
/// Declarations may overlap; coverage is the union of all declarations and does not depend on
/// the order they were added in. Once a wrapper borrows the set, the borrow checker keeps it
/// immutable for as long as the wrapper lives, and any number of wrappers may share it.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SpanSet {
    declarations: Vec<Declaration>,
}

impl SpanSet {
    pub fn new() -> Self {
        Default::default()
    }

    /// Declares `span` with the given access level, independent of any timestamp.
    pub fn declare(&mut self, access: SpanAccess, span: Span) {
        self.push(Declaration {
            span,
            access,
            policy: TimestampPolicy::Unconditional,
        });
    }

    /// Declares `span` with the given access level, bound to the timestamp `ts`.
    pub fn declare_at(&mut self, access: SpanAccess, span: Span, ts: Timestamp) {
        self.push(Declaration {
            span,
            access,
            policy: TimestampPolicy::BoundTo(ts),
        });
    }

    fn push(&mut self, declaration: Declaration) {
        trace!(%declaration, "Declaring span");
        self.declarations.push(declaration);
    }

    /// Appends all declarations of `other` to this set.
    pub fn merge(&mut self, other: &SpanSet) {
        self.declarations.extend(other.declarations.iter().cloned());
    }

    /// Checks that every declared range span ends after it starts.
    pub fn validate(&self) -> SpanLatchResult<()> {
        match self.declarations.iter().find(|d| d.span.is_empty()) {
            Some(d) => Err(SpanLatchError::InvalidSpan(d.span.clone())),
            None => Ok(()),
        }
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Declaration> {
        self.declarations.iter()
    }

    pub fn len(&self) -> usize {
        self.declarations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.declarations.is_empty()
    }

    /// Checks `access` to `span` for non-versioned access.
    pub fn check_allowed(&self, access: SpanAccess, span: &Span) -> SpanLatchResult<()> {
        AccessChecker::new(self).check(access, span)
    }

    /// Checks `access` to `span` for versioned access at `ts`.
    pub fn check_allowed_at(
        &self,
        access: SpanAccess,
        span: &Span,
        ts: Timestamp,
    ) -> SpanLatchResult<()> {
        AccessChecker::at(self, ts).check(access, span)
    }
}

impl<'a> IntoIterator for &'a SpanSet {
    type Item = &'a Declaration;
    type IntoIter = std::slice::Iter<'a, Declaration>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl fmt::Display for SpanSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{}}}", self.declarations.iter().join(", "))
    }
}

/// Wraps `batch` so that every access is checked against `spans`, for non-versioned access.
pub fn wrap_batch<B>(batch: B, spans: &SpanSet) -> GuardedBatch<'_, B> {
    GuardedBatch::new(batch, spans)
}

/// Wraps `batch` so that every access is checked against `spans`, for access at `ts`.
pub fn wrap_batch_at<B>(batch: B, spans: &SpanSet, ts: Timestamp) -> GuardedBatch<'_, B> {
    GuardedBatch::at(batch, spans, ts)
}

/// Wraps `iter` so that every positioning call is checked against `spans`.
pub fn wrap_iterator<I: EngineIterator>(
    iter: I,
    spans: &SpanSet,
    ts: Option<Timestamp>,
) -> GuardedIterator<'_, I> {
    GuardedIterator::new(iter, AccessChecker::with_timestamp(spans, ts))
}
