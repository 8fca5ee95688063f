use crate::base::{SpanLatchError, SpanLatchResult, Timestamp};
use crate::spanset::{Span, SpanAccess, SpanSet};

/// Decides whether an access is covered by a [`SpanSet`].
///
/// The checker pairs a span set with the access timestamp of one wrapper. It is `Copy`, so a
/// batch hands the same checker to every iterator it creates. Checking never mutates anything;
/// repeating a denied check yields the same error.
#[derive(Debug, Clone, Copy)]
pub struct AccessChecker<'a> {
    spans: &'a SpanSet,
    ts: Option<Timestamp>,
}

impl<'a> AccessChecker<'a> {
    /// A checker for non-versioned access.
    pub fn new(spans: &'a SpanSet) -> Self {
        Self { spans, ts: None }
    }

    /// A checker for versioned access at `ts`. [`Timestamp::ZERO`] means non-versioned access.
    pub fn at(spans: &'a SpanSet, ts: Timestamp) -> Self {
        Self::with_timestamp(spans, Some(ts))
    }

    pub fn with_timestamp(spans: &'a SpanSet, ts: Option<Timestamp>) -> Self {
        Self {
            spans,
            ts: ts.filter(|ts| !ts.is_zero()),
        }
    }

    pub fn spans(&self) -> &'a SpanSet {
        self.spans
    }

    /// The access timestamp, or `None` for non-versioned access.
    pub fn timestamp(&self) -> Option<Timestamp> {
        self.ts
    }

    /// Checks `access` to `span`. Allowed if any single declaration allows it.
    pub fn check(&self, access: SpanAccess, span: &Span) -> SpanLatchResult<()> {
        if self.spans.iter().any(|d| d.allows(access, span, self.ts)) {
            return Ok(());
        }
        Err(self.denial(access, span.clone()))
    }

    /// Checks `access` to the single key `key`, without allocating unless denied.
    pub fn check_key(&self, access: SpanAccess, key: &[u8]) -> SpanLatchResult<()> {
        let allowed = self.spans.iter().any(|d| {
            d.access.covers(access) && d.span.contains_key(key) && d.policy.permits(access, self.ts)
        });
        if allowed {
            return Ok(());
        }
        Err(self.denial(access, Span::key(key)))
    }

    /// Checks `access` to every key in `[start, end)`.
    pub fn check_range(
        &self,
        access: SpanAccess,
        start: &[u8],
        end: &[u8],
    ) -> SpanLatchResult<()> {
        let allowed = self.spans.iter().any(|d| {
            d.access.covers(access)
                && d.span.contains_range(start, end)
                && d.policy.permits(access, self.ts)
        });
        if allowed {
            return Ok(());
        }
        Err(self.denial(access, Span::range(start, end)))
    }

    pub fn check_read_key(&self, key: &[u8]) -> SpanLatchResult<()> {
        self.check_key(SpanAccess::ReadOnly, key)
    }

    pub fn check_write_key(&self, key: &[u8]) -> SpanLatchResult<()> {
        self.check_key(SpanAccess::ReadWrite, key)
    }

    fn denial(&self, access: SpanAccess, span: Span) -> SpanLatchError {
        let ts = self.ts;
        match access {
            SpanAccess::ReadOnly => SpanLatchError::UndeclaredRead { span, ts },
            SpanAccess::ReadWrite => SpanLatchError::UndeclaredWrite { span, ts },
        }
    }
}
