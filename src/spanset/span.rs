use std::fmt;

use bytes::Bytes;

use crate::base::{PrettyBytes, next_key};

/// A half-open key range `[start, end)`. Without an end key, the span covers exactly `start`.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Span {
    start: Bytes,
    end: Option<Bytes>,
}

impl Span {
    /// A span covering the single key `key`.
    pub fn key(key: impl AsRef<[u8]>) -> Self {
        Self {
            start: Bytes::copy_from_slice(key.as_ref()),
            end: None,
        }
    }

    /// A span covering all keys `k` with `start <= k < end`.
    pub fn range(start: impl AsRef<[u8]>, end: impl AsRef<[u8]>) -> Self {
        Self {
            start: Bytes::copy_from_slice(start.as_ref()),
            end: Some(Bytes::copy_from_slice(end.as_ref())),
        }
    }

    pub fn start(&self) -> &[u8] {
        &self.start
    }

    /// The exclusive end key, if this is a range span.
    pub fn end(&self) -> Option<&[u8]> {
        self.end.as_deref()
    }

    /// The exclusive end key. For single-key spans this is the key's immediate successor.
    pub fn end_key(&self) -> Bytes {
        match &self.end {
            Some(end) => end.clone(),
            None => Bytes::from(next_key(&self.start)),
        }
    }

    pub fn is_single_key(&self) -> bool {
        self.end.is_none()
    }

    /// Returns `true` for range spans that cover no key at all, i.e. `end <= start`.
    pub fn is_empty(&self) -> bool {
        matches!(&self.end, Some(end) if end <= &self.start)
    }

    pub fn contains_key(&self, key: &[u8]) -> bool {
        match &self.end {
            None => self.start.as_ref() == key,
            Some(end) => self.start.as_ref() <= key && key < end.as_ref(),
        }
    }

    /// Returns `true` if `[start, end)` lies entirely within this span.
    ///
    /// A range that covers no keys (`end <= start`) is only contained by the single-key span
    /// whose key equals `start`, and only when the range is zero-length.
    pub fn contains_range(&self, start: &[u8], end: &[u8]) -> bool {
        if end <= start {
            return end == start && self.is_single_key() && self.start.as_ref() == start;
        }
        match &self.end {
            None => self.start.as_ref() == start && end == next_key(start).as_slice(),
            Some(own_end) => self.start.as_ref() <= start && end <= own_end.as_ref(),
        }
    }

    /// Returns `true` if `other` lies entirely within this span.
    pub fn contains(&self, other: &Span) -> bool {
        match &other.end {
            None => self.contains_key(&other.start),
            Some(end) => self.contains_range(&other.start, end),
        }
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.end {
            None => write!(f, "{}", PrettyBytes(&self.start)),
            Some(end) => write!(f, "[{}, {})", PrettyBytes(&self.start), PrettyBytes(end)),
        }
    }
}

impl fmt::Debug for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Span({})", self)
    }
}
