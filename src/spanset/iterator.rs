use crate::base::{SpanLatchError, SpanLatchResult};
use crate::engine::EngineIterator;
use crate::spanset::AccessChecker;

/// Where a [`GuardedIterator`] currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IterPosition<'i> {
    /// No positioning call was made yet, or the bounds were reset.
    Unpositioned,
    /// Positioned at a declared key.
    Positioned(&'i [u8]),
    /// The underlying iterator ran out of keys. Ordinary end of data.
    Exhausted,
    /// The underlying iterator is positioned at a key the span set does not cover.
    Denied(&'i SpanLatchError),
    /// The underlying iterator failed.
    Failed(&'i SpanLatchError),
}

#[derive(Debug)]
enum State {
    Unpositioned,
    Positioned,
    Exhausted,
    Denied(SpanLatchError),
    Failed(SpanLatchError),
}

/// Wraps an engine iterator and checks read access to every key it lands on.
///
/// Each positioning call is checked on its own. Leaving the declared spans invalidates the
/// iterator, and positioning back into them makes it valid again.
#[derive(Debug)]
pub struct GuardedIterator<'a, I> {
    inner: I,
    checker: AccessChecker<'a>,
    state: State,
}

impl<'a, I: EngineIterator> GuardedIterator<'a, I> {
    pub fn new(inner: I, checker: AccessChecker<'a>) -> Self {
        Self {
            inner,
            checker,
            state: State::Unpositioned,
        }
    }

    pub fn checker(&self) -> AccessChecker<'a> {
        self.checker
    }

    /// The current position, with exhaustion and denial kept apart.
    pub fn position(&self) -> IterPosition<'_> {
        match &self.state {
            State::Unpositioned => IterPosition::Unpositioned,
            State::Positioned => match self.inner.key() {
                Some(key) => IterPosition::Positioned(key),
                None => IterPosition::Exhausted,
            },
            State::Exhausted => IterPosition::Exhausted,
            State::Denied(err) => IterPosition::Denied(err),
            State::Failed(err) => IterPosition::Failed(err),
        }
    }

    /// Re-evaluates the state after the underlying iterator moved.
    fn check_position(&mut self) {
        self.state = match self.inner.valid() {
            Ok(false) => State::Exhausted,
            Err(err) => State::Failed(err),
            Ok(true) => match self.inner.key() {
                None => State::Exhausted,
                Some(key) => match self.checker.check_read_key(key) {
                    Ok(()) => State::Positioned,
                    Err(err) => State::Denied(err),
                },
            },
        };
    }
}

impl<I: EngineIterator> EngineIterator for GuardedIterator<'_, I> {
    fn seek_ge(&mut self, key: &[u8]) {
        self.inner.seek_ge(key);
        self.check_position();
    }

    fn seek_lt(&mut self, key: &[u8]) {
        self.inner.seek_lt(key);
        self.check_position();
    }

    fn next(&mut self) {
        self.inner.next();
        self.check_position();
    }

    fn prev(&mut self) {
        self.inner.prev();
        self.check_position();
    }

    fn valid(&self) -> SpanLatchResult<bool> {
        match &self.state {
            State::Positioned => Ok(true),
            State::Unpositioned | State::Exhausted => Ok(false),
            State::Denied(err) | State::Failed(err) => Err(err.clone()),
        }
    }

    fn key(&self) -> Option<&[u8]> {
        match self.state {
            State::Positioned => self.inner.key(),
            _ => None,
        }
    }

    fn value(&self) -> Option<&[u8]> {
        match self.state {
            State::Positioned => self.inner.value(),
            _ => None,
        }
    }

    fn set_upper_bound(&mut self, upper: &[u8]) {
        self.inner.set_upper_bound(upper);
        self.state = State::Unpositioned;
    }
}
