//! Resolution of write intents over a key range.
//!
//! Values written through this module carry a one-byte [`ValueTag`] in front of the payload.
//! An intent is a provisional value left by a transaction that has not finished yet; once the
//! transaction's outcome is known, [`resolve_intent_range`] either commits the intents in a range
//! (rewriting the tag) or aborts them (deleting the key).

use bytes::{BufMut, Bytes, BytesMut};
use num_enum::{IntoPrimitive, TryFromPrimitive, TryFromPrimitiveError};
use tracing::instrument;

use crate::base::{EngineError, PrettyBytes, SpanLatchError, SpanLatchResult, next_key};
use crate::engine::{EngineIterator, Writer};
use crate::spanset::Span;

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum ValueTag {
    Committed = 0,
    Intent = 1,
}

impl From<TryFromPrimitiveError<ValueTag>> for SpanLatchError {
    fn from(err: TryFromPrimitiveError<ValueTag>) -> Self {
        SpanLatchError::Engine(EngineError::InvalidValueTag(err.number))
    }
}

/// The outcome of the transaction that wrote the intents.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum IntentStatus {
    Committed,
    Aborted,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ResolveOutcome {
    /// The number of intents that were committed or aborted.
    pub resolved: usize,
    /// The part of the range left unresolved once the key limit was hit.
    pub resume: Option<Span>,
}

pub fn encode_value(tag: ValueTag, payload: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(payload.len() + 1);
    buf.put_u8(tag.into());
    buf.put_slice(payload);
    buf.freeze()
}

pub fn decode_value(raw: &[u8]) -> SpanLatchResult<(ValueTag, &[u8])> {
    let Some((&tag, payload)) = raw.split_first() else {
        return Err(EngineError::Malformed("value without tag").into());
    };
    Ok((ValueTag::try_from(tag)?, payload))
}

/// Commits or aborts every intent in `span`, visiting keys through `iter` and writing through
/// `writer`. Committed values are skipped.
///
/// With a non-zero `max_keys`, stops after that many intents and reports the rest of the range
/// as the resume span.
///
/// `iter` is bounded at the end of `span` first and is never stepped past the last key that can
/// lie in the range, so it is never positioned at or beyond the end, whatever bounds it was
/// created with.
#[instrument(skip_all, fields(%span, %status), level = "debug")]
pub fn resolve_intent_range<W, I>(
    writer: &mut W,
    iter: &mut I,
    span: &Span,
    status: IntentStatus,
    max_keys: usize,
) -> SpanLatchResult<ResolveOutcome>
where
    W: Writer,
    I: EngineIterator,
{
    let end = span.end_key();
    if end.as_ref() <= span.start() {
        return Ok(ResolveOutcome::default());
    }

    iter.set_upper_bound(&end);
    iter.seek_ge(span.start());
    let mut resolved = 0;
    while iter.valid()? {
        let Some(key) = iter.key() else { break };
        if key >= end.as_ref() {
            break;
        }
        if max_keys > 0 && resolved == max_keys {
            debug!(resolved, resume = ?PrettyBytes(key), "Key limit reached");
            return Ok(ResolveOutcome {
                resolved,
                resume: Some(Span::range(key, &end)),
            });
        }

        let (tag, payload) = decode_value(iter.value().unwrap_or_default())?;
        if tag == ValueTag::Intent {
            trace!(key = ?PrettyBytes(key), "Resolving intent");
            match status {
                IntentStatus::Committed => {
                    writer.put(key, &encode_value(ValueTag::Committed, payload))?
                }
                IntentStatus::Aborted => writer.delete(key)?,
            }
            resolved += 1;
        }

        if next_key(key).as_slice() >= end.as_ref() {
            break;
        }
        iter.next();
    }
    Ok(ResolveOutcome {
        resolved,
        resume: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{Batch, Engine, IterOptions, MemEngine, Reader};
    use crate::spanset::{SpanAccess, SpanSet, wrap_batch};
    use crate::tests::setup_tracing;

    fn engine_with(entries: &[(&str, ValueTag)]) -> MemEngine {
        let mut engine = MemEngine::new();
        for (key, tag) in entries {
            engine
                .put(key.as_bytes(), &encode_value(*tag, b"irrelevant"))
                .unwrap();
        }
        engine
    }

    fn tag_of(engine: &MemEngine, key: &[u8]) -> Option<ValueTag> {
        let raw = engine.get(key).unwrap()?;
        Some(decode_value(&raw).unwrap().0)
    }

    #[test]
    fn test_resolution_stays_within_range() {
        setup_tracing();
        let mut spans = SpanSet::new();
        spans.declare(SpanAccess::ReadWrite, Span::range("a", b"b\x00"));
        let span = Span::range("a", b"b\x00");

        // bounded like a caller would, and once more without any bound; the guarded iterator
        // fails the call if it is ever positioned on "c"
        for opts in [IterOptions::upper_bound(span.end_key()), IterOptions::default()] {
            let engine = engine_with(&[("b", ValueTag::Intent), ("c", ValueTag::Intent)]);
            let mut batch = wrap_batch(engine.new_batch(), &spans);
            let mut iter = batch.new_iterator(opts);
            let outcome =
                resolve_intent_range(&mut batch, &mut iter, &span, IntentStatus::Committed, 0)
                    .unwrap();
            assert_eq!(outcome, ResolveOutcome { resolved: 1, resume: None });
            batch.commit(true).unwrap();

            assert_eq!(tag_of(&engine, b"b"), Some(ValueTag::Committed));
            assert_eq!(tag_of(&engine, b"c"), Some(ValueTag::Intent));
        }
    }

    #[test]
    fn test_resolution_covers_range_past_iterator_bound() {
        let engine = engine_with(&[
            ("a", ValueTag::Intent),
            ("b", ValueTag::Intent),
            ("c", ValueTag::Intent),
        ]);
        let mut batch = engine.new_batch();
        let mut iter = batch.new_iterator(IterOptions::upper_bound(b"b"));
        let outcome = resolve_intent_range(
            &mut batch,
            &mut iter,
            &Span::range("a", "z"),
            IntentStatus::Committed,
            0,
        )
        .unwrap();
        assert_eq!(outcome, ResolveOutcome { resolved: 3, resume: None });
        batch.commit(true).unwrap();

        for key in [b"a", b"b", b"c"] {
            assert_eq!(tag_of(&engine, key), Some(ValueTag::Committed));
        }
    }

    #[test]
    fn test_abort_deletes_intents_only() {
        let engine = engine_with(&[
            ("a", ValueTag::Intent),
            ("b", ValueTag::Committed),
            ("c", ValueTag::Intent),
            ("d", ValueTag::Intent),
        ]);
        let span = Span::range("a", "d");

        let mut batch = engine.new_batch();
        let mut iter = batch.new_iterator(IterOptions::default());
        let outcome =
            resolve_intent_range(&mut batch, &mut iter, &span, IntentStatus::Aborted, 0).unwrap();
        assert_eq!(outcome.resolved, 2);
        batch.commit(true).unwrap();

        let mut keys = Vec::new();
        engine
            .scan(b"a", b"z", |k, _| {
                keys.push(Bytes::copy_from_slice(k));
                Ok(false)
            })
            .unwrap();
        assert_eq!(keys, vec!["b", "d"]);
    }

    #[test]
    fn test_key_limit_reports_resume_span() {
        let engine = engine_with(&[
            ("a", ValueTag::Intent),
            ("b", ValueTag::Committed),
            ("c", ValueTag::Intent),
            ("d", ValueTag::Intent),
        ]);
        let span = Span::range("a", "z");

        let mut batch = engine.new_batch();
        let mut iter = batch.new_iterator(IterOptions::default());
        let outcome =
            resolve_intent_range(&mut batch, &mut iter, &span, IntentStatus::Committed, 2)
                .unwrap();
        assert_eq!(outcome.resolved, 2);
        assert_eq!(outcome.resume, Some(Span::range("d", "z")));

        let resume = outcome.resume.unwrap();
        let outcome =
            resolve_intent_range(&mut batch, &mut iter, &resume, IntentStatus::Committed, 2)
                .unwrap();
        assert_eq!(outcome, ResolveOutcome { resolved: 1, resume: None });
    }

    #[test]
    fn test_denied_write_stops_resolution() {
        let engine = engine_with(&[("b", ValueTag::Intent), ("e", ValueTag::Intent)]);
        let mut spans = SpanSet::new();
        spans.declare(SpanAccess::ReadWrite, Span::range("a", "c"));
        spans.declare(SpanAccess::ReadOnly, Span::range("c", "f"));

        let mut batch = wrap_batch(engine.new_batch(), &spans);
        let mut iter = batch.new_iterator(IterOptions::default());
        let err = resolve_intent_range(
            &mut batch,
            &mut iter,
            &Span::range("a", "f"),
            IntentStatus::Committed,
            0,
        )
        .unwrap_err();
        assert_eq!(err.denied_span(), Some(&Span::key("e")));
    }

    #[test]
    fn test_untagged_value() {
        assert_eq!(
            decode_value(b"").unwrap_err(),
            SpanLatchError::Engine(EngineError::Malformed("value without tag"))
        );
        assert_eq!(
            decode_value(b"\x09x").unwrap_err(),
            SpanLatchError::Engine(EngineError::InvalidValueTag(9))
        );
    }
}
