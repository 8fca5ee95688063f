use bytes::Bytes;

use super::*;
use crate::base::{PrettyBytes, Timestamp};
use crate::engine::{Batch, Engine, EngineIterator, IterOptions, MemEngine, Reader, Writer};
use crate::tests::setup_tracing;

fn is_read_span_err<T>(res: SpanLatchResult<T>) -> bool {
    matches!(res, Err(err) if err.to_string().contains("cannot read undeclared span"))
}

fn is_write_span_err<T>(res: SpanLatchResult<T>) -> bool {
    matches!(res, Err(err) if err.to_string().contains("cannot write undeclared span"))
}

fn at(wall: u64) -> Timestamp {
    Timestamp::from_wall(wall)
}

#[test]
fn test_batch_boundaries() {
    setup_tracing();
    let mut engine = MemEngine::new();
    let mut spans = SpanSet::new();
    spans.declare(SpanAccess::ReadWrite, Span::range("c", "g"));

    // values outside the declared range, to try reading later
    engine.put(b"a", b"value").unwrap();
    engine.put(b"m", b"value").unwrap();

    let mut batch = wrap_batch(engine.new_batch(), &spans);

    batch.put(b"c", b"value").unwrap();
    batch.put(b"d", b"value2").unwrap();

    // every write method checks
    assert!(is_write_span_err(batch.delete(b"a")));
    assert!(is_write_span_err(batch.delete_range(b"a", b"b")));
    {
        let mut iter = batch.new_iterator(IterOptions::default());
        assert!(is_write_span_err(batch.clear_iter_range(&mut iter, b"a", b"b")));
    }
    assert!(is_write_span_err(batch.merge(b"a", b"")));
    assert!(is_write_span_err(batch.put(b"a", b"")));

    assert_eq!(batch.get(b"c").unwrap(), Some(Bytes::from_static(b"value")));
    assert!(is_read_span_err(batch.get(b"a")));
    assert!(is_read_span_err(batch.scan(b"a", b"b", |k, _| {
        panic!("unexpected callback for {:?}", PrettyBytes(k))
    })));

    {
        let mut iter = batch.new_iterator(IterOptions::default());
        iter.seek_ge(b"a");
        assert!(is_read_span_err(iter.valid()));
        // seeking back in bounds restores validity
        iter.seek_ge(b"c");
        assert_eq!(iter.valid(), Ok(true));
        assert_eq!(iter.key(), Some(b"c".as_slice()));
        iter.next();
        assert_eq!(iter.key(), Some(b"d".as_slice()));
        // "m" exists past the declared range
        iter.next();
        assert!(is_read_span_err(iter.valid()));
    }
    {
        let mut iter = batch.new_iterator(IterOptions::upper_bound(b"g"));
        iter.seek_ge(b"d");
        iter.next();
        assert_eq!(iter.valid(), Ok(false), "running into the bound is not an error");
    }

    // same test in reverse, over the committed engine
    batch.commit(true).unwrap();
    let mut iter = wrap_iterator(engine.new_iterator(IterOptions::default()), &spans, None);
    iter.seek_lt(b"b");
    assert!(is_read_span_err(iter.valid()));
    iter.seek_lt(b"f");
    assert_eq!(iter.key(), Some(b"d".as_slice()));
    iter.prev();
    assert_eq!(iter.key(), Some(b"c".as_slice()));
    iter.prev();
    assert!(is_read_span_err(iter.valid()));
    iter.seek_lt(b"e");
    assert_eq!(iter.valid(), Ok(true));

    let mut iter = wrap_iterator(
        engine.new_iterator(IterOptions::default().with_lower_bound(b"c")),
        &spans,
        None,
    );
    iter.seek_lt(b"d");
    iter.prev();
    assert_eq!(iter.valid(), Ok(false));
}

#[test]
fn test_batch_timestamps() {
    setup_tracing();
    let mut engine = MemEngine::new();
    let mut spans = SpanSet::new();
    spans.declare_at(SpanAccess::ReadOnly, Span::range("a", "c"), at(2));
    spans.declare_at(SpanAccess::ReadWrite, Span::range("d", "f"), at(2));

    let value = b"value";
    engine.put(b"b", value).unwrap();

    let mut non_mvcc = wrap_batch_at(engine.new_batch(), &spans, Timestamp::ZERO);
    let mut before = wrap_batch_at(engine.new_batch(), &spans, at(1));
    let mut during = wrap_batch_at(engine.new_batch(), &spans, at(2));
    let mut after = wrap_batch_at(engine.new_batch(), &spans, at(3));

    during.put(b"e", value).unwrap();

    for batch in [&mut after, &mut before, &mut non_mvcc] {
        assert!(is_write_span_err(batch.put(b"e", value)));
        assert!(is_write_span_err(batch.delete(b"e")));
        {
            let mut iter = batch.new_iterator(IterOptions::default());
            assert!(is_write_span_err(batch.clear_iter_range(&mut iter, b"e", b"e")));
        }
        assert!(is_write_span_err(batch.merge(b"e", b"")));
        assert!(batch.inner().is_empty());
    }

    for batch in [&before, &during] {
        assert_eq!(batch.get(b"b").unwrap().as_deref(), Some(&value[..]));
    }

    for batch in [&after, &non_mvcc] {
        assert!(is_read_span_err(batch.get(b"b")));
        assert!(is_read_span_err(batch.scan(b"b", b"b", |_, _| Ok(false))));
    }
}

#[test]
fn test_iterator_timestamps() {
    setup_tracing();
    let mut engine = MemEngine::new();
    let mut spans = SpanSet::new();
    spans.declare_at(SpanAccess::ReadOnly, Span::range("a", "c"), at(1));
    spans.declare_at(SpanAccess::ReadOnly, Span::range("c", "e"), at(2));

    engine.put(b"b", b"b-value").unwrap();
    engine.put(b"d", b"d-value").unwrap();

    let non_mvcc = wrap_batch_at(engine.new_batch(), &spans, Timestamp::ZERO);
    let at1 = wrap_batch_at(engine.new_batch(), &spans, at(1));
    let at2 = wrap_batch_at(engine.new_batch(), &spans, at(2));
    let at3 = wrap_batch_at(engine.new_batch(), &spans, at(3));

    // at t=1 both declarations protect the read
    let mut iter = at1.new_iterator(IterOptions::default());
    iter.seek_ge(b"b");
    assert_eq!(iter.key(), Some(b"b".as_slice()));
    assert_eq!(iter.value(), Some(b"b-value".as_slice()));
    iter.next();
    assert_eq!(iter.key(), Some(b"d".as_slice()));

    // at t=2 only the declaration at t=2 does
    let mut iter = at2.new_iterator(IterOptions::default());
    iter.seek_ge(b"b");
    assert!(is_read_span_err(iter.valid()));
    iter.seek_ge(b"d");
    assert_eq!(iter.key(), Some(b"d".as_slice()));

    // past every declaration, and without a timestamp, nothing does
    for batch in [&at3, &non_mvcc] {
        let mut iter = batch.new_iterator(IterOptions::default());
        iter.seek_ge(b"b");
        assert!(is_read_span_err(iter.valid()));
        iter.seek_ge(b"d");
        assert!(is_read_span_err(iter.valid()));
    }
}

#[test]
fn test_non_mvcc_batch() {
    setup_tracing();
    let mut engine = MemEngine::new();
    let mut spans = SpanSet::new();
    spans.declare(SpanAccess::ReadOnly, Span::range("a", "c"));
    spans.declare(SpanAccess::ReadWrite, Span::range("d", "f"));

    engine.put(b"b", b"value").unwrap();

    let mut non_mvcc = wrap_batch(engine.new_batch(), &spans);
    let mut mvcc = wrap_batch_at(engine.new_batch(), &spans, at(1));

    for batch in [&mut non_mvcc, &mut mvcc] {
        batch.put(b"e", b"value").unwrap();
        assert_eq!(batch.get(b"b").unwrap(), Some(Bytes::from_static(b"value")));
    }
}

#[test]
fn test_denied_write_never_reaches_engine() {
    setup_tracing();
    let mut engine = MemEngine::new();
    engine.put(b"a", b"old").unwrap();
    engine.put(b"c", b"old").unwrap();

    let mut spans = SpanSet::new();
    spans.declare(SpanAccess::ReadWrite, Span::range("c", "g"));

    let mut batch = wrap_batch(engine.new_batch(), &spans);
    batch.put(b"c", b"new").unwrap();
    assert!(is_write_span_err(batch.put(b"a", b"new")));
    batch.commit(true).unwrap();

    let mut seen = Vec::new();
    engine
        .scan(b"a", b"z", |k, v| {
            seen.push((Bytes::copy_from_slice(k), Bytes::copy_from_slice(v)));
            Ok(false)
        })
        .unwrap();
    assert_eq!(
        seen,
        vec![
            (Bytes::from_static(b"a"), Bytes::from_static(b"old")),
            (Bytes::from_static(b"c"), Bytes::from_static(b"new")),
        ]
    );
}

fn committed_keys(engine: &MemEngine) -> Vec<Bytes> {
    let mut keys = Vec::new();
    engine
        .scan(b"", b"\xff", |k, _| {
            keys.push(Bytes::copy_from_slice(k));
            Ok(false)
        })
        .unwrap();
    keys
}

#[test]
fn test_partially_declared_range_delete_is_denied_whole() {
    setup_tracing();
    let mut engine = MemEngine::new();
    for key in [b"c", b"d", b"e"] {
        engine.put(key, b"v").unwrap();
    }
    let mut spans = SpanSet::new();
    spans.declare(SpanAccess::ReadWrite, Span::range("c", "g"));

    let mut batch = wrap_batch(engine.new_batch(), &spans);
    let err = batch.delete_range(b"b", b"e").unwrap_err();
    assert!(matches!(err, SpanLatchError::UndeclaredWrite { .. }));
    assert_eq!(err.denied_span(), Some(&Span::range("b", "e")));

    let mut iter = batch.new_iterator(IterOptions::default());
    let err = batch.clear_iter_range(&mut iter, b"e", b"h").unwrap_err();
    assert!(matches!(err, SpanLatchError::UndeclaredWrite { .. }));
    assert_eq!(err.denied_span(), Some(&Span::range("e", "h")));

    assert!(batch.inner().is_empty());
    batch.commit(true).unwrap();
    assert_eq!(committed_keys(&engine), vec!["c", "d", "e"]);
}

#[test]
fn test_clear_iter_range_ignores_iterator_bounds() {
    setup_tracing();
    let mut engine = MemEngine::new();
    for key in [b"c", b"d", b"e", b"f", b"g"] {
        engine.put(key, b"v").unwrap();
    }
    let mut spans = SpanSet::new();
    spans.declare(SpanAccess::ReadWrite, Span::range("c", "g"));

    let mut batch = wrap_batch(engine.new_batch(), &spans);
    let mut iter = batch.new_iterator(IterOptions::upper_bound(b"d"));
    batch.clear_iter_range(&mut iter, b"c", b"g").unwrap();
    batch.commit(true).unwrap();

    assert_eq!(committed_keys(&engine), vec!["g"]);
}

#[test]
fn test_wrappers_share_span_set_across_threads() {
    setup_tracing();
    let mut engine = MemEngine::new();
    for key in [b"c", b"d", b"e"] {
        engine.put(key, b"v").unwrap();
    }
    let mut spans = SpanSet::new();
    spans.declare(SpanAccess::ReadOnly, Span::range("c", "f"));

    std::thread::scope(|s| {
        for _ in 0..4 {
            let batch = wrap_batch(engine.new_batch(), &spans);
            s.spawn(move || {
                let mut count = 0;
                batch
                    .scan(b"c", b"f", |_, _| {
                        count += 1;
                        Ok(false)
                    })
                    .unwrap();
                assert_eq!(count, 3);
                assert!(is_read_span_err(batch.get(b"z")));
            });
        }
    });
}

#[test]
fn test_span_set_display() {
    let mut spans = SpanSet::new();
    spans.declare(SpanAccess::ReadWrite, Span::range("c", "g"));
    spans.declare_at(SpanAccess::ReadOnly, Span::key("a"), at(2));
    assert_eq!(
        spans.to_string(),
        r#"{rw ["c", "g") @ *, ro "a" @ 2.0}"#
    );
    assert_eq!(spans.len(), 2);
}

#[test]
fn test_validate_rejects_inverted_range() {
    let mut spans = SpanSet::new();
    spans.declare(SpanAccess::ReadOnly, Span::key("a"));
    spans.validate().unwrap();
    spans.declare(SpanAccess::ReadOnly, Span::range("g", "c"));
    assert_eq!(
        spans.validate(),
        Err(SpanLatchError::InvalidSpan(Span::range("g", "c")))
    );
}

#[test]
fn test_merge_keeps_union() {
    let mut ro = SpanSet::new();
    ro.declare(SpanAccess::ReadOnly, Span::range("a", "c"));
    let mut rw = SpanSet::new();
    rw.declare(SpanAccess::ReadWrite, Span::range("d", "f"));

    let mut merged = rw.clone();
    merged.merge(&ro);
    ro.merge(&rw);
    for spans in [&merged, &ro] {
        spans.check_allowed(SpanAccess::ReadOnly, &Span::key("b")).unwrap();
        spans.check_allowed(SpanAccess::ReadWrite, &Span::key("e")).unwrap();
        assert!(spans.check_allowed(SpanAccess::ReadWrite, &Span::key("b")).is_err());
    }
}
