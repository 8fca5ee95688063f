use std::{collections::BTreeMap, ops::Bound, sync::Arc};

use bytes::{Bytes, BytesMut};
use parking_lot::RwLock;
use tracing::instrument;

use crate::base::{EngineError, PrettyBytes, SeqNum, SpanLatchResult};
use crate::engine::{
    Batch, BatchRecord, Engine, EngineConfig, EngineIterator, IterOptions, Reader, WriteBatch,
    Writer, clear_keys_in_range,
};

#[derive(Debug, Default)]
struct MemState {
    data: BTreeMap<Bytes, Bytes>,
    /// The seqnum of the last committed batch, `None` before the first commit.
    last_seqnum: Option<SeqNum>,
}

impl MemState {
    fn apply(&mut self, record: BatchRecord) {
        match record {
            BatchRecord::Put { key, value } => {
                self.data.insert(key, value);
            }
            BatchRecord::Delete { key } => {
                self.data.remove(&key);
            }
            BatchRecord::Merge { key, value } => {
                let merged = merge_values(self.data.get(&key).map(|v| v.as_ref()), &value);
                self.data.insert(key, merged);
            }
            BatchRecord::RangeDelete { start, end } => {
                if end <= start {
                    return;
                }
                let doomed: Vec<Bytes> = self
                    .data
                    .range::<[u8], _>(range_bounds(Some(start.as_ref()), Some(end.as_ref())))
                    .map(|(k, _)| k.clone())
                    .collect();
                for key in doomed {
                    self.data.remove(&key);
                }
            }
        }
    }

    fn collect(&self, lower: Option<&[u8]>, upper: Option<&[u8]>) -> BTreeMap<Bytes, Bytes> {
        if let (Some(lower), Some(upper)) = (lower, upper) {
            if upper <= lower {
                return BTreeMap::new();
            }
        }
        self.data
            .range::<[u8], _>(range_bounds(lower, upper))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

/// The merge operator of the in-memory engine: concatenation.
fn merge_values(existing: Option<&[u8]>, operand: &[u8]) -> Bytes {
    let existing = existing.unwrap_or_default();
    let mut merged = BytesMut::with_capacity(existing.len() + operand.len());
    merged.extend_from_slice(existing);
    merged.extend_from_slice(operand);
    merged.freeze()
}

fn range_bounds<'k>(
    lower: Option<&'k [u8]>,
    upper: Option<&'k [u8]>,
) -> (Bound<&'k [u8]>, Bound<&'k [u8]>) {
    (
        lower.map_or(Bound::Unbounded, Bound::Included),
        upper.map_or(Bound::Unbounded, Bound::Excluded),
    )
}

/// An in-memory storage engine. Cloning yields another handle to the same data.
#[derive(Debug, Clone, Default)]
pub struct MemEngine {
    state: Arc<RwLock<MemState>>,
    config: EngineConfig,
}

impl MemEngine {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn with_config(config: EngineConfig) -> Self {
        Self {
            state: Default::default(),
            config,
        }
    }

    /// The seqnum of the last committed batch, `None` before the first commit.
    pub fn last_seqnum(&self) -> Option<SeqNum> {
        self.state.read().last_seqnum
    }

    #[instrument(skip_all, level = "debug")]
    fn write(&self, mut batch: WriteBatch, sync: bool) -> SpanLatchResult<()> {
        let mut state = self.state.write();
        let seqnum = match state.last_seqnum {
            Some(last) => last.next()?,
            None => SeqNum::START,
        };
        batch.commit(seqnum);
        trace!(seqnum = seqnum.get(), sync, "Batch stamped with seqnum");

        let (decoded_seqnum, records) = WriteBatch::decode(batch.take_buf().freeze())?;
        debug_assert_eq!(decoded_seqnum, seqnum);
        for record in records {
            state.apply(record);
        }
        state.last_seqnum = Some(seqnum);
        Ok(())
    }
}

impl Reader for MemEngine {
    type Iterator = MemIterator;

    fn get(&self, key: &[u8]) -> SpanLatchResult<Option<Bytes>> {
        Ok(self.state.read().data.get(key).cloned())
    }

    fn scan<F>(&self, start: &[u8], end: &[u8], mut f: F) -> SpanLatchResult<()>
    where
        F: FnMut(&[u8], &[u8]) -> SpanLatchResult<bool>,
    {
        // collect first, so that the callback never runs under the lock
        let entries = self.state.read().collect(Some(start), Some(end));
        for (key, value) in &entries {
            if f(key, value)? {
                break;
            }
        }
        Ok(())
    }

    fn new_iterator(&self, opts: IterOptions) -> MemIterator {
        let entries = self.state.read().collect(None, None);
        MemIterator::new(entries.into_iter().collect(), opts)
    }
}

impl Writer for MemEngine {
    fn put(&mut self, key: &[u8], value: &[u8]) -> SpanLatchResult<()> {
        let mut batch = self.new_batch();
        batch.put(key, value)?;
        batch.commit(true)
    }

    fn delete(&mut self, key: &[u8]) -> SpanLatchResult<()> {
        let mut batch = self.new_batch();
        batch.delete(key)?;
        batch.commit(true)
    }

    fn delete_range(&mut self, start: &[u8], end: &[u8]) -> SpanLatchResult<()> {
        let mut batch = self.new_batch();
        batch.delete_range(start, end)?;
        batch.commit(true)
    }

    fn merge(&mut self, key: &[u8], value: &[u8]) -> SpanLatchResult<()> {
        let mut batch = self.new_batch();
        batch.merge(key, value)?;
        batch.commit(true)
    }

    fn clear_iter_range<I>(
        &mut self,
        iter: &mut I,
        start: &[u8],
        end: &[u8],
    ) -> SpanLatchResult<()>
    where
        I: EngineIterator,
    {
        let mut batch = self.new_batch();
        batch.clear_iter_range(iter, start, end)?;
        batch.commit(true)
    }
}

impl Engine for MemEngine {
    type Batch = MemBatch;

    fn new_batch(&self) -> MemBatch {
        MemBatch::new(self.clone())
    }
}

/// A pending write of a [`MemBatch`], as seen by reads through the batch.
#[derive(Debug, Clone)]
enum Pending {
    Value(Bytes),
    Deleted,
}

/// A batch of writes against a [`MemEngine`]. Reads through the batch observe its own pending
/// writes on top of the engine's committed data.
#[derive(Debug)]
pub struct MemBatch {
    engine: MemEngine,
    records: Option<WriteBatch>,
    /// The latest pending write per key.
    overlay: BTreeMap<Bytes, Pending>,
    /// Range deletions, hiding committed keys that the overlay does not mention.
    tombstones: Vec<(Bytes, Bytes)>,
}

impl MemBatch {
    fn new(engine: MemEngine) -> Self {
        let buf = BytesMut::with_capacity(engine.config.batch_capacity);
        Self {
            engine,
            records: Some(WriteBatch::new_in(buf)),
            overlay: BTreeMap::new(),
            tombstones: Vec::new(),
        }
    }

    /// The number of writes recorded so far.
    pub fn len(&self) -> u32 {
        self.records.as_ref().map_or(0, WriteBatch::count)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_committed(&self) -> bool {
        self.records.is_none()
    }

    fn writable(&mut self) -> SpanLatchResult<&mut WriteBatch> {
        let limit = self.engine.config.max_batch_records;
        let records = self.records.as_mut().ok_or(EngineError::BatchCommitted)?;
        if records.count() >= limit {
            return Err(EngineError::BatchFull { limit }.into());
        }
        Ok(records)
    }

    fn is_tombstoned(&self, key: &[u8]) -> bool {
        self.tombstones
            .iter()
            .any(|(start, end)| start.as_ref() <= key && key < end.as_ref())
    }

    /// The visible key-value pairs within the bounds, in key order.
    fn merged(&self, lower: Option<&[u8]>, upper: Option<&[u8]>) -> Vec<(Bytes, Bytes)> {
        let mut entries = self.engine.state.read().collect(lower, upper);
        entries.retain(|key, _| !self.is_tombstoned(key));
        if !matches!((lower, upper), (Some(l), Some(u)) if u <= l) {
            for (key, pending) in self.overlay.range::<[u8], _>(range_bounds(lower, upper)) {
                match pending {
                    Pending::Value(value) => entries.insert(key.clone(), value.clone()),
                    Pending::Deleted => entries.remove(key),
                };
            }
        }
        entries.into_iter().collect()
    }
}

impl Reader for MemBatch {
    type Iterator = MemIterator;

    fn get(&self, key: &[u8]) -> SpanLatchResult<Option<Bytes>> {
        match self.overlay.get(key) {
            Some(Pending::Value(value)) => Ok(Some(value.clone())),
            Some(Pending::Deleted) => Ok(None),
            None if self.is_tombstoned(key) => Ok(None),
            None => self.engine.get(key),
        }
    }

    fn scan<F>(&self, start: &[u8], end: &[u8], mut f: F) -> SpanLatchResult<()>
    where
        F: FnMut(&[u8], &[u8]) -> SpanLatchResult<bool>,
    {
        for (key, value) in self.merged(Some(start), Some(end)) {
            if f(&key, &value)? {
                break;
            }
        }
        Ok(())
    }

    fn new_iterator(&self, opts: IterOptions) -> MemIterator {
        MemIterator::new(self.merged(None, None), opts)
    }
}

impl Writer for MemBatch {
    fn put(&mut self, key: &[u8], value: &[u8]) -> SpanLatchResult<()> {
        self.writable()?.put(key, value);
        self.overlay.insert(
            Bytes::copy_from_slice(key),
            Pending::Value(Bytes::copy_from_slice(value)),
        );
        Ok(())
    }

    fn delete(&mut self, key: &[u8]) -> SpanLatchResult<()> {
        self.writable()?.delete(key);
        self.overlay.insert(Bytes::copy_from_slice(key), Pending::Deleted);
        Ok(())
    }

    fn delete_range(&mut self, start: &[u8], end: &[u8]) -> SpanLatchResult<()> {
        self.writable()?.delete_range(start, end);
        if end <= start {
            return Ok(());
        }
        let bounds = range_bounds(Some(start), Some(end));
        for (_, pending) in self.overlay.range_mut::<[u8], _>(bounds) {
            *pending = Pending::Deleted;
        }
        self.tombstones
            .push((Bytes::copy_from_slice(start), Bytes::copy_from_slice(end)));
        Ok(())
    }

    fn merge(&mut self, key: &[u8], value: &[u8]) -> SpanLatchResult<()> {
        let current = self.get(key)?;
        self.writable()?.merge(key, value);
        let merged = merge_values(current.as_deref(), value);
        self.overlay
            .insert(Bytes::copy_from_slice(key), Pending::Value(merged));
        Ok(())
    }

    fn clear_iter_range<I>(
        &mut self,
        iter: &mut I,
        start: &[u8],
        end: &[u8],
    ) -> SpanLatchResult<()>
    where
        I: EngineIterator,
    {
        clear_keys_in_range(iter, start, end, |key| self.delete(key))
    }
}

impl Batch for MemBatch {
    fn commit(&mut self, sync: bool) -> SpanLatchResult<()> {
        let records = self.records.take().ok_or(EngineError::BatchCommitted)?;
        debug!(records = records.count(), sync, "Committing batch");
        self.engine.write(records, sync)
    }
}

/// An iterator over a snapshot of key-value pairs, taken when the iterator was created.
///
/// The snapshot holds every key of the source. The bounds only filter it, so a later
/// [`set_upper_bound`](EngineIterator::set_upper_bound) may widen the visible range as well as
/// narrow it.
#[derive(Debug)]
pub struct MemIterator {
    #[debug("{} entries", entries.len())]
    entries: Vec<(Bytes, Bytes)>,
    lower: Option<Bytes>,
    upper: Option<Bytes>,
    pos: Option<usize>,
}

impl MemIterator {
    fn new(entries: Vec<(Bytes, Bytes)>, opts: IterOptions) -> Self {
        Self {
            entries,
            lower: opts.lower_bound,
            upper: opts.upper_bound,
            pos: None,
        }
    }

    fn in_bounds(&self, idx: usize) -> bool {
        let Some((key, _)) = self.entries.get(idx) else {
            return false;
        };
        self.lower.as_ref().is_none_or(|lower| key >= lower)
            && self.upper.as_ref().is_none_or(|upper| key < upper)
    }

    fn settle(&mut self, idx: Option<usize>) {
        self.pos = idx.filter(|&idx| self.in_bounds(idx));
        if let Some(key) = self.key() {
            trace!(key = ?PrettyBytes(key), "MemIterator positioned");
        }
    }
}

impl EngineIterator for MemIterator {
    fn seek_ge(&mut self, key: &[u8]) {
        let target = match &self.lower {
            Some(lower) if lower.as_ref() > key => lower.clone(),
            _ => Bytes::copy_from_slice(key),
        };
        let idx = self.entries.partition_point(|(k, _)| k < &target);
        self.settle(Some(idx));
    }

    fn seek_lt(&mut self, key: &[u8]) {
        let target = match &self.upper {
            Some(upper) if upper.as_ref() < key => upper.clone(),
            _ => Bytes::copy_from_slice(key),
        };
        let idx = self.entries.partition_point(|(k, _)| k < &target);
        self.settle(idx.checked_sub(1));
    }

    fn next(&mut self) {
        let idx = self.pos.map(|pos| pos + 1);
        self.settle(idx);
    }

    fn prev(&mut self) {
        let idx = self.pos.and_then(|pos| pos.checked_sub(1));
        self.settle(idx);
    }

    fn valid(&self) -> SpanLatchResult<bool> {
        Ok(self.pos.is_some())
    }

    fn key(&self) -> Option<&[u8]> {
        self.pos.map(|pos| self.entries[pos].0.as_ref())
    }

    fn value(&self) -> Option<&[u8]> {
        self.pos.map(|pos| self.entries[pos].1.as_ref())
    }

    fn set_upper_bound(&mut self, upper: &[u8]) {
        self.upper = Some(Bytes::copy_from_slice(upper));
        self.pos = None;
    }
}
