use bytes::{Buf, BufMut, Bytes, BytesMut};
use integer_encoding::VarInt;

use crate::base::{EngineError, KeyKind, PrettyBytes, SeqNum, SpanLatchResult};

const HEADER_SIZE: usize = 12;

/// Header:
/// - 8 bytes seqnum
/// - 4 bytes count
///
/// Body:
/// - Record[]
///
/// Record:
/// - KeyKind::Delete        varstring
/// - KeyKind::Put           varstring   varstring
/// - KeyKind::Merge         varstring   varstring
/// - KeyKind::RangeDelete   varstring   varstring
#[derive(Debug)]
pub struct WriteBatch {
    #[debug("BytesMut(len={},cap={})", buf.len(), buf.capacity())]
    buf: BytesMut,
    count: u32,
    committed: bool,
}

/// A decoded record of a [`WriteBatch`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchRecord {
    Put { key: Bytes, value: Bytes },
    Delete { key: Bytes },
    Merge { key: Bytes, value: Bytes },
    RangeDelete { start: Bytes, end: Bytes },
}

impl WriteBatch {
    /// Create a new write batch, that stores its encoded data in the buffer.
    pub fn new_in(mut buf: BytesMut) -> Self {
        buf.clear();
        buf.put_bytes(0, HEADER_SIZE);
        Self {
            buf,
            count: 0,
            committed: false,
        }
    }

    /// The number of records written so far.
    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn is_committed(&self) -> bool {
        self.committed
    }

    /// Add a `put KEY=VALUE` command to this batch.
    pub fn put(&mut self, key: &[u8], value: &[u8]) {
        trace!(key = ?PrettyBytes(key), value = ?PrettyBytes(value), "WriteBatch: put");
        self.put_record(KeyKind::Put, key, Some(value));
    }

    /// Add a `delete KEY` command to this batch.
    pub fn delete(&mut self, key: &[u8]) {
        trace!(key = ?PrettyBytes(key), "WriteBatch: delete");
        self.put_record(KeyKind::Delete, key, None);
    }

    /// Add a `merge KEY+=VALUE` command to this batch.
    pub fn merge(&mut self, key: &[u8], value: &[u8]) {
        trace!(key = ?PrettyBytes(key), value = ?PrettyBytes(value), "WriteBatch: merge");
        self.put_record(KeyKind::Merge, key, Some(value));
    }

    /// Add a `delete [START, END)` command to this batch.
    pub fn delete_range(&mut self, start: &[u8], end: &[u8]) {
        trace!(start = ?PrettyBytes(start), end = ?PrettyBytes(end), "WriteBatch: delete range");
        self.put_record(KeyKind::RangeDelete, start, Some(end));
    }

    fn put_record(&mut self, kind: KeyKind, key: &[u8], value: Option<&[u8]>) {
        assert!(!self.committed, "Trying to write to a committed write batch.");
        self.count += 1;
        self.buf.put_u8(kind.into());
        self.put_varstring(key);
        if let Some(value) = value {
            self.put_varstring(value);
        }
    }

    fn put_varstring(&mut self, s: &[u8]) {
        self.put_varint(s.len());
        self.buf.put(s);
    }

    fn put_varint(&mut self, i: usize) {
        // reserve space
        let varint_size = i.required_space();
        self.buf.put_bytes(0, varint_size);
        // encode varint
        let buflen = self.buf.len();
        let written = i.encode_var(&mut self.buf[buflen - varint_size..]);
        debug_assert_eq!(written, varint_size);
    }

    pub fn commit(&mut self, seqnum: SeqNum) {
        assert!(!self.committed);
        self.buf[0..8].copy_from_slice(&seqnum.get().to_le_bytes());
        self.buf[8..12].copy_from_slice(&self.count.to_le_bytes());
        self.committed = true;
    }

    pub fn take_buf(self) -> BytesMut {
        assert!(
            self.committed,
            "Trying to access a write batch, that was not assigned a seqnum."
        );
        self.buf
    }

    /// Decodes a committed batch buffer into its seqnum and records.
    pub fn decode(buf: Bytes) -> SpanLatchResult<(SeqNum, Vec<BatchRecord>)> {
        let mut body = buf;
        if body.len() < HEADER_SIZE {
            return Err(EngineError::Malformed("header truncated").into());
        }
        let header = body.split_to(HEADER_SIZE);
        let seqnum = SeqNum::try_from(u64::from_le_bytes(header[0..8].try_into().unwrap()))?;
        let count = u32::from_le_bytes(header[8..12].try_into().unwrap());

        let mut records = Vec::with_capacity(count as usize);
        for idx in 0..count {
            if !body.has_remaining() {
                return Err(EngineError::Malformed("record truncated").into());
            }
            let kind = KeyKind::try_from(body.get_u8())?;
            let key = read_varstring(&mut body)?;
            trace!(?kind, key = ?PrettyBytes(&key), idx, "Decoded record");

            let record = match kind {
                KeyKind::Delete => BatchRecord::Delete { key },
                KeyKind::Put => BatchRecord::Put {
                    key,
                    value: read_varstring(&mut body)?,
                },
                KeyKind::Merge => BatchRecord::Merge {
                    key,
                    value: read_varstring(&mut body)?,
                },
                KeyKind::RangeDelete => BatchRecord::RangeDelete {
                    start: key,
                    end: read_varstring(&mut body)?,
                },
            };
            records.push(record);
        }

        if body.has_remaining() {
            return Err(EngineError::Malformed("trailing bytes").into());
        }
        Ok((seqnum, records))
    }
}

fn read_varstring(body: &mut Bytes) -> SpanLatchResult<Bytes> {
    let (len, varint_bytes_read) =
        usize::decode_var(&body[..]).ok_or(EngineError::InvalidVarint)?;
    body.advance(varint_bytes_read);
    if body.len() < len {
        return Err(EngineError::Malformed("record truncated").into());
    }
    Ok(body.split_to(len))
}
