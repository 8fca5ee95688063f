use num_enum::TryFromPrimitiveError;

use crate::base::{KeyKind, SeqNum, Timestamp};
use crate::spanset::Span;

/// Errors raised by a storage engine. The span guard passes these through unexamined.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[display("Sequence number overflow: {_0} exceeds maximum allowed ({}).", SeqNum::MAX.get())]
    SeqNumOverflow(#[error(not(source))] u64),

    #[display("Batch was already committed")]
    BatchCommitted,

    #[display("Batch is full: at most {limit} records may be written")]
    BatchFull { limit: u32 },

    #[display("Invalid Varint: Failed to decode.")]
    InvalidVarint,

    #[display("Invalid key kind: {_0}")]
    InvalidKeyKind(#[error(not(source))] u8),

    #[display("Invalid value tag: {_0}")]
    InvalidValueTag(#[error(not(source))] u8),

    #[display("Malformed write batch: {_0}")]
    Malformed(#[error(not(source))] &'static str),
}

impl From<TryFromPrimitiveError<KeyKind>> for EngineError {
    fn from(err: TryFromPrimitiveError<KeyKind>) -> Self {
        EngineError::InvalidKeyKind(err.number)
    }
}

#[derive(Debug, Display, Error, From, Clone, PartialEq, Eq)]
pub enum SpanLatchError {
    /// A read touched a key or range no declaration covers at the access timestamp.
    #[from(skip)]
    #[display("cannot read undeclared span {span}{}", at_suffix(ts))]
    UndeclaredRead { span: Span, ts: Option<Timestamp> },

    /// A write touched a key or range no read-write declaration covers at the access timestamp.
    #[from(skip)]
    #[display("cannot write undeclared span {span}{}", at_suffix(ts))]
    UndeclaredWrite { span: Span, ts: Option<Timestamp> },

    #[from(skip)]
    #[display("Invalid span {_0}: end key must sort after start key")]
    InvalidSpan(#[error(not(source))] Span),

    #[from(skip)]
    #[display("Wall time {_0} exceeds the maximum of {}", Timestamp::MAX_WALL)]
    WallTimeOverflow(#[error(not(source))] u64),

    #[display("Engine error: {_0}")]
    Engine(EngineError),
}

impl SpanLatchError {
    /// Returns `true` for access violations, as opposed to engine failures.
    pub fn is_undeclared(&self) -> bool {
        matches!(
            self,
            SpanLatchError::UndeclaredRead { .. } | SpanLatchError::UndeclaredWrite { .. }
        )
    }

    /// The key or range that was denied, if this is an access violation.
    pub fn denied_span(&self) -> Option<&Span> {
        match self {
            SpanLatchError::UndeclaredRead { span, .. }
            | SpanLatchError::UndeclaredWrite { span, .. } => Some(span),
            _ => None,
        }
    }
}

impl From<TryFromPrimitiveError<KeyKind>> for SpanLatchError {
    fn from(err: TryFromPrimitiveError<KeyKind>) -> Self {
        SpanLatchError::Engine(err.into())
    }
}

fn at_suffix(ts: &Option<Timestamp>) -> String {
    match ts {
        Some(ts) => format!(" at {ts}"),
        None => String::new(),
    }
}

pub type SpanLatchResult<T> = Result<T, SpanLatchError>;
