//! This module contains base types that are used across the crate.
//!
//! - [`SeqNum`]: A sequence number new-type, stamped onto every committed write batch. Limited to
//!   56 bits, to leave room for packing.
//! - [`KeyKind`]: A one-byte record kind that identifies the operations in a write batch.
//! - [`Timestamp`]: A hybrid logical timestamp that versioned access and declarations are bound
//!   to. Packs the wall time in the upper 48 bits and a logical counter in the lower 16 bits.

use std::fmt;

use nonmax::NonMaxU64;
use num_enum::{IntoPrimitive, TryFromPrimitive};

pub mod error;
pub mod utils;

pub use error::*;
pub use utils::PrettyBytes;

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[debug("SeqNum({_0})")]
pub struct SeqNum(NonMaxU64);

impl SeqNum {
    /// The first sequence number handed out to a committed batch.
    pub const START: Self = unsafe { Self::new_unchecked(16) };
    /// The maximum sequence number available.
    pub const MAX: Self = unsafe { Self::new_unchecked((1 << 56) - 1) };

    /// Creates a new `SeqNum` without verifying that it is within bounds.
    ///
    /// # Safety
    ///
    /// Caller has to ensure that `val` is at most [`SeqNum::MAX`].
    #[inline]
    pub(crate) const unsafe fn new_unchecked(val: u64) -> Self {
        // SAFETY: User has to ensure that `val <= Self::MAX`
        Self(unsafe { NonMaxU64::new_unchecked(val) })
    }

    // Returns the value as a u64 primitive type.
    #[inline]
    pub const fn get(&self) -> u64 {
        self.0.get()
    }

    /// Returns the sequence number following this one.
    pub fn next(&self) -> SpanLatchResult<Self> {
        Self::try_from(self.get() + 1)
    }
}

impl Default for SeqNum {
    fn default() -> Self {
        Self::START
    }
}

impl TryFrom<u64> for SeqNum {
    type Error = SpanLatchError;

    fn try_from(val: u64) -> Result<Self, Self::Error> {
        if val > Self::MAX.get() {
            return Err(EngineError::SeqNumOverflow(val).into());
        }
        // SAFETY: Just checked `val` is in valid range
        Ok(unsafe { SeqNum::new_unchecked(val) })
    }
}

// These values are part of the write batch format and shall never be changed.
#[repr(u8)]
#[derive(
    Debug,
    Display,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    IntoPrimitive,
    TryFromPrimitive,
)]
pub enum KeyKind {
    Delete = 0,
    Put = 1,
    Merge = 2,
    RangeDelete = 3,
}

/// # Hybrid Logical Timestamp
///
/// Versioned access to the storage engine happens at a `Timestamp`, and declarations in a
/// [`SpanSet`] may be bound to one. Ordering is by wall time first, then by the logical counter.
///
/// [`SpanSet`]: crate::spanset::SpanSet
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(
    /// Packs the wall time in the upper 48 bits and the logical counter in the lower 16 bits.
    u64,
);

impl Timestamp {
    /// The zero timestamp. Wrappers treat access at this timestamp as non-versioned.
    pub const ZERO: Self = Self(0);
    /// The largest wall time that fits into the upper 48 bits.
    pub const MAX_WALL: u64 = (1 << 48) - 1;

    /// Creates a timestamp from a wall time in milliseconds since the Unix epoch and a logical
    /// counter.
    ///
    /// # Panics
    ///
    /// Panics if `wall` exceeds [`Timestamp::MAX_WALL`]. Use [`Timestamp::try_new`] for wall times
    /// that are not known to be in range.
    #[inline]
    pub const fn new(wall: u64, logical: u16) -> Self {
        assert!(wall <= Self::MAX_WALL, "wall time does not fit into 48 bits");
        Self((wall << 16) | (logical as u64))
    }

    /// Creates a timestamp, rejecting wall times beyond [`Timestamp::MAX_WALL`].
    pub fn try_new(wall: u64, logical: u16) -> SpanLatchResult<Self> {
        if wall > Self::MAX_WALL {
            return Err(SpanLatchError::WallTimeOverflow(wall));
        }
        Ok(Self::new(wall, logical))
    }

    /// A timestamp with the given wall time in milliseconds and a zero logical counter.
    ///
    /// # Panics
    ///
    /// Panics if `wall` exceeds [`Timestamp::MAX_WALL`].
    #[inline]
    pub const fn from_wall(wall: u64) -> Self {
        Self::new(wall, 0)
    }

    #[inline]
    pub const fn wall(&self) -> u64 {
        self.0 >> 16
    }

    #[inline]
    pub const fn logical(&self) -> u16 {
        (self.0 & 0xFFFF) as u16
    }

    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

impl TryFrom<u64> for Timestamp {
    type Error = SpanLatchError;

    /// Converts a wall time in milliseconds, with a zero logical counter.
    fn try_from(wall: u64) -> Result<Self, Self::Error> {
        Self::try_new(wall, 0)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.wall(), self.logical())
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timestamp({self})")
    }
}

/// Returns the smallest key that sorts after `key`, by appending a null byte.
/// The span `[key, next_key(key))` contains exactly `key`.
pub fn next_key(key: &[u8]) -> Vec<u8> {
    let mut next = Vec::with_capacity(key.len() + 1);
    next.extend_from_slice(key);
    next.push(0);
    next
}
