//! Core value types shared by the journal components.

use super::frame;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// An entry as stored in, or read back from, the journal.
///
/// The payload is opaque to the journal. The checksum is the CRC32 of the
/// payload; it is either computed by the segment writer or supplied by the
/// caller (for instance a leader that already computed it) and validated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexedEntry {
    /// Logical index of the entry. Strictly increasing and gap-free.
    pub index: u64,
    /// CRC32 of the payload.
    pub checksum: u32,
    /// The raw payload bytes.
    pub payload: Bytes,
}

impl IndexedEntry {
    /// Build an entry for `index`, computing the payload checksum.
    #[must_use]
    pub fn new(index: u64, payload: impl Into<Bytes>) -> Self {
        let payload = payload.into();
        Self {
            index,
            checksum: frame::checksum(&payload),
            payload,
        }
    }

    /// Build an entry with a checksum supplied by the caller.
    ///
    /// The checksum is not verified here; the journal verifies it on append.
    #[must_use]
    pub fn with_checksum(index: u64, payload: impl Into<Bytes>, checksum: u32) -> Self {
        Self {
            index,
            checksum,
            payload: payload.into(),
        }
    }

    /// Size of the payload in bytes.
    #[must_use]
    #[inline]
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    /// Returns `true` if the payload is empty.
    #[must_use]
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// Returns `true` if the stored checksum matches the payload.
    #[must_use]
    pub fn verify_checksum(&self) -> bool {
        frame::checksum(&self.payload) == self.checksum
    }
}

/// Outcome of appending into a single segment.
///
/// Running out of room is an expected, recoverable condition that the
/// journal writer answers by rolling over to a new segment, so it is a
/// value rather than an error.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use]
pub enum AppendOutcome {
    /// The entry was written.
    Written(IndexedEntry),
    /// The segment cannot hold the entry.
    NoCapacity,
}

/// Which entries a [`JournalReader`](super::JournalReader) may observe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ReadMode {
    /// Every appended entry.
    #[default]
    All,
    /// Only entries at or below the commit index.
    Committed,
}

/// A point-in-time description of one segment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentInfo {
    /// Ordinal of the segment.
    pub id: u64,
    /// Index of the first entry of the segment.
    pub base_index: u64,
    /// Index of the last entry, or `base_index - 1` when empty.
    pub last_index: u64,
    /// Number of entries held.
    pub entries: u64,
    /// Bytes written, header included.
    pub size: usize,
    /// Segment capacity in bytes, header included.
    pub capacity: usize,
    /// Whether the segment is sealed (immutable).
    pub sealed: bool,
}

impl SegmentInfo {
    /// Returns `true` if the segment holds no entries.
    #[must_use]
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries == 0
    }

    /// Index the next entry appended to this segment would receive.
    #[must_use]
    #[inline]
    pub fn next_index(&self) -> u64 {
        self.base_index.saturating_add(self.entries)
    }
}
