//! Per-segment append, truncate and flush.

use super::error::JournalError;
use super::frame::{self, SEGMENT_HEADER_SIZE};
use super::segment::Segment;
use super::types::{AppendOutcome, IndexedEntry};
use bytes::Bytes;
use tracing::{debug, trace};

/// Writes frames into the tail of one [`Segment`].
///
/// The writer is a short-lived borrow of its segment: all state (write
/// offset, entry count, last entry) lives in the segment itself, so every
/// query here is O(1).
pub(crate) struct SegmentWriter<'a> {
    segment: &'a mut Segment,
}

impl<'a> SegmentWriter<'a> {
    pub(crate) fn new(segment: &'a mut Segment) -> Self {
        Self { segment }
    }

    /// Index of the last entry written to this segment, or `base - 1`.
    #[must_use]
    #[inline]
    pub fn last_index(&self) -> u64 {
        self.segment.last_index()
    }

    /// Index the next appended entry receives.
    #[must_use]
    #[inline]
    pub fn next_index(&self) -> u64 {
        self.segment.next_index()
    }

    /// The last entry written to this segment.
    #[must_use]
    #[inline]
    pub fn last_entry(&self) -> Option<&IndexedEntry> {
        self.segment.last_entry.as_ref()
    }

    /// Append `payload`, computing its checksum.
    ///
    /// # Errors
    ///
    /// Returns [`JournalError::SegmentSealed`] if the segment is sealed and
    /// [`JournalError::EntryTooLarge`] if the payload length cannot be
    /// framed at all. Lack of room is reported as
    /// [`AppendOutcome::NoCapacity`].
    pub fn append(&mut self, payload: Bytes) -> Result<AppendOutcome, JournalError> {
        let checksum = frame::checksum(&payload);
        self.write(payload, checksum)
    }

    /// Append `payload` with a checksum computed by the caller.
    ///
    /// # Errors
    ///
    /// Returns [`JournalError::ChecksumMismatch`] without writing anything if
    /// `checksum` does not match the payload, plus the errors of
    /// [`append`](Self::append).
    pub fn append_with_checksum(
        &mut self,
        payload: Bytes,
        checksum: u32,
    ) -> Result<AppendOutcome, JournalError> {
        let computed = frame::checksum(&payload);
        if computed != checksum {
            return Err(JournalError::ChecksumMismatch {
                index: self.next_index(),
                supplied: checksum,
                computed,
            });
        }
        self.write(payload, checksum)
    }

    /// Append an entry that already carries its index.
    ///
    /// # Errors
    ///
    /// Returns [`JournalError::IndexMismatch`] if the entry's index is not
    /// the next index of the segment, plus the errors of
    /// [`append_with_checksum`](Self::append_with_checksum).
    pub fn append_entry(&mut self, entry: &IndexedEntry) -> Result<AppendOutcome, JournalError> {
        let expected = self.next_index();
        if entry.index != expected {
            return Err(JournalError::IndexMismatch {
                expected,
                actual: entry.index,
            });
        }
        self.append_with_checksum(entry.payload.clone(), entry.checksum)
    }

    fn write(&mut self, payload: Bytes, checksum: u32) -> Result<AppendOutcome, JournalError> {
        let segment = &mut *self.segment;
        if segment.is_sealed() {
            return Err(JournalError::SegmentSealed { id: segment.id() });
        }

        if let Some(max) = segment.max_entries
            && segment.entries >= max
        {
            return Ok(AppendOutcome::NoCapacity);
        }

        let capacity = segment.capacity();
        let Some(len) = frame::frame_len(payload.len()) else {
            return Err(JournalError::EntryTooLarge {
                entry_bytes: payload.len(),
                segment_size: capacity,
            });
        };
        let start = segment.write_pos;
        let end = match start.checked_add(len) {
            Some(end) if end <= capacity => end,
            _ => return Ok(AppendOutcome::NoCapacity),
        };

        let index = segment.next_index();
        frame::encode_frame_into(&mut segment.mmap[start..end], checksum, &payload);
        segment.write_end_marker(end);
        segment.index.index(index, start);
        segment.write_pos = end;
        segment.entries = segment.entries.saturating_add(1);
        segment.mark_dirty(start);

        let entry = IndexedEntry {
            index,
            checksum,
            payload,
        };
        segment.last_entry = Some(entry.clone());

        trace!(segment = segment.id(), index, bytes = len, "entry appended");
        Ok(AppendOutcome::Written(entry))
    }

    /// Discard every entry after `index`.
    ///
    /// The write offset is rewound to just past the entry at `index` (or to
    /// the first frame when `index` precedes the segment) and the length
    /// word there is zeroed, so neither readers nor recovery can observe the
    /// discarded frames.
    ///
    /// # Errors
    ///
    /// Returns [`JournalError::SegmentSealed`] if the segment is sealed and
    /// [`JournalError::Inconsistent`] if the frame following `index` cannot
    /// be located.
    pub fn truncate(&mut self, index: u64) -> Result<(), JournalError> {
        let segment = &mut *self.segment;
        if index >= segment.last_index() || segment.is_empty() {
            return Ok(());
        }
        if segment.is_sealed() {
            return Err(JournalError::SegmentSealed { id: segment.id() });
        }

        let base = segment.base_index();
        let new_pos = if index < base {
            SEGMENT_HEADER_SIZE
        } else {
            segment
                .locate(index.saturating_add(1))
                .ok_or_else(|| JournalError::Inconsistent {
                    message: format!(
                        "segment {} cannot locate entry {}",
                        segment.id(),
                        index.saturating_add(1)
                    ),
                })?
        };

        let discarded = segment.last_index() - index.max(base.saturating_sub(1));
        segment.write_end_marker(new_pos);
        segment.write_pos = new_pos;
        segment.entries = if index < base { 0 } else { index - base + 1 };
        segment.index.truncate(index);
        segment.mark_dirty(new_pos);
        segment.last_entry = if segment.is_empty() {
            None
        } else {
            segment.entry(index)?
        };

        debug!(
            segment = segment.id(),
            index,
            discarded,
            "segment truncated"
        );
        Ok(())
    }

    /// Sync everything written to this segment so far.
    ///
    /// # Errors
    ///
    /// Returns [`JournalError::Io`] if the sync fails.
    pub fn flush(&mut self) -> Result<(), JournalError> {
        self.segment.flush()
    }
}
