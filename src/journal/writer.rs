//! The journal's single append / truncate / reset entry point.

use super::error::JournalError;
use super::frame;
use super::metrics::JournalMetrics;
use super::segmented::SegmentedJournal;
use super::types::{AppendOutcome, IndexedEntry};
use bytes::Bytes;
use std::sync::Arc;
use tracing::{debug, info, trace};

/// How the checksum of an appended frame is obtained.
#[derive(Debug, Clone, Copy)]
enum Framing {
    /// Computed by the segment writer.
    Computed,
    /// Supplied by the caller and validated.
    Supplied(u32),
    /// A leader's entry: index and checksum are both validated.
    Replicated { index: u64, checksum: u32 },
}

/// Appends to, truncates and resets a [`SegmentedJournal`].
///
/// Obtained from [`SegmentedJournal::writer`]; at most one exists per
/// journal. Segment rollover is invisible to callers: when the active
/// segment is full the writer flushes it, opens the next one and retries.
///
/// The writer remembers only the *id* of the active segment and resolves
/// it through the journal on every operation.
#[derive(Debug)]
pub struct JournalWriter {
    journal: SegmentedJournal,
    active_segment: u64,
    metrics: Arc<dyn JournalMetrics>,
    released: bool,
}

impl JournalWriter {
    pub(crate) fn new(journal: SegmentedJournal, active_segment: u64) -> Self {
        let metrics = journal.metrics();
        Self {
            journal,
            active_segment,
            metrics,
            released: false,
        }
    }

    /// The journal this writer appends to.
    #[must_use]
    pub fn journal(&self) -> &SegmentedJournal {
        &self.journal
    }

    /// Index of the last appended entry, or `first_index - 1` when empty.
    ///
    /// # Errors
    ///
    /// Returns [`JournalError::Closed`] if the journal is closed.
    pub fn last_index(&self) -> Result<u64, JournalError> {
        self.journal
            .with_segment_mut(self.active_segment, |s| Ok(s.writer().last_index()))
    }

    /// Index the next appended entry receives.
    ///
    /// # Errors
    ///
    /// Returns [`JournalError::Closed`] if the journal is closed.
    pub fn next_index(&self) -> Result<u64, JournalError> {
        self.journal
            .with_segment_mut(self.active_segment, |s| Ok(s.writer().next_index()))
    }

    /// The last entry of the active segment, `None` when it is empty.
    ///
    /// # Errors
    ///
    /// Returns [`JournalError::Closed`] if the journal is closed.
    pub fn last_entry(&self) -> Result<Option<IndexedEntry>, JournalError> {
        self.journal
            .with_segment_mut(self.active_segment, |s| Ok(s.writer().last_entry().cloned()))
    }

    /// Append `payload` and return the written entry.
    ///
    /// # Errors
    ///
    /// Returns [`JournalError::EntryTooLarge`] if the payload cannot fit an
    /// empty segment, and [`JournalError::Io`] on storage failure.
    pub fn append(&mut self, payload: impl Into<Bytes>) -> Result<IndexedEntry, JournalError> {
        self.append_checked(Framing::Computed, payload.into())
    }

    /// Append `payload` with a checksum computed elsewhere.
    ///
    /// # Errors
    ///
    /// Returns [`JournalError::ChecksumMismatch`] without writing anything
    /// if `checksum` is not the CRC32 of `payload`, plus the errors of
    /// [`append`](Self::append).
    pub fn append_with_checksum(
        &mut self,
        payload: impl Into<Bytes>,
        checksum: u32,
    ) -> Result<IndexedEntry, JournalError> {
        let payload = payload.into();
        let computed = frame::checksum(&payload);
        if computed != checksum {
            return Err(JournalError::ChecksumMismatch {
                index: self.next_index()?,
                supplied: checksum,
                computed,
            });
        }
        self.append_checked(Framing::Supplied(checksum), payload)
    }

    /// Append an entry received from a leader.
    ///
    /// # Errors
    ///
    /// Returns [`JournalError::IndexMismatch`] if `entry.index` is not the
    /// next index, plus the errors of
    /// [`append_with_checksum`](Self::append_with_checksum).
    pub fn append_entry(&mut self, entry: &IndexedEntry) -> Result<(), JournalError> {
        let expected = self.next_index()?;
        if entry.index != expected {
            return Err(JournalError::IndexMismatch {
                expected,
                actual: entry.index,
            });
        }
        let computed = frame::checksum(&entry.payload);
        if computed != entry.checksum {
            return Err(JournalError::ChecksumMismatch {
                index: entry.index,
                supplied: entry.checksum,
                computed,
            });
        }
        self.append_checked(
            Framing::Replicated {
                index: entry.index,
                checksum: entry.checksum,
            },
            entry.payload.clone(),
        )
        .map(|_| ())
    }

    /// Write to the active segment, rolling over once if it is full.
    fn append_checked(
        &mut self,
        framing: Framing,
        payload: Bytes,
    ) -> Result<IndexedEntry, JournalError> {
        if let AppendOutcome::Written(entry) = self.write_active(framing, &payload)? {
            return Ok(entry);
        }

        let active = self.journal.segment(self.active_segment)?;
        let max_frame = self.journal.config().max_frame_size();
        let fits_fresh = frame::frame_len(payload.len()).is_some_and(|len| len <= max_frame);
        if active.is_empty() || !fits_fresh {
            return Err(JournalError::EntryTooLarge {
                entry_bytes: payload.len(),
                segment_size: self.journal.config().max_segment_size,
            });
        }

        let metrics = Arc::clone(&self.metrics);
        metrics.observe_segment_creation(&mut || self.roll_over())?;

        match self.write_active(framing, &payload)? {
            AppendOutcome::Written(entry) => Ok(entry),
            AppendOutcome::NoCapacity => Err(JournalError::EntryTooLarge {
                entry_bytes: payload.len(),
                segment_size: self.journal.config().max_segment_size,
            }),
        }
    }

    fn write_active(&self, framing: Framing, payload: &Bytes) -> Result<AppendOutcome, JournalError> {
        self.journal.with_segment_mut(self.active_segment, |segment| {
            let mut writer = segment.writer();
            match framing {
                Framing::Computed => writer.append(payload.clone()),
                Framing::Supplied(checksum) => writer.append_with_checksum(payload.clone(), checksum),
                Framing::Replicated { index, checksum } => writer.append_entry(
                    &IndexedEntry::with_checksum(index, payload.clone(), checksum),
                ),
            }
        })
    }

    /// Flush the full active segment and move to a new one.
    fn roll_over(&mut self) -> Result<(), JournalError> {
        self.journal
            .with_segment_mut(self.active_segment, |segment| segment.writer().flush())?;
        let next = self.journal.next_segment()?;
        trace!(
            previous = self.active_segment,
            segment = next.id,
            base_index = next.base_index,
            "writer rolled over"
        );
        self.active_segment = next.id;
        Ok(())
    }

    /// Advance the commit index to `index` if it is greater than the
    /// current one. Never writes entries.
    pub fn commit(&mut self, index: u64) {
        if index > self.journal.commit_index() {
            self.journal.set_commit_index(index);
        }
    }

    /// Discard everything after `index`.
    ///
    /// Trailing segments that start after `index` are removed (the first
    /// segment always stays), the active segment is truncated to `index`,
    /// and readers past the new end are moved back.
    ///
    /// # Errors
    ///
    /// Returns [`JournalError::TruncateBelowCommit`] without changing
    /// anything if `index` is below the commit index.
    pub fn truncate(&mut self, index: u64) -> Result<(), JournalError> {
        let commit_index = self.journal.commit_index();
        if index < commit_index {
            return Err(JournalError::TruncateBelowCommit {
                index,
                commit_index,
            });
        }

        let metrics = Arc::clone(&self.metrics);
        metrics.observe_segment_truncation(&mut || self.truncate_segments(index))
    }

    fn truncate_segments(&mut self, index: u64) -> Result<(), JournalError> {
        let first = self.journal.first_segment()?;
        let mut last = self.journal.last_segment()?;
        while last.id != first.id && index < last.base_index {
            self.journal.remove_segment(last.id)?;
            last = self.journal.last_segment()?;
        }
        self.active_segment = last.id;

        self.journal.truncate_segment(last.id, index)?;
        self.journal.reset_tail(index.saturating_add(1))?;
        debug!(index, segment = last.id, "journal truncated");
        Ok(())
    }

    /// Make `index` the index of the next appended entry.
    ///
    /// Moving forward past the active segment discards every segment and
    /// starts a fresh one at `index`; otherwise this is a truncation to
    /// `index - 1`. Readers are moved to `index` or later.
    ///
    /// # Errors
    ///
    /// Returns [`JournalError::TruncateBelowCommit`] when the reset would
    /// truncate committed entries and [`JournalError::IndexOutOfRange`] for
    /// index `0`.
    pub fn reset(&mut self, index: u64) -> Result<(), JournalError> {
        if index == 0 {
            return Err(JournalError::IndexOutOfRange {
                index,
                first_index: 1,
                last_index: u64::MAX,
            });
        }
        let active = self.journal.segment(self.active_segment)?;
        if index > active.base_index {
            self.journal.truncate_segment_index(active.id, index)?;
            let fresh = self.journal.reset_segments(index)?;
            self.active_segment = fresh.id;
        } else {
            self.truncate(index.saturating_sub(1))?;
        }
        self.journal.reset_head(index)?;
        info!(index, segment = self.active_segment, "journal writer reset");
        Ok(())
    }

    /// Sync the active segment to stable storage. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns [`JournalError::Io`] if the sync fails.
    pub fn flush(&mut self) -> Result<(), JournalError> {
        let metrics = Arc::clone(&self.metrics);
        let journal = &self.journal;
        let active = self.active_segment;
        metrics.observe_segment_flush(&mut || {
            journal.with_segment_mut(active, |s| s.writer().flush())
        })
    }

    /// Flush and release the writer. The journal stays open.
    ///
    /// # Errors
    ///
    /// Returns [`JournalError::Io`] if the final flush fails; the writer is
    /// released regardless.
    pub fn close(mut self) -> Result<(), JournalError> {
        let result = self.flush();
        self.release();
        result
    }

    fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.journal.release_writer();
        }
    }
}

impl Drop for JournalWriter {
    fn drop(&mut self) {
        self.release();
    }
}
