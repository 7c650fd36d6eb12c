//! Forward iteration over journal entries.

use super::error::JournalError;
use super::segmented::SegmentedJournal;
use super::types::{IndexedEntry, ReadMode};
use std::sync::{Arc, Mutex, MutexGuard};

/// Cached byte position of a reader, valid only for the journal structure
/// epoch it was taken in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct PositionHint {
    pub(crate) segment_id: u64,
    pub(crate) offset: usize,
    pub(crate) epoch: u64,
}

/// Logical position of a reader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ReaderPosition {
    /// Index of the next entry to return.
    pub(crate) next_index: u64,
    pub(crate) hint: Option<PositionHint>,
}

impl ReaderPosition {
    /// Move to `index`, dropping the cached byte position.
    pub(crate) fn reposition(&mut self, index: u64) {
        self.next_index = index;
        self.hint = None;
    }
}

/// The part of a reader the journal can reach to clamp it after structural
/// changes. The journal tracks cursors weakly; dropping the reader drops
/// the cursor and unregisters it.
#[derive(Debug)]
pub(crate) struct ReaderCursor {
    position: Mutex<ReaderPosition>,
}

impl ReaderCursor {
    pub(crate) fn new(next_index: u64) -> Self {
        Self {
            position: Mutex::new(ReaderPosition {
                next_index,
                hint: None,
            }),
        }
    }

    pub(crate) fn lock(&self) -> Result<MutexGuard<'_, ReaderPosition>, JournalError> {
        self.position.lock().map_err(|_| JournalError::LockPoisoned)
    }
}

/// A forward cursor over a [`SegmentedJournal`].
///
/// The reader holds a logical index, never a reference into a segment.
/// Every read resolves that index through the journal, so the writer can
/// roll over, truncate or reset underneath it: after a truncation or reset
/// the journal moves the reader back into the valid range and the next
/// read continues from there.
///
/// # Example
///
/// ```rust,no_run
/// use segmented_journal::{JournalConfig, ReadMode, SegmentedJournal};
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let journal = SegmentedJournal::open(JournalConfig::new("/tmp/journal"))?;
/// let mut reader = journal.open_reader(1, ReadMode::Committed)?;
/// for entry in &mut reader {
///     let entry = entry?;
///     println!("{} -> {} bytes", entry.index, entry.payload.len());
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct JournalReader {
    journal: SegmentedJournal,
    cursor: Arc<ReaderCursor>,
    mode: ReadMode,
}

impl JournalReader {
    pub(crate) fn new(journal: SegmentedJournal, cursor: Arc<ReaderCursor>, mode: ReadMode) -> Self {
        Self {
            journal,
            cursor,
            mode,
        }
    }

    /// The visibility mode of this reader.
    #[must_use]
    pub fn mode(&self) -> ReadMode {
        self.mode
    }

    /// Index of the entry the next read returns.
    ///
    /// # Errors
    ///
    /// Returns [`JournalError::LockPoisoned`] if the cursor lock is poisoned.
    pub fn next_index(&self) -> Result<u64, JournalError> {
        Ok(self.cursor.lock()?.next_index)
    }

    /// Index of the entry most recently returned, or the index just before
    /// the reader's start position.
    ///
    /// # Errors
    ///
    /// Returns [`JournalError::LockPoisoned`] if the cursor lock is poisoned.
    pub fn current_index(&self) -> Result<u64, JournalError> {
        Ok(self.next_index()?.saturating_sub(1))
    }

    /// Position the reader so the next entry returned is `index`.
    ///
    /// Indices before the first entry of the journal are clamped to it.
    /// Returns `true` if an entry with exactly that index is currently
    /// visible to this reader.
    ///
    /// # Errors
    ///
    /// Returns [`JournalError::Closed`] if the journal is closed and
    /// [`JournalError::LockPoisoned`] on lock poisoning.
    pub fn seek(&mut self, index: u64) -> Result<bool, JournalError> {
        let (first, bound) = self.journal.visible_range(self.mode)?;
        self.cursor.lock()?.reposition(index.max(first));
        Ok(index >= first && index <= bound)
    }

    /// Position the reader at the first entry of the journal.
    ///
    /// # Errors
    ///
    /// See [`seek`](Self::seek).
    pub fn seek_to_first(&mut self) -> Result<(), JournalError> {
        let (first, _) = self.journal.visible_range(self.mode)?;
        self.cursor.lock()?.reposition(first);
        Ok(())
    }

    /// Position the reader at the last visible entry, or at the first index
    /// when nothing is visible.
    ///
    /// # Errors
    ///
    /// See [`seek`](Self::seek).
    pub fn seek_to_last(&mut self) -> Result<(), JournalError> {
        let (first, bound) = self.journal.visible_range(self.mode)?;
        self.cursor.lock()?.reposition(bound.max(first));
        Ok(())
    }

    /// Returns `true` if a read would currently return an entry.
    ///
    /// # Errors
    ///
    /// See [`seek`](Self::seek).
    pub fn has_next(&self) -> Result<bool, JournalError> {
        let (first, bound) = self.journal.visible_range(self.mode)?;
        let next = self.next_index()?.max(first);
        Ok(next <= bound)
    }

    /// Read the next entry, or `None` at the end of the visible range.
    ///
    /// # Errors
    ///
    /// Returns [`JournalError::CorruptEntry`] if the frame fails its
    /// checksum, [`JournalError::Closed`] if the journal is closed, and
    /// [`JournalError::Inconsistent`] if the index cannot be resolved.
    pub fn read_next(&mut self) -> Result<Option<IndexedEntry>, JournalError> {
        self.journal.read_next(&self.cursor, self.mode)
    }
}

impl Iterator for JournalReader {
    type Item = Result<IndexedEntry, JournalError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.read_next().transpose()
    }
}
