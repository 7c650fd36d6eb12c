//! The segment chain and its lifecycle.
//!
//! [`SegmentedJournal`] owns every [`Segment`] of a journal directory, the
//! commit index and the registry of reader cursors. It exposes the
//! structural operations the [`JournalWriter`] is built from: rollover to
//! a new segment, removal of segments at either end, reset to a fresh
//! segment, and the clamping of readers after each of them.
//!
//! # Recovery
//!
//! On open, segment files are read in id order. Each segment's frames are
//! scanned to recover its last index. A segment whose base index does not
//! continue its predecessor marks a reset point: [`reset_segments`]
//! creates the fresh segment before deleting the old ones, so a crash in
//! between leaves both on disk, and the older ones are discarded here.
//!
//! [`reset_segments`]: SegmentedJournal::reset_segments

use super::config::JournalConfig;
use super::error::JournalError;
use super::metrics::{JournalMetrics, NoopJournalMetrics};
use super::reader::{JournalReader, PositionHint, ReaderCursor};
use super::segment::{Segment, list_segments, segment_path};
use super::types::{IndexedEntry, ReadMode, SegmentInfo};
use super::writer::JournalWriter;
use std::fs;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};
use tokio::sync::watch;
use tracing::{debug, info, trace, warn};

/// State guarded by the journal lock.
pub(crate) struct JournalState {
    /// Segments ordered by base index. Never empty while open.
    segments: Vec<Segment>,
    next_segment_id: u64,
    /// Bumped on every change that can invalidate reader byte positions.
    epoch: u64,
    readers: Vec<Weak<ReaderCursor>>,
    closed: bool,
}

impl JournalState {
    fn first(&self) -> Result<&Segment, JournalError> {
        self.segments.first().ok_or_else(no_segments)
    }

    fn last(&self) -> Result<&Segment, JournalError> {
        self.segments.last().ok_or_else(no_segments)
    }

    fn last_mut(&mut self) -> Result<&mut Segment, JournalError> {
        self.segments.last_mut().ok_or_else(no_segments)
    }

    fn position_of(&self, id: u64) -> Option<usize> {
        self.segments.iter().position(|s| s.id() == id)
    }

    /// Position of the segment holding `index`.
    fn segment_for_index(&self, index: u64) -> Option<usize> {
        let after = self.segments.partition_point(|s| s.base_index() <= index);
        let candidate = after.checked_sub(1)?;
        // Empty trailing segments share their base with the next index; walk
        // back to the one that actually holds the entry.
        (0..=candidate)
            .rev()
            .find(|&i| self.segments[i].contains(index))
    }

    fn first_index(&self) -> Result<u64, JournalError> {
        Ok(self.first()?.base_index())
    }

    fn last_index(&self) -> Result<u64, JournalError> {
        Ok(self.last()?.last_index())
    }

    /// Move every live reader into `[low, high]` and forget dead ones.
    fn clamp_readers(&mut self, low: u64, high: u64) -> Result<(), JournalError> {
        let high = high.max(low);
        let mut live = Vec::with_capacity(self.readers.len());
        for weak in self.readers.drain(..) {
            let Some(cursor) = weak.upgrade() else {
                continue;
            };
            {
                let mut position = cursor.lock()?;
                if position.next_index < low {
                    position.reposition(low);
                } else if position.next_index > high {
                    position.reposition(high);
                }
            }
            live.push(weak);
        }
        self.readers = live;
        Ok(())
    }
}

fn no_segments() -> JournalError {
    JournalError::Inconsistent {
        message: "journal has no segments".to_string(),
    }
}

struct JournalShared {
    config: JournalConfig,
    state: RwLock<JournalState>,
    commit_index: AtomicU64,
    commit_tx: watch::Sender<u64>,
    writer_open: AtomicBool,
    metrics: Arc<dyn JournalMetrics>,
}

/// A segmented, memory-mapped, append-only journal.
///
/// `SegmentedJournal` is a cheap, cloneable handle. All clones share the
/// same segment chain, commit index and reader registry.
///
/// # Concurrency
///
/// Exactly one [`JournalWriter`] may exist at a time (see
/// [`writer`](Self::writer)); writes are serialized by that discipline.
/// The segment chain sits behind a [`RwLock`] so [`JournalReader`]s on
/// other threads can read between writer operations. Every operation is
/// synchronous and blocks until storage has been updated.
///
/// # Example
///
/// ```rust,no_run
/// use segmented_journal::{JournalConfig, SegmentedJournal};
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let journal = SegmentedJournal::open(JournalConfig::new("/tmp/raft/partition-1"))?;
/// let mut writer = journal.writer()?;
/// let entry = writer.append(&b"set x = 1"[..])?;
/// writer.commit(entry.index);
/// writer.flush()?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct SegmentedJournal {
    shared: Arc<JournalShared>,
}

impl SegmentedJournal {
    /// Open or create a journal with the default (no-op) observation hooks.
    ///
    /// # Errors
    ///
    /// Returns [`JournalError`] if the configuration is invalid, the
    /// directory cannot be created, or existing segments cannot be opened.
    /// A corrupt frame in any segment but the last is
    /// [`JournalError::CorruptSegment`].
    pub fn open(config: JournalConfig) -> Result<Self, JournalError> {
        Self::open_with_metrics(config, Arc::new(NoopJournalMetrics))
    }

    /// Open or create a journal whose writer reports to `metrics`.
    ///
    /// # Errors
    ///
    /// See [`open`](Self::open).
    pub fn open_with_metrics(
        config: JournalConfig,
        metrics: Arc<dyn JournalMetrics>,
    ) -> Result<Self, JournalError> {
        config.validate()?;

        let dir = config.directory.clone();
        if dir.exists() && !dir.is_dir() {
            return Err(JournalError::InvalidDirectory { path: dir });
        }
        fs::create_dir_all(&dir).map_err(|e| JournalError::io_at(e, &dir))?;

        let mut segments: Vec<Segment> = Vec::new();
        for id in list_segments(&dir)? {
            let path = segment_path(&dir, id);
            let segment = Segment::open_existing(
                &path,
                config.index_interval,
                config.max_entries_per_segment,
            )?;
            if segment.id() != id {
                return Err(JournalError::CorruptSegment {
                    path,
                    message: format!("header id {} does not match file name", segment.id()),
                });
            }

            // Only the last segment may end in a torn frame; anywhere else
            // it hides committed entries.
            if let Some(previous) = segments.last()
                && previous.has_torn_tail()
            {
                return Err(JournalError::CorruptSegment {
                    path: previous.path().to_path_buf(),
                    message: format!(
                        "corrupt frame after index {} in a segment followed by segment {id}",
                        previous.last_index()
                    ),
                });
            }
            // A cleanly ended segment followed by a newer one that does not
            // continue it is the leftover of an interrupted reset.
            if let Some(previous) = segments.last()
                && segment.base_index() != previous.next_index()
            {
                warn!(
                    segment = id,
                    base_index = segment.base_index(),
                    previous_next_index = previous.next_index(),
                    "discarding segments preceding a reset point"
                );
                for stale in segments.drain(..) {
                    stale.delete()?;
                }
            }
            segments.push(segment);
        }

        if let Some(last) = segments.last_mut() {
            last.repair_tail()?;
        }

        if segments.is_empty() {
            segments.push(Segment::create(
                &dir,
                1,
                1,
                config.max_segment_size,
                config.index_interval,
                config.max_entries_per_segment,
            )?);
        }

        let count = segments.len();
        for segment in segments.iter_mut().take(count - 1) {
            segment.seal();
        }

        let first_index = segments[0].base_index();
        let last_index = segments[count - 1].last_index();
        let next_segment_id = segments[count - 1].id().saturating_add(1);

        info!(
            dir = %dir.display(),
            segments = count,
            first_index,
            last_index,
            "journal opened"
        );

        let (commit_tx, _) = watch::channel(0);
        Ok(Self {
            shared: Arc::new(JournalShared {
                config,
                state: RwLock::new(JournalState {
                    segments,
                    next_segment_id,
                    epoch: 0,
                    readers: Vec::new(),
                    closed: false,
                }),
                commit_index: AtomicU64::new(0),
                commit_tx,
                writer_open: AtomicBool::new(false),
                metrics,
            }),
        })
    }

    fn read_state(&self) -> Result<RwLockReadGuard<'_, JournalState>, JournalError> {
        let state = self
            .shared
            .state
            .read()
            .map_err(|_| JournalError::LockPoisoned)?;
        if state.closed {
            return Err(JournalError::Closed);
        }
        Ok(state)
    }

    fn write_state(&self) -> Result<RwLockWriteGuard<'_, JournalState>, JournalError> {
        let state = self
            .shared
            .state
            .write()
            .map_err(|_| JournalError::LockPoisoned)?;
        if state.closed {
            return Err(JournalError::Closed);
        }
        Ok(state)
    }

    /// The configuration the journal was opened with.
    #[must_use]
    pub fn config(&self) -> &JournalConfig {
        &self.shared.config
    }

    pub(crate) fn metrics(&self) -> Arc<dyn JournalMetrics> {
        Arc::clone(&self.shared.metrics)
    }

    /// Obtain the journal's single writer.
    ///
    /// # Errors
    ///
    /// Returns [`JournalError::WriterAlreadyOpen`] while another writer is
    /// alive, and [`JournalError::Closed`] if the journal is closed.
    pub fn writer(&self) -> Result<JournalWriter, JournalError> {
        if self
            .shared
            .writer_open
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(JournalError::WriterAlreadyOpen);
        }
        match self.last_segment() {
            Ok(last) => Ok(JournalWriter::new(self.clone(), last.id)),
            Err(e) => {
                self.release_writer();
                Err(e)
            }
        }
    }

    pub(crate) fn release_writer(&self) {
        self.shared.writer_open.store(false, Ordering::Release);
    }

    /// Open a reader whose first read returns `index` (clamped to the first
    /// index of the journal).
    ///
    /// # Errors
    ///
    /// Returns [`JournalError::Closed`] if the journal is closed.
    pub fn open_reader(&self, index: u64, mode: ReadMode) -> Result<JournalReader, JournalError> {
        let mut state = self.write_state()?;
        let start = index.max(state.first_index()?);
        let cursor = Arc::new(ReaderCursor::new(start));
        state.readers.retain(|weak| weak.strong_count() > 0);
        state.readers.push(Arc::downgrade(&cursor));
        trace!(start, ?mode, "reader opened");
        Ok(JournalReader::new(self.clone(), cursor, mode))
    }

    /// Descriptor of the first segment.
    ///
    /// # Errors
    ///
    /// Returns [`JournalError::Closed`] if the journal is closed.
    pub fn first_segment(&self) -> Result<SegmentInfo, JournalError> {
        Ok(self.read_state()?.first()?.info())
    }

    /// Descriptor of the last (open) segment.
    ///
    /// # Errors
    ///
    /// Returns [`JournalError::Closed`] if the journal is closed.
    pub fn last_segment(&self) -> Result<SegmentInfo, JournalError> {
        Ok(self.read_state()?.last()?.info())
    }

    /// Descriptor of the segment with the given id.
    ///
    /// # Errors
    ///
    /// Returns [`JournalError::SegmentNotFound`] if no such segment is
    /// attached.
    pub fn segment(&self, id: u64) -> Result<SegmentInfo, JournalError> {
        let state = self.read_state()?;
        let position = state
            .position_of(id)
            .ok_or(JournalError::SegmentNotFound { id })?;
        Ok(state.segments[position].info())
    }

    /// Descriptors of every segment, in order.
    ///
    /// # Errors
    ///
    /// Returns [`JournalError::Closed`] if the journal is closed.
    pub fn segments(&self) -> Result<Vec<SegmentInfo>, JournalError> {
        Ok(self
            .read_state()?
            .segments
            .iter()
            .map(Segment::info)
            .collect())
    }

    /// Number of attached segments.
    ///
    /// # Errors
    ///
    /// Returns [`JournalError::Closed`] if the journal is closed.
    pub fn segment_count(&self) -> Result<usize, JournalError> {
        Ok(self.read_state()?.segments.len())
    }

    /// Index of the first entry the journal can hold.
    ///
    /// # Errors
    ///
    /// Returns [`JournalError::Closed`] if the journal is closed.
    pub fn first_index(&self) -> Result<u64, JournalError> {
        self.read_state()?.first_index()
    }

    /// Index of the last entry, or `first_index - 1` when empty.
    ///
    /// # Errors
    ///
    /// Returns [`JournalError::Closed`] if the journal is closed.
    pub fn last_index(&self) -> Result<u64, JournalError> {
        self.read_state()?.last_index()
    }

    /// Returns `true` if the journal holds no entries.
    ///
    /// # Errors
    ///
    /// Returns [`JournalError::Closed`] if the journal is closed.
    pub fn is_empty(&self) -> Result<bool, JournalError> {
        let state = self.read_state()?;
        Ok(state.last_index()? < state.first_index()?)
    }

    /// Read a single entry by index.
    ///
    /// # Errors
    ///
    /// Returns [`JournalError::CorruptEntry`] if the frame fails its
    /// checksum and [`JournalError::Closed`] if the journal is closed.
    pub fn entry(&self, index: u64) -> Result<Option<IndexedEntry>, JournalError> {
        let state = self.read_state()?;
        match state.segment_for_index(index) {
            Some(position) => state.segments[position].entry(index),
            None => Ok(None),
        }
    }

    /// Seal the last segment and open a new one starting one past its last
    /// index. This is the only way the journal grows.
    ///
    /// # Errors
    ///
    /// Returns [`JournalError::Io`] if the new segment file cannot be
    /// created; the chain is left unchanged in that case.
    pub fn next_segment(&self) -> Result<SegmentInfo, JournalError> {
        let mut state = self.write_state()?;
        let config = &self.shared.config;
        let id = state.next_segment_id;
        let base_index = state.last()?.next_index();

        let segment = Segment::create(
            &config.directory,
            id,
            base_index,
            config.max_segment_size,
            config.index_interval,
            config.max_entries_per_segment,
        )?;

        let previous = state.last_mut()?;
        previous.flush()?;
        previous.seal();

        let info = segment.info();
        state.segments.push(segment);
        state.next_segment_id = id.saturating_add(1);

        debug!(segment = id, base_index, "segment rolled over");
        Ok(info)
    }

    /// Replace every segment with one fresh, empty segment whose base index
    /// is `index`.
    ///
    /// The fresh segment is created before the old files are deleted.
    ///
    /// # Errors
    ///
    /// Returns [`JournalError::IndexOutOfRange`] for index `0` and
    /// [`JournalError::Io`] on storage failure.
    pub fn reset_segments(&self, index: u64) -> Result<SegmentInfo, JournalError> {
        let mut state = self.write_state()?;
        if index == 0 {
            return Err(JournalError::IndexOutOfRange {
                index,
                first_index: 1,
                last_index: u64::MAX,
            });
        }

        let config = &self.shared.config;
        let id = state.next_segment_id;
        let fresh = Segment::create(
            &config.directory,
            id,
            index,
            config.max_segment_size,
            config.index_interval,
            config.max_entries_per_segment,
        )?;
        let info = fresh.info();
        state.next_segment_id = id.saturating_add(1);
        state.epoch = state.epoch.wrapping_add(1);

        let old = std::mem::replace(&mut state.segments, vec![fresh]);
        let discarded = old.len();
        for segment in old {
            segment.delete()?;
        }

        info!(segment = id, base_index = index, discarded, "journal segments reset");
        Ok(info)
    }

    /// Detach and delete the segment with the given id.
    ///
    /// Only the first or the last segment may be removed, and never the
    /// sole remaining one. Removing the last segment reopens its
    /// predecessor for writes.
    ///
    /// # Errors
    ///
    /// Returns [`JournalError::SegmentNotFound`],
    /// [`JournalError::CannotRemoveLastSegment`] or
    /// [`JournalError::NonTerminalSegment`] when the removal is illegal.
    pub fn remove_segment(&self, id: u64) -> Result<(), JournalError> {
        let mut state = self.write_state()?;
        let position = state
            .position_of(id)
            .ok_or(JournalError::SegmentNotFound { id })?;
        let count = state.segments.len();
        if count == 1 {
            return Err(JournalError::CannotRemoveLastSegment { id });
        }
        if position != 0 && position != count - 1 {
            return Err(JournalError::NonTerminalSegment { id });
        }

        let segment = state.segments.remove(position);
        state.epoch = state.epoch.wrapping_add(1);
        if position == count - 1 {
            state.last_mut()?.unseal();
        }
        segment.delete()?;

        debug!(segment = id, remaining = count - 1, "segment removed");
        Ok(())
    }

    /// Drop sparse index positions after `index` in the given segment.
    ///
    /// # Errors
    ///
    /// Returns [`JournalError::SegmentNotFound`] if no such segment exists.
    pub fn truncate_segment_index(&self, id: u64, index: u64) -> Result<(), JournalError> {
        let mut state = self.write_state()?;
        let position = state
            .position_of(id)
            .ok_or(JournalError::SegmentNotFound { id })?;
        state.segments[position].truncate_index(index);
        Ok(())
    }

    /// Move readers so that none points before `index` or past the end of
    /// the journal. Called after the head of the journal moved.
    ///
    /// # Errors
    ///
    /// Returns [`JournalError::Closed`] if the journal is closed.
    pub fn reset_head(&self, index: u64) -> Result<(), JournalError> {
        let mut state = self.write_state()?;
        let high = state.last_index()?.saturating_add(1);
        state.epoch = state.epoch.wrapping_add(1);
        state.clamp_readers(index, high)
    }

    /// Move readers positioned past `index` back to `index`. Called after
    /// the tail of the journal was discarded.
    ///
    /// # Errors
    ///
    /// Returns [`JournalError::Closed`] if the journal is closed.
    pub fn reset_tail(&self, index: u64) -> Result<(), JournalError> {
        let mut state = self.write_state()?;
        let low = state.first_index()?;
        state.epoch = state.epoch.wrapping_add(1);
        state.clamp_readers(low, index)
    }

    /// Highest index guaranteed never to be truncated.
    #[must_use]
    pub fn commit_index(&self) -> u64 {
        self.shared.commit_index.load(Ordering::Acquire)
    }

    /// Store a new commit index and notify subscribers.
    ///
    /// This does not enforce monotonicity; [`JournalWriter::commit`] does.
    pub fn set_commit_index(&self, index: u64) {
        self.shared.commit_index.store(index, Ordering::Release);
        self.shared.commit_tx.send_replace(index);
        trace!(commit_index = index, "commit index updated");
    }

    /// Subscribe to commit index changes.
    #[must_use]
    pub fn subscribe_commits(&self) -> watch::Receiver<u64> {
        self.shared.commit_tx.subscribe()
    }

    /// Delete sealed head segments whose entries all lie below `index`.
    ///
    /// The active segment is never removed. Readers left before the new
    /// first index are moved forward. Returns the number of segments
    /// deleted.
    ///
    /// # Errors
    ///
    /// Returns [`JournalError::Io`] if a segment file cannot be deleted.
    pub fn compact(&self, index: u64) -> Result<usize, JournalError> {
        let mut state = self.write_state()?;
        let mut removed = 0usize;

        while state.segments.len() > 1 {
            let head = &state.segments[0];
            if !head.is_sealed() || head.next_index() > index {
                break;
            }
            let segment = state.segments.remove(0);
            segment.delete()?;
            removed = removed.saturating_add(1);
        }

        if let Some(head) = state.segments.first_mut() {
            head.compact_index(index);
        }

        if removed > 0 {
            state.epoch = state.epoch.wrapping_add(1);
            let low = state.first_index()?;
            let high = state.last_index()?.saturating_add(1);
            state.clamp_readers(low, high)?;
            debug!(index, removed, first_index = low, "journal compacted");
        }

        Ok(removed)
    }

    /// Re-verify the checksum of every entry in every segment.
    ///
    /// # Errors
    ///
    /// Returns the first [`JournalError::CorruptEntry`] encountered.
    pub fn verify_integrity(&self) -> Result<(), JournalError> {
        let state = self.read_state()?;
        for segment in &state.segments {
            segment.verify()?;
        }
        Ok(())
    }

    /// Flush every segment and release all mappings.
    ///
    /// Segment files stay on disk. Further operations on any handle to this
    /// journal fail with [`JournalError::Closed`]. Closing twice is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`JournalError::Io`] if a flush fails; the journal is closed
    /// regardless.
    pub fn close(&self) -> Result<(), JournalError> {
        let mut state = self
            .shared
            .state
            .write()
            .map_err(|_| JournalError::LockPoisoned)?;
        if state.closed {
            return Ok(());
        }

        let mut result = Ok(());
        for segment in &mut state.segments {
            if let Err(e) = segment.flush()
                && result.is_ok()
            {
                result = Err(e);
            }
        }
        state.segments.clear();
        state.readers.clear();
        state.closed = true;

        info!(dir = %self.shared.config.directory.display(), "journal closed");
        result
    }

    /// Run `operation` against the segment with the given id.
    pub(crate) fn with_segment_mut<R>(
        &self,
        id: u64,
        operation: impl FnOnce(&mut Segment) -> Result<R, JournalError>,
    ) -> Result<R, JournalError> {
        let mut state = self.write_state()?;
        let position = state
            .position_of(id)
            .ok_or(JournalError::SegmentNotFound { id })?;
        operation(&mut state.segments[position])
    }

    /// Truncate the segment with the given id to `index` and invalidate
    /// reader byte positions in the same critical section.
    pub(crate) fn truncate_segment(&self, id: u64, index: u64) -> Result<(), JournalError> {
        let mut state = self.write_state()?;
        let position = state
            .position_of(id)
            .ok_or(JournalError::SegmentNotFound { id })?;
        state.segments[position].writer().truncate(index)?;
        state.epoch = state.epoch.wrapping_add(1);
        Ok(())
    }

    /// First index and highest index visible in `mode`.
    pub(crate) fn visible_range(&self, mode: ReadMode) -> Result<(u64, u64), JournalError> {
        let state = self.read_state()?;
        let first = state.first_index()?;
        let mut bound = state.last_index()?;
        if mode == ReadMode::Committed {
            bound = bound.min(self.commit_index());
        }
        Ok((first, bound))
    }

    /// Read the entry at a reader's position and advance it.
    pub(crate) fn read_next(
        &self,
        cursor: &ReaderCursor,
        mode: ReadMode,
    ) -> Result<Option<IndexedEntry>, JournalError> {
        let state = self.read_state()?;
        let mut position = cursor.lock()?;

        let first = state.first_index()?;
        if position.next_index < first {
            position.reposition(first);
        }
        let mut bound = state.last_index()?;
        if mode == ReadMode::Committed {
            bound = bound.min(self.commit_index());
        }
        let target = position.next_index;
        if target > bound {
            return Ok(None);
        }

        let cached = position.hint.and_then(|hint| {
            if hint.epoch != state.epoch {
                return None;
            }
            let i = state.position_of(hint.segment_id)?;
            state.segments[i].contains(target).then_some((i, hint.offset))
        });
        let (segment_position, offset) = match cached {
            Some(found) => found,
            None => {
                let i = state
                    .segment_for_index(target)
                    .ok_or_else(|| JournalError::Inconsistent {
                        message: format!("no segment holds index {target}"),
                    })?;
                let offset =
                    state.segments[i]
                        .locate(target)
                        .ok_or_else(|| JournalError::Inconsistent {
                            message: format!("index {target} cannot be located"),
                        })?;
                (i, offset)
            }
        };

        let segment = &state.segments[segment_position];
        let (entry, next_offset) = segment.read_at(offset, target)?;
        position.next_index = target.saturating_add(1);
        position.hint = Some(PositionHint {
            segment_id: segment.id(),
            offset: next_offset,
            epoch: state.epoch,
        });
        Ok(Some(entry))
    }
}

impl std::fmt::Debug for SegmentedJournal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut debug = f.debug_struct("SegmentedJournal");
        debug.field("dir", &self.shared.config.directory);
        debug.field("commit_index", &self.commit_index());
        if let Ok(state) = self.shared.state.read() {
            debug.field("segments", &state.segments.len());
            debug.field("closed", &state.closed);
        }
        debug.finish()
    }
}
