//! Memory-mapped segment files.
//!
//! A [`Segment`] owns one pre-allocated, memory-mapped file holding a
//! [`SegmentHeader`] followed by a contiguous run of entry frames. Writes
//! go through a [`SegmentWriter`] borrowed from the segment; reads resolve
//! an index to an offset through the segment's [`SparseIndex`].
//!
//! Segments are named `segment-{id:020}.journal` so that a lexical or
//! numeric sort of the directory listing yields the segment chain.

use super::error::JournalError;
use super::frame::{
    self, END_MARKER_SIZE, FrameRead, SEGMENT_HEADER_SIZE, SegmentHeader,
};
use super::index::SparseIndex;
use super::segment_writer::SegmentWriter;
use super::types::{IndexedEntry, SegmentInfo};
use bytes::Bytes;
use memmap2::MmapMut;
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// One segment of the journal, backed by a memory-mapped file.
pub(crate) struct Segment {
    pub(super) header: SegmentHeader,
    pub(super) path: PathBuf,
    pub(super) mmap: MmapMut,
    pub(super) index: SparseIndex,
    /// Byte offset one past the last written frame.
    pub(super) write_pos: usize,
    /// Number of entries held.
    pub(super) entries: u64,
    pub(super) max_entries: Option<u64>,
    pub(super) last_entry: Option<IndexedEntry>,
    /// Lowest offset modified since the last flush.
    pub(super) dirty_from: Option<usize>,
    pub(super) sealed: bool,
    /// Recovery stopped at a torn or corrupt frame rather than the end marker.
    pub(super) torn_tail: bool,
}

impl Segment {
    /// Create a new segment file and memory-map it.
    ///
    /// The file is pre-allocated to `capacity` bytes; the header is written
    /// and synced before the segment is returned.
    pub(crate) fn create(
        dir: &Path,
        id: u64,
        base_index: u64,
        capacity: usize,
        index_interval: u64,
        max_entries: Option<u64>,
    ) -> Result<Self, JournalError> {
        let path = segment_path(dir, id);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)
            .map_err(|e| JournalError::io_at(e, &path))?;

        file.set_len(capacity as u64)
            .map_err(|e| JournalError::io_at(e, &path))?;

        // SAFETY: The file is exclusively owned by this journal and is never
        // truncated or modified externally while the mapping is alive.
        let mut mmap =
            unsafe { MmapMut::map_mut(&file).map_err(|e| JournalError::io_at(e, &path))? };

        let header = SegmentHeader {
            id,
            base_index,
            capacity: capacity as u64,
        };
        mmap[..SEGMENT_HEADER_SIZE].copy_from_slice(&header.encode());
        mmap.flush_range(0, SEGMENT_HEADER_SIZE)
            .map_err(|e| JournalError::io_at(e, &path))?;

        debug!(segment = id, base_index, capacity, path = %path.display(), "segment file created");

        Ok(Self {
            header,
            path,
            mmap,
            index: SparseIndex::new(index_interval),
            write_pos: SEGMENT_HEADER_SIZE,
            entries: 0,
            max_entries,
            last_entry: None,
            dirty_from: None,
            sealed: false,
            torn_tail: false,
        })
    }

    /// Open an existing segment file.
    ///
    /// Frames are scanned forward from the header to the last valid one,
    /// rebuilding the sparse index and recovering the last index. A torn or
    /// corrupt tail is only recorded; nothing on disk changes until
    /// [`repair_tail`](Self::repair_tail) is called.
    pub(crate) fn open_existing(
        path: &Path,
        index_interval: u64,
        max_entries: Option<u64>,
    ) -> Result<Self, JournalError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|e| JournalError::io_at(e, path))?;

        let file_len = file
            .metadata()
            .map_err(|e| JournalError::io_at(e, path))?
            .len() as usize;
        if file_len < SEGMENT_HEADER_SIZE {
            return Err(JournalError::CorruptSegment {
                path: path.to_path_buf(),
                message: format!("file is {file_len} bytes, shorter than its header"),
            });
        }

        // SAFETY: The file is exclusively owned by this journal and is never
        // truncated or modified externally while the mapping is alive.
        let mmap = unsafe { MmapMut::map_mut(&file).map_err(|e| JournalError::io_at(e, path))? };
        let header = SegmentHeader::decode(&mmap, path)?;

        let mut segment = Self {
            header,
            path: path.to_path_buf(),
            mmap,
            index: SparseIndex::new(index_interval),
            write_pos: SEGMENT_HEADER_SIZE,
            entries: 0,
            max_entries,
            last_entry: None,
            dirty_from: None,
            sealed: false,
            torn_tail: false,
        };
        segment.recover()?;
        Ok(segment)
    }

    /// Scan frames from the header to rebuild the in-memory state.
    fn recover(&mut self) -> Result<(), JournalError> {
        let capacity = self.capacity();
        let mut offset = SEGMENT_HEADER_SIZE;
        let mut last: Option<(u32, usize, usize)> = None;

        loop {
            match frame::read_frame(&self.mmap, offset, capacity) {
                FrameRead::Valid {
                    checksum,
                    payload,
                    next_offset,
                } => {
                    let index = self.base_index().saturating_add(self.entries);
                    self.index.index(index, offset);
                    self.entries = self.entries.saturating_add(1);
                    let payload_start = next_offset - payload.len();
                    last = Some((checksum, payload_start, next_offset));
                    offset = next_offset;
                }
                FrameRead::End => break,
                FrameRead::Torn | FrameRead::Corrupt { .. } => {
                    self.torn_tail = true;
                    break;
                }
            }
        }

        self.write_pos = offset;
        self.last_entry = last.map(|(checksum, start, end)| IndexedEntry {
            index: self.last_index(),
            checksum,
            payload: Bytes::copy_from_slice(&self.mmap[start..end]),
        });
        Ok(())
    }

    /// Returns `true` if recovery stopped at a torn or corrupt frame.
    #[inline]
    pub(crate) fn has_torn_tail(&self) -> bool {
        self.torn_tail
    }

    /// Discard a torn tail found on open by writing the end marker over it.
    ///
    /// Only valid for the last segment of a journal, where a torn frame is
    /// an append interrupted by a crash.
    pub(crate) fn repair_tail(&mut self) -> Result<(), JournalError> {
        if !self.torn_tail {
            return Ok(());
        }
        warn!(
            segment = self.id(),
            offset = self.write_pos,
            last_index = self.last_index(),
            path = %self.path.display(),
            "discarding torn tail of segment"
        );
        let offset = self.write_pos;
        self.write_end_marker(offset);
        self.mark_dirty(offset);
        self.flush()?;
        self.torn_tail = false;
        Ok(())
    }

    /// Ordinal of this segment.
    #[inline]
    pub(crate) fn id(&self) -> u64 {
        self.header.id
    }

    /// Index of the first entry of this segment.
    #[inline]
    pub(crate) fn base_index(&self) -> u64 {
        self.header.base_index
    }

    /// Index the next appended entry receives.
    #[inline]
    pub(crate) fn next_index(&self) -> u64 {
        self.base_index().saturating_add(self.entries)
    }

    /// Index of the last entry, or `base_index - 1` when empty.
    #[inline]
    pub(crate) fn last_index(&self) -> u64 {
        self.next_index().saturating_sub(1)
    }

    /// Returns `true` if `index` is held by this segment.
    #[inline]
    pub(crate) fn contains(&self, index: u64) -> bool {
        index >= self.base_index() && index < self.next_index()
    }

    #[inline]
    pub(crate) fn is_empty(&self) -> bool {
        self.entries == 0
    }

    #[inline]
    pub(crate) fn is_sealed(&self) -> bool {
        self.sealed
    }

    /// Usable size of the mapping, header included.
    #[inline]
    pub(crate) fn capacity(&self) -> usize {
        (self.header.capacity as usize).min(self.mmap.len())
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    /// Make the segment immutable.
    pub(crate) fn seal(&mut self) {
        self.sealed = true;
    }

    /// Reopen a sealed segment for writes once it is last again.
    pub(crate) fn unseal(&mut self) {
        self.sealed = false;
    }

    /// Borrow the writer for this segment.
    pub(crate) fn writer(&mut self) -> SegmentWriter<'_> {
        SegmentWriter::new(self)
    }

    pub(crate) fn info(&self) -> SegmentInfo {
        SegmentInfo {
            id: self.id(),
            base_index: self.base_index(),
            last_index: self.last_index(),
            entries: self.entries,
            size: self.write_pos,
            capacity: self.capacity(),
            sealed: self.sealed,
        }
    }

    /// Resolve the byte offset of the frame holding `index`.
    ///
    /// Starts from the nearest sparse index position (or the first frame)
    /// and scans forward.
    pub(crate) fn locate(&self, index: u64) -> Option<usize> {
        if !self.contains(index) {
            return None;
        }

        let (mut current, mut offset) = match self.index.lookup(index) {
            Some(position) if position.index >= self.base_index() => {
                (position.index, position.offset)
            }
            _ => (self.base_index(), SEGMENT_HEADER_SIZE),
        };

        while current < index {
            match frame::read_frame(&self.mmap, offset, self.write_pos) {
                FrameRead::Valid { next_offset, .. } | FrameRead::Corrupt { next_offset, .. } => {
                    offset = next_offset;
                    current = current.saturating_add(1);
                }
                FrameRead::End | FrameRead::Torn => return None,
            }
        }

        Some(offset)
    }

    /// Decode the frame at `offset`, which must hold entry `index`.
    ///
    /// Returns the entry and the offset of the following frame.
    pub(crate) fn read_at(
        &self,
        offset: usize,
        index: u64,
    ) -> Result<(IndexedEntry, usize), JournalError> {
        match frame::read_frame(&self.mmap, offset, self.write_pos) {
            FrameRead::Valid {
                checksum,
                payload,
                next_offset,
            } => Ok((
                IndexedEntry {
                    index,
                    checksum,
                    payload: Bytes::copy_from_slice(payload),
                },
                next_offset,
            )),
            FrameRead::Corrupt {
                stored, computed, ..
            } => Err(JournalError::CorruptEntry {
                index,
                expected_crc: stored,
                actual_crc: computed,
            }),
            FrameRead::End | FrameRead::Torn => Err(JournalError::CorruptSegment {
                path: self.path.clone(),
                message: format!("no frame for index {index} at offset {offset}"),
            }),
        }
    }

    /// Read the entry at `index`, if this segment holds it.
    pub(crate) fn entry(&self, index: u64) -> Result<Option<IndexedEntry>, JournalError> {
        match self.locate(index) {
            Some(offset) => self.read_at(offset, index).map(|(entry, _)| Some(entry)),
            None => Ok(None),
        }
    }

    /// Re-verify the checksum of every frame in the segment.
    pub(crate) fn verify(&self) -> Result<(), JournalError> {
        let mut offset = SEGMENT_HEADER_SIZE;
        let mut index = self.base_index();
        while index < self.next_index() {
            let (_, next_offset) = self.read_at(offset, index)?;
            offset = next_offset;
            index = index.saturating_add(1);
        }
        Ok(())
    }

    /// Drop sparse index positions after `index`.
    pub(crate) fn truncate_index(&mut self, index: u64) {
        self.index.truncate(index);
    }

    /// Drop sparse index positions not needed to reach `index` onward.
    pub(crate) fn compact_index(&mut self, index: u64) {
        self.index.compact(index);
    }

    pub(super) fn mark_dirty(&mut self, offset: usize) {
        self.dirty_from = Some(self.dirty_from.map_or(offset, |from| from.min(offset)));
    }

    /// Zero the length word at `offset` so scans stop there.
    pub(super) fn write_end_marker(&mut self, offset: usize) {
        if let Some(end) = offset.checked_add(END_MARKER_SIZE)
            && end <= self.capacity()
        {
            self.mmap[offset..end].fill(0);
        }
    }

    /// Sync every byte modified since the last flush to stable storage.
    ///
    /// A no-op when nothing is pending.
    pub(crate) fn flush(&mut self) -> Result<(), JournalError> {
        let Some(from) = self.dirty_from else {
            return Ok(());
        };
        let end = self
            .write_pos
            .saturating_add(END_MARKER_SIZE)
            .min(self.capacity())
            .max(from);
        if end > from {
            self.mmap
                .flush_range(from, end - from)
                .map_err(|e| JournalError::io_at(e, &self.path))?;
        }
        self.dirty_from = None;
        Ok(())
    }

    /// Release the mapping and delete the segment file.
    pub(crate) fn delete(self) -> Result<(), JournalError> {
        let Segment { mmap, path, header, .. } = self;
        drop(mmap);
        fs::remove_file(&path).map_err(|e| JournalError::io_at(e, &path))?;
        debug!(segment = header.id, path = %path.display(), "segment file deleted");
        Ok(())
    }
}

impl std::fmt::Debug for Segment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Segment")
            .field("id", &self.id())
            .field("path", &self.path())
            .field("base_index", &self.base_index())
            .field("entries", &self.entries)
            .field("write_pos", &self.write_pos)
            .field("sealed", &self.sealed)
            .finish()
    }
}

// ─── Helpers ────────────────────────────────────────────────────────────────

/// Build the path for a segment file given its id.
pub(crate) fn segment_path(dir: &Path, id: u64) -> PathBuf {
    dir.join(format!("segment-{id:020}.journal"))
}

/// List the ids of all segment files in the directory.
pub(crate) fn list_segments(dir: &Path) -> Result<Vec<u64>, JournalError> {
    let mut ids = Vec::new();

    let entries = fs::read_dir(dir).map_err(|e| JournalError::io_at(e, dir))?;

    for entry in entries {
        let entry = entry.map_err(|e| JournalError::io_at(e, dir))?;
        let name = entry.file_name();
        let name_str = name.to_string_lossy();

        if let Some(rest) = name_str.strip_prefix("segment-")
            && let Some(id_str) = rest.strip_suffix(".journal")
            && let Ok(id) = id_str.parse::<u64>()
        {
            ids.push(id);
        }
    }

    ids.sort_unstable();
    Ok(ids)
}
