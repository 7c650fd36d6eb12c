//! Error types for the journal subsystem.
//!
//! [`JournalError`] covers every fatal failure mode of the segmented
//! journal: storage I/O, corruption, bounds violations and structural
//! inconsistencies. Running out of room in the active segment is *not* an
//! error; it is reported as
//! [`AppendOutcome::NoCapacity`](super::AppendOutcome::NoCapacity) and
//! handled by the writer's rollover.

use std::fmt;
use std::path::PathBuf;

/// Errors that can occur within the journal subsystem.
#[derive(Debug)]
#[non_exhaustive]
pub enum JournalError {
    /// An I/O error occurred while reading, writing or syncing a segment.
    Io {
        /// The underlying I/O error message.
        message: String,
        /// The file path involved, if known.
        path: Option<PathBuf>,
    },

    /// A frame failed CRC32 verification.
    CorruptEntry {
        /// The logical index of the corrupt entry.
        index: u64,
        /// The checksum stored in the frame.
        expected_crc: u32,
        /// The checksum computed from the payload bytes.
        actual_crc: u32,
    },

    /// A segment file has an unreadable header or the segment chain on disk
    /// is not contiguous.
    CorruptSegment {
        /// The segment file involved.
        path: PathBuf,
        /// Description of the problem.
        message: String,
    },

    /// An entry cannot fit even in a freshly created segment.
    EntryTooLarge {
        /// The size of the framed entry in bytes.
        entry_bytes: usize,
        /// The configured segment size in bytes.
        segment_size: usize,
    },

    /// A caller-supplied checksum does not match the payload.
    ChecksumMismatch {
        /// The index the entry would have been written at.
        index: u64,
        /// The checksum supplied by the caller.
        supplied: u32,
        /// The checksum computed from the payload.
        computed: u32,
    },

    /// A pre-indexed entry does not carry the next expected index.
    IndexMismatch {
        /// The index the journal expected next.
        expected: u64,
        /// The index carried by the entry.
        actual: u64,
    },

    /// Truncation would discard committed entries.
    TruncateBelowCommit {
        /// The requested truncation index.
        index: u64,
        /// The current commit index.
        commit_index: u64,
    },

    /// The requested index is outside the range the operation accepts.
    IndexOutOfRange {
        /// The requested index.
        index: u64,
        /// The first valid index.
        first_index: u64,
        /// The last valid index.
        last_index: u64,
    },

    /// No segment with the given id is attached to the journal.
    SegmentNotFound {
        /// The missing segment id.
        id: u64,
    },

    /// The sole remaining segment of a journal cannot be removed.
    CannotRemoveLastSegment {
        /// The id of the remaining segment.
        id: u64,
    },

    /// Only the first or the last segment may be detached; removing a
    /// segment from the middle would open a gap in the index sequence.
    NonTerminalSegment {
        /// The id of the segment that was asked to be removed.
        id: u64,
    },

    /// A sealed segment was asked to accept writes.
    SegmentSealed {
        /// The id of the sealed segment.
        id: u64,
    },

    /// The in-memory segment chain violates a structural invariant.
    Inconsistent {
        /// Description of the violated invariant.
        message: String,
    },

    /// A writer is already open on this journal.
    WriterAlreadyOpen,

    /// The journal configuration is invalid.
    InvalidConfig {
        /// Description of the problem.
        message: String,
    },

    /// The journal directory exists but is not a directory.
    InvalidDirectory {
        /// The path that was expected to be a valid directory.
        path: PathBuf,
    },

    /// An internal lock was poisoned (another thread panicked while
    /// holding it).
    LockPoisoned,

    /// The journal has been closed.
    Closed,
}

impl fmt::Display for JournalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JournalError::Io { message, path } => {
                if let Some(p) = path {
                    write!(f, "journal I/O error at {}: {message}", p.display())
                } else {
                    write!(f, "journal I/O error: {message}")
                }
            }
            JournalError::CorruptEntry {
                index,
                expected_crc,
                actual_crc,
            } => {
                write!(
                    f,
                    "corrupt journal entry at index {index}: \
                     expected CRC {expected_crc:#010x}, got {actual_crc:#010x}"
                )
            }
            JournalError::CorruptSegment { path, message } => {
                write!(f, "corrupt journal segment {}: {message}", path.display())
            }
            JournalError::EntryTooLarge {
                entry_bytes,
                segment_size,
            } => {
                write!(
                    f,
                    "journal entry too large: {entry_bytes} bytes does not fit \
                     a segment of {segment_size} bytes"
                )
            }
            JournalError::ChecksumMismatch {
                index,
                supplied,
                computed,
            } => {
                write!(
                    f,
                    "checksum mismatch for entry {index}: supplied {supplied:#010x}, \
                     computed {computed:#010x}"
                )
            }
            JournalError::IndexMismatch { expected, actual } => {
                write!(
                    f,
                    "entry index mismatch: expected {expected}, got {actual}"
                )
            }
            JournalError::TruncateBelowCommit {
                index,
                commit_index,
            } => {
                write!(
                    f,
                    "cannot truncate committed index: {index} (commit index {commit_index})"
                )
            }
            JournalError::IndexOutOfRange {
                index,
                first_index,
                last_index,
            } => {
                write!(
                    f,
                    "index {index} out of range [{first_index}, {last_index}]"
                )
            }
            JournalError::SegmentNotFound { id } => {
                write!(f, "segment {id} is not attached to the journal")
            }
            JournalError::CannotRemoveLastSegment { id } => {
                write!(f, "cannot remove segment {id}: it is the only segment")
            }
            JournalError::NonTerminalSegment { id } => {
                write!(
                    f,
                    "cannot remove segment {id}: only the first or last segment may be removed"
                )
            }
            JournalError::SegmentSealed { id } => {
                write!(f, "segment {id} is sealed")
            }
            JournalError::Inconsistent { message } => {
                write!(f, "journal structure inconsistent: {message}")
            }
            JournalError::WriterAlreadyOpen => {
                write!(f, "a journal writer is already open")
            }
            JournalError::InvalidConfig { message } => {
                write!(f, "invalid journal configuration: {message}")
            }
            JournalError::InvalidDirectory { path } => {
                write!(f, "invalid journal directory: {}", path.display())
            }
            JournalError::LockPoisoned => {
                write!(f, "journal internal lock poisoned")
            }
            JournalError::Closed => {
                write!(f, "journal is closed")
            }
        }
    }
}

impl std::error::Error for JournalError {}

impl From<std::io::Error> for JournalError {
    #[cold]
    fn from(err: std::io::Error) -> Self {
        JournalError::Io {
            message: err.to_string(),
            path: None,
        }
    }
}

impl JournalError {
    /// Build an [`JournalError::Io`] that records the file involved.
    #[cold]
    pub(crate) fn io_at(err: std::io::Error, path: &std::path::Path) -> Self {
        JournalError::Io {
            message: err.to_string(),
            path: Some(path.to_path_buf()),
        }
    }

    /// Returns `true` for errors caused by a caller violating the journal's
    /// bounds rather than by storage failure.
    #[must_use]
    pub fn is_bounds_violation(&self) -> bool {
        matches!(
            self,
            JournalError::TruncateBelowCommit { .. }
                | JournalError::IndexOutOfRange { .. }
                | JournalError::IndexMismatch { .. }
        )
    }
}
