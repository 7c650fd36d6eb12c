//! Segmented, memory-mapped, append-only journal.
//!
//! This module provides the durability layer beneath a replicated state
//! machine: an ordered log of opaque entries split across fixed-capacity
//! segment files.
//!
//! # Types
//!
//! - [`SegmentedJournal`]: the segment chain, commit index and reader registry
//! - [`JournalWriter`]: the single append / truncate / reset / commit entry point
//! - [`JournalReader`]: forward cursor that survives rollover, truncation and reset
//! - [`SparseIndex`]: sparse `index -> offset` map of one segment
//! - [`JournalMetrics`]: observation hooks around structural operations
//! - [`JournalConfig`]: directory, segment size, entry limit, index interval
//! - [`JournalError`]: error type for journal operations
//!
//! # On-disk layout
//!
//! A journal directory holds one `segment-{id:020}.journal` file per
//! segment. Each file starts with a 64-byte header followed by frames:
//!
//! ```text
//! [length: u32 LE][crc32: u32 LE][payload: length - 8 bytes]
//! ```
//!
//! A zero length word marks the end of written data.

pub mod config;
pub mod error;
pub mod frame;
pub mod index;
pub mod metrics;
pub mod reader;
mod segment;
mod segment_writer;
pub mod segmented;
pub mod types;
pub mod writer;

pub use config::{DEFAULT_INDEX_INTERVAL, DEFAULT_MAX_SEGMENT_SIZE, JournalConfig};
pub use error::JournalError;
pub use frame::{END_MARKER_SIZE, FRAME_HEADER_SIZE, SEGMENT_HEADER_SIZE};
pub use index::{IndexPosition, SparseIndex};
#[cfg(feature = "metrics")]
pub use metrics::MetricsJournalMetrics;
pub use metrics::{CountingJournalMetrics, JournalMetrics, NoopJournalMetrics, ObservedOperation};
pub use reader::JournalReader;
pub use segmented::SegmentedJournal;
pub use types::{AppendOutcome, IndexedEntry, ReadMode, SegmentInfo};
pub use writer::JournalWriter;
