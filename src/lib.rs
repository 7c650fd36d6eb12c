//! # Segmented Journal
//!
//! A segmented, memory-mapped, append-only journal written in Rust. It is
//! the durability layer beneath a replicated state machine: an ordered,
//! gap-free log of opaque entries that supports crash-consistent flush,
//! truncation of uncommitted suffixes and a full reset, while readers keep
//! iterating across all of it.
//!
//! ## Key Features
//!
//! - **Segmented Storage**: The log is split across fixed-capacity segment files, each pre-allocated and memory-mapped through `memmap2`. Only the last segment is writable; all others are sealed.
//!
//! - **Transparent Rollover**: When the active segment is full the writer flushes it, opens the next one and retries. Callers only ever see contiguous indices.
//!
//! - **Checksummed Frames**: Every entry is framed as `[length][crc32][payload]`. Checksums are computed on append or supplied by a leader and validated before anything is written.
//!
//! - **Crash Recovery**: On open, each segment is scanned forward to its last valid frame. Torn or corrupt tails are discarded and leftovers of an interrupted reset are removed.
//!
//! - **Raft Semantics**: A monotonic commit index guards committed entries against truncation. `truncate` discards uncommitted suffixes; `reset` restarts the log at an arbitrary index after a snapshot install.
//!
//! - **Position-Based Readers**: Readers hold logical positions, never references into mappings. They re-resolve through the journal on every read and are clamped back into range after truncation, reset or compaction.
//!
//! - **Observation Hooks**: Segment creation, truncation and flush run inside an injected `JournalMetrics` implementation; a `metrics`-crate backend is available behind the `metrics` feature.
//!
//! - **Typed Records**: An optional record layer encodes keyed commands and events through a pluggable serializer (JSON, or Bincode behind the `bincode` feature) and replays events into an applier.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use segmented_journal::{JournalConfig, ReadMode, SegmentedJournal};
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = JournalConfig::new("/var/lib/raft/partition-1")
//!     .with_max_segment_size(64 * 1024 * 1024);
//! let journal = SegmentedJournal::open(config)?;
//!
//! let mut writer = journal.writer()?;
//! for payload in [&b"first"[..], b"second", b"third"] {
//!     writer.append(payload)?;
//! }
//! writer.commit(2);
//! writer.flush()?;
//!
//! // Uncommitted suffix from a deposed leader.
//! writer.truncate(2)?;
//!
//! let reader = journal.open_reader(1, ReadMode::Committed)?;
//! for entry in reader {
//!     let entry = entry?;
//!     println!("{}: {:?}", entry.index, entry.payload);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## On-Disk Format
//!
//! A journal directory contains `segment-{id:020}.journal` files. Each file
//! begins with a 64-byte little-endian header:
//!
//! | Offset | Size | Field                          |
//! |--------|------|--------------------------------|
//! | 0      | 4    | magic `SJNL`                   |
//! | 4      | 2    | format version                  |
//! | 6      | 2    | reserved                       |
//! | 8      | 8    | segment id                     |
//! | 16     | 8    | base index                     |
//! | 24     | 8    | capacity in bytes              |
//! | 32     | 28   | reserved                       |
//! | 60     | 4    | CRC32 of bytes 0..60           |
//!
//! followed by frames `[length: u32][crc32: u32][payload]`, where `length`
//! counts the whole frame. A zero length word ends the written region.
//!
//! ## Feature Flags
//!
//! | Feature   | Enables                                           |
//! |-----------|---------------------------------------------------|
//! | `bincode` | `BincodeRecordSerializer`                         |
//! | `metrics` | `MetricsJournalMetrics` backed by the `metrics` crate |
//!
//! ## Concurrency
//!
//! One `JournalWriter` per journal, enforced at runtime. Readers may run on
//! other threads; the segment chain is guarded by an `RwLock` and every
//! operation is synchronous. Commit index changes can be observed through
//! a `tokio::sync::watch` channel.

pub mod journal;
pub mod record;

pub mod prelude;
mod utils;

#[cfg(feature = "metrics")]
pub use journal::MetricsJournalMetrics;
pub use journal::{
    AppendOutcome, CountingJournalMetrics, IndexedEntry, JournalConfig, JournalError,
    JournalMetrics, JournalReader, JournalWriter, NoopJournalMetrics, ReadMode, SegmentInfo,
    SegmentedJournal,
};
#[cfg(feature = "bincode")]
pub use record::BincodeRecordSerializer;
pub use record::{
    CommandWriter, EventApplier, JsonRecordSerializer, Record, RecordError, RecordMetadata,
    RecordSerializer, RecordType, SerializationError, replay,
};
