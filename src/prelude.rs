/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 2/10/25
******************************************************************************/

//! Prelude module that re-exports commonly used types and traits.
//!
//! Instead of importing each type individually, you can use:
//!
//! ```rust
//! use segmented_journal::prelude::*;
//! ```
//!
//! This imports everything needed to open a journal, write to it, read it
//! back and replay typed records.

// Journal
pub use crate::journal::{
    AppendOutcome, IndexedEntry, JournalConfig, JournalError, JournalReader, JournalWriter,
    ReadMode, SegmentInfo, SegmentedJournal,
};

// Observation hooks
#[cfg(feature = "metrics")]
pub use crate::journal::MetricsJournalMetrics;
pub use crate::journal::{CountingJournalMetrics, JournalMetrics, NoopJournalMetrics};

// Records
#[cfg(feature = "bincode")]
pub use crate::record::BincodeRecordSerializer;
pub use crate::record::{
    CommandWriter, EventApplier, JsonRecordSerializer, Record, RecordError, RecordMetadata,
    RecordSerializer, RecordType, replay,
};
