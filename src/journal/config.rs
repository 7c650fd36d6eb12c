//! Journal configuration.

use super::error::JournalError;
use super::frame::{FRAME_HEADER_SIZE, SEGMENT_HEADER_SIZE};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default segment size in bytes (32 MB).
pub const DEFAULT_MAX_SEGMENT_SIZE: usize = 32 * 1024 * 1024;

/// Default number of entries between two sparse index positions.
pub const DEFAULT_INDEX_INTERVAL: u64 = 64;

/// Settings for opening a [`SegmentedJournal`](super::SegmentedJournal).
///
/// Every segment of a journal shares the same capacity. The capacity
/// includes the fixed segment header, so the usable body of a segment is
/// `max_segment_size - SEGMENT_HEADER_SIZE` bytes.
///
/// # Example
///
/// ```rust
/// use segmented_journal::JournalConfig;
///
/// let config = JournalConfig::new("/tmp/raft-log")
///     .with_max_segment_size(4 * 1024 * 1024)
///     .with_max_entries_per_segment(10_000)
///     .with_index_interval(32);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JournalConfig {
    /// Directory holding the segment files. Created on open if missing.
    pub directory: PathBuf,

    /// Size of each segment file in bytes, header included.
    pub max_segment_size: usize,

    /// Optional cap on the number of entries a single segment may hold.
    pub max_entries_per_segment: Option<u64>,

    /// Number of entries between two positions of the sparse index.
    pub index_interval: u64,
}

impl Default for JournalConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("journal"),
            max_segment_size: DEFAULT_MAX_SEGMENT_SIZE,
            max_entries_per_segment: None,
            index_interval: DEFAULT_INDEX_INTERVAL,
        }
    }
}

impl JournalConfig {
    /// Create a configuration with default settings for `directory`.
    #[must_use]
    pub fn new<P: AsRef<Path>>(directory: P) -> Self {
        Self {
            directory: directory.as_ref().to_path_buf(),
            ..Self::default()
        }
    }

    /// Set the segment size in bytes.
    #[must_use]
    pub fn with_max_segment_size(mut self, max_segment_size: usize) -> Self {
        self.max_segment_size = max_segment_size;
        self
    }

    /// Limit the number of entries per segment.
    #[must_use]
    pub fn with_max_entries_per_segment(mut self, max_entries: u64) -> Self {
        self.max_entries_per_segment = Some(max_entries);
        self
    }

    /// Set the sparse index interval.
    #[must_use]
    pub fn with_index_interval(mut self, index_interval: u64) -> Self {
        self.index_interval = index_interval;
        self
    }

    /// Parse a configuration from JSON. Missing fields take their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`JournalError::InvalidConfig`] if the JSON is malformed or
    /// the resulting configuration fails [`validate`](Self::validate).
    pub fn from_json(json: &str) -> Result<Self, JournalError> {
        let config: JournalConfig =
            serde_json::from_str(json).map_err(|e| JournalError::InvalidConfig {
                message: e.to_string(),
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Largest framed entry that fits an empty segment.
    #[must_use]
    #[inline]
    pub fn max_frame_size(&self) -> usize {
        self.max_segment_size.saturating_sub(SEGMENT_HEADER_SIZE)
    }

    /// Check that the settings describe a usable journal.
    ///
    /// # Errors
    ///
    /// Returns [`JournalError::InvalidConfig`] describing the first
    /// offending setting.
    pub fn validate(&self) -> Result<(), JournalError> {
        if self.max_segment_size <= SEGMENT_HEADER_SIZE + FRAME_HEADER_SIZE {
            return Err(JournalError::InvalidConfig {
                message: format!(
                    "max_segment_size must exceed {} bytes, got {}",
                    SEGMENT_HEADER_SIZE + FRAME_HEADER_SIZE,
                    self.max_segment_size
                ),
            });
        }
        if self.max_entries_per_segment == Some(0) {
            return Err(JournalError::InvalidConfig {
                message: "max_entries_per_segment must be at least 1".to_string(),
            });
        }
        if self.index_interval == 0 {
            return Err(JournalError::InvalidConfig {
                message: "index_interval must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}
