//! Batched command appends.

use super::serialization::RecordSerializer;
use super::{Record, RecordError, RecordMetadata};
use crate::journal::JournalWriter;
use bytes::Bytes;
use std::sync::Arc;
use tracing::debug;

/// Buffers typed commands and appends them to the journal in one batch.
///
/// Records are only encoded when [`flush`](Self::flush) runs. If any record
/// fails to encode, nothing is appended and the buffer is kept so the
/// caller can inspect or [`reset`](Self::reset) it.
///
/// # Example
///
/// ```rust,no_run
/// use segmented_journal::{CommandWriter, JournalConfig, JsonRecordSerializer, SegmentedJournal};
/// use std::sync::Arc;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let journal = SegmentedJournal::open(JournalConfig::new("/tmp/commands"))?;
/// let mut writer = journal.writer()?;
///
/// let mut commands: CommandWriter<String> = CommandWriter::new(Arc::new(JsonRecordSerializer::new()));
/// commands.append_new_command("CREATE", "checkout".to_string());
/// commands.append_follow_up_command(42, "DELETE", "cart".to_string());
/// let last = commands.flush(&mut writer)?;
/// assert!(last.is_some());
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct CommandWriter<V> {
    serializer: Arc<dyn RecordSerializer<V>>,
    pending: Vec<Record<V>>,
}

impl<V> CommandWriter<V> {
    /// Create a writer encoding records with `serializer`.
    pub fn new(serializer: Arc<dyn RecordSerializer<V>>) -> Self {
        Self {
            serializer,
            pending: Vec::new(),
        }
    }

    /// Buffer a command for an entity without a key.
    pub fn append_new_command(&mut self, intent: impl Into<String>, value: V) {
        self.pending.push(Record::new_command(intent, value));
    }

    /// Buffer a command for the entity with the given key.
    pub fn append_follow_up_command(&mut self, key: u64, intent: impl Into<String>, value: V) {
        self.pending
            .push(Record::follow_up_command(key, intent, value));
    }

    /// Buffer a follow-up command and let `metadata` fill in its request
    /// metadata.
    pub fn append_follow_up_command_with<F>(
        &mut self,
        key: u64,
        intent: impl Into<String>,
        value: V,
        metadata: F,
    ) where
        F: FnOnce(&mut RecordMetadata),
    {
        let mut record = Record::follow_up_command(key, intent, value);
        metadata(&mut record.metadata);
        self.pending.push(record);
    }

    /// Buffer an already built record.
    pub fn append_record(&mut self, record: Record<V>) {
        self.pending.push(record);
    }

    /// Number of buffered records.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Discard every buffered record.
    pub fn reset(&mut self) {
        self.pending.clear();
    }

    /// Encode and append every buffered record.
    ///
    /// Returns the index of the last appended entry, or `None` when the
    /// buffer was empty. The buffer is cleared once the appends were
    /// attempted.
    ///
    /// # Errors
    ///
    /// Returns [`RecordError::Encode`] if a record cannot be encoded (the
    /// journal is untouched), or [`RecordError::Journal`] if an append
    /// fails part way (earlier records of the batch stay appended).
    pub fn flush(&mut self, writer: &mut JournalWriter) -> Result<Option<u64>, RecordError> {
        if self.pending.is_empty() {
            return Ok(None);
        }

        let payloads = self
            .pending
            .iter()
            .map(|record| self.serializer.serialize(record).map(Bytes::from))
            .collect::<Result<Vec<_>, _>>()
            .map_err(RecordError::Encode)?;
        self.pending.clear();

        let count = payloads.len();
        let mut last = None;
        for payload in payloads {
            last = Some(writer.append(payload)?.index);
        }

        debug!(
            records = count,
            last_index = ?last,
            content_type = self.serializer.content_type(),
            "command batch appended"
        );
        Ok(last)
    }
}
