//! Rebuilding state from journaled events.

use super::serialization::RecordSerializer;
use super::{RecordError, RecordType};
use crate::journal::JournalReader;
use tracing::{debug, trace};

/// Applies events to whatever state they describe.
pub trait EventApplier<V> {
    /// Apply the event `intent` with body `value` to the entity `key`.
    fn apply_state(&mut self, key: u64, intent: &str, value: V);
}

impl<V, F> EventApplier<V> for F
where
    F: FnMut(u64, &str, V),
{
    fn apply_state(&mut self, key: u64, intent: &str, value: V) {
        self(key, intent, value);
    }
}

/// Decode every entry the reader yields and apply its events.
///
/// Commands and rejections are skipped, as are events without a key.
/// Returns the number of events applied.
///
/// # Errors
///
/// Returns [`RecordError::Decode`] for a payload the serializer cannot
/// decode and [`RecordError::Journal`] if reading fails. Events before the
/// failing entry have already been applied.
pub fn replay<V, A>(
    reader: &mut JournalReader,
    serializer: &dyn RecordSerializer<V>,
    applier: &mut A,
) -> Result<u64, RecordError>
where
    A: EventApplier<V> + ?Sized,
{
    let mut applied = 0u64;
    let mut skipped = 0u64;

    while let Some(entry) = reader.read_next()? {
        let record = serializer
            .deserialize(&entry.payload)
            .map_err(|source| RecordError::Decode {
                index: entry.index,
                source,
            })?;

        match (record.record_type, record.key) {
            (RecordType::Event, Some(key)) => {
                trace!(index = entry.index, key, intent = %record.intent, "applying event");
                applier.apply_state(key, &record.intent, record.value);
                applied = applied.saturating_add(1);
            }
            _ => skipped = skipped.saturating_add(1),
        }
    }

    debug!(applied, skipped, "replay finished");
    Ok(applied)
}
