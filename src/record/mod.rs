//! Typed records on top of the journal.
//!
//! The journal stores opaque payloads. This module gives them a shape:
//! a [`Record`] carries an optional entity key, a [`RecordType`], an
//! intent name, request metadata and a typed value, and is encoded into a
//! payload by a pluggable [`RecordSerializer`].
//!
//! - [`CommandWriter`] buffers commands and appends them in one batch
//! - [`EventApplier`] is the boundary to whatever state the events build
//! - [`replay`] feeds the events of a [`JournalReader`] into an applier
//!
//! [`JournalReader`]: crate::journal::JournalReader

pub mod applier;
pub mod serialization;
pub mod writer;

pub use applier::{EventApplier, replay};
#[cfg(feature = "bincode")]
pub use serialization::BincodeRecordSerializer;
pub use serialization::{JsonRecordSerializer, RecordSerializer, SerializationError};
pub use writer::CommandWriter;

use crate::journal::JournalError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecordType {
    /// A request to change state.
    Command,
    /// A state change that happened.
    Event,
    /// A command that was refused.
    CommandRejection,
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordType::Command => write!(f, "COMMAND"),
            RecordType::Event => write!(f, "EVENT"),
            RecordType::CommandRejection => write!(f, "COMMAND_REJECTION"),
        }
    }
}

/// Request bookkeeping attached to a record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordMetadata {
    /// Id of the client request that caused the record, if any.
    pub request_id: Option<u64>,
    /// Stream the request arrived on, if any.
    pub request_stream_id: Option<u32>,
    /// Why a command was rejected.
    pub rejection_reason: Option<String>,
}

/// A typed journal record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record<V> {
    /// Key of the entity the record applies to. `None` for new commands
    /// whose key is assigned when they are processed.
    pub key: Option<u64>,
    /// Kind of the record.
    pub record_type: RecordType,
    /// Name of the intent, e.g. `"CREATE"`.
    pub intent: String,
    /// Request correlation and rejection details.
    #[serde(default)]
    pub metadata: RecordMetadata,
    /// The record body.
    pub value: V,
}

impl<V> Record<V> {
    /// A command for an entity that has no key yet.
    pub fn new_command(intent: impl Into<String>, value: V) -> Self {
        Self {
            key: None,
            record_type: RecordType::Command,
            intent: intent.into(),
            metadata: RecordMetadata::default(),
            value,
        }
    }

    /// A command for an existing entity.
    pub fn follow_up_command(key: u64, intent: impl Into<String>, value: V) -> Self {
        Self {
            key: Some(key),
            ..Self::new_command(intent, value)
        }
    }

    /// An event for the given entity.
    pub fn event(key: u64, intent: impl Into<String>, value: V) -> Self {
        Self {
            key: Some(key),
            record_type: RecordType::Event,
            intent: intent.into(),
            metadata: RecordMetadata::default(),
            value,
        }
    }

    /// Replace the record's metadata.
    #[must_use]
    pub fn with_metadata(mut self, metadata: RecordMetadata) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Errors of the record layer.
#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    /// A record could not be encoded.
    #[error("failed to encode record: {0}")]
    Encode(#[source] SerializationError),

    /// The payload of a journal entry could not be decoded.
    #[error("failed to decode journal entry {index}: {source}")]
    Decode {
        /// Index of the offending entry.
        index: u64,
        #[source]
        source: SerializationError,
    },

    /// The journal refused the operation.
    #[error(transparent)]
    Journal(#[from] JournalError),
}
