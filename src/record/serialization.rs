//! Pluggable record encoding.
//!
//! This module provides the [`RecordSerializer`] trait and two built-in
//! implementations:
//!
//! - [`JsonRecordSerializer`]: human-readable JSON (always available)
//! - `BincodeRecordSerializer`: compact binary format (requires the
//!   `bincode` feature)
//!
//! Command writers and replay accept any `&dyn RecordSerializer<V>`, so the
//! on-disk payload format is chosen at construction time.
//!
//! # Feature Gate
//!
//! ```toml
//! [dependencies]
//! segmented-journal = { version = "0.3", features = ["bincode"] }
//! ```

use super::Record;
use serde::Serialize;
use serde::de::DeserializeOwned;

/// Errors that can occur during record serialization or deserialization.
#[derive(Debug)]
pub struct SerializationError {
    /// Human-readable description of the failure.
    pub message: String,
}

impl std::fmt::Display for SerializationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "record serialization error: {}", self.message)
    }
}

impl std::error::Error for SerializationError {}

/// Converts [`Record`]s to and from journal payloads.
///
/// Implementations must be `Send + Sync` so they can be shared as
/// `Arc<dyn RecordSerializer<V>>`.
pub trait RecordSerializer<V>: Send + Sync + std::fmt::Debug {
    /// Encode a record.
    ///
    /// # Errors
    ///
    /// Returns [`SerializationError`] if the record cannot be encoded.
    fn serialize(&self, record: &Record<V>) -> Result<Vec<u8>, SerializationError>;

    /// Decode a record.
    ///
    /// # Errors
    ///
    /// Returns [`SerializationError`] if the bytes are malformed or
    /// incompatible with the expected format.
    fn deserialize(&self, data: &[u8]) -> Result<Record<V>, SerializationError>;

    /// MIME-like identifier of the format, e.g. `"application/json"`.
    #[must_use]
    fn content_type(&self) -> &'static str;
}

// ─── JSON ───────────────────────────────────────────────────────────────────

/// JSON record serializer using `serde_json`.
///
/// # Content Type
///
/// `"application/json"`
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonRecordSerializer;

impl JsonRecordSerializer {
    /// Create a new JSON record serializer.
    #[must_use]
    #[inline]
    pub fn new() -> Self {
        Self
    }
}

impl<V> RecordSerializer<V> for JsonRecordSerializer
where
    V: Serialize + DeserializeOwned,
{
    fn serialize(&self, record: &Record<V>) -> Result<Vec<u8>, SerializationError> {
        serde_json::to_vec(record).map_err(|e| SerializationError {
            message: e.to_string(),
        })
    }

    fn deserialize(&self, data: &[u8]) -> Result<Record<V>, SerializationError> {
        serde_json::from_slice(data).map_err(|e| SerializationError {
            message: e.to_string(),
        })
    }

    #[inline]
    fn content_type(&self) -> &'static str {
        "application/json"
    }
}

// ─── Bincode ────────────────────────────────────────────────────────────────

/// Bincode record serializer for compact binary payloads.
///
/// # Content Type
///
/// `"application/x-bincode"`
#[cfg(feature = "bincode")]
#[derive(Debug, Clone, Copy, Default)]
pub struct BincodeRecordSerializer;

#[cfg(feature = "bincode")]
impl BincodeRecordSerializer {
    /// Create a new Bincode record serializer.
    #[must_use]
    #[inline]
    pub fn new() -> Self {
        Self
    }
}

#[cfg(feature = "bincode")]
impl<V> RecordSerializer<V> for BincodeRecordSerializer
where
    V: Serialize + DeserializeOwned,
{
    fn serialize(&self, record: &Record<V>) -> Result<Vec<u8>, SerializationError> {
        bincode::serde::encode_to_vec(record, bincode::config::standard()).map_err(|e| {
            SerializationError {
                message: e.to_string(),
            }
        })
    }

    fn deserialize(&self, data: &[u8]) -> Result<Record<V>, SerializationError> {
        bincode::serde::decode_from_slice(data, bincode::config::standard())
            .map(|(record, _)| record)
            .map_err(|e| SerializationError {
                message: e.to_string(),
            })
    }

    #[inline]
    fn content_type(&self) -> &'static str {
        "application/x-bincode"
    }
}
