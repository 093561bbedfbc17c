//! Record-level error model.

use thiserror::Error;

/// Result type used across the record layer.
pub type RecordResult<T> = Result<T, RecordError>;

/// Failure to interpret a stored failure entry.
///
/// Keep this focused on the shape of a single record (wire format, timestamps).
/// Storage and resubmission problems belong to the infrastructure layer.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RecordError {
    /// The stored representation could not be decoded into a record.
    #[error("failed to decode failure record: {0}")]
    Decode(String),

    /// A record could not be encoded back into the stored representation.
    #[error("failed to encode failure record: {0}")]
    Encode(String),

    /// A timestamp field (or a filter bound) could not be parsed.
    #[error("invalid timestamp: {0:?}")]
    InvalidTimestamp(String),
}

impl RecordError {
    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode(msg.into())
    }

    pub fn encode(msg: impl Into<String>) -> Self {
        Self::Encode(msg.into())
    }

    pub fn invalid_timestamp(raw: impl Into<String>) -> Self {
        Self::InvalidTimestamp(raw.into())
    }
}
