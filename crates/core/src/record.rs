//! The failed-job entry as stored in the failure list.
//!
//! Records are decoded from one JSON document per list slot. Fields this tool
//! does not interpret (`worker`, `backtrace`, `error`, and anything unknown)
//! are carried through untouched so that re-encoding a record only changes
//! what the cleaner explicitly changed.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::error::{RecordError, RecordResult};
use crate::timestamp;

/// Sentinel reported for a missing job class or exception.
pub const UNKNOWN: &str = "UNKNOWN";

/// Class name of the adapter that wraps framework-level jobs.
///
/// Its first argument carries the real `job_class` and `arguments`.
pub const JOB_WRAPPER_CLASS: &str = "ActiveJob::QueueAdapters::ResqueAdapter::JobWrapper";

/// Job class and arguments of the job that failed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Payload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class: Option<String>,
    #[serde(default, deserialize_with = "sequence_or_single")]
    pub args: Vec<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One entry of the failure list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureRecord {
    /// Raw stamp as written by the worker. Absent on malformed entries, which
    /// stay selectable and clearable but fail any time comparison.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_at: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub payload: Payload,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exception: Option<String>,
    #[serde(default)]
    pub queue: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retried_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worker: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backtrace: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl FailureRecord {
    /// Create a record for a job of `class` that failed on `queue` just now.
    pub fn new(queue: impl Into<String>, class: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            failed_at: Some(timestamp::format_stamp(Utc::now())),
            payload: Payload {
                class: Some(class.into()),
                args,
                extra: Map::new(),
            },
            exception: None,
            queue: queue.into(),
            retried_at: None,
            worker: None,
            backtrace: None,
            error: None,
            extra: Map::new(),
        }
    }

    /// Set the raw `failed_at` stamp.
    pub fn with_failed_at(mut self, failed_at: impl Into<String>) -> Self {
        self.failed_at = Some(failed_at.into());
        self
    }

    /// Set the exception type and message.
    pub fn with_exception(mut self, exception: impl Into<String>, error: impl Into<String>) -> Self {
        self.exception = Some(exception.into());
        self.error = Some(Value::String(error.into()));
        self
    }

    /// Decode a stored entry and apply adapter normalization.
    pub fn decode(raw: &str) -> RecordResult<Self> {
        let mut record: Self =
            serde_json::from_str(raw).map_err(|e| RecordError::decode(e.to_string()))?;
        record.normalize();
        Ok(record)
    }

    /// Encode the record into its stored representation.
    pub fn encode(&self) -> RecordResult<String> {
        serde_json::to_string(self).map_err(|e| RecordError::encode(e.to_string()))
    }

    /// Stable content digest (hex SHA-256 of the encoded record).
    pub fn digest(&self) -> RecordResult<String> {
        let encoded = self.encode()?;
        Ok(format!("{:x}", Sha256::digest(encoded.as_bytes())))
    }

    /// Unwrap adapter-wrapped jobs so that filters and display see the real
    /// job class and arguments.
    ///
    /// Returns `true` when the record was rewritten. Running it again on the
    /// result is a no-op.
    pub fn normalize(&mut self) -> bool {
        if self.payload.class.as_deref() != Some(JOB_WRAPPER_CLASS) {
            return false;
        }

        let inner = self.payload.args.iter().find_map(|arg| {
            let obj = arg.as_object()?;
            let class = obj.get("job_class")?.as_str()?;
            let arguments = obj.get("arguments")?;
            (class != JOB_WRAPPER_CLASS).then(|| (class.to_string(), coerce_sequence(arguments.clone())))
        });

        match inner {
            Some((class, args)) => {
                self.payload.class = Some(class);
                self.payload.args = args;
                true
            }
            None => false,
        }
    }

    /// Job class, or [`UNKNOWN`] when the payload carries none.
    pub fn class_name(&self) -> &str {
        self.payload.class.as_deref().unwrap_or(UNKNOWN)
    }

    /// Exception type, or [`UNKNOWN`].
    pub fn exception_name(&self) -> &str {
        self.exception.as_deref().unwrap_or(UNKNOWN)
    }

    pub fn queue_name(&self) -> &str {
        &self.queue
    }

    pub fn args(&self) -> &[Value] {
        &self.payload.args
    }

    /// Whether this entry has been requeued before.
    pub fn is_retried(&self) -> bool {
        self.retried_at.as_deref().is_some_and(|s| !s.trim().is_empty())
    }

    /// Raw `failed_at`, or an error when the entry has none.
    pub fn failed_at_raw(&self) -> RecordResult<&str> {
        self.failed_at
            .as_deref()
            .ok_or_else(|| RecordError::invalid_timestamp(""))
    }

    /// Parsed `failed_at` in UTC.
    pub fn failed_at_time(&self) -> RecordResult<DateTime<Utc>> {
        timestamp::parse_timestamp(self.failed_at_raw()?)
    }

    /// Calendar day of the failure, as recorded by the worker.
    pub fn failed_on(&self) -> RecordResult<NaiveDate> {
        let raw = self.failed_at_raw()?;
        match timestamp::leading_day(raw) {
            Some(day) => Ok(day),
            None => timestamp::parse_with_offset(raw).map(|t| t.date_naive()),
        }
    }

    /// Failed strictly before `at`.
    pub fn failed_before(&self, at: DateTime<Utc>) -> RecordResult<bool> {
        Ok(self.failed_at_time()? < at)
    }

    /// Failed at or after `at`.
    pub fn failed_since(&self, at: DateTime<Utc>) -> RecordResult<bool> {
        Ok(self.failed_at_time()? >= at)
    }

    /// Stamp the record as requeued at `at`.
    pub fn mark_retried(&mut self, at: DateTime<Utc>) {
        self.retried_at = Some(timestamp::format_stamp(at));
    }
}

fn coerce_sequence(value: Value) -> Vec<Value> {
    match value {
        Value::Null => Vec::new(),
        Value::Array(items) => items,
        other => vec![other],
    }
}

fn sequence_or_single<'de, D>(deserializer: D) -> Result<Vec<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(coerce_sequence)
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
