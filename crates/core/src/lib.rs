//! `sweeper-core` — failed-job records and the predicates used to select them.
//!
//! This crate is pure domain code: no storage, no queue access.

pub mod error;
pub mod filter;
pub mod record;
pub mod timestamp;

pub use error::{RecordError, RecordResult};
pub use filter::Filter;
pub use record::{FailureRecord, JOB_WRAPPER_CLASS, Payload, UNKNOWN};
pub use timestamp::{DAY_FORMAT, format_stamp, parse_timestamp};
