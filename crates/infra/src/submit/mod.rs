//! Requeueing failed jobs onto live queues.

#[cfg(feature = "redis")]
pub mod redis_queue;
pub mod submitter;

#[cfg(feature = "redis")]
pub use redis_queue::RedisSubmitter;
pub use submitter::{JobSubmitter, RecordingSubmitter, SubmitError, Submission};
