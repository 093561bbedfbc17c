//! Job resubmission abstraction and the recording implementation.

use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;
use serde_json::Value;

/// Pushes a job back onto a live queue.
pub trait JobSubmitter: Send + Sync {
    fn submit(&self, queue: &str, class: &str, args: &[Value]) -> Result<(), SubmitError>;
}

/// Job resubmission error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SubmitError {
    #[error("queue connection error: {0}")]
    Connection(String),
    #[error("queue command error: {0}")]
    Command(String),
    #[error("job rejected: {0}")]
    Rejected(String),
}

/// A job as it is placed on a queue.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Submission {
    pub queue: String,
    pub class: String,
    pub args: Vec<Value>,
}

impl Submission {
    /// Queue item body (`{"class": .., "args": [..]}`).
    pub fn queue_item(&self) -> Result<String, SubmitError> {
        serde_json::to_string(&serde_json::json!({
            "class": self.class,
            "args": self.args,
        }))
        .map_err(|e| SubmitError::Rejected(format!("unencodable job: {e}")))
    }
}

/// Submitter that only records what it was asked to enqueue.
///
/// Intended for tests/dev. Can be told to start rejecting after a number of
/// accepted submissions to exercise partial-failure paths.
#[derive(Debug, Default)]
pub struct RecordingSubmitter {
    submitted: Mutex<Vec<Submission>>,
    accept_limit: Option<usize>,
}

impl RecordingSubmitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Reject every submission after the first `limit`.
    pub fn rejecting_after(limit: usize) -> Self {
        Self {
            submitted: Mutex::new(Vec::new()),
            accept_limit: Some(limit),
        }
    }

    pub fn submitted(&self) -> Vec<Submission> {
        self.submitted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl JobSubmitter for RecordingSubmitter {
    fn submit(&self, queue: &str, class: &str, args: &[Value]) -> Result<(), SubmitError> {
        let mut submitted = self.submitted.lock().unwrap_or_else(PoisonError::into_inner);
        if self.accept_limit.is_some_and(|limit| submitted.len() >= limit) {
            return Err(SubmitError::Rejected(format!("{class} on {queue}")));
        }
        submitted.push(Submission {
            queue: queue.to_string(),
            class: class.to_string(),
            args: args.to_vec(),
        });
        Ok(())
    }
}

impl<T: JobSubmitter + ?Sized> JobSubmitter for Arc<T> {
    fn submit(&self, queue: &str, class: &str, args: &[Value]) -> Result<(), SubmitError> {
        (**self).submit(queue, class, args)
    }
}
