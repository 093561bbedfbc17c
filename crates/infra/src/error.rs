//! Errors surfaced by cleaner operations.

use sweeper_core::RecordError;

use crate::failures::FailureStoreError;
use crate::submit::SubmitError;

/// Cleaner operation error.
///
/// Batch mutations do not roll back: when one of these is returned partway
/// through a batch, the entries handled before the failure stay handled.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CleanerError {
    #[error(transparent)]
    Store(#[from] FailureStoreError),

    #[error(transparent)]
    Submit(#[from] SubmitError),

    #[error(transparent)]
    Record(#[from] RecordError),

    #[error("failure at index {index} has no queue to requeue into")]
    MissingQueue { index: usize },
}

pub type CleanerResult<T> = Result<T, CleanerError>;
