//! Index-based deletion and requeueing against the locked window.
//!
//! Every batch runs under [`Cleaner::with_lock`]. A record at window position
//! `i` lives at absolute index `start_index + i - removed`, where `removed`
//! counts entries this batch already deleted in front of it. Appends by
//! workers land past the snapshot and never shift these indices.
//!
//! Deletion is by value (the list offers no delete-by-index), so the stored
//! entry is re-read at the computed index right before it is removed: a
//! re-encoded record is not guaranteed to match the stored bytes.

use chrono::Utc;
use tracing::{debug, info, instrument, warn};

use sweeper_core::Filter;

use crate::error::{CleanerError, CleanerResult};
use crate::failures::FailureList;
use crate::submit::JobSubmitter;

use super::Cleaner;

/// How [`Cleaner::requeue`] treats the entries it resubmits.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequeueOptions {
    /// Remove requeued entries from the list instead of stamping them.
    pub clear_after: bool,
    /// Queue to resubmit into instead of each entry's own queue.
    pub queue: Option<String>,
}

impl RequeueOptions {
    pub fn clearing() -> Self {
        Self {
            clear_after: true,
            queue: None,
        }
    }

    pub fn with_clear_after(mut self, clear_after: bool) -> Self {
        self.clear_after = clear_after;
        self
    }

    pub fn with_queue(mut self, queue: impl Into<String>) -> Self {
        self.queue = Some(queue.into());
        self
    }
}

impl<L: FailureList, J: JobSubmitter> Cleaner<L, J> {
    /// Delete every windowed entry accepted by `filter`. Returns how many were deleted.
    #[instrument(skip(self), err)]
    pub fn clear(&self, filter: &Filter) -> CleanerResult<usize> {
        self.with_lock(|| {
            let start_index = self.limiter.start_index(&self.failures)?;
            let mut cleared = 0;

            for (position, job) in self.limiter.jobs(&self.failures)?.iter().enumerate() {
                if !filter.matches(job)? {
                    continue;
                }
                if self.remove_at(start_index + position - cleared)? {
                    cleared += 1;
                }
            }

            info!(cleared, start_index, "cleared failures");
            Ok(cleared)
        })
    }

    /// Resubmit every windowed entry accepted by `filter`.
    ///
    /// Each entry goes back onto its own queue (or `options.queue`) with the
    /// same class and arguments. Afterwards it is either removed from the list
    /// or stamped with `retried_at` in place. A failing submission aborts the
    /// batch; entries handled before it stay handled.
    #[instrument(skip(self), err)]
    pub fn requeue(&self, options: &RequeueOptions, filter: &Filter) -> CleanerResult<usize> {
        self.with_lock(|| {
            let start_index = self.limiter.start_index(&self.failures)?;
            let mut requeued = 0;
            let mut cleared = 0;

            for (position, job) in self.limiter.jobs(&self.failures)?.iter().enumerate() {
                if !filter.matches(job)? {
                    continue;
                }

                let queue = options.queue.as_deref().unwrap_or(job.queue_name());
                if queue.is_empty() {
                    return Err(CleanerError::MissingQueue {
                        index: start_index + position - cleared,
                    });
                }
                self.submitter.submit(queue, job.class_name(), job.args())?;
                requeued += 1;

                if options.clear_after {
                    if self.remove_at(start_index + position - cleared)? {
                        cleared += 1;
                    }
                } else {
                    // Nothing is removed in this mode, so indices have not drifted.
                    let mut stamped = job.clone();
                    stamped.mark_retried(Utc::now());
                    self.failures.set(start_index + position, stamped.encode()?)?;
                }
            }

            info!(requeued, cleared, start_index, "requeued failures");
            Ok(requeued)
        })
    }

    /// Drop everything older than the window.
    ///
    /// No-op returning 0 when the whole list fits; otherwise the list is
    /// trimmed to the newest `maximum` entries and `maximum` is returned.
    #[instrument(skip(self), err)]
    pub fn clear_stale(&self) -> CleanerResult<usize> {
        if !self.limiter.is_over_limit(&self.failures)? {
            return Ok(0);
        }

        let maximum = self.limiter.maximum();
        self.failures.trim_to_last(maximum)?;
        info!(kept = maximum, "trimmed stale failures");
        Ok(maximum)
    }

    /// Re-read the entry at `index` and delete one stored copy of it.
    fn remove_at(&self, index: usize) -> CleanerResult<bool> {
        let Some(raw) = self.failures.get(index)? else {
            warn!(index, "failure slot vanished before removal");
            return Ok(false);
        };

        let removed = self.failures.remove_one(&raw)? > 0;
        if removed {
            debug!(index, "removed failure");
        } else {
            warn!(index, "failure entry changed before removal");
        }
        Ok(removed)
    }
}
