//! Failed-job cleaner: selection, mutation and aggregation over the window.
//!
//! ## Components
//!
//! - `Limiter`: bounded, lockable window over the failure list
//! - `Cleaner::select*`: predicate and pattern selection
//! - `Cleaner::clear` / `requeue` / `clear_stale`: index-based mutations
//! - `Cleaner::stats_by_*`: grouped counts

pub mod limiter;
pub mod mutate;
pub mod stats;

use regex::Regex;
use tracing::debug;

use sweeper_core::{FailureRecord, Filter};

use crate::config::CleanerConfig;
use crate::error::CleanerResult;
use crate::failures::FailureList;
use crate::submit::JobSubmitter;

pub use limiter::Limiter;
pub use mutate::RequeueOptions;
pub use stats::{Stats, summary_lines};

/// Maintenance handle over one failure list.
///
/// Assumes a single caller issues mutations at a time; any number of
/// workers may keep appending to the list meanwhile.
#[derive(Debug)]
pub struct Cleaner<L, J> {
    failures: L,
    submitter: J,
    limiter: Limiter,
    verbose: bool,
}

impl<L: FailureList, J: JobSubmitter> Cleaner<L, J> {
    pub fn new(failures: L, submitter: J, config: CleanerConfig) -> Self {
        Self {
            failures,
            submitter,
            limiter: Limiter::new(config.maximum),
            verbose: config.verbose,
        }
    }

    pub fn failures(&self) -> &L {
        &self.failures
    }

    pub fn submitter(&self) -> &J {
        &self.submitter
    }

    pub fn limiter(&self) -> &Limiter {
        &self.limiter
    }

    /// Mutable access, e.g. to change this cleaner's window size.
    pub fn limiter_mut(&mut self) -> &mut Limiter {
        &mut self.limiter
    }

    pub fn is_verbose(&self) -> bool {
        self.verbose
    }

    pub fn set_verbose(&mut self, verbose: bool) {
        self.verbose = verbose;
    }

    /// Total number of failures in the list (not just the window).
    pub fn failure_count(&self) -> CleanerResult<usize> {
        Ok(self.failures.len()?)
    }

    /// Warning shown when the window does not cover the whole list.
    pub fn over_limit_message(&self) -> CleanerResult<String> {
        Ok(format!(
            "There are too many failed jobs(count={}). This only looks at last {} jobs.",
            self.failure_count()?,
            self.limiter.maximum()
        ))
    }

    /// Run `body` with the window frozen (see [`Limiter::with_lock`]).
    pub fn with_lock<T, F>(&self, body: F) -> CleanerResult<T>
    where
        F: FnOnce() -> CleanerResult<T>,
    {
        self.limiter.with_lock(&self.failures, body)
    }

    /// Records in the window accepted by `filter`, oldest first.
    pub fn select(&self, filter: &Filter) -> CleanerResult<Vec<FailureRecord>> {
        let jobs = self.limiter.jobs(&self.failures)?;
        if filter.is_unfiltered() {
            return Ok(jobs);
        }

        let mut selected = Vec::new();
        for job in jobs {
            if filter.matches(&job)? {
                selected.push(job);
            }
        }
        Ok(selected)
    }

    /// Records whose encoded form matches `pattern`.
    ///
    /// An invalid pattern selects nothing.
    pub fn select_by_pattern(&self, pattern: &str) -> CleanerResult<Vec<FailureRecord>> {
        match Regex::new(pattern) {
            Ok(regex) => self.select(&Filter::any().pattern(regex)),
            Err(e) => {
                debug!(pattern, error = %e, "ignoring invalid selection pattern");
                Ok(Vec::new())
            }
        }
    }
}
