//! Grouped counts over the selected window.

use std::collections::BTreeMap;

use tracing::{info, warn};

use sweeper_core::{DAY_FORMAT, FailureRecord, Filter, RecordResult};

use crate::error::CleanerResult;
use crate::failures::FailureList;
use crate::submit::JobSubmitter;

use super::Cleaner;

/// Count per derived key. Keys with no matching record are absent.
pub type Stats = BTreeMap<String, usize>;

impl<L: FailureList, J: JobSubmitter> Cleaner<L, J> {
    /// Counts keyed by the day each job failed, `YYYY/MM/DD`.
    pub fn stats_by_date(&self, filter: &Filter) -> CleanerResult<Stats> {
        self.stats_by(filter, |job| {
            Ok(job.failed_on()?.format(DAY_FORMAT).to_string())
        })
    }

    /// Counts keyed by job class.
    pub fn stats_by_class(&self, filter: &Filter) -> CleanerResult<Stats> {
        self.stats_by(filter, |job| Ok(job.class_name().to_string()))
    }

    /// Counts keyed by exception name.
    pub fn stats_by_exception(&self, filter: &Filter) -> CleanerResult<Stats> {
        self.stats_by(filter, |job| Ok(job.exception_name().to_string()))
    }

    /// Counts keyed by the queue a job came from.
    pub fn stats_by_queue(&self, filter: &Filter) -> CleanerResult<Stats> {
        self.stats_by(filter, |job| Ok(job.queue_name().to_string()))
    }

    fn stats_by<K>(&self, filter: &Filter, key: K) -> CleanerResult<Stats>
    where
        K: Fn(&FailureRecord) -> RecordResult<String>,
    {
        let mut stats = Stats::new();
        for job in self.select(filter)? {
            *stats.entry(key(&job)?).or_default() += 1;
        }

        if self.verbose {
            self.report(&stats)?;
        }
        Ok(stats)
    }

    /// Summary lines for `stats`, led by the over-limit warning when the
    /// window does not cover the whole list.
    pub fn summarize(&self, stats: &Stats) -> CleanerResult<Vec<String>> {
        Ok(summary_lines(stats, self.over_limit_warning()?))
    }

    fn over_limit_warning(&self) -> CleanerResult<Option<String>> {
        if self.limiter.is_over_limit(&self.failures)? {
            Ok(Some(self.over_limit_message()?))
        } else {
            Ok(None)
        }
    }

    fn report(&self, stats: &Stats) -> CleanerResult<()> {
        let warning = self.over_limit_warning()?;
        let lines = summary_lines(stats, warning.clone());
        if let Some(warning) = &warning {
            warn!("{warning}");
        }
        for line in lines.iter().skip(usize::from(warning.is_some())) {
            info!("{line}");
        }
        Ok(())
    }
}

/// Human-readable rendering of `stats`: an optional warning, one line per key
/// in key order, then the total.
pub fn summary_lines(stats: &Stats, over_limit: Option<String>) -> Vec<String> {
    let mut lines: Vec<String> = over_limit.into_iter().collect();
    lines.extend(stats.iter().map(|(key, count)| format!("{key}: {count:>4}")));
    let total: usize = stats.values().sum();
    lines.push(format!("{:>10}: {:>4}", "total", total));
    lines
}
