//! Composable record predicates.
//!
//! A [`Filter`] is a conjunction of predicates. Named builders cover the
//! common cases and arbitrary closures can be chained in:
//!
//! ```
//! use sweeper_core::Filter;
//!
//! let filter = Filter::any()
//!     .job_class("EmailJob")
//!     .exception("Net::ReadTimeout")
//!     .and_then(|job| job.args().len() == 2);
//! # let _ = filter;
//! ```

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use regex::Regex;

use crate::error::RecordResult;
use crate::record::FailureRecord;
use crate::timestamp;

type Predicate = Arc<dyn Fn(&FailureRecord) -> RecordResult<bool> + Send + Sync>;

/// Conjunction of record predicates. The empty filter matches every record.
#[derive(Clone, Default)]
pub struct Filter {
    predicates: Vec<Predicate>,
    labels: Vec<String>,
}

impl Filter {
    /// Filter matching every record.
    pub fn any() -> Self {
        Self::default()
    }

    /// Filter matching no record.
    pub fn nothing() -> Self {
        Self::any().and_then_labeled("nothing", |_| false)
    }

    /// Filter from a plain closure.
    pub fn new<F>(predicate: F) -> Self
    where
        F: Fn(&FailureRecord) -> bool + Send + Sync + 'static,
    {
        Self::any().and_then(predicate)
    }

    /// Whether this filter accepts everything.
    pub fn is_unfiltered(&self) -> bool {
        self.predicates.is_empty()
    }

    /// Evaluate all predicates, stopping at the first miss.
    pub fn matches(&self, record: &FailureRecord) -> RecordResult<bool> {
        for predicate in &self.predicates {
            if !predicate(record)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Conjunction with another filter.
    pub fn and(mut self, other: Filter) -> Self {
        self.predicates.extend(other.predicates);
        self.labels.extend(other.labels);
        self
    }

    /// Add an infallible closure.
    pub fn and_then<F>(self, predicate: F) -> Self
    where
        F: Fn(&FailureRecord) -> bool + Send + Sync + 'static,
    {
        self.and_then_labeled("custom", predicate)
    }

    /// Add a closure that may fail (e.g. it parses a timestamp).
    pub fn and_try<F>(self, predicate: F) -> Self
    where
        F: Fn(&FailureRecord) -> RecordResult<bool> + Send + Sync + 'static,
    {
        self.push("custom".to_string(), Arc::new(predicate))
    }

    /// Records that were requeued before.
    pub fn retried(self) -> Self {
        self.and_then_labeled("retried", FailureRecord::is_retried)
    }

    /// Alias for [`Filter::retried`].
    pub fn requeued(self) -> Self {
        self.retried()
    }

    /// Records that were never requeued.
    pub fn not_retried(self) -> Self {
        self.and_then_labeled("not_retried", |job| !job.is_retried())
    }

    /// Failed strictly before `at`.
    pub fn before(self, at: DateTime<Utc>) -> Self {
        self.push(
            format!("before({at})"),
            Arc::new(move |job: &FailureRecord| job.failed_before(at)),
        )
    }

    /// Failed at or after `at`.
    pub fn after(self, at: DateTime<Utc>) -> Self {
        self.push(
            format!("after({at})"),
            Arc::new(move |job: &FailureRecord| job.failed_since(at)),
        )
    }

    /// [`Filter::before`] with a bound given as text.
    pub fn before_str(self, at: &str) -> RecordResult<Self> {
        Ok(self.before(timestamp::parse_timestamp(at)?))
    }

    /// [`Filter::after`] with a bound given as text.
    pub fn after_str(self, at: &str) -> RecordResult<Self> {
        Ok(self.after(timestamp::parse_timestamp(at)?))
    }

    /// Normalized job class equals `class`.
    pub fn job_class(self, class: impl Into<String>) -> Self {
        let class = class.into();
        let label = format!("class={class}");
        self.and_then_labeled(label, move |job| job.class_name() == class)
    }

    /// Normalized exception equals `exception`.
    pub fn exception(self, exception: impl Into<String>) -> Self {
        let exception = exception.into();
        let label = format!("exception={exception}");
        self.and_then_labeled(label, move |job| job.exception_name() == exception)
    }

    /// Queue name equals `queue`.
    pub fn queue(self, queue: impl Into<String>) -> Self {
        let queue = queue.into();
        let label = format!("queue={queue}");
        self.and_then_labeled(label, move |job| job.queue_name() == queue)
    }

    /// Encoded record matches `pattern`.
    pub fn pattern(self, pattern: Regex) -> Self {
        let label = format!("pattern=/{pattern}/");
        self.push(
            label,
            Arc::new(move |job: &FailureRecord| -> RecordResult<bool> {
                Ok(pattern.is_match(&job.encode()?))
            }),
        )
    }

    fn and_then_labeled<F>(self, label: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&FailureRecord) -> bool + Send + Sync + 'static,
    {
        self.push(
            label.into(),
            Arc::new(move |job: &FailureRecord| -> RecordResult<bool> { Ok(predicate(job)) }),
        )
    }

    fn push(mut self, label: String, predicate: Predicate) -> Self {
        self.predicates.push(predicate);
        self.labels.push(label);
        self
    }
}

impl fmt::Debug for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Filter").field(&self.labels).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RecordError;
    use serde_json::json;

    fn job(class: &str, queue: &str, failed_at: &str) -> FailureRecord {
        FailureRecord::new(queue, class, vec![json!("Jason")])
            .with_failed_at(failed_at)
            .with_exception("RuntimeError", "boom")
    }

    #[test]
    fn empty_filter_matches_everything() {
        let filter = Filter::any();
        assert!(filter.is_unfiltered());
        assert!(filter.matches(&job("BadJob", "jobs", "2010/11/13 00:00:00 UTC")).unwrap());
        assert!(!Filter::nothing().matches(&job("BadJob", "jobs", "2010/11/13 00:00:00 UTC")).unwrap());
    }

    #[test]
    fn named_filters_compose_by_conjunction() {
        let filter = Filter::any().job_class("BadJob").queue("jobs").exception("RuntimeError");

        assert!(filter.matches(&job("BadJob", "jobs", "2010/11/13 00:00:00 UTC")).unwrap());
        assert!(!filter.matches(&job("GoodJob", "jobs", "2010/11/13 00:00:00 UTC")).unwrap());
        assert!(!filter.matches(&job("BadJob", "mail", "2010/11/13 00:00:00 UTC")).unwrap());
    }

    #[test]
    fn time_bounds_use_strict_before_and_inclusive_after() {
        let d2 = "2010/11/13 00:00:00 UTC";
        let filter_before = Filter::any().before_str(d2).unwrap();
        let filter_after = Filter::any().after_str(d2).unwrap();

        assert!(filter_before.matches(&job("BadJob", "jobs", "2010/08/13 00:00:00 UTC")).unwrap());
        assert!(!filter_before.matches(&job("BadJob", "jobs", d2)).unwrap());
        assert!(filter_after.matches(&job("BadJob", "jobs", d2)).unwrap());
        assert!(!filter_after.matches(&job("BadJob", "jobs", "2010/08/13 00:00:00 UTC")).unwrap());
    }

    #[test]
    fn time_filters_propagate_bad_timestamps() {
        let filter = Filter::any().after_str("2010-01-01").unwrap();
        let err = filter.matches(&job("BadJob", "jobs", "garbage")).unwrap_err();
        assert_eq!(err, RecordError::InvalidTimestamp("garbage".to_string()));

        assert!(Filter::any().before_str("not a date").is_err());
    }

    #[test]
    fn evaluation_short_circuits() {
        // The time predicate would fail on this record, but the class check rejects it first.
        let filter = Filter::any()
            .job_class("Other")
            .after_str("2010-01-01")
            .unwrap();
        assert!(!filter.matches(&job("BadJob", "jobs", "garbage")).unwrap());
    }

    #[test]
    fn retried_state_filters() {
        let mut retried = job("BadJob", "jobs", "2010/11/13 00:00:00 UTC");
        retried.mark_retried(Utc::now());
        let fresh = job("BadJob", "jobs", "2010/11/13 00:00:00 UTC");

        assert!(Filter::any().retried().matches(&retried).unwrap());
        assert!(!Filter::any().requeued().matches(&fresh).unwrap());
        assert!(Filter::any().not_retried().matches(&fresh).unwrap());
    }

    #[test]
    fn pattern_matches_encoded_record() {
        let filter = Filter::any().pattern(Regex::new("Jas+on").unwrap());
        assert!(filter.matches(&job("BadJob", "jobs", "2010/11/13 00:00:00 UTC")).unwrap());

        let filter = Filter::any().pattern(Regex::new("Freddy").unwrap());
        assert!(!filter.matches(&job("BadJob", "jobs", "2010/11/13 00:00:00 UTC")).unwrap());
    }

    #[test]
    fn custom_closures_chain_with_named_filters() {
        let filter = Filter::new(|job| job.args().first() == Some(&json!("Jason"))).job_class("BadJob");
        assert!(filter.matches(&job("BadJob", "jobs", "2010/11/13 00:00:00 UTC")).unwrap());
        assert_eq!(format!("{filter:?}"), r#"Filter(["custom", "class=BadJob"])"#);
    }
}
