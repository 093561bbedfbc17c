use std::collections::HashSet;

use axum::http::StatusCode;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use sweeper_core::{FailureRecord, Filter, RecordResult};

use crate::app::errors;

pub const DEFAULT_PER_PAGE: usize = 20;
const MAX_PER_PAGE: usize = 1000;

// -------------------------
// Request DTOs
// -------------------------

/// Record filters shared by the listing, dump and exec endpoints.
///
/// Empty strings count as "not given", so plain HTML forms can post every field.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct FilterQuery {
    pub class: Option<String>,
    pub exception: Option<String>,
    /// Source queue. In exec bodies `queue` names the requeue target, so the
    /// filter is sent as `source_queue` there.
    #[serde(alias = "source_queue")]
    pub queue: Option<String>,
    /// Failed at or after this time.
    pub from: Option<String>,
    /// Failed strictly before this time.
    pub to: Option<String>,
    pub regex: Option<String>,
    pub retried: Option<bool>,
}

impl FilterQuery {
    /// Build the cleaner filter. Unparseable time bounds are a 400; an
    /// invalid regex selects nothing.
    pub fn to_filter(&self) -> Result<Filter, axum::response::Response> {
        let mut filter = Filter::any();

        if let Some(class) = given(&self.class) {
            filter = filter.job_class(class);
        }
        if let Some(exception) = given(&self.exception) {
            filter = filter.exception(exception);
        }
        if let Some(queue) = given(&self.queue) {
            filter = filter.queue(queue);
        }
        if let Some(from) = given(&self.from) {
            filter = filter.after_str(from).map_err(|e| {
                errors::json_error(StatusCode::BAD_REQUEST, "invalid_filter", format!("from: {e}"))
            })?;
        }
        if let Some(to) = given(&self.to) {
            filter = filter.before_str(to).map_err(|e| {
                errors::json_error(StatusCode::BAD_REQUEST, "invalid_filter", format!("to: {e}"))
            })?;
        }
        match self.retried {
            Some(true) => filter = filter.retried(),
            Some(false) => filter = filter.not_retried(),
            None => {}
        }
        if let Some(pattern) = given(&self.regex) {
            filter = match Regex::new(pattern) {
                Ok(regex) => filter.pattern(regex),
                Err(e) => {
                    tracing::debug!(pattern, error = %e, "invalid regex; selecting nothing");
                    filter.and(Filter::nothing())
                }
            };
        }

        Ok(filter)
    }
}

fn given(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

#[derive(Debug, Default, Clone, Copy, Deserialize)]
pub struct PageQuery {
    /// 1-based page number.
    pub page: Option<usize>,
    pub per_page: Option<usize>,
}

impl PageQuery {
    pub fn page(&self) -> usize {
        self.page.unwrap_or(1).max(1)
    }

    pub fn per_page(&self) -> usize {
        self.per_page.unwrap_or(DEFAULT_PER_PAGE).clamp(1, MAX_PER_PAGE)
    }

    /// Slice out the requested page.
    pub fn apply<T>(&self, items: Vec<T>) -> Vec<T> {
        let skip = (self.page() - 1).saturating_mul(self.per_page());
        items.into_iter().skip(skip).take(self.per_page()).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecAction {
    Clear,
    Retry,
    RetryAndClear,
}

#[derive(Debug, Deserialize)]
pub struct ExecRequest {
    pub action: ExecAction,
    /// Restrict the batch to these record digests.
    #[serde(default)]
    pub digests: Option<Vec<String>>,
    /// Requeue into this queue instead of each record's own.
    #[serde(default)]
    pub queue: Option<String>,
    #[serde(flatten)]
    pub filter: FilterQuery,
}

impl ExecRequest {
    pub fn to_filter(&self) -> Result<Filter, axum::response::Response> {
        let filter = self.filter.to_filter()?;
        Ok(match &self.digests {
            Some(digests) => filter.and(digest_filter(digests)),
            None => filter,
        })
    }
}

fn digest_filter(digests: &[String]) -> Filter {
    let wanted: HashSet<String> = digests.iter().cloned().collect();
    Filter::any().and_try(move |job: &FailureRecord| -> RecordResult<bool> {
        Ok(wanted.contains(&job.digest()?))
    })
}

// -------------------------
// Response DTOs
// -------------------------

#[derive(Debug, Serialize)]
pub struct FailureView {
    pub digest: String,
    pub failed_at: Option<String>,
    pub class: String,
    pub exception: String,
    pub queue: String,
    pub args: Vec<Value>,
    pub retried: bool,
    pub retried_at: Option<String>,
    pub record: FailureRecord,
}

impl FailureView {
    pub fn from_record(record: FailureRecord) -> RecordResult<Self> {
        Ok(Self {
            digest: record.digest()?,
            failed_at: record.failed_at.clone(),
            class: record.class_name().to_string(),
            exception: record.exception_name().to_string(),
            queue: record.queue_name().to_string(),
            args: record.args().to_vec(),
            retried: record.is_retried(),
            retried_at: record.retried_at.clone(),
            record,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(class: &str, queue: &str) -> FailureRecord {
        FailureRecord::new(queue, class, vec![json!("Jason")])
            .with_failed_at("2010/11/13 00:00:00 UTC")
            .with_exception("RuntimeError", "boom")
    }

    #[test]
    fn empty_fields_are_ignored() {
        let query = FilterQuery {
            class: Some(" ".to_string()),
            regex: Some(String::new()),
            ..FilterQuery::default()
        };
        assert!(query.to_filter().unwrap().is_unfiltered());
    }

    #[test]
    fn invalid_regex_matches_nothing() {
        let query = FilterQuery {
            regex: Some("(".to_string()),
            ..FilterQuery::default()
        };
        let filter = query.to_filter().unwrap();
        assert!(!filter.matches(&record("A", "q")).unwrap());
    }

    #[test]
    fn invalid_time_bound_is_rejected() {
        let query = FilterQuery {
            from: Some("last tuesday".to_string()),
            ..FilterQuery::default()
        };
        let response = query.to_filter().unwrap_err();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn exec_body_separates_target_and_source_queue() {
        let body: ExecRequest = serde_json::from_value(json!({
            "action": "retry_and_clear",
            "queue": "urgent",
            "source_queue": "mail",
            "class": "Mailer",
        }))
        .unwrap();
        assert_eq!(body.action, ExecAction::RetryAndClear);
        assert_eq!(body.queue.as_deref(), Some("urgent"));
        assert_eq!(body.filter.queue.as_deref(), Some("mail"));

        let filter = body.to_filter().unwrap();
        assert!(filter.matches(&record("Mailer", "mail")).unwrap());
        assert!(!filter.matches(&record("Mailer", "urgent")).unwrap());
    }

    #[test]
    fn digests_restrict_selection() {
        let keep = record("A", "q");
        let other = record("B", "q");
        let body = ExecRequest {
            action: ExecAction::Clear,
            digests: Some(vec![keep.digest().unwrap()]),
            queue: None,
            filter: FilterQuery::default(),
        };
        let filter = body.to_filter().unwrap();
        assert!(filter.matches(&keep).unwrap());
        assert!(!filter.matches(&other).unwrap());
    }

    #[test]
    fn pages_are_one_based() {
        let page = PageQuery {
            page: Some(2),
            per_page: Some(3),
        };
        assert_eq!(page.apply((1..=8).collect()), vec![4, 5, 6]);

        let first = PageQuery::default();
        assert_eq!(first.page(), 1);
        assert_eq!(first.per_page(), DEFAULT_PER_PAGE);
        assert_eq!(PageQuery { page: Some(0), per_page: Some(0) }.apply(vec![1, 2]), vec![1]);
    }
}
