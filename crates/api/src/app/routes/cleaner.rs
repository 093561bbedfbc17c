//! Cleaner dashboard endpoints.
//!
//! Every handler builds a [`Filter`](sweeper_core::Filter) from its query or
//! body and hands the cleaner call to [`AppServices::run`].

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use serde_json::{Value, json};

use sweeper_core::Filter;
use sweeper_infra::{Cleaner, CleanerResult, FailureList, JobSubmitter, RequeueOptions};

use crate::app::dto::{ExecAction, ExecRequest, FailureView, FilterQuery, PageQuery};
use crate::app::errors;
use crate::app::services::AppServices;

pub fn router() -> Router {
    Router::new()
        .route("/", get(overview))
        .route("/list", get(list_failures))
        .route("/dump", get(dump_failures))
        .route("/exec", post(exec))
        .route("/stale", post(clear_stale))
}

/// GET /cleaner
///
/// Totals for the whole window, grouped four ways.
pub async fn overview(
    Extension(services): Extension<Arc<AppServices>>,
) -> axum::response::Response {
    let result = services.run(|cleaner| overview_body(cleaner)).await;

    match result {
        Ok(body) => (StatusCode::OK, Json(body)).into_response(),
        Err(response) => response,
    }
}

/// Overview document. All four grids are computed against one frozen window.
pub fn overview_body<L, J>(cleaner: &Cleaner<L, J>) -> CleanerResult<Value>
where
    L: FailureList,
    J: JobSubmitter,
{
    cleaner.with_lock(|| {
        let all = Filter::any();
        let failure_count = cleaner.failure_count()?;
        let over_limit = failure_count > cleaner.limiter().maximum();
        let message = if over_limit {
            Some(cleaner.over_limit_message()?)
        } else {
            None
        };

        Ok(json!({
            "failure_count": failure_count,
            "maximum": cleaner.limiter().maximum(),
            "over_limit": over_limit,
            "message": message,
            "by_class": cleaner.stats_by_class(&all)?,
            "by_exception": cleaner.stats_by_exception(&all)?,
            "by_date": cleaner.stats_by_date(&all)?,
            "by_queue": cleaner.stats_by_queue(&all)?,
        }))
    })
}

/// GET /cleaner/list?class=X&from=2010/11/01&page=2&per_page=20
///
/// Matching failures, newest first, one page at a time.
pub async fn list_failures(
    Extension(services): Extension<Arc<AppServices>>,
    Query(filter): Query<FilterQuery>,
    Query(page): Query<PageQuery>,
) -> axum::response::Response {
    let filter = match filter.to_filter() {
        Ok(f) => f,
        Err(response) => return response,
    };

    let selected = match services.run(move |cleaner| cleaner.select(&filter)).await {
        Ok(records) => records,
        Err(response) => return response,
    };

    let total = selected.len();
    let newest_first: Vec<_> = selected.into_iter().rev().collect();
    let items = match page
        .apply(newest_first)
        .into_iter()
        .map(FailureView::from_record)
        .collect::<Result<Vec<_>, _>>()
    {
        Ok(items) => items,
        Err(e) => return errors::record_error_to_response(e),
    };

    (
        StatusCode::OK,
        Json(json!({
            "total": total,
            "page": page.page(),
            "per_page": page.per_page(),
            "items": items,
        })),
    )
        .into_response()
}

/// GET /cleaner/dump
///
/// Matching failures as stored, oldest first.
pub async fn dump_failures(
    Extension(services): Extension<Arc<AppServices>>,
    Query(filter): Query<FilterQuery>,
) -> axum::response::Response {
    let filter = match filter.to_filter() {
        Ok(f) => f,
        Err(response) => return response,
    };

    match services.run(move |cleaner| cleaner.select(&filter)).await {
        Ok(records) => (StatusCode::OK, Json(records)).into_response(),
        Err(response) => response,
    }
}

/// POST /cleaner/exec
///
/// Clear or requeue the matching failures.
pub async fn exec(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<ExecRequest>,
) -> axum::response::Response {
    let filter = match body.to_filter() {
        Ok(f) => f,
        Err(response) => return response,
    };
    let action = body.action;
    let options = RequeueOptions {
        clear_after: action == ExecAction::RetryAndClear,
        queue: body.queue.filter(|q| !q.trim().is_empty()),
    };

    let result = services
        .run(move |cleaner| match action {
            ExecAction::Clear => cleaner.clear(&filter),
            ExecAction::Retry | ExecAction::RetryAndClear => cleaner.requeue(&options, &filter),
        })
        .await;

    match result {
        Ok(count) => {
            tracing::info!(?action, count, "dashboard batch finished");
            (StatusCode::OK, Json(json!({ "action": action, "count": count }))).into_response()
        }
        Err(response) => response,
    }
}

/// POST /cleaner/stale
///
/// Trim the list down to the window.
pub async fn clear_stale(
    Extension(services): Extension<Arc<AppServices>>,
) -> axum::response::Response {
    match services.run(|cleaner| cleaner.clear_stale()).await {
        Ok(count) => (StatusCode::OK, Json(json!({ "count": count }))).into_response(),
        Err(response) => response,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use sweeper_core::FailureRecord;
    use sweeper_infra::{
        CleanerConfig, FailureStoreError, InMemoryFailureList, RawFailure, RecordingSubmitter,
    };

    /// A list that a busy worker appends to after every range read.
    #[derive(Debug, Default)]
    struct BusyList {
        inner: InMemoryFailureList,
    }

    impl BusyList {
        fn append(&self) -> Result<(), FailureStoreError> {
            let record = FailureRecord::new("jobs", "Late", vec![json!(1)])
                .with_failed_at("2010/11/14 00:00:00 UTC")
                .with_exception("Timeout", "slow");
            self.inner.push_record(&record)
        }
    }

    impl FailureList for BusyList {
        fn len(&self) -> Result<usize, FailureStoreError> {
            self.inner.len()
        }

        fn range(&self, start: isize, count: usize) -> Result<Vec<RawFailure>, FailureStoreError> {
            let entries = self.inner.range(start, count)?;
            self.append()?;
            Ok(entries)
        }

        fn remove_one(&self, raw: &str) -> Result<usize, FailureStoreError> {
            self.inner.remove_one(raw)
        }

        fn set(&self, index: usize, raw: RawFailure) -> Result<(), FailureStoreError> {
            self.inner.set(index, raw)
        }

        fn trim_to_last(&self, n: usize) -> Result<(), FailureStoreError> {
            self.inner.trim_to_last(n)
        }
    }

    fn total(grid: &Value) -> u64 {
        grid.as_object().unwrap().values().map(|v| v.as_u64().unwrap()).sum()
    }

    #[test]
    fn overview_grids_share_one_window() {
        let list = BusyList::default();
        for _ in 0..3 {
            list.append().unwrap();
        }
        let cleaner = CleanerConfig::default().build(list, RecordingSubmitter::new());

        let body = overview_body(&cleaner).unwrap();
        let expected = total(&body["by_class"]);
        assert_eq!(expected, 3);
        for grid in ["by_exception", "by_date", "by_queue"] {
            assert_eq!(total(&body[grid]), expected, "{grid}");
        }
        assert!(!cleaner.limiter().is_locked());
    }
}
