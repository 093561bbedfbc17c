use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use sweeper_core::RecordError;
use sweeper_infra::CleanerError;

pub fn cleaner_error_to_response(err: CleanerError) -> axum::response::Response {
    match err {
        CleanerError::Store(e) => json_error(StatusCode::BAD_GATEWAY, "store_error", e.to_string()),
        CleanerError::Submit(e) => json_error(StatusCode::BAD_GATEWAY, "submit_error", e.to_string()),
        CleanerError::Record(e) => record_error_to_response(e),
        e @ CleanerError::MissingQueue { .. } => {
            json_error(StatusCode::UNPROCESSABLE_ENTITY, "missing_queue", e.to_string())
        }
    }
}

pub fn record_error_to_response(err: RecordError) -> axum::response::Response {
    json_error(StatusCode::UNPROCESSABLE_ENTITY, "invalid_record", err.to_string())
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}
