use axum::Router;

pub mod cleaner;
pub mod system;

/// Router for all dashboard endpoints.
pub fn router() -> Router {
    Router::new().nest("/cleaner", cleaner::router())
}
