//! HTTP API application wiring (Axum router + service wiring).
//!
//! - `services.rs`: the shared cleaner and how handlers reach it
//! - `routes/`: HTTP routes + handlers
//! - `dto.rs`: query/body DTOs and their mapping to filters
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::{Extension, Router, routing::get};

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

use services::AppServices;

/// Build the full HTTP router (public entrypoint used by `main.rs` and tests).
pub fn build_app(services: Arc<AppServices>) -> Router {
    Router::new()
        .route("/health", get(routes::system::health))
        .merge(routes::router())
        .layer(Extension(services))
}
