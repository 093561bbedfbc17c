//! HTTP dashboard over the failed-job cleaner: routing and request/response mapping.

pub mod app;
