use std::sync::{Arc, Mutex, PoisonError};

use axum::http::StatusCode;

use sweeper_infra::{
    Cleaner, CleanerConfig, CleanerResult, FailureList, JobSubmitter, SweeperConfig,
    failures::RedisFailureList, submit::RedisSubmitter,
};

use crate::app::errors;

/// Cleaner type shared by all handlers; backends are chosen at startup.
pub type DynCleaner = Cleaner<Arc<dyn FailureList>, Arc<dyn JobSubmitter>>;

/// Shared state behind every route.
///
/// All cleaner calls go through one mutex, so mutations issued from the
/// dashboard never interleave within this process.
pub struct AppServices {
    cleaner: Mutex<DynCleaner>,
}

impl AppServices {
    pub fn new(
        failures: Arc<dyn FailureList>,
        submitter: Arc<dyn JobSubmitter>,
        config: &CleanerConfig,
    ) -> Self {
        Self {
            cleaner: Mutex::new(config.build(failures, submitter)),
        }
    }

    /// Wire the Redis-backed failure list and submitter for `config`.
    pub fn connect(config: &SweeperConfig) -> anyhow::Result<Self> {
        let namespace = Some(config.namespace.as_str());
        let failures = RedisFailureList::new(&config.redis_url, namespace)?;
        let submitter = RedisSubmitter::new(&config.redis_url, namespace)?;
        tracing::debug!(key = failures.key(), "using failure list");

        Ok(Self::new(Arc::new(failures), Arc::new(submitter), &config.cleaner))
    }

    /// Run `op` against the cleaner on the blocking pool.
    ///
    /// Cleaner backends do synchronous I/O, so calls never run on the async
    /// workers. Errors are already mapped to responses.
    pub async fn run<T, F>(self: &Arc<Self>, op: F) -> Result<T, axum::response::Response>
    where
        T: Send + 'static,
        F: FnOnce(&DynCleaner) -> CleanerResult<T> + Send + 'static,
    {
        let services = Arc::clone(self);
        let joined = tokio::task::spawn_blocking(move || {
            let cleaner = services
                .cleaner
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            op(&cleaner)
        })
        .await;

        match joined {
            Ok(result) => result.map_err(errors::cleaner_error_to_response),
            Err(e) => Err(errors::json_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "task_failed",
                e.to_string(),
            )),
        }
    }
}
