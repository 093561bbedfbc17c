//! Infrastructure layer: the failure list, job submission, config and the
//! cleaner that ties them together.

pub mod cleaner;
pub mod config;
pub mod error;
pub mod failures;
pub mod submit;


pub use cleaner::{Cleaner, Limiter, RequeueOptions, Stats, summary_lines};
pub use config::{CleanerConfig, ConfigError, DEFAULT_MAXIMUM, SweeperConfig};
pub use error::{CleanerError, CleanerResult};
pub use failures::{FailureList, FailureStoreError, InMemoryFailureList, RawFailure};
pub use submit::{JobSubmitter, RecordingSubmitter, SubmitError, Submission};
