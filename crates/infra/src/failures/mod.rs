//! The persistent failure list the cleaner operates on.
//!
//! - `FailureList`: narrow contract over the backing list (indexed reads,
//!   length, delete-by-value, overwrite, trim)
//! - `InMemoryFailureList`: test/dev implementation
//! - `RedisFailureList` (feature `redis`): the list workers actually append to

#[cfg(feature = "redis")]
pub mod redis_list;
pub mod store;

#[cfg(feature = "redis")]
pub use redis_list::{DEFAULT_NAMESPACE, RedisFailureList};
pub use store::{FailureList, FailureStoreError, InMemoryFailureList, RawFailure};
