//! Bounded window over the tail of the failure list.
//!
//! Filtering is a linear scan over decoded records, so the cleaner only ever
//! looks at the newest `maximum` entries. A batch that reads and then mutates
//! takes a lock: the window's start index and contents are captured once and
//! every read inside the batch sees that snapshot, however many failures
//! workers append meanwhile.

use std::mem;
use std::sync::{Mutex, MutexGuard, PoisonError};

use sweeper_core::FailureRecord;
use tracing::debug;

use crate::error::CleanerResult;
use crate::failures::{FailureList, RawFailure};

/// Frozen view of the window taken when a lock is acquired.
#[derive(Debug)]
struct WindowSnapshot {
    start_index: usize,
    jobs: Vec<FailureRecord>,
}

#[derive(Debug, Default)]
enum LockState {
    #[default]
    Unlocked,
    Locked(WindowSnapshot),
}

/// Windowed accessor over a [`FailureList`].
#[derive(Debug)]
pub struct Limiter {
    maximum: usize,
    state: Mutex<LockState>,
}

impl Limiter {
    pub fn new(maximum: usize) -> Self {
        Self {
            maximum,
            state: Mutex::new(LockState::Unlocked),
        }
    }

    pub fn maximum(&self) -> usize {
        self.maximum
    }

    pub fn set_maximum(&mut self, maximum: usize) {
        self.maximum = maximum;
    }

    pub fn is_locked(&self) -> bool {
        matches!(*self.state(), LockState::Locked(_))
    }

    /// Whether the list holds more failures than the window covers.
    pub fn is_over_limit<L: FailureList + ?Sized>(&self, list: &L) -> CleanerResult<bool> {
        Ok(list.len()? > self.maximum)
    }

    /// Number of records in the window.
    pub fn count<L: FailureList + ?Sized>(&self, list: &L) -> CleanerResult<usize> {
        if let LockState::Locked(snapshot) = &*self.state() {
            return Ok(snapshot.jobs.len());
        }
        Ok(list.len()?.min(self.maximum))
    }

    /// Absolute list index of the window's oldest record.
    pub fn start_index<L: FailureList + ?Sized>(&self, list: &L) -> CleanerResult<usize> {
        if let LockState::Locked(snapshot) = &*self.state() {
            return Ok(snapshot.start_index);
        }
        Ok(list.len()?.saturating_sub(self.maximum))
    }

    /// Records in the window, oldest first.
    pub fn jobs<L: FailureList + ?Sized>(&self, list: &L) -> CleanerResult<Vec<FailureRecord>> {
        if let LockState::Locked(snapshot) = &*self.state() {
            return Ok(snapshot.jobs.clone());
        }

        let count = self.count(list)?;
        if count == 0 {
            return Ok(Vec::new());
        }
        let offset = -isize::try_from(count).unwrap_or(isize::MAX);
        decode_all(list.range(offset, count)?)
    }

    /// Run `body` against a frozen window.
    ///
    /// The snapshot is taken once per outermost call; nested calls run their
    /// body against the snapshot already in place. The previous lock state is
    /// restored however `body` exits, including by unwinding.
    pub fn with_lock<L, T, F>(&self, list: &L, body: F) -> CleanerResult<T>
    where
        L: FailureList + ?Sized,
        F: FnOnce() -> CleanerResult<T>,
    {
        if self.is_locked() {
            return body();
        }

        let snapshot = self.snapshot(list)?;
        debug!(
            start_index = snapshot.start_index,
            count = snapshot.jobs.len(),
            "window locked"
        );

        let previous = mem::replace(&mut *self.state(), LockState::Locked(snapshot));
        let _guard = LockGuard {
            state: &self.state,
            previous: Some(previous),
        };
        body()
    }

    fn snapshot<L: FailureList + ?Sized>(&self, list: &L) -> CleanerResult<WindowSnapshot> {
        let total = list.len()?;
        let start_index = total.saturating_sub(self.maximum);
        let count = total - start_index;
        let start = isize::try_from(start_index).unwrap_or(isize::MAX);
        let jobs = decode_all(list.range(start, count)?)?;
        Ok(WindowSnapshot { start_index, jobs })
    }

    fn state(&self) -> MutexGuard<'_, LockState> {
        lock_state(&self.state)
    }
}

fn lock_state(state: &Mutex<LockState>) -> MutexGuard<'_, LockState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Restores the lock state captured at acquisition when dropped.
struct LockGuard<'a> {
    state: &'a Mutex<LockState>,
    previous: Option<LockState>,
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        if let Some(previous) = self.previous.take() {
            *lock_state(self.state) = previous;
        }
    }
}

fn decode_all(raws: Vec<RawFailure>) -> CleanerResult<Vec<FailureRecord>> {
    raws.iter()
        .map(|raw| FailureRecord::decode(raw).map_err(Into::into))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CleanerError;
    use crate::failures::InMemoryFailureList;
    use proptest::prelude::*;
    use serde_json::json;

    fn failure(n: usize) -> FailureRecord {
        FailureRecord::new("jobs", "BadJob", vec![json!(n)]).with_failed_at("2010/11/13 00:00:00 UTC")
    }

    fn list_of(n: usize) -> InMemoryFailureList {
        let list = InMemoryFailureList::new();
        for i in 0..n {
            list.push_record(&failure(i)).unwrap();
        }
        list
    }

    fn arg(record: &FailureRecord) -> i64 {
        record.args()[0].as_i64().unwrap()
    }

    #[test]
    fn unlimited_window_covers_whole_list() {
        let list = list_of(5);
        let limiter = Limiter::new(10);
        assert_eq!(limiter.count(&list).unwrap(), 5);
        assert_eq!(limiter.start_index(&list).unwrap(), 0);
        assert!(!limiter.is_over_limit(&list).unwrap());
        assert_eq!(limiter.jobs(&list).unwrap().len(), 5);
    }

    #[test]
    fn limited_window_covers_newest_entries() {
        let list = list_of(12);
        let limiter = Limiter::new(5);
        assert_eq!(limiter.count(&list).unwrap(), 5);
        assert_eq!(limiter.start_index(&list).unwrap(), 7);
        assert!(limiter.is_over_limit(&list).unwrap());

        let args: Vec<i64> = limiter.jobs(&list).unwrap().iter().map(arg).collect();
        assert_eq!(args, vec![7, 8, 9, 10, 11]);
    }

    #[test]
    fn empty_list_yields_empty_window() {
        let list = InMemoryFailureList::new();
        let limiter = Limiter::new(5);
        assert!(limiter.jobs(&list).unwrap().is_empty());
        limiter
            .with_lock(&list, || {
                assert!(limiter.jobs(&list)?.is_empty());
                assert_eq!(limiter.start_index(&list)?, 0);
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn zero_maximum_sees_nothing() {
        let list = list_of(3);
        let limiter = Limiter::new(0);
        assert!(limiter.jobs(&list).unwrap().is_empty());
        assert_eq!(limiter.start_index(&list).unwrap(), 3);
    }

    #[test]
    fn locked_window_ignores_concurrent_appends() {
        let list = list_of(8);
        let limiter = Limiter::new(5);

        limiter
            .with_lock(&list, || {
                let before = limiter.jobs(&list)?;
                for i in 100..110 {
                    list.push_record(&failure(i))?;
                }
                assert_eq!(limiter.jobs(&list)?, before);
                assert_eq!(limiter.count(&list)?, 5);
                assert_eq!(limiter.start_index(&list)?, 3);
                Ok(())
            })
            .unwrap();

        assert!(!limiter.is_locked());
        let args: Vec<i64> = limiter.jobs(&list).unwrap().iter().map(arg).collect();
        assert_eq!(args, vec![105, 106, 107, 108, 109]);
        assert_eq!(limiter.start_index(&list).unwrap(), 13);
    }

    #[test]
    fn nested_lock_reuses_outer_snapshot() {
        let list = list_of(4);
        let limiter = Limiter::new(10);

        limiter
            .with_lock(&list, || {
                list.push_record(&failure(99))?;
                limiter.with_lock(&list, || {
                    assert_eq!(limiter.count(&list)?, 4);
                    Ok(())
                })?;
                // Inner scope exit must not unlock the outer one.
                assert!(limiter.is_locked());
                assert_eq!(limiter.count(&list)?, 4);
                Ok(())
            })
            .unwrap();

        assert!(!limiter.is_locked());
        assert_eq!(limiter.count(&list).unwrap(), 5);
    }

    #[test]
    fn lock_is_released_when_body_fails() {
        let list = list_of(2);
        let limiter = Limiter::new(10);

        let result: CleanerResult<()> = limiter.with_lock(&list, || {
            Err(CleanerError::MissingQueue { index: 0 })
        });
        assert!(result.is_err());
        assert!(!limiter.is_locked());
    }

    #[test]
    fn lock_is_released_when_body_panics() {
        let list = list_of(2);
        let limiter = Limiter::new(10);

        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _: CleanerResult<()> = limiter.with_lock(&list, || panic!("boom"));
        }));
        assert!(outcome.is_err());
        assert!(!limiter.is_locked());
    }

    #[test]
    fn undecodable_entries_fail_loudly() {
        let list = list_of(2);
        list.push("{not json").unwrap();
        let limiter = Limiter::new(10);
        assert!(matches!(limiter.jobs(&list), Err(CleanerError::Record(_))));
        assert!(limiter.with_lock(&list, || Ok(())).is_err());
    }

    proptest! {
        #[test]
        fn window_is_newest_min_len_max_in_order(len in 0usize..40, maximum in 0usize..40) {
            let list = list_of(len);
            let limiter = Limiter::new(maximum);

            let expected: Vec<i64> = (len.saturating_sub(maximum)..len).map(|i| i as i64).collect();
            let unlocked: Vec<i64> = limiter.jobs(&list).unwrap().iter().map(arg).collect();
            prop_assert_eq!(&unlocked, &expected);

            let locked: Vec<i64> = limiter
                .with_lock(&list, || Ok(limiter.jobs(&list)?.iter().map(arg).collect()))
                .unwrap();
            prop_assert_eq!(locked, expected);
        }
    }
}
