//! Failure list storage abstraction and the in-memory implementation.

use std::sync::{Arc, RwLock};

use sweeper_core::{FailureRecord, RecordError};

/// Stored representation of one failure entry (one JSON document per slot).
pub type RawFailure = String;

/// Append-mostly list holding one entry per failed job.
///
/// Index 0 is the oldest entry. Workers append at the tail concurrently with
/// anything this trait's callers do; implementations provide no transactions.
pub trait FailureList: Send + Sync {
    /// Current number of entries.
    fn len(&self) -> Result<usize, FailureStoreError>;

    /// Read `count` entries starting at `start`.
    ///
    /// A negative `start` counts from the tail (`-1` is the newest entry).
    /// `count == 0` always yields an empty sequence.
    fn range(&self, start: isize, count: usize) -> Result<Vec<RawFailure>, FailureStoreError>;

    /// Read the entry at an absolute index, if there is one.
    fn get(&self, index: usize) -> Result<Option<RawFailure>, FailureStoreError> {
        let start = isize::try_from(index)
            .map_err(|_| FailureStoreError::Storage(format!("index {index} out of range")))?;
        Ok(self.range(start, 1)?.into_iter().next())
    }

    /// Remove the first entry equal to `raw`. Returns how many were removed (0 or 1).
    fn remove_one(&self, raw: &str) -> Result<usize, FailureStoreError>;

    /// Overwrite the entry at an absolute index.
    fn set(&self, index: usize, raw: RawFailure) -> Result<(), FailureStoreError>;

    /// Keep only the newest `n` entries.
    fn trim_to_last(&self, n: usize) -> Result<(), FailureStoreError>;

    fn is_empty(&self) -> Result<bool, FailureStoreError> {
        Ok(self.len()? == 0)
    }
}

/// Failure list storage error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum FailureStoreError {
    #[error("failure store connection error: {0}")]
    Connection(String),
    #[error("failure store command error: {0}")]
    Command(String),
    #[error("storage error: {0}")]
    Storage(String),
}

/// Resolve a possibly negative `start` against a list of `len` entries into
/// the half-open slice bounds it covers.
pub(crate) fn resolve_range(len: usize, start: isize, count: usize) -> (usize, usize) {
    let from = if start < 0 {
        len.saturating_sub(start.unsigned_abs())
    } else {
        start.unsigned_abs().min(len)
    };
    (from, from.saturating_add(count).min(len))
}

/// In-memory failure list for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryFailureList {
    entries: RwLock<Vec<RawFailure>>,
}

impl InMemoryFailureList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Append a raw entry at the tail, as a worker would.
    pub fn push(&self, raw: impl Into<RawFailure>) -> Result<(), FailureStoreError> {
        self.write()?.push(raw.into());
        Ok(())
    }

    /// Encode and append a record.
    pub fn push_record(&self, record: &FailureRecord) -> Result<(), FailureStoreError> {
        let raw = record
            .encode()
            .map_err(|e: RecordError| FailureStoreError::Storage(e.to_string()))?;
        self.push(raw)
    }

    /// Copy of every stored entry, oldest first.
    pub fn entries(&self) -> Result<Vec<RawFailure>, FailureStoreError> {
        Ok(self.read()?.clone())
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, Vec<RawFailure>>, FailureStoreError> {
        self.entries
            .read()
            .map_err(|_| FailureStoreError::Storage("lock poisoned".to_string()))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, Vec<RawFailure>>, FailureStoreError> {
        self.entries
            .write()
            .map_err(|_| FailureStoreError::Storage("lock poisoned".to_string()))
    }
}

impl FailureList for InMemoryFailureList {
    fn len(&self) -> Result<usize, FailureStoreError> {
        Ok(self.read()?.len())
    }

    fn range(&self, start: isize, count: usize) -> Result<Vec<RawFailure>, FailureStoreError> {
        if count == 0 {
            return Ok(Vec::new());
        }
        let entries = self.read()?;
        let (from, to) = resolve_range(entries.len(), start, count);
        Ok(entries[from..to].to_vec())
    }

    fn remove_one(&self, raw: &str) -> Result<usize, FailureStoreError> {
        let mut entries = self.write()?;
        match entries.iter().position(|e| e == raw) {
            Some(pos) => {
                entries.remove(pos);
                Ok(1)
            }
            None => Ok(0),
        }
    }

    fn set(&self, index: usize, raw: RawFailure) -> Result<(), FailureStoreError> {
        let mut entries = self.write()?;
        let len = entries.len();
        let slot = entries
            .get_mut(index)
            .ok_or_else(|| FailureStoreError::Command(format!("index {index} out of range (len {len})")))?;
        *slot = raw;
        Ok(())
    }

    fn trim_to_last(&self, n: usize) -> Result<(), FailureStoreError> {
        let mut entries = self.write()?;
        let excess = entries.len().saturating_sub(n);
        entries.drain(..excess);
        Ok(())
    }
}

impl<T: FailureList + ?Sized> FailureList for Arc<T> {
    fn len(&self) -> Result<usize, FailureStoreError> {
        (**self).len()
    }

    fn range(&self, start: isize, count: usize) -> Result<Vec<RawFailure>, FailureStoreError> {
        (**self).range(start, count)
    }

    fn get(&self, index: usize) -> Result<Option<RawFailure>, FailureStoreError> {
        (**self).get(index)
    }

    fn remove_one(&self, raw: &str) -> Result<usize, FailureStoreError> {
        (**self).remove_one(raw)
    }

    fn set(&self, index: usize, raw: RawFailure) -> Result<(), FailureStoreError> {
        (**self).set(index, raw)
    }

    fn trim_to_last(&self, n: usize) -> Result<(), FailureStoreError> {
        (**self).trim_to_last(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list_of(n: usize) -> InMemoryFailureList {
        let list = InMemoryFailureList::new();
        for i in 0..n {
            list.push(format!("e{i}")).unwrap();
        }
        list
    }

    #[test]
    fn range_reads_from_head_and_tail() {
        let list = list_of(5);
        assert_eq!(list.range(1, 2).unwrap(), vec!["e1", "e2"]);
        assert_eq!(list.range(-2, 2).unwrap(), vec!["e3", "e4"]);
        assert_eq!(list.range(-10, 3).unwrap(), vec!["e0", "e1", "e2"]);
        assert_eq!(list.range(3, 10).unwrap(), vec!["e3", "e4"]);
        assert!(list.range(9, 1).unwrap().is_empty());
        assert!(list.range(0, 0).unwrap().is_empty());
    }

    #[test]
    fn get_reads_single_slot() {
        let list = list_of(3);
        assert_eq!(list.get(2).unwrap().as_deref(), Some("e2"));
        assert_eq!(list.get(3).unwrap(), None);
    }

    #[test]
    fn remove_one_drops_first_equal_entry_only() {
        let list = InMemoryFailureList::new();
        for raw in ["a", "b", "a"] {
            list.push(raw).unwrap();
        }
        assert_eq!(list.remove_one("a").unwrap(), 1);
        assert_eq!(list.entries().unwrap(), vec!["b", "a"]);
        assert_eq!(list.remove_one("zzz").unwrap(), 0);
    }

    #[test]
    fn set_rejects_out_of_range() {
        let list = list_of(2);
        list.set(1, "x".to_string()).unwrap();
        assert_eq!(list.entries().unwrap(), vec!["e0", "x"]);
        assert!(matches!(list.set(2, "y".to_string()), Err(FailureStoreError::Command(_))));
    }

    #[test]
    fn trim_keeps_newest_entries() {
        let list = list_of(5);
        list.trim_to_last(2).unwrap();
        assert_eq!(list.entries().unwrap(), vec!["e3", "e4"]);

        list.trim_to_last(10).unwrap();
        assert_eq!(list.len().unwrap(), 2);

        list.trim_to_last(0).unwrap();
        assert!(list.is_empty().unwrap());
    }
}
