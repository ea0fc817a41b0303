use crate::storage::{Change, KeyValueStore, StorageError, StoredValue};
use fnv::FnvHashMap;
use std::sync::{PoisonError, RwLock};

/// An in-memory backend, mostly useful for tests and short-lived processes.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: RwLock<FnvHashMap<String, StoredValue>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored values, still counted after a writer panicked.
    pub fn len(&self) -> usize {
        self.values
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn unavailable<T>(e: PoisonError<T>) -> StorageError {
    StorageError::Unavailable(e.to_string())
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<StoredValue>, StorageError> {
        Ok(self.values.read().map_err(unavailable)?.get(key).cloned())
    }

    fn set(&self, key: &str, value: StoredValue) -> Result<(), StorageError> {
        self.values
            .write()
            .map_err(unavailable)?
            .insert(key.to_string(), value);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.values.write().map_err(unavailable)?.remove(key);
        Ok(())
    }

    fn apply(&self, changes: Vec<Change>) -> Result<(), StorageError> {
        let mut values = self.values.write().map_err(unavailable)?;
        for change in changes {
            match change {
                Change::Set(key, value) => {
                    values.insert(key, value);
                }
                Change::Remove(key) => {
                    values.remove(&key);
                }
            }
        }
        Ok(())
    }
}
