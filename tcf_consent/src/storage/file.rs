use crate::storage::{Change, KeyValueStore, StorageError, StoredValue};
use log::debug;
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

type Values = BTreeMap<String, StoredValue>;

/// A backend persisting values as a JSON object in a file.
///
/// Every modification rewrites the whole file: values are written to a temporary file next
/// to the target, which is then renamed over it. A missing file reads as an empty store.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Every stored value, ordered by key.
    pub fn values(&self) -> Result<Values, StorageError> {
        let _guard = self.lock.lock().map_err(unavailable)?;
        self.read()
    }

    fn read(&self) -> Result<Values, StorageError> {
        match fs::read(&self.path) {
            Ok(bytes) if bytes.is_empty() => Ok(Values::new()),
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Values::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&self, values: &Values) -> Result<(), StorageError> {
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        fs::write(&tmp, serde_json::to_vec_pretty(values)?)?;
        fs::rename(&tmp, &self.path)?;
        debug!("wrote {} values to {}", values.len(), self.path.display());
        Ok(())
    }

    fn modify<F>(&self, f: F) -> Result<(), StorageError>
    where
        F: FnOnce(&mut Values),
    {
        let _guard = self.lock.lock().map_err(unavailable)?;
        let mut values = self.read()?;
        f(&mut values);
        self.write(&values)
    }
}

fn unavailable<T>(e: PoisonError<T>) -> StorageError {
    StorageError::Unavailable(e.to_string())
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, key: &str) -> Result<Option<StoredValue>, StorageError> {
        Ok(self.values()?.remove(key))
    }

    fn set(&self, key: &str, value: StoredValue) -> Result<(), StorageError> {
        self.modify(|values| {
            values.insert(key.to_string(), value);
        })
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.modify(|values| {
            values.remove(key);
        })
    }

    fn apply(&self, changes: Vec<Change>) -> Result<(), StorageError> {
        self.modify(|values| {
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
        })
    }
}
