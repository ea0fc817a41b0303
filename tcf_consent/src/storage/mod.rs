//! Persistence of decoded consent strings.
//!
//! Storage is split in two layers:
//!
//! - [`KeyValueStore`] is the minimal contract a backend must fulfil, implemented here by
//!   [`MemoryStore`] and, with the `serde` feature, by [`JsonFileStore`],
//! - [`ConsentStorage`] saves and loads a consent model on top of any backend, following the
//!   key layout used by IAB in-app CMPs: [`TcfV1Storage`] uses `IABConsent_` keys and
//!   [`TcfV2Storage`] uses `IABTCF_` keys, so both versions can share a backend.
//!
//! # Example
//!
//! ```
//! use tcf_consent::storage::{ConsentStorage, GdprApplies, MemoryStore, TcfV2Storage};
//! use tcf_consent::tcf::ConsentStringV2;
//!
//! let storage = TcfV2Storage::new(MemoryStore::new());
//! assert_eq!(storage.load().unwrap(), None);
//! assert_eq!(storage.load_gdpr_applies().unwrap(), GdprApplies::Unset);
//!
//! let cs: ConsentStringV2 = "CPXxRfAPXxRfAAfKABENB-CgAAAAAAAAAAYgAAAAAAAA".parse().unwrap();
//! storage.save(&cs).unwrap();
//! storage.save_gdpr_applies(GdprApplies::Yes).unwrap();
//! assert_eq!(storage.load().unwrap(), Some(cs));
//! assert_eq!(storage.load_gdpr_applies().unwrap(), GdprApplies::Yes);
//! ```
use crate::tcf::{IdSet, TcfDecodeError, TcfEncodeError};
use num_derive::{FromPrimitive, ToPrimitive};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use std::io;
use std::sync::Arc;
use strum_macros::Display;
use thiserror::Error;

#[cfg(feature = "serde")]
mod file;
mod memory;
pub mod v1;
pub mod v2;

#[cfg(feature = "serde")]
pub use file::JsonFileStore;
pub use memory::MemoryStore;
pub use v1::TcfV1Storage;
pub use v2::TcfV2Storage;

/// Whether GDPR applies to the current user.
#[derive(
    Clone, Copy, Debug, Default, Eq, PartialEq, Hash, FromPrimitive, ToPrimitive, Display,
)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum GdprApplies {
    #[default]
    Unset = -1,
    No = 0,
    Yes = 1,
}

impl From<bool> for GdprApplies {
    fn from(applies: bool) -> Self {
        if applies { Self::Yes } else { Self::No }
    }
}

/// A value held by a [`KeyValueStore`].
#[derive(Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(untagged))]
pub enum StoredValue {
    Text(String),
    Integer(i64),
}

impl From<String> for StoredValue {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<&str> for StoredValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<i64> for StoredValue {
    fn from(n: i64) -> Self {
        Self::Integer(n)
    }
}

impl From<bool> for StoredValue {
    fn from(b: bool) -> Self {
        Self::Integer(i64::from(b))
    }
}

/// A single modification applied by [`KeyValueStore::apply`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Change {
    Set(String, StoredValue),
    Remove(String),
}

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum StorageError {
    /// The backend cannot be used, for instance after a thread panicked while holding it.
    #[error("storage unavailable: {0}")]
    Unavailable(String),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("unexpected value type for key {key}")]
    UnexpectedType { key: String },
    #[error("invalid consent string stored in {key}")]
    InvalidConsentString {
        key: String,
        #[source]
        source: TcfDecodeError,
    },
    #[error("cannot encode consent string: {0}")]
    Encode(#[from] TcfEncodeError),
    #[cfg(feature = "serde")]
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// The contract a storage backend must fulfil.
///
/// Methods take `&self`: backends are expected to be shared and to synchronize access
/// internally.
pub trait KeyValueStore {
    fn get(&self, key: &str) -> Result<Option<StoredValue>, StorageError>;

    fn set(&self, key: &str, value: StoredValue) -> Result<(), StorageError>;

    fn remove(&self, key: &str) -> Result<(), StorageError>;

    /// Applies changes in order. Backends able to do so apply them atomically.
    fn apply(&self, changes: Vec<Change>) -> Result<(), StorageError> {
        for change in changes {
            match change {
                Change::Set(key, value) => self.set(&key, value)?,
                Change::Remove(key) => self.remove(&key)?,
            }
        }
        Ok(())
    }
}

impl<S: KeyValueStore + ?Sized> KeyValueStore for &S {
    fn get(&self, key: &str) -> Result<Option<StoredValue>, StorageError> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: StoredValue) -> Result<(), StorageError> {
        (**self).set(key, value)
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        (**self).remove(key)
    }

    fn apply(&self, changes: Vec<Change>) -> Result<(), StorageError> {
        (**self).apply(changes)
    }
}

impl<S: KeyValueStore + ?Sized> KeyValueStore for Arc<S> {
    fn get(&self, key: &str) -> Result<Option<StoredValue>, StorageError> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: StoredValue) -> Result<(), StorageError> {
        (**self).set(key, value)
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        (**self).remove(key)
    }

    fn apply(&self, changes: Vec<Change>) -> Result<(), StorageError> {
        (**self).apply(changes)
    }
}

/// Saves and loads one version of consent model.
pub trait ConsentStorage {
    type Model;

    /// Stores a model, replacing whatever was stored before.
    fn save(&self, model: &Self::Model) -> Result<(), StorageError>;

    /// Loads the stored model, or `None` if nothing was ever saved.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::InvalidConsentString`] if the stored string cannot be
    /// decoded.
    fn load(&self) -> Result<Option<Self::Model>, StorageError>;

    fn save_gdpr_applies(&self, applies: GdprApplies) -> Result<(), StorageError>;

    /// Returns [`GdprApplies::Unset`] unless a value was saved.
    fn load_gdpr_applies(&self) -> Result<GdprApplies, StorageError>;

    /// Removes every stored key, including the GDPR flag.
    fn clear(&self) -> Result<(), StorageError>;
}

/// Renders ids as a string of `0` and `1`, where position `n` stands for id `n + 1`.
pub(crate) fn binary_string(ids: &IdSet, len: usize) -> String {
    (1..=len)
        .map(|id| if ids.contains(&(id as u16)) { '1' } else { '0' })
        .collect()
}

pub(crate) fn get_text(
    store: &impl KeyValueStore,
    key: &str,
) -> Result<Option<String>, StorageError> {
    match store.get(key)? {
        Some(StoredValue::Text(s)) => Ok(Some(s)),
        Some(StoredValue::Integer(_)) => Err(StorageError::UnexpectedType {
            key: key.to_string(),
        }),
        None => Ok(None),
    }
}

pub(crate) fn get_integer(
    store: &impl KeyValueStore,
    key: &str,
) -> Result<Option<i64>, StorageError> {
    match store.get(key)? {
        Some(StoredValue::Integer(n)) => Ok(Some(n)),
        Some(StoredValue::Text(_)) => Err(StorageError::UnexpectedType {
            key: key.to_string(),
        }),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tcf::TcString;
    use num_traits::{FromPrimitive, ToPrimitive};
    use test_case::test_case;

    #[test_case(-1 => Some(GdprApplies::Unset))]
    #[test_case(0 => Some(GdprApplies::No))]
    #[test_case(1 => Some(GdprApplies::Yes))]
    #[test_case(2 => None)]
    fn gdpr_applies_from_i64(n: i64) -> Option<GdprApplies> {
        GdprApplies::from_i64(n)
    }

    #[test]
    fn gdpr_applies_default() {
        assert_eq!(GdprApplies::default(), GdprApplies::Unset);
        assert_eq!(GdprApplies::Unset.to_i64(), Some(-1));
        assert_eq!(GdprApplies::from(true), GdprApplies::Yes);
        assert_eq!(GdprApplies::No.to_string(), "No");
    }

    #[test_case(&[], 3 => "000")]
    #[test_case(&[1, 3], 4 => "1010")]
    #[test_case(&[5], 0 => "")]
    fn binary(ids: &[u16], len: usize) -> String {
        binary_string(&ids.iter().copied().collect(), len)
    }

    #[test]
    fn typed_getters() {
        let store = MemoryStore::new();
        store.set("text", "a".into()).unwrap();
        store.set("int", StoredValue::Integer(1)).unwrap();
        assert_eq!(get_text(&store, "text").unwrap(), Some("a".to_string()));
        assert_eq!(get_integer(&store, "int").unwrap(), Some(1));
        assert_eq!(get_text(&store, "missing").unwrap(), None);
        assert!(matches!(
            get_text(&store, "int"),
            Err(StorageError::UnexpectedType { .. })
        ));
    }

    #[test]
    fn shared_backend() {
        let store = Arc::new(MemoryStore::new());
        let v1 = TcfV1Storage::new(Arc::clone(&store));
        let v2 = TcfV2Storage::new(Arc::clone(&store));
        let TcString::V1(cs1) = "BOEFEAyOEFEAyAHABDENAI4AAAB9vABAASA".parse().unwrap() else {
            panic!("expected a v1 string");
        };
        let TcString::V2(cs2) = "CPXxRfAPXxRfAAfKABENB-CgAAAAAAAAAAYgAAAAAAAA".parse().unwrap()
        else {
            panic!("expected a v2 string");
        };

        v2.save(&cs2).unwrap();
        v1.save(&cs1).unwrap();
        assert_eq!(v2.load().unwrap(), Some(cs2.clone()));

        v1.clear().unwrap();
        assert_eq!(v1.load().unwrap(), None);
        assert_eq!(v2.load().unwrap(), Some(cs2));

        v2.save_gdpr_applies(GdprApplies::No).unwrap();
        assert_eq!(v1.load_gdpr_applies().unwrap(), GdprApplies::Unset);
    }

    #[test]
    fn storage_by_reference() {
        let store = MemoryStore::new();
        let storage = TcfV2Storage::new(&store);
        storage.save_gdpr_applies(GdprApplies::Yes).unwrap();
        assert_eq!(store.get("IABTCF_gdprApplies").unwrap(), Some(StoredValue::Integer(1)));
    }
}
