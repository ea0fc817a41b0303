//! Decoding and storing consent strings in a single call.
use crate::storage::{
    v1, v2, ConsentStorage, GdprApplies, KeyValueStore, StorageError, TcfV1Storage, TcfV2Storage,
};
use crate::tcf::{ConsentStringV1, ConsentStringV2, TcString, TcfDecodeError};
use log::debug;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ApiError {
    #[error("decode error: {0}")]
    Decode(#[from] TcfDecodeError),
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Entry point for applications receiving consent strings from a CMP.
///
/// Both TCF versions are stored in the same backend, each in its own namespace.
///
/// # Example
///
/// ```
/// # use std::error::Error;
/// #
/// # fn main() -> Result<(), Box<dyn Error>> {
/// use tcf_consent::api::TcfApi;
/// use tcf_consent::storage::{GdprApplies, MemoryStore};
///
/// let api = TcfApi::new(MemoryStore::new());
/// api.set_consent_string("CPXxRfAPXxRfAAfKABENB-CgAAAAAAAAAAYgAAAAAAAA")?;
/// api.set_gdpr_applies(GdprApplies::Yes)?;
///
/// let consent = api.consent_v2()?.ok_or("missing consent")?;
/// assert!(consent.core.is_service_specific);
/// assert_eq!(api.consent_v1()?, None);
/// assert_eq!(api.gdpr_applies()?, GdprApplies::Yes);
/// # Ok(())
/// # }
/// ```
pub struct TcfApi<S> {
    v1: TcfV1Storage<Arc<S>>,
    v2: TcfV2Storage<Arc<S>>,
}

impl<S: KeyValueStore> TcfApi<S> {
    pub fn new(store: S) -> Self {
        Self::with_shared_store(Arc::new(store))
    }

    pub fn with_shared_store(store: Arc<S>) -> Self {
        Self {
            v1: TcfV1Storage::new(Arc::clone(&store)),
            v2: TcfV2Storage::new(store),
        }
    }

    pub fn store(&self) -> &S {
        self.v2.store()
    }

    /// Decodes a consent string of any version and saves it in the matching namespace.
    ///
    /// # Errors
    ///
    /// Nothing is stored if the string cannot be decoded.
    pub fn set_consent_string(&self, s: &str) -> Result<TcString, ApiError> {
        let tc_string: TcString = s.parse()?;
        match &tc_string {
            TcString::V1(cs) => self.v1.save(cs)?,
            TcString::V2(cs) => self.v2.save(cs)?,
        }
        debug!("stored TCF v{} consent string", tc_string.version());
        Ok(tc_string)
    }

    pub fn consent_v1(&self) -> Result<Option<ConsentStringV1>, ApiError> {
        Ok(self.v1.load()?)
    }

    pub fn consent_v2(&self) -> Result<Option<ConsentStringV2>, ApiError> {
        Ok(self.v2.load()?)
    }

    /// Saves the GDPR flag in both namespaces, as a single batch of changes.
    pub fn set_gdpr_applies(&self, applies: GdprApplies) -> Result<(), ApiError> {
        self.store().apply(vec![
            v1::gdpr_applies_change(applies),
            v2::gdpr_applies_change(applies),
        ])?;
        Ok(())
    }

    /// Returns the TCF v2 GDPR flag, or the TCF v1 one if the former is unset.
    pub fn gdpr_applies(&self) -> Result<GdprApplies, ApiError> {
        match self.v2.load_gdpr_applies()? {
            GdprApplies::Unset => Ok(self.v1.load_gdpr_applies()?),
            applies => Ok(applies),
        }
    }

    /// Removes everything stored for both versions.
    pub fn clear(&self) -> Result<(), ApiError> {
        self.v1.clear()?;
        self.v2.clear()?;
        Ok(())
    }
}
