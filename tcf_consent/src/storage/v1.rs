use crate::storage::{
    binary_string, get_text, Change, ConsentStorage, GdprApplies, KeyValueStore, StorageError,
    StoredValue,
};
use crate::tcf::ConsentStringV1;
use log::{debug, warn};

pub const CONSENT_STRING: &str = "IABConsent_ConsentString";
pub const SUBJECT_TO_GDPR: &str = "IABConsent_SubjectToGDPR";
pub const CMP_PRESENT: &str = "IABConsent_CMPPresent";
pub const PARSED_PURPOSE_CONSENTS: &str = "IABConsent_ParsedPurposeConsents";
pub const PARSED_VENDOR_CONSENTS: &str = "IABConsent_ParsedVendorConsents";

const PURPOSES: usize = 24;

/// Stores TCF v1 consent strings under `IABConsent_` keys.
#[derive(Debug, Default)]
pub struct TcfV1Storage<S> {
    store: S,
}

impl<S: KeyValueStore> TcfV1Storage<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn into_inner(self) -> S {
        self.store
    }
}

/// The change recording whether GDPR applies, as a `0` or `1` string.
pub(crate) fn gdpr_applies_change(applies: GdprApplies) -> Change {
    let key = SUBJECT_TO_GDPR.to_string();
    match applies {
        GdprApplies::Unset => Change::Remove(key),
        GdprApplies::No => Change::Set(key, "0".into()),
        GdprApplies::Yes => Change::Set(key, "1".into()),
    }
}

impl<S: KeyValueStore> ConsentStorage for TcfV1Storage<S> {
    type Model = ConsentStringV1;

    fn save(&self, model: &ConsentStringV1) -> Result<(), StorageError> {
        let vendors = &model.vendor_consents;
        let changes = vec![
            Change::Set(CONSENT_STRING.to_string(), model.encode()?.into()),
            Change::Set(CMP_PRESENT.to_string(), StoredValue::Integer(1)),
            Change::Set(
                PARSED_PURPOSE_CONSENTS.to_string(),
                binary_string(&model.purposes_allowed, PURPOSES).into(),
            ),
            Change::Set(
                PARSED_VENDOR_CONSENTS.to_string(),
                binary_string(&vendors.ids, vendors.max_vendor_id as usize).into(),
            ),
        ];
        debug!(
            "saving TCF v1 consent from CMP {} for {} vendors",
            model.cmp_id,
            vendors.len()
        );
        self.store.apply(changes)
    }

    fn load(&self) -> Result<Option<ConsentStringV1>, StorageError> {
        let Some(s) = get_text(&self.store, CONSENT_STRING)? else {
            return Ok(None);
        };
        s.parse().map(Some).map_err(|source| {
            warn!("invalid consent string stored in {CONSENT_STRING}: {source}");
            StorageError::InvalidConsentString {
                key: CONSENT_STRING.to_string(),
                source,
            }
        })
    }

    fn save_gdpr_applies(&self, applies: GdprApplies) -> Result<(), StorageError> {
        self.store.apply(vec![gdpr_applies_change(applies)])
    }

    fn load_gdpr_applies(&self) -> Result<GdprApplies, StorageError> {
        match get_text(&self.store, SUBJECT_TO_GDPR)?.as_deref() {
            None => Ok(GdprApplies::Unset),
            Some("0") => Ok(GdprApplies::No),
            Some("1") => Ok(GdprApplies::Yes),
            Some(_) => Err(StorageError::UnexpectedType {
                key: SUBJECT_TO_GDPR.to_string(),
            }),
        }
    }

    fn clear(&self) -> Result<(), StorageError> {
        let changes = [
            CONSENT_STRING,
            SUBJECT_TO_GDPR,
            CMP_PRESENT,
            PARSED_PURPOSE_CONSENTS,
            PARSED_VENDOR_CONSENTS,
        ]
        .into_iter()
        .map(|key| Change::Remove(key.to_string()))
        .collect();
        self.store.apply(changes)
    }
}
