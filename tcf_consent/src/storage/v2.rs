use crate::storage::{
    binary_string, get_integer, get_text, Change, ConsentStorage, GdprApplies, KeyValueStore,
    StorageError, StoredValue,
};
use crate::tcf::{ConsentStringV2, IdSet, PublisherPurposes, VendorSet};
use log::{debug, warn};
use num_traits::{FromPrimitive, ToPrimitive};

pub const TC_STRING: &str = "IABTCF_TCString";
pub const GDPR_APPLIES: &str = "IABTCF_gdprApplies";
pub const CMP_SDK_ID: &str = "IABTCF_CmpSdkID";
pub const CMP_SDK_VERSION: &str = "IABTCF_CmpSdkVersion";
pub const POLICY_VERSION: &str = "IABTCF_PolicyVersion";
pub const PUBLISHER_CC: &str = "IABTCF_PublisherCC";
pub const PURPOSE_ONE_TREATMENT: &str = "IABTCF_PurposeOneTreatment";
pub const USE_NON_STANDARD_STACKS: &str = "IABTCF_UseNonStandardStacks";
pub const VENDOR_CONSENTS: &str = "IABTCF_VendorConsents";
pub const VENDOR_LEGITIMATE_INTERESTS: &str = "IABTCF_VendorLegitimateInterests";
pub const PURPOSE_CONSENTS: &str = "IABTCF_PurposeConsents";
pub const PURPOSE_LEGITIMATE_INTERESTS: &str = "IABTCF_PurposeLegitimateInterests";
pub const SPECIAL_FEATURES_OPT_INS: &str = "IABTCF_SpecialFeaturesOptIns";
pub const PUBLISHER_RESTRICTIONS_PREFIX: &str = "IABTCF_PublisherRestrictions";
pub const PUBLISHER_CONSENT: &str = "IABTCF_PublisherConsent";
pub const PUBLISHER_LEGITIMATE_INTERESTS: &str = "IABTCF_PublisherLegitimateInterests";
pub const PUBLISHER_CUSTOM_PURPOSES_CONSENTS: &str = "IABTCF_PublisherCustomPurposesConsents";
pub const PUBLISHER_CUSTOM_PURPOSES_LEGITIMATE_INTERESTS: &str =
    "IABTCF_PublisherCustomPurposesLegitimateInterests";

const NAMESPACE_KEYS: [&str; 16] = [
    CMP_SDK_ID,
    CMP_SDK_VERSION,
    POLICY_VERSION,
    PUBLISHER_CC,
    PURPOSE_ONE_TREATMENT,
    USE_NON_STANDARD_STACKS,
    VENDOR_CONSENTS,
    VENDOR_LEGITIMATE_INTERESTS,
    PURPOSE_CONSENTS,
    PURPOSE_LEGITIMATE_INTERESTS,
    SPECIAL_FEATURES_OPT_INS,
    PUBLISHER_CONSENT,
    PUBLISHER_LEGITIMATE_INTERESTS,
    PUBLISHER_CUSTOM_PURPOSES_CONSENTS,
    PUBLISHER_CUSTOM_PURPOSES_LEGITIMATE_INTERESTS,
    TC_STRING,
];

const PURPOSES: usize = 24;
const SPECIAL_FEATURES: usize = 12;
const MAX_PURPOSE_ID: u8 = 63;

/// Key holding the restrictions set for a purpose.
pub fn publisher_restrictions_key(purpose_id: u8) -> String {
    format!("{PUBLISHER_RESTRICTIONS_PREFIX}{purpose_id}")
}

/// Stores TCF v2 consent strings under `IABTCF_` keys.
///
/// Besides the TC string itself, saving writes the values most commonly read by vendor SDKs:
/// consents, legitimate interests and publisher restrictions, as strings of `0` and `1`.
#[derive(Debug, Default)]
pub struct TcfV2Storage<S> {
    store: S,
}

impl<S: KeyValueStore> TcfV2Storage<S> {
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

fn vendor_string(set: &VendorSet) -> String {
    binary_string(&set.ids, set.max_vendor_id as usize)
}

/// One character per vendor up to the largest restricted one: the restriction type of the
/// vendor, or `_` when it is not restricted.
fn restrictions_string(cs: &ConsentStringV2, purpose_id: u8) -> Option<String> {
    let restrictions = cs
        .core
        .publisher_restrictions
        .iter()
        .filter(|r| r.purpose_id == purpose_id)
        .map(|r| (r.restriction_type, r.intervals()))
        .collect::<Vec<_>>();
    let max = restrictions
        .iter()
        .filter_map(|(_, intervals)| intervals.last())
        .map(|&(_, end)| end)
        .max()?;

    // the first restriction listing a vendor wins
    let mut s = vec!['_'; max as usize];
    let mut unset = (1..=max).collect::<IdSet>();
    for (restriction_type, intervals) in &restrictions {
        let c = restriction_type
            .to_u8()
            .map_or('_', |t| char::from(b'0' + t));
        for &(start, end) in intervals {
            let ids = unset.range(start..=end).copied().collect::<Vec<_>>();
            for id in ids {
                unset.remove(&id);
                s[id as usize - 1] = c;
            }
        }
    }
    Some(s.into_iter().collect())
}

fn publisher_changes(purposes: Option<&PublisherPurposes>) -> Vec<Change> {
    let Some(p) = purposes else {
        return [
            PUBLISHER_CONSENT,
            PUBLISHER_LEGITIMATE_INTERESTS,
            PUBLISHER_CUSTOM_PURPOSES_CONSENTS,
            PUBLISHER_CUSTOM_PURPOSES_LEGITIMATE_INTERESTS,
        ]
        .into_iter()
        .map(|key| Change::Remove(key.to_string()))
        .collect();
    };

    let custom = p.custom_purpose_count as usize;
    vec![
        set(PUBLISHER_CONSENT, binary_string(&p.consents, PURPOSES)),
        set(
            PUBLISHER_LEGITIMATE_INTERESTS,
            binary_string(&p.legitimate_interests, PURPOSES),
        ),
        set(
            PUBLISHER_CUSTOM_PURPOSES_CONSENTS,
            binary_string(&p.custom_consents, custom),
        ),
        set(
            PUBLISHER_CUSTOM_PURPOSES_LEGITIMATE_INTERESTS,
            binary_string(&p.custom_legitimate_interests, custom),
        ),
    ]
}

/// The change recording whether GDPR applies, as an integer.
pub(crate) fn gdpr_applies_change(applies: GdprApplies) -> Change {
    match applies {
        GdprApplies::Unset => Change::Remove(GDPR_APPLIES.to_string()),
        _ => set(
            GDPR_APPLIES,
            StoredValue::Integer(applies.to_i64().unwrap_or_default()),
        ),
    }
}

fn set(key: &str, value: impl Into<StoredValue>) -> Change {
    Change::Set(key.to_string(), value.into())
}

impl<S: KeyValueStore> ConsentStorage for TcfV2Storage<S> {
    type Model = ConsentStringV2;

    fn save(&self, model: &ConsentStringV2) -> Result<(), StorageError> {
        let core = &model.core;
        let mut changes = vec![
            set(TC_STRING, model.encode()?),
            set(CMP_SDK_ID, i64::from(core.cmp_id)),
            set(CMP_SDK_VERSION, i64::from(core.cmp_version)),
            set(POLICY_VERSION, i64::from(core.policy_version)),
            set(PUBLISHER_CC, core.publisher_country_code.as_str()),
            set(PURPOSE_ONE_TREATMENT, core.purpose_one_treatment),
            set(USE_NON_STANDARD_STACKS, core.use_non_standard_stacks),
            set(VENDOR_CONSENTS, vendor_string(&core.vendor_consents)),
            set(
                VENDOR_LEGITIMATE_INTERESTS,
                vendor_string(&core.vendor_legitimate_interests),
            ),
            set(PURPOSE_CONSENTS, binary_string(&core.purpose_consents, PURPOSES)),
            set(
                PURPOSE_LEGITIMATE_INTERESTS,
                binary_string(&core.purpose_legitimate_interests, PURPOSES),
            ),
            set(
                SPECIAL_FEATURES_OPT_INS,
                binary_string(&core.special_feature_optins, SPECIAL_FEATURES),
            ),
        ];

        for purpose_id in 0..=MAX_PURPOSE_ID {
            let key = publisher_restrictions_key(purpose_id);
            changes.push(match restrictions_string(model, purpose_id) {
                Some(s) => Change::Set(key, StoredValue::Text(s)),
                None => Change::Remove(key),
            });
        }
        changes.extend(publisher_changes(model.publisher_purposes()));

        debug!(
            "saving TCF v2 consent from CMP {} ({} changes)",
            core.cmp_id,
            changes.len()
        );
        self.store.apply(changes)
    }

    fn load(&self) -> Result<Option<ConsentStringV2>, StorageError> {
        let Some(s) = get_text(&self.store, TC_STRING)? else {
            return Ok(None);
        };
        match s.parse() {
            Ok(cs) => Ok(Some(cs)),
            Err(source) => {
                warn!("invalid TC string stored in {TC_STRING}: {source}");
                Err(StorageError::InvalidConsentString {
                    key: TC_STRING.to_string(),
                    source,
                })
            }
        }
    }

    fn save_gdpr_applies(&self, applies: GdprApplies) -> Result<(), StorageError> {
        self.store.apply(vec![gdpr_applies_change(applies)])
    }

    fn load_gdpr_applies(&self) -> Result<GdprApplies, StorageError> {
        match get_integer(&self.store, GDPR_APPLIES)? {
            None => Ok(GdprApplies::Unset),
            Some(n) => GdprApplies::from_i64(n)
                .filter(|&applies| applies != GdprApplies::Unset)
                .ok_or(StorageError::UnexpectedType {
                    key: GDPR_APPLIES.to_string(),
                }),
        }
    }

    fn clear(&self) -> Result<(), StorageError> {
        let changes = NAMESPACE_KEYS
            .iter()
            .map(|key| key.to_string())
            .chain((0..=MAX_PURPOSE_ID).map(publisher_restrictions_key))
            .chain([GDPR_APPLIES.to_string()])
            .map(Change::Remove)
            .collect();
        self.store.apply(changes)
    }
}
