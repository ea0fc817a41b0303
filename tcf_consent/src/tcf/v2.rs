//! TCF v2 consent strings.
//!
//! A v2 string is made of a mandatory core segment, optionally followed by other segments,
//! all separated by `.` characters. Each segment is base64 encoded on its own, and every
//! segment but the core one starts with a 3 bit segment type.
//!
//! # Example
//!
//! ```
//! use tcf_consent::tcf::v2::ConsentStringV2;
//!
//! let cs: ConsentStringV2 = "COvFyGBOvFyGBAbAAAENAPCAAOAAAAAAAAAAAEEUACCKAAA.ZAAgH9794ulA"
//!     .parse()
//!     .unwrap();
//! assert_eq!(cs.core.cmp_id, 27);
//! assert!(cs.core.vendor_consents.contains(6));
//! assert_eq!(cs.publisher_purposes().map(|p| p.custom_purpose_count), Some(5));
//! ```
use crate::core::{BitReader, BitWriter, DataRead, DataWrite, FromDataReader, ToDataWriter};
use crate::tcf::restrictions::{read_publisher_restrictions, write_publisher_restrictions};
use crate::tcf::vendors::{read_vendor_set, write_vendor_set};
use crate::tcf::{
    check_ids, check_letters, decoded_letters, to_base64_str, Base64EncodedStr, IdSet, PublisherRestriction,
    RestrictionType, TcfDecodeError, TcfEncodeError, VendorSet,
};
use log::debug;
use num_derive::{FromPrimitive, ToPrimitive};
use num_traits::{FromPrimitive, ToPrimitive};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::str::FromStr;
use strum_macros::Display;

pub const TCF_V2_VERSION: u8 = 2;

const VERSION_BITS: u32 = 6;
const CMP_ID_BITS: u32 = 12;
const CMP_VERSION_BITS: u32 = 12;
const CONSENT_SCREEN_BITS: u32 = 6;
const VENDOR_LIST_VERSION_BITS: u32 = 12;
const POLICY_VERSION_BITS: u32 = 6;
const SEGMENT_TYPE_BITS: u32 = 3;
const CUSTOM_PURPOSE_COUNT_BITS: u32 = 6;
const SPECIAL_FEATURES: u16 = 12;
const PURPOSES: u16 = 24;

#[derive(Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ConsentStringV2 {
    pub core: Core,
    /// Optional segments, in wire order.
    pub segments: Vec<Segment>,
}

impl ConsentStringV2 {
    pub fn new(core: Core) -> Self {
        Self {
            core,
            segments: vec![],
        }
    }

    /// Encodes this consent string, each segment in its shortest representation.
    ///
    /// # Errors
    ///
    /// Fails if a field does not fit in its wire representation, or if the same segment
    /// type appears more than once.
    pub fn encode(&self) -> Result<String, TcfEncodeError> {
        let mut seen = BTreeSet::new();
        let mut parts = vec![to_base64_str(&self.core)?];
        for segment in &self.segments {
            let segment_type = segment.segment_type();
            if !seen.insert(segment_type) {
                return Err(TcfEncodeError::DuplicateSegment {
                    segment_type: segment_type.to_u8().unwrap_or_default(),
                });
            }
            parts.push(to_base64_str(segment)?);
        }
        Ok(parts.join("."))
    }

    pub fn disclosed_vendors(&self) -> Option<&VendorSet> {
        self.segments.iter().find_map(|s| match s {
            Segment::DisclosedVendors(v) => Some(v),
            _ => None,
        })
    }

    pub fn allowed_vendors(&self) -> Option<&VendorSet> {
        self.segments.iter().find_map(|s| match s {
            Segment::AllowedVendors(v) => Some(v),
            _ => None,
        })
    }

    pub fn publisher_purposes(&self) -> Option<&PublisherPurposes> {
        self.segments.iter().find_map(|s| match s {
            Segment::PublisherPurposes(p) => Some(p),
            _ => None,
        })
    }
}

impl FromStr for ConsentStringV2 {
    type Err = TcfDecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split('.');
        let core: Core = parts.next().unwrap_or_default().parse_base64_str()?;

        let mut seen = BTreeSet::new();
        let mut segments = vec![];
        for part in parts {
            let segment: Segment = part.parse_base64_str()?;
            let segment_type = segment.segment_type();
            if !seen.insert(segment_type) {
                return Err(TcfDecodeError::DuplicateSegment {
                    segment_type: segment_type.to_u8().unwrap_or_default(),
                });
            }
            segments.push(segment);
        }

        debug!(
            "decoded TCF v2 string from CMP {} with {} optional segments",
            core.cmp_id,
            segments.len()
        );
        Ok(Self { core, segments })
    }
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Core {
    /// Creation time, in deciseconds since the Unix epoch.
    pub created: u64,
    /// Last update time, in deciseconds since the Unix epoch.
    pub last_updated: u64,
    pub cmp_id: u16,
    pub cmp_version: u16,
    pub consent_screen: u8,
    pub consent_language: String,
    pub vendor_list_version: u16,
    pub policy_version: u8,
    pub is_service_specific: bool,
    pub use_non_standard_stacks: bool,
    pub special_feature_optins: IdSet,
    pub purpose_consents: IdSet,
    pub purpose_legitimate_interests: IdSet,
    pub purpose_one_treatment: bool,
    pub publisher_country_code: String,
    pub vendor_consents: VendorSet,
    pub vendor_legitimate_interests: VendorSet,
    pub publisher_restrictions: Vec<PublisherRestriction>,
}

impl Core {
    /// Returns the type of the first restriction set on a vendor for a purpose, if any.
    pub fn restriction_for(&self, vendor_id: u16, purpose_id: u8) -> Option<RestrictionType> {
        self.publisher_restrictions
            .iter()
            .find(|r| r.purpose_id == purpose_id && r.applies_to(vendor_id))
            .map(|r| r.restriction_type)
    }
}

impl FromDataReader for Core {
    type Err = TcfDecodeError;

    fn from_data_reader(r: &mut BitReader) -> Result<Self, Self::Err> {
        let version = r.read_unsigned::<u8>(VERSION_BITS)?;
        if version != TCF_V2_VERSION {
            return Err(TcfDecodeError::UnsupportedVersion {
                expected: TCF_V2_VERSION,
                found: version,
            });
        }

        Ok(Self {
            created: r.read_timestamp()?,
            last_updated: r.read_timestamp()?,
            cmp_id: r.read_unsigned(CMP_ID_BITS)?,
            cmp_version: r.read_unsigned(CMP_VERSION_BITS)?,
            consent_screen: r.read_unsigned(CONSENT_SCREEN_BITS)?,
            consent_language: decoded_letters("consent language", r.read_string(2)?)?,
            vendor_list_version: r.read_unsigned(VENDOR_LIST_VERSION_BITS)?,
            policy_version: r.read_unsigned(POLICY_VERSION_BITS)?,
            is_service_specific: r.read_bit()?,
            use_non_standard_stacks: r.read_bit()?,
            special_feature_optins: r.read_fixed_bitfield(SPECIAL_FEATURES as usize)?,
            purpose_consents: r.read_fixed_bitfield(PURPOSES as usize)?,
            purpose_legitimate_interests: r.read_fixed_bitfield(PURPOSES as usize)?,
            purpose_one_treatment: r.read_bit()?,
            publisher_country_code: decoded_letters(
                "publisher country code",
                r.read_string(2)?,
            )?,
            vendor_consents: read_vendor_set(r)?,
            vendor_legitimate_interests: read_vendor_set(r)?,
            publisher_restrictions: read_publisher_restrictions(r)?,
        })
    }
}

impl Core {
    /// Writes every field up to the publisher country code.
    fn write_header(&self, w: &mut BitWriter) -> Result<(), TcfEncodeError> {
        check_letters("consent language", &self.consent_language)?;
        check_letters("publisher country code", &self.publisher_country_code)?;
        check_ids(
            "special feature opt-ins",
            &self.special_feature_optins,
            SPECIAL_FEATURES,
        )?;
        check_ids("purpose consents", &self.purpose_consents, PURPOSES)?;
        check_ids(
            "purpose legitimate interests",
            &self.purpose_legitimate_interests,
            PURPOSES,
        )?;

        w.write_bits(u64::from(TCF_V2_VERSION), VERSION_BITS)?;
        w.write_timestamp(self.created)?;
        w.write_timestamp(self.last_updated)?;
        w.write_bits(u64::from(self.cmp_id), CMP_ID_BITS)?;
        w.write_bits(u64::from(self.cmp_version), CMP_VERSION_BITS)?;
        w.write_bits(u64::from(self.consent_screen), CONSENT_SCREEN_BITS)?;
        w.write_string(&self.consent_language)?;
        w.write_bits(
            u64::from(self.vendor_list_version),
            VENDOR_LIST_VERSION_BITS,
        )?;
        w.write_bits(u64::from(self.policy_version), POLICY_VERSION_BITS)?;
        w.write_bit(self.is_service_specific)?;
        w.write_bit(self.use_non_standard_stacks)?;
        w.write_fixed_bitfield(&self.special_feature_optins, SPECIAL_FEATURES as usize)?;
        w.write_fixed_bitfield(&self.purpose_consents, PURPOSES as usize)?;
        w.write_fixed_bitfield(&self.purpose_legitimate_interests, PURPOSES as usize)?;
        w.write_bit(self.purpose_one_treatment)?;
        w.write_string(&self.publisher_country_code)?;
        Ok(())
    }
}

impl ToDataWriter for Core {
    type Err = TcfEncodeError;

    fn to_data_writer(&self, w: &mut BitWriter) -> Result<(), Self::Err> {
        self.write_header(w)?;
        write_vendor_set(w, "vendor consents", &self.vendor_consents)?;
        write_vendor_set(
            w,
            "vendor legitimate interests",
            &self.vendor_legitimate_interests,
        )?;
        write_publisher_restrictions(w, &self.publisher_restrictions)
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, FromPrimitive, ToPrimitive, Display)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum SegmentType {
    Core = 0,
    DisclosedVendors = 1,
    AllowedVendors = 2,
    PublisherPurposes = 3,
}

#[derive(Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Segment {
    DisclosedVendors(VendorSet),
    AllowedVendors(VendorSet),
    PublisherPurposes(PublisherPurposes),
}

impl Segment {
    pub fn segment_type(&self) -> SegmentType {
        match self {
            Self::DisclosedVendors(_) => SegmentType::DisclosedVendors,
            Self::AllowedVendors(_) => SegmentType::AllowedVendors,
            Self::PublisherPurposes(_) => SegmentType::PublisherPurposes,
        }
    }
}

impl FromDataReader for Segment {
    type Err = TcfDecodeError;

    fn from_data_reader(r: &mut BitReader) -> Result<Self, Self::Err> {
        let segment_type = r.read_unsigned::<u8>(SEGMENT_TYPE_BITS)?;
        match SegmentType::from_u8(segment_type) {
            Some(SegmentType::DisclosedVendors) => Ok(Self::DisclosedVendors(read_vendor_set(r)?)),
            Some(SegmentType::AllowedVendors) => Ok(Self::AllowedVendors(read_vendor_set(r)?)),
            Some(SegmentType::PublisherPurposes) => Ok(Self::PublisherPurposes(r.parse()?)),
            Some(SegmentType::Core) | None => Err(TcfDecodeError::UnknownSegment { segment_type }),
        }
    }
}

impl ToDataWriter for Segment {
    type Err = TcfEncodeError;

    fn to_data_writer(&self, w: &mut BitWriter) -> Result<(), Self::Err> {
        let segment_type = self.segment_type().to_u64().unwrap_or_default();
        w.write_bits(segment_type, SEGMENT_TYPE_BITS)?;
        match self {
            Self::DisclosedVendors(v) => write_vendor_set(w, "disclosed vendors", v),
            Self::AllowedVendors(v) => write_vendor_set(w, "allowed vendors", v),
            Self::PublisherPurposes(p) => w.emit(p),
        }
    }
}

/// Purposes the publisher itself was granted, including its own custom purposes.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PublisherPurposes {
    pub consents: IdSet,
    pub legitimate_interests: IdSet,
    /// Number of custom purposes, which is the width of the two custom bitfields.
    pub custom_purpose_count: u8,
    pub custom_consents: IdSet,
    pub custom_legitimate_interests: IdSet,
}

impl FromDataReader for PublisherPurposes {
    type Err = TcfDecodeError;

    fn from_data_reader(r: &mut BitReader) -> Result<Self, Self::Err> {
        let consents = r.read_fixed_bitfield(PURPOSES as usize)?;
        let legitimate_interests = r.read_fixed_bitfield(PURPOSES as usize)?;
        let custom_purpose_count = r.read_unsigned::<u8>(CUSTOM_PURPOSE_COUNT_BITS)?;

        Ok(Self {
            consents,
            legitimate_interests,
            custom_purpose_count,
            custom_consents: r.read_fixed_bitfield(custom_purpose_count as usize)?,
            custom_legitimate_interests: r.read_fixed_bitfield(custom_purpose_count as usize)?,
        })
    }
}

impl ToDataWriter for PublisherPurposes {
    type Err = TcfEncodeError;

    fn to_data_writer(&self, w: &mut BitWriter) -> Result<(), Self::Err> {
        let n = u16::from(self.custom_purpose_count);
        check_ids("publisher consents", &self.consents, PURPOSES)?;
        check_ids(
            "publisher legitimate interests",
            &self.legitimate_interests,
            PURPOSES,
        )?;
        check_ids("custom purpose consents", &self.custom_consents, n)?;
        check_ids(
            "custom purpose legitimate interests",
            &self.custom_legitimate_interests,
            n,
        )?;

        w.write_fixed_bitfield(&self.consents, PURPOSES as usize)?;
        w.write_fixed_bitfield(&self.legitimate_interests, PURPOSES as usize)?;
        w.write_bits(u64::from(n), CUSTOM_PURPOSE_COUNT_BITS)?;
        w.write_fixed_bitfield(&self.custom_consents, n as usize)?;
        w.write_fixed_bitfield(&self.custom_legitimate_interests, n as usize)?;
        Ok(())
    }
}
