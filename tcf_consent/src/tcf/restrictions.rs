//! Publisher restrictions, found at the end of a TCF v2 core segment.
use crate::core::{BitReader, BitWriter, DataRead, DataWrite, FromDataReader, ToDataWriter};
use crate::tcf::{
    compact_ranges, expand_intervals, merge_entries, normalize_entries, validate_entries, IdSet,
    RangeEntry, TcfDecodeError, TcfEncodeError,
};
use num_derive::{FromPrimitive, ToPrimitive};
use num_traits::{FromPrimitive, ToPrimitive};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use strum_macros::Display;

const RESTRICTION_COUNT_BITS: u32 = 12;
const PURPOSE_ID_BITS: u32 = 6;
const RESTRICTION_TYPE_BITS: u32 = 2;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, FromPrimitive, ToPrimitive, Display)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum RestrictionType {
    NotAllowed = 0,
    RequireConsent = 1,
    RequireLegitimateInterest = 2,
    Undefined = 3,
}

/// A restriction set by the publisher on how vendors may process data for a purpose.
#[derive(Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PublisherRestriction {
    pub purpose_id: u8,
    pub restriction_type: RestrictionType,
    /// Restricted vendors, as found on the wire.
    pub vendors: Vec<RangeEntry>,
}

impl PublisherRestriction {
    pub fn new(purpose_id: u8, restriction_type: RestrictionType, vendor_ids: &IdSet) -> Self {
        Self {
            purpose_id,
            restriction_type,
            vendors: compact_ranges(vendor_ids.iter().copied()),
        }
    }

    /// Every restricted vendor id.
    pub fn vendor_ids(&self) -> IdSet {
        expand_intervals(&self.intervals())
    }

    /// Restricted vendors as sorted, disjoint and non adjacent `(start, end)` pairs.
    pub(crate) fn intervals(&self) -> Vec<(u16, u16)> {
        merge_entries(&self.vendors, 1, u16::MAX)
    }

    pub fn applies_to(&self, vendor_id: u16) -> bool {
        self.vendors.iter().any(|e| e.contains(vendor_id))
    }
}

impl FromDataReader for PublisherRestriction {
    type Err = TcfDecodeError;

    fn from_data_reader(r: &mut BitReader) -> Result<Self, Self::Err> {
        let purpose_id = r.read_unsigned::<u8>(PURPOSE_ID_BITS)?;
        let restriction_type = RestrictionType::from_u8(r.read_unsigned(RESTRICTION_TYPE_BITS)?)
            .unwrap_or(RestrictionType::Undefined);
        // Overlapping or reversed entries are merged so the restriction can be written back.
        let vendors = normalize_entries(r.read_range_entries()?);

        Ok(Self {
            purpose_id,
            restriction_type,
            vendors,
        })
    }
}

impl ToDataWriter for PublisherRestriction {
    type Err = TcfEncodeError;

    fn to_data_writer(&self, w: &mut BitWriter) -> Result<(), Self::Err> {
        validate_entries(&self.vendors)?;
        w.write_bits(u64::from(self.purpose_id), PURPOSE_ID_BITS)?;
        let restriction_type = self.restriction_type.to_u64().unwrap_or_default();
        w.write_bits(restriction_type, RESTRICTION_TYPE_BITS)?;
        w.write_range_entries(&self.vendors)?;
        Ok(())
    }
}

pub(crate) fn read_publisher_restrictions(
    r: &mut BitReader,
) -> Result<Vec<PublisherRestriction>, TcfDecodeError> {
    let n = r.read_unsigned::<u16>(RESTRICTION_COUNT_BITS)?;
    (0..n).map(|_| r.parse()).collect()
}

pub(crate) fn write_publisher_restrictions(
    w: &mut BitWriter,
    restrictions: &[PublisherRestriction],
) -> Result<(), TcfEncodeError> {
    w.write_bits(restrictions.len() as u64, RESTRICTION_COUNT_BITS)?;
    for restriction in restrictions {
        w.emit(restriction)?;
    }
    Ok(())
}
