//! TCF v1.1 consent strings.
//!
//! A v1 string is a single base64 encoded bit sequence, starting with a 6 bit version field
//! set to 1, which renders as a leading `B` character.
//!
//! # Example
//!
//! ```
//! use tcf_consent::tcf::v1::ConsentStringV1;
//!
//! let cs: ConsentStringV1 = "BOEFEAyOEFEAyAHABDENAI4AAAB9vABAASA".parse().unwrap();
//! assert_eq!(cs.cmp_id, 7);
//! assert!(cs.purpose_allowed(1));
//! assert!(!cs.vendor_consent(9));
//! ```
use crate::core::{BitReader, BitWriter, DataRead, DataWrite, FromDataReader, ToDataWriter};
use crate::tcf::vendors::{read_v1_vendor_set, write_v1_vendor_set};
use crate::tcf::{
    check_ids, check_letters, decoded_letters, to_base64_str, Base64EncodedStr, IdSet,
    TcfDecodeError, TcfEncodeError, VendorSet,
};
use log::debug;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use std::str::FromStr;

pub const TCF_V1_VERSION: u8 = 1;

const VERSION_BITS: u32 = 6;
const CMP_ID_BITS: u32 = 12;
const CMP_VERSION_BITS: u32 = 12;
const CONSENT_SCREEN_BITS: u32 = 6;
const VENDOR_LIST_VERSION_BITS: u32 = 12;
const PURPOSES: u16 = 24;

#[derive(Clone, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ConsentStringV1 {
    /// Creation time, in deciseconds since the Unix epoch.
    pub created: u64,
    /// Last update time, in deciseconds since the Unix epoch.
    pub last_updated: u64,
    pub cmp_id: u16,
    pub cmp_version: u16,
    pub consent_screen: u8,
    pub consent_language: String,
    pub vendor_list_version: u16,
    pub purposes_allowed: IdSet,
    pub vendor_consents: VendorSet,
}

impl ConsentStringV1 {
    /// Encodes this consent string into its shortest representation.
    ///
    /// # Errors
    ///
    /// Fails if a field does not fit in its wire representation, for instance a vendor id
    /// larger than `vendor_consents.max_vendor_id` or a language which is not made of two
    /// letters.
    pub fn encode(&self) -> Result<String, TcfEncodeError> {
        to_base64_str(self)
    }

    pub fn purpose_allowed(&self, purpose_id: u16) -> bool {
        self.purposes_allowed.contains(&purpose_id)
    }

    pub fn vendor_consent(&self, vendor_id: u16) -> bool {
        self.vendor_consents.contains(vendor_id)
    }
}

impl FromStr for ConsentStringV1 {
    type Err = TcfDecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let cs: Self = s.parse_base64_str()?;
        debug!(
            "decoded TCF v1 string from CMP {} with {} vendor consents",
            cs.cmp_id,
            cs.vendor_consents.len()
        );
        Ok(cs)
    }
}

impl FromDataReader for ConsentStringV1 {
    type Err = TcfDecodeError;

    fn from_data_reader(r: &mut BitReader) -> Result<Self, Self::Err> {
        let version = r.read_unsigned::<u8>(VERSION_BITS)?;
        if version != TCF_V1_VERSION {
            return Err(TcfDecodeError::UnsupportedVersion {
                expected: TCF_V1_VERSION,
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
            purposes_allowed: r.read_fixed_bitfield(PURPOSES as usize)?,
            vendor_consents: read_v1_vendor_set(r)?,
        })
    }
}

impl ToDataWriter for ConsentStringV1 {
    type Err = TcfEncodeError;

    fn to_data_writer(&self, w: &mut BitWriter) -> Result<(), Self::Err> {
        check_letters("consent language", &self.consent_language)?;
        check_ids("purposes allowed", &self.purposes_allowed, PURPOSES)?;

        w.write_bits(u64::from(TCF_V1_VERSION), VERSION_BITS)?;
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
        w.write_fixed_bitfield(&self.purposes_allowed, PURPOSES as usize)?;
        write_v1_vendor_set(w, "vendor consents", &self.vendor_consents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ValueTooWide;
    use test_case::test_case;

    const REFERENCE: &str = "BOEFEAyOEFEAyAHABDENAI4AAAB9vABAASA";

    fn reference() -> ConsentStringV1 {
        ConsentStringV1 {
            created: 15100821554,
            last_updated: 15100821554,
            cmp_id: 7,
            cmp_version: 1,
            consent_screen: 3,
            consent_language: "EN".to_string(),
            vendor_list_version: 8,
            purposes_allowed: IdSet::from([1, 2, 3]),
            vendor_consents: VendorSet::new(2011, (1..=2011).filter(|&id| id != 9).collect()),
        }
    }

    #[test]
    fn decode() {
        assert_eq!(REFERENCE.parse::<ConsentStringV1>().unwrap(), reference());
    }

    #[test]
    fn decode_is_deterministic() {
        let a = ConsentStringV1::from_str(REFERENCE).unwrap();
        let b = ConsentStringV1::from_str(REFERENCE).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn encode_shortest_form() {
        // the reference string carries 7 bits of padding, which the encoder drops
        assert_eq!(
            reference().encode().unwrap(),
            "BOEFEAyOEFEAyAHABDENAI4AAAB9vABAAS"
        );
    }

    #[test]
    fn round_trip() {
        let mut cs = reference();
        cs.vendor_consents = VendorSet::new(10, IdSet::from([1, 3]));
        cs.purposes_allowed = IdSet::from([1, 24]);
        let encoded = cs.encode().unwrap();
        assert_eq!(encoded.parse::<ConsentStringV1>().unwrap(), cs);
        assert_eq!(encoded.parse::<ConsentStringV1>().unwrap().encode().unwrap(), encoded);
    }

    #[test]
    fn bitfield_and_range_decode_to_the_same_set() {
        let header = "000001 000000000000000000000000000000000000 000000000000000000000000000000000000 \
            000000000000 000000000000 000000 000100 001101 000000000000 000000000000000000000000";
        let bitfield = format!("{header} 0000000000000011 0 101");
        let range = format!(
            "{header} 0000000000000011 1 0 000000000010 0 0000000000000001 0 0000000000000011"
        );
        let parse = |s: &str| {
            let (bytes, len) = crate::core::tests::b(s);
            BitReader::new(&bytes, len).parse::<ConsentStringV1>().unwrap()
        };
        let a = parse(&bitfield);
        let b = parse(&range);
        assert_eq!(a.vendor_consents, VendorSet::new(3, IdSet::from([1, 3])));
        assert_eq!(a, b);
    }

    #[test]
    fn decode_letter_past_z() {
        let header = "000001 000000000000000000000000000000000000 000000000000000000000000000000000000 \
            000000000000 000000000000 000000 000100 011010 000000000000 000000000000000000000000";
        let (bytes, len) = crate::core::tests::b(&format!("{header} 0000000000000000 0"));
        assert_eq!(
            BitReader::new(&bytes, len).parse::<ConsentStringV1>(),
            Err(TcfDecodeError::InvalidLetter {
                field: "consent language",
                character: '['
            })
        );
    }

    #[test]
    fn truncated_by_one_bit() {
        let cs = reference();
        let mut w = BitWriter::new();
        w.emit(&cs).unwrap();
        let len = w.len();
        let bytes = w.to_bytes();
        assert!(matches!(
            BitReader::new(&bytes, len - 1).parse::<ConsentStringV1>(),
            Err(TcfDecodeError::OutOfRange(_))
        ));
    }

    #[test_case("BOEFEAyOEFEAyAHABDENAI4AAAB9vABA" => matches TcfDecodeError::OutOfRange(_) ; "truncated")]
    #[test_case("CPXxRfAPXxRfAAfKABENB-CgAAAAAAAAAAYgAAAAAAAA" => TcfDecodeError::UnsupportedVersion { expected: 1, found: 2 } ; "v2 string")]
    #[test_case("BOEFEAyOEFEAyAHABDENAI4AAAB9vABAAS+" => matches TcfDecodeError::InvalidEncoding(_) ; "plus sign")]
    #[test_case("BOEFEAyOEFEAyAHABD/NAI4AAAB9vABAASA" => matches TcfDecodeError::InvalidEncoding(_) ; "slash")]
    #[test_case("" => matches TcfDecodeError::OutOfRange(_) ; "empty")]
    fn decode_error(s: &str) -> TcfDecodeError {
        ConsentStringV1::from_str(s).unwrap_err()
    }

    #[test]
    fn encode_invalid_language() {
        let cs = ConsentStringV1 {
            consent_language: "ENG".to_string(),
            ..reference()
        };
        assert_eq!(
            cs.encode(),
            Err(TcfEncodeError::InvalidLength {
                field: "consent language",
                expected: 2,
                found: 3
            })
        );
    }

    #[test]
    fn encode_purpose_out_of_range() {
        let cs = ConsentStringV1 {
            purposes_allowed: IdSet::from([25]),
            ..reference()
        };
        assert!(matches!(cs.encode(), Err(TcfEncodeError::IdOutOfRange { id: 25, .. })));
    }

    #[test]
    fn encode_value_too_wide() {
        let cs = ConsentStringV1 {
            cmp_id: 4096,
            ..reference()
        };
        assert_eq!(
            cs.encode(),
            Err(TcfEncodeError::ValueTooWide(ValueTooWide {
                value: 4096,
                bits: 12
            }))
        );
    }
}
