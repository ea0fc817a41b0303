//! Vendor lists, which are stored either as a bitfield or as a list of id ranges.
//!
//! The wire form is an encoding detail: [`VendorSet`] only holds the largest vendor id and
//! the ids that are set, and the encoder picks whichever form is the shortest.
use crate::core::{
    range_entries_bit_len, BitReader, BitWriter, DataRead, DataWrite, MAX_ENTRIES,
};
use crate::tcf::{
    check_ids, compact_ranges, expand_intervals, merge_entries, validate_entries, IdSet,
    RangeEntry, TcfDecodeError, TcfEncodeError,
};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

const MAX_VENDOR_ID_BITS: u32 = 16;

/// A set of vendor ids along with the largest vendor id known when the set was built.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct VendorSet {
    pub max_vendor_id: u16,
    pub ids: IdSet,
}

impl VendorSet {
    pub fn new(max_vendor_id: u16, ids: IdSet) -> Self {
        Self { max_vendor_id, ids }
    }

    /// Builds a set whose largest vendor id is its largest member.
    pub fn from_ids(ids: IdSet) -> Self {
        Self {
            max_vendor_id: ids.last().copied().unwrap_or_default(),
            ids,
        }
    }

    pub fn contains(&self, vendor_id: u16) -> bool {
        self.ids.contains(&vendor_id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

impl FromIterator<u16> for VendorSet {
    fn from_iter<T: IntoIterator<Item = u16>>(iter: T) -> Self {
        Self::from_ids(iter.into_iter().collect())
    }
}

/// The wire form of a vendor list.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum VendorEncoding {
    /// One bit per vendor, from 1 to the largest vendor id.
    Bitfield,
    /// A list of entries. In TCF v1 the entries list the vendors whose consent differs
    /// from `default_consent`; in TCF v2 they list the vendors that are set.
    Ranges {
        default_consent: bool,
        entries: Vec<RangeEntry>,
    },
}

impl VendorEncoding {
    /// Picks the shortest encoding of a TCF v1 vendor list.
    ///
    /// A bitfield wins ties, as does a zero default consent among range encodings.
    pub fn for_v1(set: &VendorSet) -> Self {
        let consented = compact_ranges(set.ids.iter().copied());
        let refused = compact_ranges((1..=set.max_vendor_id).filter(|id| !set.contains(*id)));

        [(false, consented), (true, refused)]
            .into_iter()
            .filter(|(_, entries)| entries.len() <= MAX_ENTRIES)
            .map(|(default_consent, entries)| Self::Ranges {
                default_consent,
                entries,
            })
            .fold(Self::Bitfield, |best, candidate| {
                let max = set.max_vendor_id;
                if candidate.bit_len(max, true) < best.bit_len(max, true) {
                    candidate
                } else {
                    best
                }
            })
    }

    /// Picks the shortest encoding of a TCF v2 vendor list. A bitfield wins ties.
    pub fn for_v2(set: &VendorSet) -> Self {
        let entries = compact_ranges(set.ids.iter().copied());
        if entries.len() > MAX_ENTRIES
            || range_entries_bit_len(&entries) >= set.max_vendor_id as usize
        {
            return Self::Bitfield;
        }
        Self::Ranges {
            default_consent: false,
            entries,
        }
    }

    /// Number of bits following the encoding type flag.
    pub fn bit_len(&self, max_vendor_id: u16, with_default: bool) -> usize {
        match self {
            Self::Bitfield => max_vendor_id as usize,
            Self::Ranges { entries, .. } => {
                usize::from(with_default) + range_entries_bit_len(entries)
            }
        }
    }
}

/// Reads a TCF v1 vendor list, where range entries are exceptions to a default consent.
pub(crate) fn read_v1_vendor_set(r: &mut BitReader) -> Result<VendorSet, TcfDecodeError> {
    let max_vendor_id = r.read_unsigned::<u16>(MAX_VENDOR_ID_BITS)?;
    let is_range = r.read_bit()?;
    let ids = if is_range {
        let default_consent = r.read_bit()?;
        let listed = merge_entries(&r.read_range_entries()?, 1, max_vendor_id);
        if default_consent {
            complement(&listed, max_vendor_id)
        } else {
            expand_intervals(&listed)
        }
    } else {
        r.read_fixed_bitfield(max_vendor_id as usize)?
    };

    Ok(VendorSet { max_vendor_id, ids })
}

/// Ids of `1..=max` not covered by merged intervals.
fn complement(intervals: &[(u16, u16)], max: u16) -> IdSet {
    let mut ids = IdSet::new();
    let mut next = 1u32;
    for &(start, end) in intervals {
        ids.extend((next..u32::from(start)).map(|id| id as u16));
        next = u32::from(end) + 1;
    }
    ids.extend((next..=u32::from(max)).map(|id| id as u16));
    ids
}

/// Reads a TCF v2 vendor list, where range entries list the ids that are set.
///
/// Listed ids outside of `1..=max_vendor_id` are ignored.
pub(crate) fn read_vendor_set(r: &mut BitReader) -> Result<VendorSet, TcfDecodeError> {
    let max_vendor_id = r.read_unsigned::<u16>(MAX_VENDOR_ID_BITS)?;
    let is_range = r.read_bit()?;
    let ids = if is_range {
        expand_intervals(&merge_entries(&r.read_range_entries()?, 1, max_vendor_id))
    } else {
        r.read_fixed_bitfield(max_vendor_id as usize)?
    };

    Ok(VendorSet { max_vendor_id, ids })
}

pub(crate) fn write_v1_vendor_set(
    w: &mut BitWriter,
    field: &'static str,
    set: &VendorSet,
) -> Result<(), TcfEncodeError> {
    check_ids(field, &set.ids, set.max_vendor_id)?;
    write_encoding(w, set, &VendorEncoding::for_v1(set), true)
}

pub(crate) fn write_vendor_set(
    w: &mut BitWriter,
    field: &'static str,
    set: &VendorSet,
) -> Result<(), TcfEncodeError> {
    check_ids(field, &set.ids, set.max_vendor_id)?;
    write_encoding(w, set, &VendorEncoding::for_v2(set), false)
}

fn write_encoding(
    w: &mut BitWriter,
    set: &VendorSet,
    encoding: &VendorEncoding,
    with_default: bool,
) -> Result<(), TcfEncodeError> {
    w.write_bits(u64::from(set.max_vendor_id), MAX_VENDOR_ID_BITS)?;
    match encoding {
        VendorEncoding::Bitfield => {
            w.write_bit(false)?;
            w.write_fixed_bitfield(&set.ids, set.max_vendor_id as usize)?;
        }
        VendorEncoding::Ranges {
            default_consent,
            entries,
        } => {
            validate_entries(entries)?;
            w.write_bit(true)?;
            if with_default {
                w.write_bit(*default_consent)?;
            }
            w.write_range_entries(entries)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::tests::{b, bits_of};
    use std::time::{Duration, Instant};
    use test_case::test_case;

    fn set(max_vendor_id: u16, ids: &[u16]) -> VendorSet {
        VendorSet::new(max_vendor_id, ids.iter().copied().collect())
    }

    #[test_case("0000000000000011 0 101" => set(3, &[1, 3]) ; "bitfield")]
    #[test_case("0000000000000000 0" => set(0, &[]) ; "empty bitfield")]
    #[test_case("0000000000000101 1 0 000000000001 1 0000000000000010 0000000000000011" => set(5, &[2, 3]) ; "range with default refused")]
    #[test_case("0000000000000101 1 1 000000000001 0 0000000000000010" => set(5, &[1, 3, 4, 5]) ; "range with default consent")]
    #[test_case("0000000000000011 1 0 000000000001 0 0000000000001001" => set(3, &[]) ; "listed ids above max are ignored")]
    fn read_v1(s: &str) -> VendorSet {
        let (bytes, len) = b(s);
        read_v1_vendor_set(&mut BitReader::new(&bytes, len)).unwrap()
    }

    #[test_case("0000000000000011 0 101" => set(3, &[1, 3]) ; "bitfield")]
    #[test_case("0000000000001000 1 000000000010 0 0000000000000010 1 0000000000000110 0000000000001000" => set(8, &[2, 6, 7, 8]) ; "ranges")]
    #[test_case("0000000000000000 1 000000000000" => set(0, &[]) ; "no entries")]
    #[test_case("0000000000000011 1 000000000011 0 0000000000001001 0 0000000000000000 1 0000000000000010 0000000000000101" => set(3, &[2, 3]) ; "listed ids outside of range are ignored")]
    #[test_case("0000000000000110 1 000000000010 1 0000000000000001 0000000000000100 1 0000000000000011 0000000000000010" => set(6, &[1, 2, 3, 4]) ; "reversed and overlapping entries")]
    fn read_v2(s: &str) -> VendorSet {
        let (bytes, len) = b(s);
        read_vendor_set(&mut BitReader::new(&bytes, len)).unwrap()
    }

    #[test_case(false => 65535 ; "listed")]
    #[test_case(true => 0 ; "default consent")]
    fn read_many_wide_ranges(default_consent: bool) -> usize {
        let entries = vec![RangeEntry::Range { start: 1, end: 65535 }; 4095];
        let mut w = BitWriter::new();
        w.write_bits(65535, 16).unwrap();
        w.write_bit(true).unwrap();
        w.write_bit(default_consent).unwrap();
        w.write_range_entries(&entries).unwrap();
        let len = w.len();
        let bytes = w.to_bytes();

        let start = Instant::now();
        let set = read_v1_vendor_set(&mut BitReader::new(&bytes, len)).unwrap();
        assert!(start.elapsed() < Duration::from_secs(5));
        set.len()
    }

    #[test]
    fn read_v2_many_wide_ranges() {
        let entries = vec![RangeEntry::Range { start: 1, end: 65535 }; 4095];
        let mut w = BitWriter::new();
        w.write_bits(300, 16).unwrap();
        w.write_bit(true).unwrap();
        w.write_range_entries(&entries).unwrap();
        let len = w.len();
        let bytes = w.to_bytes();

        let start = Instant::now();
        let set = read_vendor_set(&mut BitReader::new(&bytes, len)).unwrap();
        assert!(start.elapsed() < Duration::from_secs(5));
        assert_eq!(set, VendorSet::new(300, (1..=300).collect()));
    }

    #[test]
    fn read_truncated() {
        let (bytes, len) = b("0000000000001000 0 1010");
        assert!(matches!(
            read_vendor_set(&mut BitReader::new(&bytes, len)),
            Err(TcfDecodeError::OutOfRange(_))
        ));
    }

    #[test_case(set(3, &[1, 3]) => VendorEncoding::Bitfield ; "small sets use a bitfield")]
    #[test_case(set(2011, &[9]) => VendorEncoding::Ranges {
        default_consent: false,
        entries: vec![RangeEntry::Single(9)],
    } ; "sparse set")]
    #[test_case(set(2011, &(1..=2011).filter(|&id| id != 9).collect::<Vec<_>>()) => VendorEncoding::Ranges {
        default_consent: true,
        entries: vec![RangeEntry::Single(9)],
    } ; "dense set")]
    #[test_case(set(0, &[]) => VendorEncoding::Bitfield ; "empty set")]
    fn choose_v1(set: VendorSet) -> VendorEncoding {
        VendorEncoding::for_v1(&set)
    }

    #[test_case(set(3, &[1, 3]) => VendorEncoding::Bitfield ; "small sets use a bitfield")]
    #[test_case(set(30, &[30]) => VendorEncoding::Ranges {
        default_consent: false,
        entries: vec![RangeEntry::Single(30)],
    } ; "one id ranges")]
    #[test_case(set(46, &[1, 2]) => VendorEncoding::Ranges {
        default_consent: false,
        entries: vec![RangeEntry::Range { start: 1, end: 2 }],
    } ; "range shorter than bitfield")]
    #[test_case(set(29, &[29]) => VendorEncoding::Bitfield ; "bitfield wins ties")]
    fn choose_v2(set: VendorSet) -> VendorEncoding {
        VendorEncoding::for_v2(&set)
    }

    #[test]
    fn range_encoding_is_never_longer_than_bitfield() {
        for max in [0, 1, 17, 64, 300] {
            let sparse = set(max, &[1]);
            let dense = VendorSet::new(max, (1..=max).collect());
            for s in [sparse, dense] {
                let v1 = VendorEncoding::for_v1(&s);
                let v2 = VendorEncoding::for_v2(&s);
                assert!(v1.bit_len(max, true) <= max as usize);
                assert!(v2.bit_len(max, false) <= max as usize);
            }
        }
    }

    #[test]
    fn write_v1_bitfield() {
        let mut w = BitWriter::new();
        write_v1_vendor_set(&mut w, "vendor consents", &set(3, &[1, 3])).unwrap();
        assert_eq!(bits_of(w), "0000000000000011 0 101".replace(' ', ""));
    }

    #[test]
    fn write_v1_ranges() {
        let dense = VendorSet::new(2011, (1..=2011).filter(|&id| id != 9).collect());
        let mut w = BitWriter::new();
        write_v1_vendor_set(&mut w, "vendor consents", &dense).unwrap();
        assert_eq!(
            bits_of(w),
            "0000011111011011 1 1 000000000001 0 0000000000001001".replace(' ', "")
        );
    }

    #[test]
    fn write_v2_ranges() {
        let mut w = BitWriter::new();
        write_vendor_set(&mut w, "vendor consents", &set(46, &[1, 2])).unwrap();
        assert_eq!(
            bits_of(w),
            "0000000000101110 1 000000000001 1 0000000000000001 0000000000000010".replace(' ', "")
        );
    }

    #[test_case(set(3, &[4]) => TcfEncodeError::IdOutOfRange { field: "vendor consents", id: 4, max: 3 } ; "above max")]
    #[test_case(set(3, &[0, 1]) => TcfEncodeError::IdOutOfRange { field: "vendor consents", id: 0, max: 3 } ; "zero")]
    fn write_invalid(set: VendorSet) -> TcfEncodeError {
        let mut w = BitWriter::new();
        write_vendor_set(&mut w, "vendor consents", &set).unwrap_err()
    }

    #[test]
    fn round_trip() {
        let sets = [
            set(0, &[]),
            set(10, &[]),
            set(10, &[1, 2, 3, 4, 5, 6, 7, 8, 9, 10]),
            set(400, &[1, 200, 201, 202, 400]),
            VendorSet::new(1000, (1..=1000).filter(|id| id % 3 != 0).collect()),
        ];
        for s in sets {
            let mut w = BitWriter::new();
            write_v1_vendor_set(&mut w, "v1", &s).unwrap();
            write_vendor_set(&mut w, "v2", &s).unwrap();
            let len = w.len();
            let bytes = w.to_bytes();
            let mut r = BitReader::new(&bytes, len);
            assert_eq!(read_v1_vendor_set(&mut r).unwrap(), s);
            assert_eq!(read_vendor_set(&mut r).unwrap(), s);
            assert_eq!(r.remaining(), 0);
        }
    }

    #[test]
    fn from_ids() {
        let s = VendorSet::from_iter([8, 2, 6]);
        assert_eq!(s.max_vendor_id, 8);
        assert!(s.contains(6));
        assert!(!s.contains(7));
        assert_eq!(s.len(), 3);
    }
}
