//! Bit level primitives shared by every consent string codec.
//!
//! Consent strings are packed MSB-first. [`BitReader`] and [`BitWriter`] are thin cursors
//! over `bitstream-io` that know the exact number of meaningful bits, so that reading past
//! the end of a truncated string fails with [`OutOfRange`] instead of yielding zeroes.
//!
use crate::tcf::RangeEntry;
use bitstream_io::{BigEndian, BitRead, BitWrite, UnsignedInteger};
use std::collections::BTreeSet;
use std::io::Cursor;
use thiserror::Error;

pub mod base64;

const ENTRY_COUNT_BITS: u32 = 12;
const VENDOR_ID_BITS: u32 = 16;
const TIMESTAMP_BITS: u32 = 36;
const LETTER_BITS: u32 = 6;

/// Returned when a read requests more bits than are left in the sequence.
#[derive(Error, Debug, Clone, Copy, Eq, PartialEq)]
#[error("attempted to read {requested} bits with only {remaining} remaining")]
pub struct OutOfRange {
    pub requested: u32,
    pub remaining: usize,
}

/// Returned when a value cannot be represented in the requested number of bits.
#[derive(Error, Debug, Clone, Copy, Eq, PartialEq)]
#[error("value {value} does not fit in {bits} bits")]
pub struct ValueTooWide {
    pub value: u64,
    pub bits: u32,
}

/// A cursor over an immutable, MSB-first bit sequence.
pub struct BitReader<'a> {
    inner: bitstream_io::BitReader<Cursor<&'a [u8]>, BigEndian>,
    position: usize,
    len: usize,
}

impl<'a> BitReader<'a> {
    /// Creates a reader over the first `len` bits of `bytes`.
    ///
    /// `len` is clamped to the number of bits actually available.
    pub fn new(bytes: &'a [u8], len: usize) -> Self {
        Self {
            inner: bitstream_io::BitReader::endian(Cursor::new(bytes), BigEndian),
            position: 0,
            len: len.min(bytes.len() * 8),
        }
    }

    /// Offset of the next bit to be read.
    pub fn position(&self) -> usize {
        self.position
    }

    /// Number of bits left before the end of the sequence.
    pub fn remaining(&self) -> usize {
        self.len - self.position
    }

    fn ensure(&self, bits: u32) -> Result<(), OutOfRange> {
        let remaining = self.remaining();
        if bits as usize > remaining {
            return Err(OutOfRange {
                requested: bits,
                remaining,
            });
        }
        Ok(())
    }

    pub fn read_bit(&mut self) -> Result<bool, OutOfRange> {
        self.ensure(1)?;
        let bit = self.inner.read_bit().map_err(|_| OutOfRange {
            requested: 1,
            remaining: 0,
        })?;
        self.position += 1;
        Ok(bit)
    }

    /// Reads an unsigned integer of `bits` width into the given type.
    ///
    /// `bits` must be between 1 and the bit size of `U`.
    pub fn read_unsigned<U>(&mut self, bits: u32) -> Result<U, OutOfRange>
    where
        U: UnsignedInteger,
    {
        self.ensure(bits)?;
        let remaining = self.remaining();
        let value = self
            .inner
            .read_unsigned_var::<U>(bits)
            .map_err(|_| OutOfRange {
                requested: bits,
                remaining,
            })?;
        self.position += bits as usize;
        Ok(value)
    }

    /// Reads up to 64 bits as an unsigned integer. Reading zero bits yields zero.
    pub fn read_bits(&mut self, bits: u32) -> Result<u64, OutOfRange> {
        if bits == 0 {
            return Ok(0);
        }
        self.read_unsigned::<u64>(bits)
    }

    pub fn skip(&mut self, bits: u32) -> Result<(), OutOfRange> {
        self.ensure(bits)?;
        let remaining = self.remaining();
        self.inner.skip(bits).map_err(|_| OutOfRange {
            requested: bits,
            remaining,
        })?;
        self.position += bits as usize;
        Ok(())
    }

    pub fn parse<T: FromDataReader>(&mut self) -> Result<T, T::Err> {
        T::from_data_reader(self)
    }
}

/// An MSB-first bit accumulator.
pub struct BitWriter {
    inner: bitstream_io::BitWriter<Vec<u8>, BigEndian>,
    len: usize,
}

impl BitWriter {
    pub fn new() -> Self {
        Self {
            inner: bitstream_io::BitWriter::endian(Vec::new(), BigEndian),
            len: 0,
        }
    }

    /// Number of bits written so far.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn write_bit(&mut self, bit: bool) -> Result<(), ValueTooWide> {
        // writing into a Vec never fails
        let _ = self.inner.write_bit(bit);
        self.len += 1;
        Ok(())
    }

    /// Writes the `bits` low bits of `value`, which must not have any higher bit set.
    pub fn write_bits(&mut self, value: u64, bits: u32) -> Result<(), ValueTooWide> {
        if bits > 64 || (bits < 64 && value >> bits != 0) {
            return Err(ValueTooWide { value, bits });
        }
        if bits == 0 {
            return Ok(());
        }
        let _ = self.inner.write_unsigned_var::<u64>(bits, value);
        self.len += bits as usize;
        Ok(())
    }

    pub fn emit<T: ToDataWriter + ?Sized>(&mut self, value: &T) -> Result<(), T::Err> {
        value.to_data_writer(self)
    }

    /// Consumes the writer and returns the bytes, the last one being padded with zero bits.
    pub fn to_bytes(mut self) -> Vec<u8> {
        let _ = self.inner.byte_align();
        self.inner.into_writer()
    }

    /// Consumes the writer and returns the shortest URL-safe base64 text holding every bit.
    pub fn to_base64(self) -> String {
        let len = self.len;
        base64::encode_bits(&self.to_bytes(), len)
    }
}

impl Default for BitWriter {
    fn default() -> Self {
        Self::new()
    }
}

pub trait FromDataReader: Sized {
    type Err;

    fn from_data_reader(r: &mut BitReader) -> Result<Self, Self::Err>;
}

pub trait ToDataWriter {
    type Err;

    fn to_data_writer(&self, w: &mut BitWriter) -> Result<(), Self::Err>;
}

/// Field level decoding helpers.
pub trait DataRead {
    fn read_string(&mut self, chars: usize) -> Result<String, OutOfRange>;

    /// Reads a 36 bit timestamp, in deciseconds since the Unix epoch.
    fn read_timestamp(&mut self) -> Result<u64, OutOfRange>;

    fn read_fixed_bitfield(&mut self, bits: usize) -> Result<BTreeSet<u16>, OutOfRange>;

    /// Reads a 12 bit entry count followed by as many single ids or id ranges.
    fn read_range_entries(&mut self) -> Result<Vec<RangeEntry>, OutOfRange>;
}

impl DataRead for BitReader<'_> {
    fn read_string(&mut self, chars: usize) -> Result<String, OutOfRange> {
        (0..chars)
            .map(|_| {
                self.read_unsigned::<u8>(LETTER_BITS)
                    .map(|n| char::from(n + b'A'))
            })
            .collect()
    }

    fn read_timestamp(&mut self) -> Result<u64, OutOfRange> {
        self.read_unsigned::<u64>(TIMESTAMP_BITS)
    }

    fn read_fixed_bitfield(&mut self, bits: usize) -> Result<BTreeSet<u16>, OutOfRange> {
        let mut result = BTreeSet::new();
        for i in 1..=bits {
            if self.read_bit()? {
                result.insert(i as u16);
            }
        }

        Ok(result)
    }

    fn read_range_entries(&mut self) -> Result<Vec<RangeEntry>, OutOfRange> {
        let n = self.read_unsigned::<u16>(ENTRY_COUNT_BITS)?;
        let mut entries = Vec::with_capacity(n as usize);

        for _ in 0..n {
            let is_range = self.read_bit()?;
            if is_range {
                let start = self.read_unsigned::<u16>(VENDOR_ID_BITS)?;
                let end = self.read_unsigned::<u16>(VENDOR_ID_BITS)?;
                entries.push(RangeEntry::Range { start, end });
            } else {
                entries.push(RangeEntry::Single(
                    self.read_unsigned::<u16>(VENDOR_ID_BITS)?,
                ));
            }
        }

        Ok(entries)
    }
}

/// Field level encoding helpers, mirroring [`DataRead`].
pub trait DataWrite {
    /// Writes each character as a 6 bit offset from `'A'`.
    fn write_string(&mut self, s: &str) -> Result<(), ValueTooWide>;

    fn write_timestamp(&mut self, deciseconds: u64) -> Result<(), ValueTooWide>;

    /// Writes `bits` bits where bit `n - 1` is set if `n` is in `ids`.
    ///
    /// Ids outside of `1..=bits` cannot be represented and are rejected.
    fn write_fixed_bitfield(&mut self, ids: &BTreeSet<u16>, bits: usize)
    -> Result<(), ValueTooWide>;

    fn write_range_entries(&mut self, entries: &[RangeEntry]) -> Result<(), ValueTooWide>;
}

impl DataWrite for BitWriter {
    fn write_string(&mut self, s: &str) -> Result<(), ValueTooWide> {
        for c in s.chars() {
            let value = (c as u64)
                .checked_sub(u64::from(b'A'))
                .ok_or(ValueTooWide {
                    value: c as u64,
                    bits: LETTER_BITS,
                })?;
            self.write_bits(value, LETTER_BITS)?;
        }
        Ok(())
    }

    fn write_timestamp(&mut self, deciseconds: u64) -> Result<(), ValueTooWide> {
        self.write_bits(deciseconds, TIMESTAMP_BITS)
    }

    fn write_fixed_bitfield(
        &mut self,
        ids: &BTreeSet<u16>,
        bits: usize,
    ) -> Result<(), ValueTooWide> {
        if let Some(&id) = ids.iter().find(|&&id| id == 0 || id as usize > bits) {
            return Err(ValueTooWide {
                value: u64::from(id),
                bits: bits as u32,
            });
        }
        for i in 1..=bits {
            self.write_bit(ids.contains(&(i as u16)))?;
        }
        Ok(())
    }

    fn write_range_entries(&mut self, entries: &[RangeEntry]) -> Result<(), ValueTooWide> {
        self.write_bits(entries.len() as u64, ENTRY_COUNT_BITS)?;
        for entry in entries {
            match *entry {
                RangeEntry::Single(id) => {
                    self.write_bit(false)?;
                    self.write_bits(u64::from(id), VENDOR_ID_BITS)?;
                }
                RangeEntry::Range { start, end } => {
                    self.write_bit(true)?;
                    self.write_bits(u64::from(start), VENDOR_ID_BITS)?;
                    self.write_bits(u64::from(end), VENDOR_ID_BITS)?;
                }
            }
        }
        Ok(())
    }
}

/// Bit length taken by a list of range entries, including its 12 bit count.
pub(crate) fn range_entries_bit_len(entries: &[RangeEntry]) -> usize {
    ENTRY_COUNT_BITS as usize
        + entries
            .iter()
            .map(|e| match e {
                RangeEntry::Single(_) => 1 + VENDOR_ID_BITS as usize,
                RangeEntry::Range { .. } => 1 + 2 * VENDOR_ID_BITS as usize,
            })
            .sum::<usize>()
}

/// Largest number of entries a 12 bit count can announce.
pub(crate) const MAX_ENTRIES: usize = (1 << ENTRY_COUNT_BITS) - 1;

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use test_case::test_case;

    /// Transform a string of literal binary digits into a vector of bytes and its bit length.
    /// Zeroes will be appended to fill missing bits.
    pub(crate) fn b(s: &str) -> (Vec<u8>, usize) {
        let chars = s
            .chars()
            .filter(|&c| c == '1' || c == '0')
            .collect::<Vec<_>>();
        let bytes = chars
            .chunks(8)
            .map(|c| (8 - c.len(), String::from_iter(c)))
            .map(|(l, s)| u8::from_str_radix(&s, 2).map(|n| n << l))
            .collect::<Result<Vec<_>, _>>()
            .unwrap_or(vec![]);
        (bytes, chars.len())
    }

    /// Render written bits back as a string of binary digits.
    pub(crate) fn bits_of(w: BitWriter) -> String {
        let len = w.len();
        w.to_bytes()
            .iter()
            .map(|b| format!("{b:08b}"))
            .collect::<String>()
            .chars()
            .take(len)
            .collect()
    }

    #[test_case("00000001 00000010 00000011" => (vec![1, 2, 3], 24))]
    #[test_case("000000 010000 001000 000011 1000" => (vec![1, 2, 3, 128], 28))]
    #[test_case("000000 010000 001000 000011 1001" => (vec![1, 2, 3, 144], 28))]
    fn bytes(s: &str) -> (Vec<u8>, usize) {
        b(s)
    }

    #[test_case("101", 3 => 5)]
    #[test_case("0000 0001", 8 => 1)]
    #[test_case("1111111111111111111111111111111111111111111111111111111111111111", 64 => u64::MAX ; "full width")]
    #[test_case("1", 0 => 0 ; "zero bits")]
    fn read_bits(s: &str, n: u32) -> u64 {
        let (bytes, len) = b(s);
        BitReader::new(&bytes, len).read_bits(n).unwrap()
    }

    #[test]
    fn read_past_end() {
        let (bytes, len) = b("10110");
        let mut r = BitReader::new(&bytes, len);
        assert_eq!(r.read_bits(3), Ok(0b101));
        assert_eq!(
            r.read_bits(3),
            Err(OutOfRange {
                requested: 3,
                remaining: 2
            })
        );

        // a failed read does not consume anything
        assert_eq!(r.position(), 3);
        assert_eq!(r.read_bits(2), Ok(0b10));
        assert_eq!(r.remaining(), 0);
        assert!(r.read_bit().is_err());
    }

    #[test]
    fn partial_trailing_byte() {
        // the last byte holds 3 meaningful bits only
        let mut r = BitReader::new(&[0xff, 0xff], 11);
        assert_eq!(r.read_bits(8), Ok(0xff));
        assert_eq!(r.remaining(), 3);
        assert!(r.read_bits(4).is_err());
    }

    #[test]
    fn length_is_clamped() {
        let r = BitReader::new(&[0], 100);
        assert_eq!(r.remaining(), 8);
    }

    #[test]
    fn skip() {
        let (bytes, len) = b("0000 1100");
        let mut r = BitReader::new(&bytes, len);
        r.skip(4).unwrap();
        assert_eq!(r.position(), 4);
        assert_eq!(r.read_bits(2), Ok(0b11));
        assert!(r.skip(3).is_err());
    }

    #[test_case(5, 3 => "101")]
    #[test_case(0, 6 => "000000")]
    #[test_case(4095, 12 => "111111111111")]
    fn write_bits(value: u64, n: u32) -> String {
        let mut w = BitWriter::new();
        w.write_bits(value, n).unwrap();
        bits_of(w)
    }

    #[test_case(8, 3 => ValueTooWide { value: 8, bits: 3 })]
    #[test_case(1, 0 => ValueTooWide { value: 1, bits: 0 } ; "zero width")]
    #[test_case(4096, 12 => ValueTooWide { value: 4096, bits: 12 })]
    fn write_bits_too_wide(value: u64, n: u32) -> ValueTooWide {
        BitWriter::new().write_bits(value, n).unwrap_err()
    }

    #[test]
    fn to_bytes_pads_with_zeroes() {
        let mut w = BitWriter::new();
        w.write_bits(0b101, 3).unwrap();
        w.write_bit(true).unwrap();
        assert_eq!(w.len(), 4);
        assert_eq!(w.to_bytes(), vec![0b1011_0000]);
    }

    #[test_case("101010", 1 => "k")]
    #[test_case("000100 001101", 2 => "EN")]
    fn read_string(s: &str, chars: usize) -> String {
        let (bytes, len) = b(s);
        BitReader::new(&bytes, len).read_string(chars).unwrap()
    }

    #[test_case("EN" => "000100001101")]
    #[test_case("" => "")]
    fn write_string(s: &str) -> String {
        let mut w = BitWriter::new();
        w.write_string(s).unwrap();
        bits_of(w)
    }

    #[test]
    fn write_string_rejects_non_letters() {
        assert!(BitWriter::new().write_string("e!").is_err());
    }

    #[test_case("001111101100100110001110010001011101" => 16854344797)]
    #[test_case("000000000000000000000000000000000000" => 0)]
    fn read_timestamp(s: &str) -> u64 {
        let (bytes, len) = b(s);
        BitReader::new(&bytes, len).read_timestamp().unwrap()
    }

    #[test_case("10101", 5 => BTreeSet::from_iter([1, 3, 5]))]
    #[test_case("101010", 6 => BTreeSet::from_iter([1, 3, 5]))]
    #[test_case("101010", 0 => BTreeSet::from_iter([]))]
    fn read_fixed_bitfield(s: &str, bits: usize) -> BTreeSet<u16> {
        let (bytes, len) = b(s);
        BitReader::new(&bytes, len).read_fixed_bitfield(bits).unwrap()
    }

    #[test]
    fn read_fixed_bitfield_truncated() {
        let (bytes, len) = b("101");
        assert!(BitReader::new(&bytes, len).read_fixed_bitfield(4).is_err());
    }

    #[test_case(&[1, 3, 5], 6 => "101010")]
    #[test_case(&[], 3 => "000")]
    fn write_fixed_bitfield(ids: &[u16], bits: usize) -> String {
        let mut w = BitWriter::new();
        w.write_fixed_bitfield(&ids.iter().copied().collect(), bits)
            .unwrap();
        bits_of(w)
    }

    #[test_case(&[7], 6 ; "id above width")]
    #[test_case(&[0], 6 ; "id zero")]
    fn write_fixed_bitfield_invalid(ids: &[u16], bits: usize) {
        let mut w = BitWriter::new();
        assert!(
            w.write_fixed_bitfield(&ids.iter().copied().collect(), bits)
                .is_err()
        );
    }

    #[test_case("000000000000" => Vec::<RangeEntry>::new() ; "empty")]
    #[test_case("000000000010 0 0000000000000011 1 0000000000000101 0000000000001000" => vec![
        RangeEntry::Single(3),
        RangeEntry::Range { start: 5, end: 8 },
    ] ; "single and range")]
    #[test_case("000000000001 1 0000000000001000 0000000000000101" => vec![
        RangeEntry::Range { start: 8, end: 5 },
    ] ; "reversed range is kept as is")]
    fn read_range_entries(s: &str) -> Vec<RangeEntry> {
        let (bytes, len) = b(s);
        BitReader::new(&bytes, len).read_range_entries().unwrap()
    }

    #[test]
    fn write_range_entries() {
        let entries = [RangeEntry::Single(3), RangeEntry::Range { start: 5, end: 8 }];
        let mut w = BitWriter::new();
        w.write_range_entries(&entries).unwrap();
        assert_eq!(w.len(), range_entries_bit_len(&entries));
        assert_eq!(
            bits_of(w),
            "000000000010 0 0000000000000011 1 0000000000000101 0000000000001000".replace(' ', "")
        );
    }
}
