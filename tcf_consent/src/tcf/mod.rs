//! Models and codecs for TCF consent strings.
//!
//! Both versions of the format are supported, each in its own submodule:
//!
//! - [`v1`] for the legacy TCF v1.1 consent string, starting with a `B` character,
//! - [`v2`] for TCF v2.0 and v2.2 TC strings, starting with a `C` character.
//!
//! When the version of a string is not known in advance, [`TcString`] inspects the version
//! field and dispatches to the matching codec.
//!
//! Decoding is strict: if a string cannot be fully decoded it is rejected as a whole, so
//! that consent information is never read from a corrupted payload.
//!
use crate::core::base64::{self, DecodeError};
use crate::core::{BitReader, BitWriter, FromDataReader, OutOfRange, ToDataWriter, ValueTooWide};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::ops::RangeInclusive;
use std::str::FromStr;
use thiserror::Error;

pub mod restrictions;
pub mod v1;
pub mod v2;
pub mod vendors;

pub use restrictions::{PublisherRestriction, RestrictionType};
pub use v1::ConsentStringV1;
pub use v2::{ConsentStringV2, Core, PublisherPurposes, Segment, SegmentType};
pub use vendors::{VendorEncoding, VendorSet};

pub type IdSet = BTreeSet<u16>;

/// The error type for consent string decoding operations.
#[derive(Error, Debug, Clone, Eq, PartialEq)]
#[non_exhaustive]
pub enum TcfDecodeError {
    /// The string ended before all fields could be read.
    ///
    /// This usually occurs if the input string is truncated.
    #[error("unexpected end of string: {0}")]
    OutOfRange(#[from] OutOfRange),
    /// The version field does not match the codec that was asked to decode the string.
    #[error("unsupported version (expected {expected}, found {found})")]
    UnsupportedVersion { expected: u8, found: u8 },
    /// The version field does not match any known version of the format.
    #[error("unknown consent string version {found}")]
    UnknownVersion { found: u8 },
    /// The string contains a character outside of the URL-safe base64 alphabet.
    #[error("invalid encoding: {0}")]
    InvalidEncoding(#[from] DecodeError),
    /// An optional segment has a type which is reserved or unknown.
    #[error("unknown segment type {segment_type}")]
    UnknownSegment { segment_type: u8 },
    /// The same optional segment appears more than once.
    #[error("duplicate segment type {segment_type}")]
    DuplicateSegment { segment_type: u8 },
    /// A two letter code holds a value outside of `A` to `Z`.
    #[error("invalid character {character:?} in {field}")]
    InvalidLetter { field: &'static str, character: char },
}

/// The error type for consent string encoding operations.
///
/// Encoding only fails when the model is inconsistent with the limits of the format.
#[derive(Error, Debug, Clone, Eq, PartialEq)]
#[non_exhaustive]
pub enum TcfEncodeError {
    #[error("{0}")]
    ValueTooWide(#[from] ValueTooWide),
    #[error("{field} id {id} is out of range (1..={max})")]
    IdOutOfRange {
        field: &'static str,
        id: u16,
        max: u16,
    },
    #[error("invalid character {character:?} in {field}")]
    InvalidCharacter { field: &'static str, character: char },
    #[error("{field} must have {expected} characters, found {found}")]
    InvalidLength {
        field: &'static str,
        expected: usize,
        found: usize,
    },
    #[error("invalid range {start}-{end}")]
    InvalidRange { start: u16, end: u16 },
    #[error("range starting at {next_start} overlaps an entry ending at {previous_end}")]
    OverlappingRanges { previous_end: u16, next_start: u16 },
    #[error("duplicate segment type {segment_type}")]
    DuplicateSegment { segment_type: u8 },
}

/// A single id or an inclusive range of ids, as found in range encoded vendor lists.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum RangeEntry {
    Single(u16),
    Range { start: u16, end: u16 },
}

impl RangeEntry {
    pub fn start(&self) -> u16 {
        match *self {
            Self::Single(id) => id,
            Self::Range { start, .. } => start,
        }
    }

    pub fn end(&self) -> u16 {
        match *self {
            Self::Single(id) => id,
            Self::Range { end, .. } => end,
        }
    }

    /// Ids covered by this entry. A range whose end is lower than its start is empty.
    pub fn ids(&self) -> RangeInclusive<u16> {
        self.start()..=self.end()
    }

    pub fn contains(&self, id: u16) -> bool {
        self.ids().contains(&id)
    }
}

/// Builds the shortest list of entries covering the given ascending ids.
pub(crate) fn compact_ranges<I>(ids: I) -> Vec<RangeEntry>
where
    I: IntoIterator<Item = u16>,
{
    let mut entries: Vec<RangeEntry> = vec![];
    for id in ids {
        match entries.last_mut() {
            Some(last) if last.end().checked_add(1) == Some(id) => {
                *last = RangeEntry::Range {
                    start: last.start(),
                    end: id,
                };
            }
            _ => entries.push(RangeEntry::Single(id)),
        }
    }
    entries
}

/// Clamps entries to `min..=max` and merges them into sorted, disjoint inclusive intervals.
///
/// Reversed entries cover nothing and are dropped.
pub(crate) fn merge_entries(entries: &[RangeEntry], min: u16, max: u16) -> Vec<(u16, u16)> {
    let mut intervals = entries
        .iter()
        .map(|e| (e.start().max(min), e.end().min(max)))
        .filter(|(start, end)| start <= end)
        .collect::<Vec<_>>();
    intervals.sort_unstable();

    let mut merged: Vec<(u16, u16)> = Vec::with_capacity(intervals.len());
    for (start, end) in intervals {
        match merged.last_mut() {
            Some(last) if u32::from(start) <= u32::from(last.1) + 1 => last.1 = last.1.max(end),
            _ => merged.push((start, end)),
        }
    }
    merged
}

/// Every id covered by merged intervals.
pub(crate) fn expand_intervals(intervals: &[(u16, u16)]) -> IdSet {
    intervals.iter().flat_map(|&(start, end)| start..=end).collect()
}

/// Rewrites reversed or overlapping entries as the minimal list covering the same ids.
///
/// Well-formed lists are returned unchanged.
pub(crate) fn normalize_entries(entries: Vec<RangeEntry>) -> Vec<RangeEntry> {
    if validate_entries(&entries).is_ok() {
        return entries;
    }
    merge_entries(&entries, 0, u16::MAX)
        .into_iter()
        .map(|(start, end)| {
            if start == end {
                RangeEntry::Single(start)
            } else {
                RangeEntry::Range { start, end }
            }
        })
        .collect()
}

/// Checks that every entry is well-formed and that no two entries overlap.
pub(crate) fn validate_entries(entries: &[RangeEntry]) -> Result<(), TcfEncodeError> {
    if let Some(e) = entries.iter().find(|e| e.start() > e.end()) {
        return Err(TcfEncodeError::InvalidRange {
            start: e.start(),
            end: e.end(),
        });
    }

    let mut sorted = entries.to_vec();
    sorted.sort_by_key(|e| e.start());
    for pair in sorted.windows(2) {
        if pair[1].start() <= pair[0].end() {
            return Err(TcfEncodeError::OverlappingRanges {
                previous_end: pair[0].end(),
                next_start: pair[1].start(),
            });
        }
    }

    Ok(())
}

/// Checks that every id of a set can be written in a field whose ids go from 1 to `max`.
pub(crate) fn check_ids(field: &'static str, ids: &IdSet, max: u16) -> Result<(), TcfEncodeError> {
    match ids.iter().find(|&&id| id == 0 || id > max) {
        Some(&id) => Err(TcfEncodeError::IdOutOfRange { field, id, max }),
        None => Ok(()),
    }
}

/// Checks that a two letter code such as a language or a country can be written.
pub(crate) fn check_letters(field: &'static str, s: &str) -> Result<(), TcfEncodeError> {
    let found = s.chars().count();
    if found != 2 {
        return Err(TcfEncodeError::InvalidLength {
            field,
            expected: 2,
            found,
        });
    }
    match s.chars().find(|c| !c.is_ascii_uppercase()) {
        Some(character) => Err(TcfEncodeError::InvalidCharacter { field, character }),
        None => Ok(()),
    }
}

/// Rejects decoded two letter codes holding values past `Z`.
pub(crate) fn decoded_letters(field: &'static str, s: String) -> Result<String, TcfDecodeError> {
    match s.chars().find(|c| !c.is_ascii_uppercase()) {
        Some(character) => Err(TcfDecodeError::InvalidLetter { field, character }),
        None => Ok(s),
    }
}

pub(crate) trait Base64EncodedStr<T> {
    fn parse_base64_str(&self) -> Result<T, TcfDecodeError>;
}

impl<T> Base64EncodedStr<T> for str
where
    T: FromDataReader<Err = TcfDecodeError>,
{
    fn parse_base64_str(&self) -> Result<T, TcfDecodeError> {
        let bytes = base64::decode(self)?;
        BitReader::new(&bytes, self.len() * 6).parse()
    }
}

/// Encodes a value into its shortest base64 representation.
pub(crate) fn to_base64_str<T>(value: &T) -> Result<String, TcfEncodeError>
where
    T: ToDataWriter<Err = TcfEncodeError> + ?Sized,
{
    let mut w = BitWriter::new();
    w.emit(value)?;
    Ok(w.to_base64())
}

/// A consent string of any supported version.
///
/// # Example
///
/// ```
/// use tcf_consent::tcf::TcString;
///
/// let s: TcString = "CPXxRfAPXxRfAAfKABENB-CgAAAAAAAAAAYgAAAAAAAA".parse().unwrap();
/// assert_eq!(s.version(), 2);
/// ```
#[derive(Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "version", rename_all = "lowercase"))]
pub enum TcString {
    V1(ConsentStringV1),
    V2(ConsentStringV2),
}

impl TcString {
    pub fn version(&self) -> u8 {
        match self {
            Self::V1(_) => v1::TCF_V1_VERSION,
            Self::V2(_) => v2::TCF_V2_VERSION,
        }
    }

    pub fn encode(&self) -> Result<String, TcfEncodeError> {
        match self {
            Self::V1(s) => s.encode(),
            Self::V2(s) => s.encode(),
        }
    }
}

/// Reads the 6 bit version field which starts every consent string.
pub(crate) fn peek_version(s: &str) -> Result<u8, TcfDecodeError> {
    let first_segment = s.split('.').next().unwrap_or_default();
    let bytes = base64::decode(first_segment)?;
    let mut r = BitReader::new(&bytes, first_segment.len() * 6);
    Ok(r.read_unsigned::<u8>(6)?)
}

impl FromStr for TcString {
    type Err = TcfDecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match peek_version(s)? {
            v1::TCF_V1_VERSION => s.parse().map(Self::V1),
            v2::TCF_V2_VERSION => s.parse().map(Self::V2),
            found => Err(TcfDecodeError::UnknownVersion { found }),
        }
    }
}
