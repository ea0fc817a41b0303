//! This crate is an implementation of the IAB Transparency & Consent Framework (TCF)
//! [consent string format](https://github.com/InteractiveAdvertisingBureau/GDPR-Transparency-and-Consent-Framework),
//! along with the storage conventions used by in-app CMPs.
//!
//! It can decode and encode both TCF v1.1 consent strings and TCF v2 TC strings.
//!
//! NOTE: This is not an official IAB library.
//!
//! # Decoding consent strings
//!
//! When the version of the string is known, use the version specific functions:
//!
//! ```
//! # use std::error::Error;
//! #
//! # fn main() -> Result<(), Box<dyn Error>> {
//! let cs = tcf_consent::decode_v2("CPXxRfAPXxRfAAfKABENB-CgAAAAAAAAAAYgAAAAAAAA")?;
//! assert_eq!(cs.core.cmp_id, 31);
//! assert_eq!(cs.core.publisher_country_code, "DE");
//! # Ok(())
//! # }
//! ```
//!
//! Otherwise, [`TcString`](tcf/enum.TcString.html) detects the version from the string itself:
//!
//! ```
//! # use std::error::Error;
//! #
//! # fn main() -> Result<(), Box<dyn Error>> {
//! use std::str::FromStr;
//! use tcf_consent::tcf::TcString;
//!
//! match TcString::from_str("BOEFEAyOEFEAyAHABDENAI4AAAB9vABAASA")? {
//!     TcString::V1(cs) => println!("TCF v1 string with {} vendors", cs.vendor_consents.len()),
//!     TcString::V2(cs) => println!("TCF v2 string from CMP {}", cs.core.cmp_id),
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Accessing consent data
//!
//! The following example checks that a specific vendor (id 8) may create a personalized ads
//! profile (purpose id 3) for the user who submitted the provided consent string.
//!
//! ```
//! # use std::error::Error;
//! #
//! # fn main() -> Result<(), Box<dyn Error>> {
//! let tcf = tcf_consent::decode_v2("COvFyGBOvFyGBAbAAAENAPCAAOAAAAAAAAAAAEEUACCKAAA")?;
//!
//! // does the user consent to the vendor creating a personalized ads profile
//! // based on their data?
//! let personalized_ads_profile_consent = tcf.core.purpose_consents.contains(&3);
//!
//! // does the user consent to the vendor using their data?
//! let vendor_consent = tcf.core.vendor_consents.contains(8);
//!
//! // did the publisher restrict this purpose for the vendor?
//! let restricted = tcf.core.restriction_for(8, 3).is_some();
//!
//! assert!(personalized_ads_profile_consent && vendor_consent && !restricted);
//! # Ok(())
//! # }
//! ```
//!
//! # Encoding consent strings
//!
//! Models can be built or modified, then encoded back. The encoder always picks the shortest
//! representation of vendor lists.
//!
//! ```
//! # use std::error::Error;
//! #
//! # fn main() -> Result<(), Box<dyn Error>> {
//! let mut cs = tcf_consent::decode_v2("COvFyGBOvFyGBAbAAAENAPCAAOAAAAAAAAAAAEEUACCKAAA")?;
//! cs.core.purpose_consents.insert(4);
//!
//! let s = tcf_consent::encode_v2(&cs)?;
//! assert_eq!(tcf_consent::decode_v2(&s)?, cs);
//! # Ok(())
//! # }
//! ```
//!
//! # Storing consent
//!
//! The [`storage`](storage/index.html) module persists decoded strings behind a minimal
//! key-value contract, and [`TcfApi`](api/struct.TcfApi.html) decodes and stores strings in one
//! call.
//!
//! # Error handling
//!
//! This crate is conservative with regard to how it handles parsing failure. If a string cannot be
//! fully decoded, then it is considered as an error.
//!
//! This is done to avoid obtaining erroneous user consent information from potentially corrupted
//! payloads.
//!
use crate::tcf::{ConsentStringV1, ConsentStringV2, TcfDecodeError, TcfEncodeError};

pub mod api;
pub mod core;
pub mod storage;
pub mod tcf;

/// Decodes a TCF v1 consent string.
pub fn decode_v1(s: &str) -> Result<ConsentStringV1, TcfDecodeError> {
    s.parse()
}

/// Encodes a TCF v1 consent string in its shortest form.
pub fn encode_v1(cs: &ConsentStringV1) -> Result<String, TcfEncodeError> {
    cs.encode()
}

/// Decodes a TCF v2 consent string, along with its optional segments.
pub fn decode_v2(s: &str) -> Result<ConsentStringV2, TcfDecodeError> {
    s.parse()
}

/// Encodes a TCF v2 consent string, each segment in its shortest form.
pub fn encode_v2(cs: &ConsentStringV2) -> Result<String, TcfEncodeError> {
    cs.encode()
}
