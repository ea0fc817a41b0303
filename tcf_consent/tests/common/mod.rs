use assert_json_diff::assert_json_eq;
use serde::Deserialize;
use std::fs::File;
use std::io;
use std::io::ErrorKind;
use std::path::Path;
use std::str::FromStr;
use tcf_consent::tcf::TcString;

#[derive(Deserialize)]
pub struct TestCase {
    tc_string: String,
    /// Shortest encoding of the decoded model, when it differs from `tc_string`.
    #[serde(default)]
    encoded: Option<String>,
    expected: TcString,
}

impl TestCase {
    pub fn load_from_file<P: AsRef<Path>>(p: P) -> io::Result<Self> {
        let f = File::open(p)?;
        let tc: Self = serde_json::from_reader(&f)
            .map_err(|e| io::Error::new(ErrorKind::InvalidData, e.to_string()))?;
        Ok(tc)
    }

    pub fn assert_json_matches(&self) {
        let decoded = match TcString::from_str(&self.tc_string) {
            Ok(decoded) => decoded,
            Err(e) => panic!("decode error: {:?}", e.to_string()),
        };

        assert_json_eq!(&decoded, &self.expected);
        assert_eq!(decoded, self.expected);

        let encoded = decoded.encode().expect("encodable model");
        assert_eq!(
            &encoded,
            self.encoded.as_ref().unwrap_or(&self.tc_string)
        );
        assert_eq!(TcString::from_str(&encoded).expect("valid string"), decoded);
    }
}
