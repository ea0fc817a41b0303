use std::env::args;
use std::str::FromStr;
use tcf_consent::tcf::TcString;

fn main() {
    let s = args()
        .nth(1)
        .unwrap_or_else(|| "CPXxRfAPXxRfAAfKABENB-CgAAAAAAAAAAYgAAAAAAAA".to_string());

    let tc_string = TcString::from_str(&s).expect("a valid TCF string");

    #[cfg(feature = "serde")]
    println!("{}", serde_json::to_string_pretty(&tc_string).unwrap());

    #[cfg(not(feature = "serde"))]
    println!("{tc_string:?}");
}
