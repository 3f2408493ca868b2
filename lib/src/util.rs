use crate::ArcStr;
use chrono::NaiveDate;
use serde::{de, Deserialize, Deserializer};
use std::{fs, io, path::Path};

/// Converts a not found error to Ok(false)
pub fn path_exists(path: &Path) -> io::Result<bool> {
    match fs::metadata(path) {
        Ok(_) => Ok(true),
        Err(e) if matches!(e.kind(), io::ErrorKind::NotFound) => Ok(false),
        Err(e) => Err(e),
    }
}

// Helpers for serde to parse fields with quirks.

/// Parse a string, but map "null" and "nan" to `None` (in addition to the default "" -> None
/// mapping)
pub fn optional_string<'de, D>(d: D) -> Result<Option<ArcStr>, D::Error>
where
    D: Deserializer<'de>,
{
    let s: String = Deserialize::deserialize(d)?;
    if s.is_empty() || s.eq_ignore_ascii_case("null") || s.eq_ignore_ascii_case("nan") {
        Ok(None)
    } else {
        Ok(Some(s.into()))
    }
}

/// Parse a date written either the way the trial extract does (m/d/yyyy) or as ISO 8601
/// (yyyy-mm-dd), which is how we write them back out.
pub fn trial_date<'de, D>(d: D) -> Result<NaiveDate, D::Error>
where
    D: Deserializer<'de>,
{
    let s: String = Deserialize::deserialize(d)?;
    parse_trial_date(&s).map_err(|e| de::Error::custom(format!("\"{}\": {}", s, e)))
}

fn parse_trial_date(s: &str) -> chrono::ParseResult<NaiveDate> {
    NaiveDate::parse_from_str(s, "%m/%d/%Y").or_else(|_| NaiveDate::parse_from_str(s, "%Y-%m-%d"))
}

// error printing helper.
//
pub trait ResultExt {
    fn print_error(self) -> Self;
}

impl<T> ResultExt for Result<T, anyhow::Error> {
    fn print_error(self) -> Self {
        match self {
            Ok(v) => Ok(v),
            Err(error) => {
                println!("error: {}", error);
                let mut err: &dyn std::error::Error = error.as_ref();
                while let Some(cause) = err.source() {
                    println!("caused by: {}", cause);
                    err = cause;
                }
                Err(error)
            }
        }
    }
}

pub fn header(header: &str) {
    let len = header.chars().count();
    print!("\n{}\n", header);
    for _ in 0..len {
        print!("=");
    }
    println!("\n")
}

#[cfg(test)]
mod test {
    use super::parse_trial_date;
    use chrono::NaiveDate;

    #[test]
    fn trial_dates() {
        let expected = NaiveDate::from_ymd_opt(1976, 7, 10).unwrap();
        assert_eq!(parse_trial_date("7/10/1976").unwrap(), expected);
        assert_eq!(parse_trial_date("1976-07-10").unwrap(), expected);
        assert!(parse_trial_date("10th July").is_err());
    }
}
