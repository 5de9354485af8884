//! Parsing and formatting of user supplied and catalogue timestamps.
use crate::error::{Error, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};

/// Lower bound substituted for a missing search start time.
pub const MISSION_START: &str = "2024-05-28T00:00:00Z";

const NAIVE_FORMATS: [&str; 7] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%dT%H:%M:%SZ",
    "%Y-%m-%dT%H:%MZ",
    "%Y%m%dT%H%M%SZ",
];

pub fn parse(input: &str) -> Result<DateTime<Utc>> {
    let input = input.trim();
    if let Ok(t) = DateTime::parse_from_rfc3339(input) {
        return Ok(t.with_timezone(&Utc));
    }
    for format in NAIVE_FORMATS {
        if let Ok(t) = NaiveDateTime::parse_from_str(input, format) {
            return Ok(Utc.from_utc_datetime(&t));
        }
    }
    if let Ok(d) = NaiveDate::parse_from_str(input, "%Y-%m-%d") {
        if let Some(t) = d.and_hms_opt(0, 0, 0) {
            return Ok(Utc.from_utc_datetime(&t));
        }
    }
    Err(Error::invalid_input(format!(
        "'{input}' is not a valid time (e.g. \"2024-07-31 13:45\" or \"20240731T134500Z\")"
    )))
}

pub fn format(t: &DateTime<Utc>) -> String {
    t.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

pub fn mission_start() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(MISSION_START)
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Parses the compact `YYYYMMDDTHHMMSSZ` stamps embedded in product file names.
/// Anything unparsable maps to the minimum representable time.
pub fn parse_compact_or_min(input: &str) -> DateTime<Utc> {
    NaiveDateTime::parse_from_str(input, "%Y%m%dT%H%M%SZ")
        .map(|t| Utc.from_utc_datetime(&t))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_accepts_common_spellings() {
        let expected = "2024-07-31T13:45:00Z";
        for input in [
            "2024-07-31 13:45",
            "2024-07-31 13:45:00",
            "2024-07-31T13:45",
            "2024-07-31T13:45:00Z",
            "20240731T134500Z",
            "2024-07-31T15:45:00+02:00",
        ] {
            assert_eq!(format(&parse(input).unwrap()), expected, "{input}");
        }
        assert_eq!(format(&parse("2024-07-31").unwrap()), "2024-07-31T00:00:00Z");
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(matches!(parse("yesterday"), Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_compact_fallback() {
        assert_eq!(
            format(&parse_compact_or_min("20240731T134500Z")),
            "2024-07-31T13:45:00Z"
        );
        assert_eq!(parse_compact_or_min("garbage"), DateTime::<Utc>::MIN_UTC);
        assert_eq!(format(&mission_start()), MISSION_START);
    }
}
