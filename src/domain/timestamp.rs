//! Serde helpers for instants that may be "zero".
//!
//! A zero instant is modelled as `None` and written as [`ZERO`], so snapshots
//! stay readable by tools that expect a timestamp in every slot.

use std::fmt::Display;

use chrono::{DateTime, FixedOffset, SecondsFormat, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serializer};

pub const ZERO: &str = "0001-01-01T00:00:00Z";

pub fn format<Tz: TimeZone>(value: &Option<DateTime<Tz>>) -> String
where
    Tz::Offset: Display,
{
    match value {
        Some(dt) => dt.to_rfc3339_opts(SecondsFormat::AutoSi, true),
        None => ZERO.to_string(),
    }
}

pub fn parse(s: &str) -> Result<Option<DateTime<FixedOffset>>, chrono::ParseError> {
    let s = s.trim();
    if s.is_empty() || s == ZERO {
        return Ok(None);
    }
    DateTime::parse_from_rfc3339(s).map(Some)
}

pub fn serialize<S, Tz>(value: &Option<DateTime<Tz>>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
    Tz: TimeZone,
    Tz::Offset: Display,
{
    serializer.serialize_str(&format(value))
}

/// Writes the instant converted to UTC.
pub fn serialize_utc<S, Tz>(value: &Option<DateTime<Tz>>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
    Tz: TimeZone,
{
    serializer.serialize_str(&format(&value.as_ref().map(|dt| dt.with_timezone(&Utc))))
}

pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(deserialize_fixed(deserializer)?.map(|dt| dt.with_timezone(&Utc)))
}

pub fn deserialize_fixed<'de, D>(deserializer: D) -> Result<Option<DateTime<FixedOffset>>, D::Error>
where
    D: Deserializer<'de>,
{
    let s = Option::<String>::deserialize(deserializer)?.unwrap_or_default();
    parse(&s).map_err(serde::de::Error::custom)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_formats_as_epoch_string() {
        assert_eq!(format::<Utc>(&None), ZERO);
        assert_eq!(parse(ZERO).unwrap(), None);
        assert_eq!(parse("").unwrap(), None);
    }

    #[test]
    fn test_offset_is_preserved() {
        let parsed = parse("2024-03-01T10:00:00+02:00").unwrap().unwrap();
        assert_eq!(parsed.offset().local_minus_utc(), 2 * 3600);
        assert_eq!(format(&Some(parsed)), "2024-03-01T10:00:00+02:00");
    }

    #[test]
    fn test_utc_uses_z_suffix() {
        let dt = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        assert_eq!(format(&Some(dt)), "2024-01-02T03:04:05Z");
    }
}
