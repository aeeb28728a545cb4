//! Timestamp utilities
//!
//! Source tables were written by several tools over the years, so timestamps
//! show up as RFC 3339, SQLite `CURRENT_TIMESTAMP` text, bare dates, or
//! Brazilian `dd/mm/yyyy`. Parsing is lenient and never fails hard.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer};

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Timestamp used when a record carries no usable date
pub fn epoch() -> DateTime<Utc> {
    DateTime::<Utc>::UNIX_EPOCH
}

/// Parse a timestamp in any of the formats seen in source tables
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }

    // Postgres text output: "2024-01-01 10:00:00.123+00"
    for fmt in ["%Y-%m-%d %H:%M:%S%.f%#z", "%Y-%m-%dT%H:%M:%S%.f%#z"] {
        if let Ok(ts) = DateTime::parse_from_str(raw, fmt) {
            return Some(ts.with_timezone(&Utc));
        }
    }

    for fmt in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M", "%d/%m/%Y %H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }

    parse_date(raw).map(|d| Utc.from_utc_datetime(&d.and_time(NaiveTime::MIN)))
}

/// Parse a calendar date (`yyyy-mm-dd`, `dd/mm/yyyy`, or the date part of a timestamp)
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    let head = raw.get(..10).unwrap_or(raw);
    NaiveDate::parse_from_str(head, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(head, "%d/%m/%Y"))
        .ok()
}

/// Parse a wall-clock time (`HH:MM` or `HH:MM:SS`)
pub fn parse_time(raw: &str) -> Option<NaiveTime> {
    let raw = raw.trim();
    NaiveTime::parse_from_str(raw, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M"))
        .ok()
}

/// Serde helper: required timestamp, lenient, epoch when unusable
pub fn deserialize_lenient<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(deserialize_lenient_opt(deserializer)?.unwrap_or_else(epoch))
}

/// Serde helper: optional timestamp, lenient
pub fn deserialize_lenient_opt<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.as_deref().and_then(parse_timestamp))
}

/// Serde helper: optional calendar date, lenient
pub fn deserialize_date_opt<'de, D>(deserializer: D) -> Result<Option<NaiveDate>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.as_deref().and_then(parse_date))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    #[test]
    fn test_now_returns_recent_timestamp() {
        let timestamp = now();
        assert!(timestamp.timestamp() > 946_684_800); // 2000-01-01 00:00:00 UTC
        assert!(timestamp.timestamp() < 4_102_444_800); // 2100-01-01 00:00:00 UTC
    }

    #[test]
    fn test_parse_rfc3339() {
        let ts = parse_timestamp("2024-03-05T10:20:30-03:00").unwrap();
        assert_eq!(ts.hour(), 13);
        assert_eq!(ts.day(), 5);
    }

    #[test]
    fn test_parse_sqlite_current_timestamp() {
        let ts = parse_timestamp("2024-03-05 10:20:30").unwrap();
        assert_eq!((ts.hour(), ts.minute(), ts.second()), (10, 20, 30));
    }

    #[test]
    fn test_parse_postgres_text_offset() {
        let ts = parse_timestamp("2024-03-05 10:20:30.5+00").unwrap();
        assert_eq!(ts.hour(), 10);
    }

    #[test]
    fn test_parse_bare_and_brazilian_dates() {
        assert_eq!(parse_timestamp("2024-01-01").unwrap().year(), 2024);
        assert_eq!(parse_date("31/12/2023"), NaiveDate::from_ymd_opt(2023, 12, 31));
        assert_eq!(parse_date("2024-01-01T09:00:00Z"), NaiveDate::from_ymd_opt(2024, 1, 1));
    }

    #[test]
    fn test_parse_garbage_is_none() {
        assert!(parse_timestamp("").is_none());
        assert!(parse_timestamp("ontem").is_none());
        assert!(parse_date("2024-13-45").is_none());
        assert!(parse_time("25:99").is_none());
    }

    #[test]
    fn test_parse_time() {
        assert_eq!(parse_time("14:30"), NaiveTime::from_hms_opt(14, 30, 0));
        assert_eq!(parse_time("08:05:10"), NaiveTime::from_hms_opt(8, 5, 10));
    }
}
