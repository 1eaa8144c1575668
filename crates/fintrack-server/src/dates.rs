use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};

/// Which end of a range a date-only value stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bound {
    Start,
    End,
}

/// Accepts RFC 3339, a zone-less `YYYY-MM-DDTHH:MM:SS` (read as UTC), or a bare
/// `YYYY-MM-DD` which means midnight UTC.
pub fn parse_datetime(raw: &str) -> Option<DateTime<Utc>> {
    parse_bound(raw, Bound::Start)
}

/// Like [`parse_datetime`], but a bare date used as [`Bound::End`] covers the whole day.
pub fn parse_bound(raw: &str, bound: Bound) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(naive.and_utc());
    }

    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok()?;
    let time = match bound {
        Bound::Start => NaiveTime::MIN,
        Bound::End => NaiveTime::from_hms_milli_opt(23, 59, 59, 999)?,
    };
    Some(date.and_time(time).and_utc())
}
