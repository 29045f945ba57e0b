//! Shared timestamp helpers and the injectable clock.
//!
//! All stored timestamps are RFC 3339 UTC strings with millisecond precision
//! (`2026-10-16T09:30:00.000Z`). Fixed width means lexical order in SQLite
//! equals chronological order.

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use ulid::Ulid;

/// Source of "now" for date filters and record stamping.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock pinned to one instant. Used by tests and replays.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Returns unix-epoch seconds with `Z` suffix (e.g. `1771220592Z`).
pub fn now_epoch_z() -> String {
    format!("{}Z", Utc::now().timestamp())
}

pub fn new_event_id() -> String {
    Ulid::new().to_string()
}

/// Canonical storage form of a timestamp.
pub fn to_storage(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parses planner-supplied datetimes.
///
/// Accepts full RFC 3339, a naive `YYYY-MM-DDTHH:MM[:SS[.fff]]` (read as UTC)
/// and a bare `YYYY-MM-DD` (midnight UTC).
pub fn parse_datetime(input: &str) -> Option<DateTime<Utc>> {
    let s = input.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%d %H:%M",
    ] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive))
}

/// `[today 00:00, tomorrow 00:00)` in UTC.
pub fn day_bounds(now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = start_of_day(now);
    (start, start + Duration::days(1))
}

/// `[Monday 00:00, next Monday 00:00)` in UTC.
pub fn week_bounds(now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
    let days_from_monday = i64::from(now.weekday().num_days_from_monday());
    let start = start_of_day(now) - Duration::days(days_from_monday);
    (start, start + Duration::days(7))
}

fn start_of_day(ts: DateTime<Utc>) -> DateTime<Utc> {
    let naive = ts
        .date_naive()
        .and_hms_opt(0, 0, 0)
        .unwrap_or_else(|| ts.naive_utc());
    Utc.from_utc_datetime(&naive)
}

/// Human form used in enriched responses: `2026-10-17 14:00 UTC`.
pub fn display(ts: &str) -> String {
    match parse_datetime(ts) {
        Some(dt) => dt.format("%Y-%m-%d %H:%M UTC").to_string(),
        None => ts.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(s: &str) -> DateTime<Utc> {
        parse_datetime(s).unwrap()
    }

    #[test]
    fn test_now_epoch_z_format() {
        let result = now_epoch_z();
        assert!(result.ends_with('Z'));
        assert!(result.trim_end_matches('Z').parse::<u64>().is_ok());
    }

    #[test]
    fn test_new_event_id_is_valid_ulid() {
        let id = new_event_id();
        assert!(ulid::Ulid::from_string(&id).is_ok());
    }

    #[test]
    fn storage_form_is_fixed_width_utc() {
        let ts = at("2026-10-16T09:30:00+02:00");
        assert_eq!(to_storage(ts), "2026-10-16T07:30:00.000Z");
    }

    #[test]
    fn parses_naive_and_date_only_inputs_as_utc() {
        assert_eq!(to_storage(at("2026-10-16T14:00")), "2026-10-16T14:00:00.000Z");
        assert_eq!(to_storage(at("2026-10-16")), "2026-10-16T00:00:00.000Z");
        assert!(parse_datetime("tomorrow").is_none());
        assert!(parse_datetime("").is_none());
    }

    #[test]
    fn week_starts_on_monday() {
        // 2026-10-16 is a Friday.
        let (start, end) = week_bounds(at("2026-10-16T18:45:00Z"));
        assert_eq!(to_storage(start), "2026-10-12T00:00:00.000Z");
        assert_eq!(to_storage(end), "2026-10-19T00:00:00.000Z");
    }

    #[test]
    fn day_bounds_cover_one_day() {
        let (start, end) = day_bounds(at("2026-10-16T23:59:59Z"));
        assert_eq!(to_storage(start), "2026-10-16T00:00:00.000Z");
        assert_eq!(to_storage(end), "2026-10-17T00:00:00.000Z");
    }

    #[test]
    fn display_is_minute_precision() {
        assert_eq!(display("2026-10-17T14:00:00.000Z"), "2026-10-17 14:00 UTC");
    }
}
