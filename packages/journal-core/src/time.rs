//! Timezone-aware temporal bucketing.
//!
//! All day/week/month keys are computed in an explicit user timezone. Nothing
//! in this module reads the system timezone.

use std::fmt;
use std::str::FromStr;

use chrono::{
    DateTime, Datelike, Duration, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, TimeZone,
    Utc,
};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Source of the current instant.
pub trait Clock {
    fn now(&self) -> DateTime<Utc>;
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now(&self) -> DateTime<Utc> {
        (**self).now()
    }
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock frozen at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedClock(pub DateTime<Utc>);

impl FixedClock {
    pub fn new(at: DateTime<Utc>) -> Self {
        Self(at)
    }

    pub fn parse(timestamp: &str) -> Result<Self> {
        parse_timestamp(timestamp).map(Self)
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// A user timezone: an IANA zone or a fixed UTC offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Timezone {
    Named(Tz),
    Fixed(FixedOffset),
}

impl Default for Timezone {
    fn default() -> Self {
        Timezone::Named(Tz::UTC)
    }
}

impl Timezone {
    pub fn utc() -> Self {
        Self::default()
    }

    /// Parse a timezone, treating an absent/blank value as UTC.
    pub fn parse_or_utc(value: Option<&str>) -> Result<Self> {
        match value.map(str::trim) {
            Some(s) if !s.is_empty() => s.parse(),
            _ => {
                tracing::debug!("No timezone supplied, bucketing in UTC");
                Ok(Self::utc())
            }
        }
    }

    /// Calendar date of `ts` as observed in this timezone.
    pub fn local_date(&self, ts: &DateTime<Utc>) -> NaiveDate {
        match self {
            Timezone::Named(tz) => ts.with_timezone(tz).date_naive(),
            Timezone::Fixed(offset) => ts.with_timezone(offset).date_naive(),
        }
    }

    /// UTC instant of the first moment of `day` in this timezone.
    pub fn start_of_day(&self, day: NaiveDate) -> Result<DateTime<Utc>> {
        let midnight = day.and_time(NaiveTime::MIN);
        let resolved = match self {
            Timezone::Named(tz) => first_valid_local(tz, midnight),
            Timezone::Fixed(offset) => first_valid_local(offset, midnight),
        };
        resolved.ok_or_else(|| {
            Error::InvalidTimestamp(format!("no local midnight for {} in {}", day, self))
        })
    }
}

/// Resolve a local wall time, skipping forward through a DST gap if needed.
fn first_valid_local<T: TimeZone>(tz: &T, naive: NaiveDateTime) -> Option<DateTime<Utc>> {
    (0..=4).find_map(|half_hours| {
        tz.from_local_datetime(&(naive + Duration::minutes(30 * half_hours)))
            .earliest()
            .map(|dt| dt.with_timezone(&Utc))
    })
}

impl FromStr for Timezone {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("z") {
            return Ok(Self::utc());
        }
        if let Ok(tz) = trimmed.parse::<Tz>() {
            return Ok(Timezone::Named(tz));
        }
        parse_fixed_offset(trimmed)
            .map(Timezone::Fixed)
            .ok_or_else(|| Error::InvalidTimezone(trimmed.to_string()))
    }
}

/// Accepts `UTC-5`, `UTC+05:30`, `GMT+2`, `+0200`, `-03:00`.
fn parse_fixed_offset(s: &str) -> Option<FixedOffset> {
    let upper = s.to_ascii_uppercase();
    let rest = upper
        .strip_prefix("UTC")
        .or_else(|| upper.strip_prefix("GMT"))
        .unwrap_or(&upper);

    let (sign, digits) = match rest.chars().next()? {
        '+' => (1, &rest[1..]),
        '-' => (-1, &rest[1..]),
        _ => return None,
    };

    let (hours, minutes) = match digits.split_once(':') {
        Some((h, m)) => (h.parse::<i32>().ok()?, m.parse::<i32>().ok()?),
        None if digits.len() == 4 && digits.is_ascii() => {
            (digits[..2].parse().ok()?, digits[2..].parse().ok()?)
        }
        None => (digits.parse().ok()?, 0),
    };

    if !(0..=14).contains(&hours) || !(0..60).contains(&minutes) {
        return None;
    }
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

impl fmt::Display for Timezone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Timezone::Named(tz) => write!(f, "{}", tz.name()),
            Timezone::Fixed(offset) => write!(f, "UTC{}", offset),
        }
    }
}

impl TryFrom<String> for Timezone {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Timezone> for String {
    fn from(tz: Timezone) -> Self {
        tz.to_string()
    }
}

/// Parse a timestamp string into a UTC instant.
///
/// Naive timestamps and bare dates are interpreted as UTC.
pub fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    let trimmed = s.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(dt.with_timezone(&Utc));
    }

    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Ok(naive.and_utc());
        }
    }

    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        return Ok(date.and_time(NaiveTime::MIN).and_utc());
    }

    Err(Error::InvalidTimestamp(s.to_string()))
}

/// Parse a `YYYY-MM-DD` day key.
pub fn parse_day(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .map_err(|_| Error::InvalidTimestamp(s.to_string()))
}

/// Calendar day `YYYY-MM-DD` of `ts` in `tz`.
pub fn day_key(ts: &DateTime<Utc>, tz: &Timezone) -> String {
    tz.local_date(ts).format("%Y-%m-%d").to_string()
}

/// `day_key` over an unparsed timestamp.
pub fn day_key_str(ts: &str, tz: &Timezone) -> Result<String> {
    parse_timestamp(ts).map(|dt| day_key(&dt, tz))
}

/// Today's day key in `tz`.
pub fn today<C: Clock>(clock: &C, tz: &Timezone) -> String {
    day_key(&clock.now(), tz)
}

pub fn is_same_day(a: &DateTime<Utc>, b: &DateTime<Utc>, tz: &Timezone) -> bool {
    tz.local_date(a) == tz.local_date(b)
}

/// True iff `later` is strictly after `earlier` and at most `max_minutes` later.
///
/// A window too large to represent as a duration has no upper bound.
pub fn within_minutes(later: &DateTime<Utc>, earlier: &DateTime<Utc>, max_minutes: i64) -> bool {
    let delta = *later - *earlier;
    delta > Duration::zero() && Duration::try_minutes(max_minutes).is_none_or(|max| delta <= max)
}

/// Whole minutes from `earlier` to `later` (negative if reversed).
pub fn minutes_between(later: &DateTime<Utc>, earlier: &DateTime<Utc>) -> i64 {
    (*later - *earlier).num_minutes()
}

/// Monday of the ISO week containing `ts` in `tz`, as `YYYY-MM-DD`.
pub fn week_key(ts: &DateTime<Utc>, tz: &Timezone) -> String {
    let date = tz.local_date(ts);
    let monday = date - Duration::days(date.weekday().num_days_from_monday() as i64);
    monday.format("%Y-%m-%d").to_string()
}

/// `YYYY-MM` of `ts` in `tz`.
pub fn month_key(ts: &DateTime<Utc>, tz: &Timezone) -> String {
    tz.local_date(ts).format("%Y-%m").to_string()
}

/// UTC bounds `[start, end)` of a local calendar day.
pub fn day_bounds(day: NaiveDate, tz: &Timezone) -> Result<(DateTime<Utc>, DateTime<Utc>)> {
    let next = day
        .succ_opt()
        .ok_or_else(|| Error::InvalidTimestamp(format!("no day after {}", day)))?;
    Ok((tz.start_of_day(day)?, tz.start_of_day(next)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(s: &str) -> DateTime<Utc> {
        parse_timestamp(s).unwrap()
    }

    #[test]
    fn test_day_key_fixed_offset() {
        let tz: Timezone = "UTC-5".parse().unwrap();
        assert_eq!(day_key(&ts("2024-01-01T23:30:00Z"), &tz), "2024-01-01");
        // 03:30Z is still the previous evening in UTC-5
        assert_eq!(day_key(&ts("2024-01-02T03:30:00Z"), &tz), "2024-01-01");
        assert_eq!(day_key(&ts("2024-01-02T05:00:00Z"), &tz), "2024-01-02");
    }

    #[test]
    fn test_day_key_iana() {
        let tz: Timezone = "Asia/Tokyo".parse().unwrap();
        assert_eq!(day_key(&ts("2024-01-01T16:00:00Z"), &tz), "2024-01-02");

        let ny: Timezone = "America/New_York".parse().unwrap();
        // EDT (UTC-4) in July
        assert_eq!(day_key(&ts("2024-07-02T03:59:00Z"), &ny), "2024-07-01");
        assert_eq!(day_key(&ts("2024-07-02T04:00:00Z"), &ny), "2024-07-02");
    }

    #[test]
    fn test_day_key_str_invalid() {
        let result = day_key_str("not a date", &Timezone::utc());
        assert!(matches!(result, Err(Error::InvalidTimestamp(_))));
    }

    #[test]
    fn test_parse_timestamp_formats() {
        let expected = ts("2024-03-05T10:15:00Z");
        assert_eq!(ts("2024-03-05T12:15:00+02:00"), expected);
        assert_eq!(ts("2024-03-05T10:15:00"), expected);
        assert_eq!(ts("2024-03-05 10:15:00"), expected);
        assert_eq!(ts("2024-03-05T10:15"), expected);
        assert_eq!(ts("2024-03-05"), ts("2024-03-05T00:00:00Z"));
        assert!(parse_timestamp("").is_err());
        assert!(parse_timestamp("2024-13-40").is_err());
    }

    #[test]
    fn test_timezone_parsing() {
        assert_eq!(Timezone::parse_or_utc(None).unwrap(), Timezone::utc());
        assert_eq!(Timezone::parse_or_utc(Some("  ")).unwrap(), Timezone::utc());
        assert_eq!(
            "UTC+05:30".parse::<Timezone>().unwrap(),
            Timezone::Fixed(FixedOffset::east_opt(5 * 3600 + 30 * 60).unwrap())
        );
        assert_eq!(
            "GMT+2".parse::<Timezone>().unwrap(),
            Timezone::Fixed(FixedOffset::east_opt(2 * 3600).unwrap())
        );
        assert_eq!(
            "-0300".parse::<Timezone>().unwrap(),
            Timezone::Fixed(FixedOffset::west_opt(3 * 3600).unwrap())
        );
        assert!(matches!(
            "Mars/Olympus".parse::<Timezone>(),
            Err(Error::InvalidTimezone(_))
        ));
        assert!("UTC+19".parse::<Timezone>().is_err());
    }

    #[test]
    fn test_timezone_serde_roundtrip() {
        let tz: Timezone = serde_json::from_str(r#""Europe/Berlin""#).unwrap();
        assert_eq!(tz.to_string(), "Europe/Berlin");
        assert!(serde_json::from_str::<Timezone>(r#""Nowhere/City""#).is_err());
    }

    #[test]
    fn test_is_same_day() {
        let tz: Timezone = "UTC-5".parse().unwrap();
        let a = ts("2024-01-01T23:30:00Z");
        let b = ts("2024-01-02T04:00:00Z");
        assert!(is_same_day(&a, &b, &tz));
        assert!(!is_same_day(&a, &b, &Timezone::utc()));
    }

    #[test]
    fn test_within_minutes() {
        let loss_close = ts("2024-01-01T10:00:00Z");
        assert!(within_minutes(&ts("2024-01-01T10:20:00Z"), &loss_close, 30));
        assert!(within_minutes(&ts("2024-01-01T10:30:00Z"), &loss_close, 30));
        assert!(!within_minutes(&ts("2024-01-01T10:31:00Z"), &loss_close, 30));
        assert!(!within_minutes(&ts("2024-01-01T09:59:00Z"), &loss_close, 30));
        assert!(!within_minutes(&loss_close, &loss_close, 30));
        assert!(within_minutes(&ts("2030-01-01T00:00:00Z"), &loss_close, i64::MAX));
        assert!(!within_minutes(&ts("2024-01-01T09:59:00Z"), &loss_close, i64::MAX));
    }

    #[test]
    fn test_week_and_month_keys() {
        let tz = Timezone::utc();
        // 2024-01-03 is a Wednesday
        assert_eq!(week_key(&ts("2024-01-03T12:00:00Z"), &tz), "2024-01-01");
        assert_eq!(week_key(&ts("2024-01-07T23:59:00Z"), &tz), "2024-01-01");
        assert_eq!(month_key(&ts("2024-01-31T23:30:00Z"), &tz), "2024-01");

        let tokyo: Timezone = "Asia/Tokyo".parse().unwrap();
        assert_eq!(month_key(&ts("2024-01-31T23:30:00Z"), &tokyo), "2024-02");
    }

    #[test]
    fn test_day_bounds() {
        let tz: Timezone = "UTC-5".parse().unwrap();
        let (start, end) = day_bounds(parse_day("2024-01-01").unwrap(), &tz).unwrap();
        assert_eq!(start, ts("2024-01-01T05:00:00Z"));
        assert_eq!(end, ts("2024-01-02T05:00:00Z"));
    }

    #[test]
    fn test_today_uses_clock() {
        let clock = FixedClock::parse("2024-06-30T22:00:00Z").unwrap();
        let tz: Timezone = "Europe/Berlin".parse().unwrap();
        assert_eq!(today(&clock, &tz), "2024-07-01");
        assert_eq!(today(&clock, &Timezone::utc()), "2024-06-30");
    }
}
