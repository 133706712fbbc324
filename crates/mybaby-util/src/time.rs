//! Time utilities for mybabyd
//!
//! Policy decisions use the household's local wall clock: schedule windows
//! are `HH:MM` times on weekdays indexed 0 (Sunday) through 6 (Saturday), and
//! quota days roll over at local midnight.
//!
//! # Mock Time for Development
//!
//! In debug builds, the `MYBABY_MOCK_TIME` environment variable can be set
//! to override the system time for all time-sensitive operations.
//!
//! Format: `YYYY-MM-DD HH:MM:SS` (e.g., `2025-12-25 18:30:00`)
//!
//! Example:
//! ```bash
//! MYBABY_MOCK_TIME="2025-12-25 18:30:00" mybabyd --config config.toml
//! ```

use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Timelike, Weekday};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;
use thiserror::Error;

/// Environment variable name for mock time (debug builds only)
pub const MOCK_TIME_ENV_VAR: &str = "MYBABY_MOCK_TIME";

/// Offset between mock time and real time, computed once at first use so
/// mock time advances naturally.
static MOCK_TIME_OFFSET: OnceLock<Option<chrono::Duration>> = OnceLock::new();

#[allow(clippy::disallowed_methods)] // This is the internal implementation that wraps Local::now()
fn get_mock_time_offset() -> Option<chrono::Duration> {
    *MOCK_TIME_OFFSET.get_or_init(|| {
        #[cfg(debug_assertions)]
        {
            if let Ok(mock_time_str) = std::env::var(MOCK_TIME_ENV_VAR) {
                match NaiveDateTime::parse_from_str(&mock_time_str, "%Y-%m-%d %H:%M:%S") {
                    Ok(naive_dt) => match Local.from_local_datetime(&naive_dt).single() {
                        Some(mock_dt) => {
                            let offset = mock_dt.signed_duration_since(chrono::Local::now());
                            tracing::info!(
                                mock_time = %mock_time_str,
                                offset_secs = offset.num_seconds(),
                                "Mock time enabled"
                            );
                            return Some(offset);
                        }
                        None => tracing::warn!(
                            mock_time = %mock_time_str,
                            "Failed to convert mock time to local timezone"
                        ),
                    },
                    Err(_) => tracing::warn!(
                        mock_time = %mock_time_str,
                        expected_format = "%Y-%m-%d %H:%M:%S",
                        "Invalid mock time format"
                    ),
                }
            }
            None
        }
        #[cfg(not(debug_assertions))]
        {
            None
        }
    })
}

/// Returns whether mock time is currently active.
pub fn is_mock_time_active() -> bool {
    get_mock_time_offset().is_some()
}

/// Get the current local time, respecting mock time settings in debug builds.
#[allow(clippy::disallowed_methods)] // This is the wrapper that provides mock time support
pub fn now() -> DateTime<Local> {
    let real_now = chrono::Local::now();

    match get_mock_time_offset() {
        Some(offset) => real_now + offset,
        None => real_now,
    }
}

/// Format a DateTime for display with full date and time.
pub fn format_datetime_full(dt: &DateTime<Local>) -> String {
    dt.format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Helper to format a minute count in human-readable form
pub fn format_minutes(minutes: i64) -> String {
    let sign = if minutes < 0 { "-" } else { "" };
    let abs = minutes.unsigned_abs();
    let hours = abs / 60;
    let mins = abs % 60;

    if hours > 0 {
        format!("{}{}h {}m", sign, hours, mins)
    } else {
        format!("{}{}m", sign, mins)
    }
}

/// Weekday index as used by schedule windows: 0 = Sunday .. 6 = Saturday
pub fn weekday_index(weekday: Weekday) -> u8 {
    weekday.num_days_from_sunday() as u8
}

/// Saturday and Sunday
pub fn is_weekend(weekday: Weekday) -> bool {
    matches!(weekday, Weekday::Sat | Weekday::Sun)
}

/// Invalid `HH:MM` string
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid time '{value}': {message}")]
pub struct WallClockParseError {
    pub value: String,
    pub message: &'static str,
}

/// Wall-clock time of day with minute granularity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct WallClock {
    pub hour: u8,
    pub minute: u8,
}

impl WallClock {
    pub fn new(hour: u8, minute: u8) -> Option<Self> {
        if hour < 24 && minute < 60 {
            Some(Self { hour, minute })
        } else {
            None
        }
    }

    /// Truncates seconds: 18:29:59 is 18:29
    pub fn from_time<T: Timelike>(t: &T) -> Self {
        Self {
            hour: t.hour() as u8,
            minute: t.minute() as u8,
        }
    }

    /// Returns minutes since midnight
    pub fn minutes_from_midnight(&self) -> u16 {
        (self.hour as u16) * 60 + self.minute as u16
    }
}

impl PartialOrd for WallClock {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for WallClock {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.minutes_from_midnight()
            .cmp(&other.minutes_from_midnight())
    }
}

impl fmt::Display for WallClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

impl FromStr for WallClock {
    type Err = WallClockParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = |message| WallClockParseError {
            value: s.to_string(),
            message,
        };

        let (h, m) = s.split_once(':').ok_or_else(|| err("expected HH:MM format"))?;
        if h.len() != 2 || m.len() != 2 || !h.bytes().chain(m.bytes()).all(|b| b.is_ascii_digit()) {
            return Err(err("expected HH:MM format"));
        }

        let hour: u8 = h.parse().map_err(|_| err("invalid hour"))?;
        let minute: u8 = m.parse().map_err(|_| err("invalid minute"))?;

        if hour >= 24 {
            return Err(err("hour must be 00-23"));
        }
        if minute >= 60 {
            return Err(err("minute must be 00-59"));
        }

        Ok(Self { hour, minute })
    }
}

impl TryFrom<String> for WallClock {
    type Error = WallClockParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<WallClock> for String {
    fn from(t: WallClock) -> Self {
        t.to_string()
    }
}

/// Weekday index outside 0..=6
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Invalid weekday index {0} (expected 0 = Sunday through 6 = Saturday)")]
pub struct DaySetError(pub u8);

/// Set of weekdays, bit `i` is weekday index `i` (0 = Sunday)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "Vec<u8>", into = "Vec<u8>")]
pub struct DaySet(u8);

impl DaySet {
    pub const WEEKDAYS: DaySet = DaySet(0b0011_1110);
    pub const WEEKENDS: DaySet = DaySet(0b0100_0001);
    pub const ALL_DAYS: DaySet = DaySet(0x7F);
    pub const NONE: DaySet = DaySet(0);

    pub fn from_indices(indices: impl IntoIterator<Item = u8>) -> Result<Self, DaySetError> {
        let mut mask = 0u8;
        for i in indices {
            if i > 6 {
                return Err(DaySetError(i));
            }
            mask |= 1 << i;
        }
        Ok(Self(mask))
    }

    pub fn contains_index(&self, index: u8) -> bool {
        index <= 6 && (self.0 & (1 << index)) != 0
    }

    pub fn contains(&self, weekday: Weekday) -> bool {
        self.contains_index(weekday_index(weekday))
    }

    /// Ascending weekday indices
    pub fn indices(&self) -> Vec<u8> {
        (0..=6).filter(|i| self.contains_index(*i)).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }
}

impl TryFrom<Vec<u8>> for DaySet {
    type Error = DaySetError;

    fn try_from(v: Vec<u8>) -> Result<Self, Self::Error> {
        Self::from_indices(v)
    }
}

impl From<DaySet> for Vec<u8> {
    fn from(days: DaySet) -> Self {
        days.indices()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Datelike;

    #[test]
    fn test_wall_clock_ordering() {
        let morning = WallClock::new(8, 0).unwrap();
        let evening = WallClock::new(18, 30).unwrap();
        let late = WallClock::new(20, 0).unwrap();

        assert!(morning < evening);
        assert!(evening < late);
    }

    #[test]
    fn test_wall_clock_parse() {
        assert_eq!("18:30".parse::<WallClock>().unwrap(), WallClock::new(18, 30).unwrap());
        assert_eq!("00:00".parse::<WallClock>().unwrap().minutes_from_midnight(), 0);
        assert_eq!("23:59".parse::<WallClock>().unwrap().minutes_from_midnight(), 1439);

        for bad in ["24:00", "12:60", "invalid", "7:30", "+1:30", "12:3", "12-30", ""] {
            assert!(bad.parse::<WallClock>().is_err(), "{bad:?} should be rejected");
        }
    }

    #[test]
    fn test_wall_clock_truncates_seconds() {
        let dt = Local.with_ymd_and_hms(2025, 12, 30, 18, 29, 59).unwrap();
        assert_eq!(WallClock::from_time(&dt), WallClock::new(18, 29).unwrap());
    }

    #[test]
    fn test_wall_clock_serde_string() {
        let t = WallClock::new(9, 5).unwrap();
        assert_eq!(serde_json::to_string(&t).unwrap(), "\"09:05\"");
        let parsed: WallClock = serde_json::from_str("\"20:00\"").unwrap();
        assert_eq!(parsed, WallClock::new(20, 0).unwrap());
    }

    #[test]
    fn test_day_set_indices() {
        let school = DaySet::from_indices([1, 2, 3, 4, 5]).unwrap();
        assert_eq!(school, DaySet::WEEKDAYS);
        assert!(school.contains(Weekday::Tue));
        assert!(!school.contains(Weekday::Sat));
        assert!(!school.contains(Weekday::Sun));

        let weekend = DaySet::from_indices([0, 6]).unwrap();
        assert_eq!(weekend, DaySet::WEEKENDS);
        assert_eq!(weekend.indices(), vec![0, 6]);

        assert_eq!(DaySet::from_indices([7]), Err(DaySetError(7)));
        assert!(DaySet::NONE.is_empty());
    }

    #[test]
    fn test_day_set_serde() {
        let days: DaySet = serde_json::from_str("[5, 1, 3]").unwrap();
        assert_eq!(serde_json::to_string(&days).unwrap(), "[1,3,5]");
        assert!(serde_json::from_str::<DaySet>("[9]").is_err());
    }

    #[test]
    fn test_weekend_detection() {
        assert!(is_weekend(Weekday::Sat));
        assert!(is_weekend(Weekday::Sun));
        assert!(!is_weekend(Weekday::Fri));
        assert_eq!(weekday_index(Weekday::Sun), 0);
        assert_eq!(weekday_index(Weekday::Sat), 6);
    }

    #[test]
    fn test_format_minutes() {
        assert_eq!(format_minutes(45), "45m");
        assert_eq!(format_minutes(125), "2h 5m");
        assert_eq!(format_minutes(-15), "-15m");
    }

    #[test]
    fn test_format_datetime_full() {
        let dt = Local.with_ymd_and_hms(2025, 12, 25, 14, 30, 45).unwrap();
        assert_eq!(format_datetime_full(&dt), "2025-12-25 14:30:45");
    }

    #[test]
    fn test_now_returns_time() {
        let t = now();
        assert!(t.year() >= 2020);
        assert!(t.year() <= 2100);
    }

    #[test]
    fn test_mock_time_env_var_name() {
        assert_eq!(MOCK_TIME_ENV_VAR, "MYBABY_MOCK_TIME");
        assert!(NaiveDateTime::parse_from_str("2025-12-25 14:30:00", "%Y-%m-%d %H:%M:%S").is_ok());
    }
}
