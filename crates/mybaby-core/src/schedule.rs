//! Schedule evaluation for schedule-mode devices
//!
//! Windows are half-open `[start, end)` on the household's local calendar day,
//! compared at minute granularity. A window with `end <= start` matches no
//! instant; midnight-crossing windows are not supported.

use chrono::{DateTime, Datelike, Duration, Local, NaiveTime, TimeZone};
use mybaby_api::ScheduleWindow;
use mybaby_util::WallClock;

/// How far ahead [`next_window_start`] looks
const LOOKAHEAD_DAYS: i64 = 7;

/// Whether `now` falls inside the window
pub fn is_active_window(window: &ScheduleWindow, now: &DateTime<Local>) -> bool {
    if window.end <= window.start {
        return false;
    }

    let t = WallClock::from_time(now);
    window.days.contains(now.weekday()) && window.start <= t && t < window.end
}

/// Union over windows. An empty list is never allowed.
pub fn is_allowed(windows: &[ScheduleWindow], now: &DateTime<Local>) -> bool {
    windows.iter().any(|w| is_active_window(w, now))
}

/// Minutes until the latest-ending active window closes
pub fn window_minutes_left(windows: &[ScheduleWindow], now: &DateTime<Local>) -> Option<u32> {
    let t = WallClock::from_time(now).minutes_from_midnight();
    windows
        .iter()
        .filter(|w| is_active_window(w, now))
        .map(|w| u32::from(w.end.minutes_from_midnight() - t))
        .max()
}

/// Start of the next window opening strictly after `now`, within a week
pub fn next_window_start(
    windows: &[ScheduleWindow],
    now: &DateTime<Local>,
) -> Option<DateTime<Local>> {
    let today = now.date_naive();

    (0..=LOOKAHEAD_DAYS)
        .map(|offset| today + Duration::days(offset))
        .flat_map(|day| {
            windows
                .iter()
                .filter(move |w| w.end > w.start && w.days.contains(day.weekday()))
                .filter_map(move |w| {
                    let time = NaiveTime::from_hms_opt(w.start.hour.into(), w.start.minute.into(), 0)?;
                    Local.from_local_datetime(&day.and_time(time)).earliest()
                })
        })
        .filter(|start| start > now)
        .min()
}
