//! Quota tracking for quota-mode devices

use chrono::{DateTime, Datelike, Local};
use mybaby_api::{Device, QuotaConfig};

/// Today's limit: weekend limit on Saturday and Sunday, weekday limit otherwise
pub fn daily_limit(quota: &QuotaConfig, now: &DateTime<Local>) -> u32 {
    if mybaby_util::is_weekend(now.weekday()) {
        quota.weekend_limit_minutes
    } else {
        quota.weekday_limit_minutes
    }
}

/// Limit minus usage. Negative when over. `None` for non-quota devices.
pub fn remaining_minutes(device: &Device, now: &DateTime<Local>) -> Option<i64> {
    device
        .quota()
        .map(|quota| daily_limit(quota, now) as i64 - device.time_used_today as i64)
}

/// Whether a quota-mode device has used up today's budget
pub fn is_exhausted(device: &Device, now: &DateTime<Local>) -> bool {
    remaining_minutes(device, now).is_some_and(|remaining| remaining <= 0)
}
