//! Discovery freshness filter and enrichment
//!
//! Sightings come from an external discovery service. Only those observed
//! within the trailing window are shown, and each is tagged with preset data
//! and whether the MAC is already under control.

use chrono::{DateTime, Local};
use mybaby_api::{DiscoveredDevice, RecentDeviceSighting};
use tracing::warn;

use crate::{DeviceRegistry, PresetTable, display_name, normalize_mac};

/// Default trailing window for "recently seen"
pub const DEFAULT_WINDOW_DAYS: u32 = 7;

const MS_PER_DAY: i64 = 24 * 60 * 60 * 1000;

/// Keep sightings with `last_seen_at` strictly inside the trailing window.
///
/// Sightings without a timestamp are dropped. Input order is preserved.
pub fn filter_recent(
    sightings: &[RecentDeviceSighting],
    now: &DateTime<Local>,
    window_days: u32,
) -> Vec<RecentDeviceSighting> {
    let threshold_ms = now.timestamp_millis() - i64::from(window_days) * MS_PER_DAY;

    sightings
        .iter()
        .filter(|s| {
            s.last_seen_at
                .is_some_and(|secs| secs.saturating_mul(1000) > threshold_ms)
        })
        .cloned()
        .collect()
}

/// Attach preset data and registry membership to fresh sightings.
///
/// Sightings whose MAC does not parse are skipped.
pub fn enrich(
    sightings: Vec<RecentDeviceSighting>,
    presets: &PresetTable,
    registry: &DeviceRegistry,
) -> Vec<DiscoveredDevice> {
    sightings
        .into_iter()
        .filter_map(|sighting| {
            let mac = match normalize_mac(&sighting.mac) {
                Ok(mac) => mac,
                Err(e) => {
                    warn!(mac = %sighting.mac, error = %e, "Skipping sighting with malformed MAC");
                    return None;
                }
            };

            let preset = presets.resolve(&mac);
            let display_name = display_name(None, &preset, sighting.hostname.as_deref(), &mac);

            Some(DiscoveredDevice {
                mac,
                ip: sighting.ip,
                hostname: sighting.hostname,
                last_seen_at: sighting.last_seen_at.unwrap_or_default(),
                online: sighting.online,
                display_name,
                preset,
                controlled_by: registry.find_by_mac(&mac).map(|d| d.id.clone()),
            })
        })
        .collect()
}
