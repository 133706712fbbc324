//! Decision engine: combines device policy with the platform catalog

use chrono::{DateTime, Local};
use mybaby_api::{Device, DeviceControl, Verdict};
use mybaby_util::PlatformId;

use crate::{PolicyCatalog, is_allowed, is_exhausted};

/// Verdict for a device using a platform at `now`.
///
/// Platforms outside the device's subset, unknown platforms and disabled
/// platforms are not governed. Otherwise the device's mode decides.
pub fn decide(
    device: &Device,
    catalog: &PolicyCatalog,
    platform_id: &PlatformId,
    now: &DateTime<Local>,
) -> Verdict {
    if !device.covers_platform(platform_id) {
        return Verdict::NotGoverned;
    }

    match catalog.get(platform_id) {
        Some(platform) if platform.enabled => {}
        _ => return Verdict::NotGoverned,
    }

    let allowed = match &device.control {
        DeviceControl::Quota { .. } => !is_exhausted(device, now),
        DeviceControl::Schedule { schedules } => is_allowed(schedules, now),
    };

    if allowed { Verdict::Allow } else { Verdict::Block }
}
