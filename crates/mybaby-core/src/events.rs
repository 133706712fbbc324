//! Core events emitted by the control engine

use mybaby_api::{DeviceView, Platform, Verdict};
use mybaby_util::{DeviceId, PlatformId};

/// Events emitted by the core engine.
///
/// The daemon turns these into IPC events and decides whether the
/// enforcement backend needs a new plan.
#[derive(Debug, Clone)]
pub enum CoreEvent {
    DeviceChanged(DeviceView),

    DeviceRemoved {
        device_id: DeviceId,
    },

    PlatformChanged(Platform),

    PlatformRemoved {
        platform_id: PlatformId,
        detached_from: Vec<DeviceId>,
    },

    /// A governed verdict flipped (quota ran out, window opened or closed)
    VerdictChanged {
        device_id: DeviceId,
        platform_id: PlatformId,
        verdict: Verdict,
    },

    DailyUsageReset {
        device_count: usize,
    },

    EnforcementToggled {
        enabled: bool,
    },

    /// Discovery switched to cached data
    DiscoveryDegraded {
        message: String,
    },
}

impl CoreEvent {
    /// Whether the enforcement plan may differ after this event
    pub fn affects_enforcement(&self) -> bool {
        !matches!(self, CoreEvent::DiscoveryDegraded { .. })
    }
}
