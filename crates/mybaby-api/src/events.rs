//! Event types for mybabyd -> client streaming

use chrono::{DateTime, Local};
use mybaby_util::{DeviceId, PlatformId};
use serde::{Deserialize, Serialize};

use crate::{API_VERSION, DeviceView, Platform, ServiceStateSnapshot, Verdict};

/// Event envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub api_version: u32,
    pub timestamp: DateTime<Local>,
    pub payload: EventPayload,
}

impl Event {
    pub fn new(payload: EventPayload) -> Self {
        Self {
            api_version: API_VERSION,
            timestamp: mybaby_util::now(),
            payload,
        }
    }
}

/// All possible events from the service to clients
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    /// Full state snapshot (sent on subscribe and major changes)
    StateChanged(ServiceStateSnapshot),

    /// A device was added or its policy, usage or status changed
    DeviceChanged(DeviceView),

    DeviceRemoved { device_id: DeviceId },

    /// A platform was added, edited or toggled
    PlatformChanged(Platform),

    PlatformRemoved {
        platform_id: PlatformId,
        detached_from: Vec<DeviceId>,
    },

    /// A governed (device, platform) pair flipped verdict
    VerdictChanged {
        device_id: DeviceId,
        platform_id: PlatformId,
        verdict: Verdict,
    },

    /// Local midnight passed and usage was zeroed
    DailyUsageReset { device_count: usize },

    EnforcementToggled { enabled: bool },

    /// Discovery failed; listings are served from cache
    DiscoveryDegraded { message: String },

    /// Service is shutting down
    Shutdown,
}
