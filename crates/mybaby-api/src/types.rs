//! Shared types for the mybabyd model and API

use chrono::{DateTime, Local};
use mybaby_util::{DaySet, DeviceId, MacAddress, PlatformId, WallClock, WindowId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// A controllable content platform: a named bundle of domain patterns
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Platform {
    pub id: PlatformId,
    pub name: String,
    /// Icon reference (opaque, interpreted by the UI)
    #[serde(default)]
    pub icon: Option<String>,
    /// Glob-style domain patterns, e.g. `*.example.com`, stored verbatim
    pub domains: Vec<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

/// How a device's access is controlled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlMode {
    /// Cumulative daily minutes budget
    #[serde(alias = "QUOTA")]
    Quota,
    /// Fixed recurring weekly windows
    #[serde(alias = "SCHEDULE")]
    Schedule,
}

impl fmt::Display for ControlMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControlMode::Quota => f.write_str("quota"),
            ControlMode::Schedule => f.write_str("schedule"),
        }
    }
}

/// Daily minute budgets. Weekday = Mon-Fri, weekend = Sat-Sun.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaConfig {
    pub weekday_limit_minutes: u32,
    pub weekend_limit_minutes: u32,
}

/// A recurring weekly window, half-open: `[start, end)` on each of `days`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleWindow {
    pub id: WindowId,
    pub start: WallClock,
    pub end: WallClock,
    pub days: DaySet,
}

/// Validated control of a committed device. Exactly one of quota or
/// schedules exists, matching the mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum DeviceControl {
    Quota { quota: QuotaConfig },
    /// An empty list means never allowed
    Schedule { schedules: Vec<ScheduleWindow> },
}

impl DeviceControl {
    pub fn mode(&self) -> ControlMode {
        match self {
            DeviceControl::Quota { .. } => ControlMode::Quota,
            DeviceControl::Schedule { .. } => ControlMode::Schedule,
        }
    }
}

/// Reported device state (from the enforcement backend or discovery)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceStatus {
    Online,
    #[default]
    Offline,
    Blocked,
}

/// A managed device in the registry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    pub id: DeviceId,
    pub mac: MacAddress,
    pub name: String,
    #[serde(flatten)]
    pub control: DeviceControl,
    /// Platforms this device's control applies to. `None` means every
    /// enabled platform.
    #[serde(default)]
    pub platform_ids: Option<BTreeSet<PlatformId>>,
    /// Minutes consumed today, reset at local midnight
    #[serde(default)]
    pub time_used_today: u32,
    #[serde(default)]
    pub status: DeviceStatus,
    #[serde(default)]
    pub last_seen: Option<DateTime<Local>>,
}

impl Device {
    pub fn mode(&self) -> ControlMode {
        self.control.mode()
    }

    pub fn quota(&self) -> Option<&QuotaConfig> {
        match &self.control {
            DeviceControl::Quota { quota } => Some(quota),
            DeviceControl::Schedule { .. } => None,
        }
    }

    pub fn schedules(&self) -> Option<&[ScheduleWindow]> {
        match &self.control {
            DeviceControl::Quota { .. } => None,
            DeviceControl::Schedule { schedules } => Some(schedules),
        }
    }

    /// Whether the platform falls inside this device's platform subset
    pub fn covers_platform(&self, platform_id: &PlatformId) -> bool {
        match &self.platform_ids {
            Some(ids) => ids.contains(platform_id),
            None => true,
        }
    }
}

/// Unvalidated device as submitted by an operator or loaded from config.
///
/// The registry validates a draft as a whole before committing it, so a
/// device never exists in a half-edited state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceDraft {
    /// Assigned by the registry when absent
    #[serde(default)]
    pub id: Option<DeviceId>,
    /// Raw MAC as entered; normalized on commit
    pub mac: String,
    pub name: String,
    pub mode: ControlMode,
    #[serde(default)]
    pub quota: Option<QuotaConfig>,
    #[serde(default)]
    pub schedules: Option<Vec<ScheduleWindow>>,
    #[serde(default)]
    pub platform_ids: Option<Vec<PlatformId>>,
}

impl DeviceDraft {
    pub fn quota(mac: impl Into<String>, name: impl Into<String>, quota: QuotaConfig) -> Self {
        Self {
            id: None,
            mac: mac.into(),
            name: name.into(),
            mode: ControlMode::Quota,
            quota: Some(quota),
            schedules: None,
            platform_ids: None,
        }
    }

    pub fn schedule(
        mac: impl Into<String>,
        name: impl Into<String>,
        schedules: Vec<ScheduleWindow>,
    ) -> Self {
        Self {
            id: None,
            mac: mac.into(),
            name: name.into(),
            mode: ControlMode::Schedule,
            quota: None,
            schedules: Some(schedules),
            platform_ids: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<DeviceId>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_platforms<I, P>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PlatformId>,
    {
        self.platform_ids = Some(ids.into_iter().map(Into::into).collect());
        self
    }
}

impl From<&Device> for DeviceDraft {
    fn from(device: &Device) -> Self {
        let (quota, schedules) = match &device.control {
            DeviceControl::Quota { quota } => (Some(*quota), None),
            DeviceControl::Schedule { schedules } => (None, Some(schedules.clone())),
        };

        Self {
            id: Some(device.id.clone()),
            mac: device.mac.to_string(),
            name: device.name.clone(),
            mode: device.mode(),
            quota,
            schedules,
            platform_ids: device
                .platform_ids
                .as_ref()
                .map(|ids| ids.iter().cloned().collect()),
        }
    }
}

/// A raw network sighting from the discovery service. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecentDeviceSighting {
    /// As reported; may be in any accepted MAC spelling or malformed
    pub mac: String,
    /// As reported; scoped IPv6 addresses such as `fe80::1%eth0` included
    #[serde(default)]
    pub ip: Option<String>,
    #[serde(default)]
    pub hostname: Option<String>,
    /// Epoch seconds of the last observation
    #[serde(default, alias = "lastSeenAt")]
    pub last_seen_at: Option<i64>,
    /// Free-form last-seen text, informational only
    #[serde(default, alias = "lastSeen")]
    pub last_seen: Option<String>,
    #[serde(default)]
    pub online: bool,
}

/// Static identification hints keyed by exact MAC or by OUI
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DevicePreset {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub device_type: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub icon: Option<String>,
}

impl DevicePreset {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.device_type.is_none() && self.model.is_none() && self.icon.is_none()
    }
}

/// A fresh sighting enriched with preset data and registry membership
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveredDevice {
    pub mac: MacAddress,
    pub ip: Option<String>,
    pub hostname: Option<String>,
    pub last_seen_at: i64,
    pub online: bool,
    pub display_name: String,
    pub preset: DevicePreset,
    /// Set when the MAC is already in the registry; promotion is disabled
    pub controlled_by: Option<DeviceId>,
}

impl DiscoveredDevice {
    pub fn already_controlled(&self) -> bool {
        self.controlled_by.is_some()
    }
}

/// Result of listing recently seen devices
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryReport {
    pub devices: Vec<DiscoveredDevice>,
    /// True when the list comes from a cached fetch instead of a live one
    pub stale: bool,
    pub warning: Option<String>,
    pub fetched_at: Option<DateTime<Local>>,
}

/// Access verdict for a (device, platform, instant) triple
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Allow,
    Block,
    /// The device's policy does not apply to this platform
    NotGoverned,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Allow => f.write_str("ALLOW"),
            Verdict::Block => f.write_str("BLOCK"),
            Verdict::NotGoverned => f.write_str("NOT_GOVERNED"),
        }
    }
}

/// Verdict for one platform
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformVerdict {
    pub platform_id: PlatformId,
    pub verdict: Verdict,
}

/// View of a device for UI display
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceView {
    pub device: Device,
    /// Quota mode: today's limit
    pub daily_limit_minutes: Option<u32>,
    /// Quota mode: limit minus usage, negative when over
    pub remaining_minutes: Option<i64>,
    /// Schedule mode: minutes left in the currently open window
    pub window_minutes_left: Option<u32>,
    /// Schedule mode: when the next window opens, if one opens within a week
    pub next_window_start: Option<DateTime<Local>>,
    pub verdicts: Vec<PlatformVerdict>,
}

/// Counters for the dashboard
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DashboardStats {
    pub device_count: usize,
    pub online_count: usize,
    pub blocked_count: usize,
    pub enabled_platform_count: usize,
}

/// Full service state snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceStateSnapshot {
    pub api_version: u32,
    pub enforcement_enabled: bool,
    pub ipv6_support: bool,
    pub stats: DashboardStats,
    #[serde(default)]
    pub devices: Vec<DeviceView>,
    #[serde(default)]
    pub platforms: Vec<Platform>,
}

/// Free-text guidance from the advisory service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Advice {
    pub device_id: DeviceId,
    pub text: String,
    /// True when `text` is the placeholder because the advisor failed
    pub degraded: bool,
}

/// Audit log line for admin clients
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntryView {
    pub id: i64,
    pub timestamp: DateTime<Local>,
    pub event_type: String,
    pub details: serde_json::Value,
}

/// Role for authorization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientRole {
    /// Operator or enforcement agent - may mutate policy and report usage
    Admin,
    /// Read-only observer
    Observer,
}

impl ClientRole {
    pub fn can_mutate(&self) -> bool {
        matches!(self, ClientRole::Admin)
    }
}

/// Health status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub live: bool,
    pub ready: bool,
    pub store_ok: bool,
    /// False while discovery is serving cached data
    pub discovery_ok: bool,
    pub enforcement_ok: bool,
}
