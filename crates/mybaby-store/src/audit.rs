//! Audit event types

use chrono::{DateTime, Local, NaiveDate};
use mybaby_api::{ControlMode, DeviceStatus, Verdict};
use mybaby_util::{DeviceId, MacAddress, PlatformId};
use serde::{Deserialize, Serialize};

/// Types of audit events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuditEventType {
    ServiceStarted,

    ServiceStopped,

    /// Catalog and registry loaded at startup
    PolicyLoaded {
        platform_count: usize,
        device_count: usize,
        /// True when loaded from the saved snapshot instead of config
        restored: bool,
    },

    PlatformAdded { platform_id: PlatformId, name: String },

    PlatformUpdated { platform_id: PlatformId },

    PlatformToggled { platform_id: PlatformId, enabled: bool },

    PlatformRemoved {
        platform_id: PlatformId,
        detached_from: Vec<DeviceId>,
    },

    DeviceAdded {
        device_id: DeviceId,
        mac: MacAddress,
        mode: ControlMode,
    },

    DeviceUpdated { device_id: DeviceId },

    DeviceRemoved { device_id: DeviceId, mac: MacAddress },

    /// A discovered sighting was registered as a device
    SightingPromoted { device_id: DeviceId, mac: MacAddress },

    /// Usage minutes reported by the enforcement backend
    UsageReported {
        device_id: DeviceId,
        minutes: u32,
        time_used_today: u32,
    },

    StatusReported {
        device_id: DeviceId,
        status: DeviceStatus,
    },

    /// Usage zeroed at rollover or by an operator
    DailyUsageReset {
        day: NaiveDate,
        device_count: usize,
        manual: bool,
    },

    VerdictChanged {
        device_id: DeviceId,
        platform_id: PlatformId,
        verdict: Verdict,
    },

    EnforcementToggled { enabled: bool },

    EnforcementPushFailed { message: String },

    DiscoveryFailed { message: String },

    /// Client connected
    ClientConnected {
        client_id: String,
        role: String,
        uid: Option<u32>,
    },

    ClientDisconnected { client_id: String },
}

impl AuditEventType {
    /// Short name matching the serialized tag
    pub fn name(&self) -> &'static str {
        match self {
            AuditEventType::ServiceStarted => "service_started",
            AuditEventType::ServiceStopped => "service_stopped",
            AuditEventType::PolicyLoaded { .. } => "policy_loaded",
            AuditEventType::PlatformAdded { .. } => "platform_added",
            AuditEventType::PlatformUpdated { .. } => "platform_updated",
            AuditEventType::PlatformToggled { .. } => "platform_toggled",
            AuditEventType::PlatformRemoved { .. } => "platform_removed",
            AuditEventType::DeviceAdded { .. } => "device_added",
            AuditEventType::DeviceUpdated { .. } => "device_updated",
            AuditEventType::DeviceRemoved { .. } => "device_removed",
            AuditEventType::SightingPromoted { .. } => "sighting_promoted",
            AuditEventType::UsageReported { .. } => "usage_reported",
            AuditEventType::StatusReported { .. } => "status_reported",
            AuditEventType::DailyUsageReset { .. } => "daily_usage_reset",
            AuditEventType::VerdictChanged { .. } => "verdict_changed",
            AuditEventType::EnforcementToggled { .. } => "enforcement_toggled",
            AuditEventType::EnforcementPushFailed { .. } => "enforcement_push_failed",
            AuditEventType::DiscoveryFailed { .. } => "discovery_failed",
            AuditEventType::ClientConnected { .. } => "client_connected",
            AuditEventType::ClientDisconnected { .. } => "client_disconnected",
        }
    }
}

/// Full audit event with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Unique event ID
    pub id: i64,

    pub timestamp: DateTime<Local>,

    /// Event type and details
    pub event: AuditEventType,
}

impl AuditEvent {
    pub fn new(event: AuditEventType) -> Self {
        Self {
            id: 0, // Will be set by store
            timestamp: mybaby_util::now(),
            event,
        }
    }

    /// Render for operator clients
    pub fn to_view(&self) -> mybaby_api::AuditEntryView {
        mybaby_api::AuditEntryView {
            id: self.id,
            timestamp: self.timestamp,
            event_type: self.event.name().to_string(),
            details: serde_json::to_value(&self.event).unwrap_or(serde_json::Value::Null),
        }
    }
}
