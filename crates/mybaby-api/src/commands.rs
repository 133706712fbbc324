//! Command types for the mybabyd protocol

use chrono::{DateTime, Local};
use mybaby_util::{ClientId, DeviceId, PlatformId};
use serde::{Deserialize, Serialize};

use crate::{
    API_VERSION, Advice, AuditEntryView, ClientRole, DeviceDraft, DeviceStatus, DeviceView,
    DiscoveryReport, HealthStatus, Platform, ServiceStateSnapshot, Verdict,
};

/// Request wrapper with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    /// Request ID for correlation
    pub request_id: u64,
    pub api_version: u32,
    pub command: Command,
}

impl Request {
    pub fn new(request_id: u64, command: Command) -> Self {
        Self {
            request_id,
            api_version: API_VERSION,
            command,
        }
    }
}

/// Response wrapper
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    /// Corresponding request ID
    pub request_id: u64,
    pub api_version: u32,
    pub result: ResponseResult,
}

impl Response {
    pub fn success(request_id: u64, payload: ResponsePayload) -> Self {
        Self {
            request_id,
            api_version: API_VERSION,
            result: ResponseResult::Ok(payload),
        }
    }

    pub fn error(request_id: u64, error: ErrorInfo) -> Self {
        Self {
            request_id,
            api_version: API_VERSION,
            result: ResponseResult::Err(error),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseResult {
    Ok(ResponsePayload),
    Err(ErrorInfo),
}

/// Error information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub code: ErrorCode,
    pub message: String,
}

impl ErrorInfo {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Error codes for the protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    InvalidRequest,
    InvalidMacFormat,
    DuplicateId,
    DuplicateMac,
    NotFound,
    EmptyDomainList,
    EmptyName,
    /// Mode does not match the quota/schedules present
    InconsistentMode,
    PermissionDenied,
    StoreError,
    InternalError,
}

/// All possible commands from clients
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Command {
    /// Get current service state
    GetState,

    ListDevices,

    ListPlatforms,

    // Registry

    AddDevice { draft: DeviceDraft },

    /// Replace a device's policy fields. Usage and status are kept.
    UpdateDevice { device_id: DeviceId, draft: DeviceDraft },

    RemoveDevice { device_id: DeviceId },

    // Catalog

    AddPlatform { platform: Platform },

    UpdatePlatform { platform: Platform },

    TogglePlatform { platform_id: PlatformId },

    /// Remove a platform and detach it from every device
    RemovePlatform { platform_id: PlatformId },

    /// Evaluate a verdict
    Decide {
        device_id: DeviceId,
        platform_id: PlatformId,
        /// Optional: evaluate at a specific time (for preview)
        #[serde(default)]
        at_time: Option<DateTime<Local>>,
    },

    // Discovery

    ListRecentDevices {
        #[serde(default)]
        window_days: Option<u32>,
    },

    /// Register a discovered device under the default quota
    PromoteSighting {
        mac: String,
        #[serde(default)]
        name: Option<String>,
    },

    // Enforcement backend reports

    ReportUsage { mac: String, minutes: u32 },

    ReportStatus { mac: String, status: DeviceStatus },

    /// Zero every device's usage for today
    ResetDailyUsage,

    GetAdvice { device_id: DeviceId },

    SetEnforcementEnabled { enabled: bool },

    GetRecentAudits { limit: usize },

    /// Subscribe to events (returns immediately, events stream separately)
    SubscribeEvents,

    UnsubscribeEvents,

    GetHealth,

    /// Ping for keepalive
    Ping,
}

impl Command {
    /// Whether the command needs the admin role: anything that changes
    /// policy or usage state, plus the audit log
    pub fn requires_admin(&self) -> bool {
        matches!(
            self,
            Command::AddDevice { .. }
                | Command::UpdateDevice { .. }
                | Command::RemoveDevice { .. }
                | Command::AddPlatform { .. }
                | Command::UpdatePlatform { .. }
                | Command::TogglePlatform { .. }
                | Command::RemovePlatform { .. }
                | Command::PromoteSighting { .. }
                | Command::ReportUsage { .. }
                | Command::ReportStatus { .. }
                | Command::ResetDailyUsage
                | Command::SetEnforcementEnabled { .. }
                | Command::GetRecentAudits { .. }
        )
    }
}

/// Response payloads
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponsePayload {
    State(ServiceStateSnapshot),
    Devices { devices: Vec<DeviceView> },
    Platforms { platforms: Vec<Platform> },
    Device(DeviceView),
    DeviceRemoved { device_id: DeviceId },
    Platform(Platform),
    PlatformRemoved {
        platform_id: PlatformId,
        /// Devices whose platform subset lost the id
        detached_from: Vec<DeviceId>,
    },
    Decision {
        device_id: DeviceId,
        platform_id: PlatformId,
        at_time: DateTime<Local>,
        verdict: Verdict,
    },
    RecentDevices(DiscoveryReport),
    UsageRecorded {
        device_id: DeviceId,
        time_used_today: u32,
        remaining_minutes: Option<i64>,
    },
    StatusRecorded { device_id: DeviceId },
    DailyUsageReset { device_count: usize },
    Advice(Advice),
    EnforcementSet { enabled: bool },
    Audits { entries: Vec<AuditEntryView> },
    Subscribed { client_id: ClientId },
    Unsubscribed,
    Health(HealthStatus),
    Pong,
}

/// Client connection info (set by IPC layer)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientInfo {
    pub client_id: ClientId,
    pub role: ClientRole,
    /// Unix UID if available
    pub uid: Option<u32>,
}

impl ClientInfo {
    pub fn new(role: ClientRole) -> Self {
        Self {
            client_id: ClientId::new(),
            role,
            uid: None,
        }
    }

    pub fn with_uid(mut self, uid: u32) -> Self {
        self.uid = Some(uid);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DashboardStats, QuotaConfig};

    #[test]
    fn request_serialization() {
        let req = Request::new(1, Command::GetState);
        let json = serde_json::to_string(&req).unwrap();
        let parsed: Request = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed.request_id, 1);
        assert!(matches!(parsed.command, Command::GetState));
    }

    #[test]
    fn add_device_wire_format() {
        let draft = DeviceDraft::quota(
            "aa-bb-cc-dd-ee-ff",
            "Tablet",
            QuotaConfig {
                weekday_limit_minutes: 60,
                weekend_limit_minutes: 120,
            },
        );
        let json = serde_json::to_value(Request::new(7, Command::AddDevice { draft })).unwrap();

        assert_eq!(json["command"]["type"], "add_device");
        assert_eq!(json["command"]["draft"]["mode"], "quota");
        assert_eq!(json["command"]["draft"]["mac"], "aa-bb-cc-dd-ee-ff");
    }

    #[test]
    fn decide_at_time_is_optional() {
        let json = r#"{"request_id":3,"api_version":1,"command":{"type":"decide","device_id":"d1","platform_id":"2"}}"#;
        let parsed: Request = serde_json::from_str(json).unwrap();
        match parsed.command {
            Command::Decide { at_time, .. } => assert!(at_time.is_none()),
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn admin_commands_are_flagged() {
        assert!(Command::ResetDailyUsage.requires_admin());
        assert!(
            Command::ReportUsage {
                mac: "AA:BB:CC:DD:EE:FF".into(),
                minutes: 5
            }
            .requires_admin()
        );
        assert!(Command::GetRecentAudits { limit: 10 }.requires_admin());
        assert!(!Command::ListDevices.requires_admin());
        assert!(!Command::Ping.requires_admin());
    }

    #[test]
    fn response_serialization() {
        let resp = Response::success(
            1,
            ResponsePayload::State(ServiceStateSnapshot {
                api_version: API_VERSION,
                enforcement_enabled: true,
                ipv6_support: false,
                stats: DashboardStats::default(),
                devices: vec![],
                platforms: vec![],
            }),
        );

        let json = serde_json::to_string(&resp).unwrap();
        let parsed: Response = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed.request_id, 1);
        assert!(matches!(parsed.result, ResponseResult::Ok(ResponsePayload::State(_))));
    }

    #[test]
    fn error_codes_are_snake_case() {
        let info = ErrorInfo::new(ErrorCode::InvalidMacFormat, "bad");
        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["code"], "invalid_mac_format");
    }
}
