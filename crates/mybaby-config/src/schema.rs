//! Raw configuration schema (as parsed from TOML)

use mybaby_api::{ControlMode, QuotaConfig};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Raw configuration as parsed from TOML
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawConfig {
    /// Config schema version
    pub config_version: u32,

    /// Global service settings
    #[serde(default)]
    pub service: RawServiceConfig,

    /// Quota given to promoted sightings
    #[serde(default)]
    pub defaults: RawDefaults,

    #[serde(default)]
    pub platforms: Vec<RawPlatform>,

    #[serde(default)]
    pub devices: Vec<RawDevice>,

    #[serde(default)]
    pub presets: RawPresets,
}

/// Service-level settings
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawServiceConfig {
    /// IPC socket path
    pub socket_path: Option<PathBuf>,

    /// Data directory for store
    pub data_dir: Option<PathBuf>,

    /// Master switch for pushing plans to the enforcement backend
    pub enforcement_enabled: Option<bool>,

    pub ipv6_support: Option<bool>,

    /// Prefer the last saved catalog and registry over the lists in this file
    pub restore_snapshot: Option<bool>,

    #[serde(default)]
    pub discovery: RawDiscoveryConfig,

    #[serde(default)]
    pub enforcement: RawEndpointConfig,

    #[serde(default)]
    pub advisory: RawEndpointConfig,
}

/// Discovery service settings
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawDiscoveryConfig {
    /// Absent means no live discovery
    pub url: Option<String>,
    pub poll_interval_seconds: Option<u64>,
    pub timeout_seconds: Option<u64>,
    /// Freshness window for "recently seen"
    pub window_days: Option<u32>,
}

/// Remote collaborator reached over HTTP
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawEndpointConfig {
    pub url: Option<String>,
    pub timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawDefaults {
    pub weekday_limit_minutes: Option<u32>,
    pub weekend_limit_minutes: Option<u32>,
}

/// Raw platform definition
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawPlatform {
    pub id: String,
    pub name: String,
    pub icon: Option<String>,
    #[serde(default)]
    pub domains: Vec<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

/// Raw device definition
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawDevice {
    /// Generated when absent
    pub id: Option<String>,

    /// Any accepted MAC spelling
    pub mac: String,

    pub name: String,

    pub mode: ControlMode,

    /// Platform subset. Absent means all enabled platforms.
    pub platforms: Option<Vec<String>>,

    pub quota: Option<QuotaConfig>,

    pub schedules: Option<Vec<RawScheduleWindow>>,
}

/// Schedule window
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawScheduleWindow {
    pub id: Option<String>,

    /// Start time (HH:MM format)
    pub start: String,

    /// End time (HH:MM format), exclusive
    pub end: String,

    /// Days of week: "weekdays", "weekends", "all", or indices like [1, 2, 3] (0 = Sunday)
    pub days: RawDays,
}

/// Days specification
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum RawDays {
    Preset(String),
    Indices(Vec<u8>),
}

/// Identification hints keyed by exact MAC or by OUI
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawPresets {
    #[serde(default)]
    pub by_mac: BTreeMap<String, RawPreset>,

    #[serde(default)]
    pub by_oui: BTreeMap<String, RawPreset>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawPreset {
    pub name: Option<String>,
    pub device_type: Option<String>,
    pub model: Option<String>,
    pub icon: Option<String>,
}
