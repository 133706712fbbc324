//! Validated policy structures

use crate::schema::{
    RawConfig, RawDefaults, RawDevice, RawEndpointConfig, RawPreset, RawPresets,
    RawScheduleWindow, RawServiceConfig,
};
use crate::validation::{parse_days, parse_time};
use mybaby_api::{DeviceDraft, DevicePreset, Platform, QuotaConfig, ScheduleWindow};
use mybaby_util::{MacAddress, Oui, PlatformId, WindowId};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

/// Default daily limits for promoted sightings
pub const DEFAULT_WEEKDAY_LIMIT_MINUTES: u32 = 60;
pub const DEFAULT_WEEKEND_LIMIT_MINUTES: u32 = 120;

/// Default freshness window for discovery listings
pub const DEFAULT_DISCOVERY_WINDOW_DAYS: u32 = 7;

/// Validated policy ready for use by the core engine
#[derive(Debug, Clone)]
pub struct Policy {
    pub service: ServiceConfig,

    /// Quota assigned when a sighting is promoted
    pub default_quota: QuotaConfig,

    pub platforms: Vec<Platform>,

    /// Devices as drafts; the registry commits them
    pub devices: Vec<DeviceDraft>,

    pub presets: PresetConfig,
}

impl Policy {
    /// Convert from raw config (after validation)
    pub fn from_raw(raw: RawConfig) -> Self {
        Self {
            service: ServiceConfig::from_raw(raw.service),
            default_quota: convert_defaults(raw.defaults),
            platforms: raw
                .platforms
                .into_iter()
                .map(|p| Platform {
                    id: PlatformId::new(p.id),
                    name: p.name,
                    icon: p.icon,
                    domains: p.domains,
                    enabled: p.enabled,
                })
                .collect(),
            devices: raw.devices.into_iter().map(convert_device).collect(),
            presets: PresetConfig::from_raw(raw.presets),
        }
    }

    /// Get platform by ID
    pub fn get_platform(&self, id: &PlatformId) -> Option<&Platform> {
        self.platforms.iter().find(|p| &p.id == id)
    }
}

/// Service configuration
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub socket_path: PathBuf,
    pub data_dir: PathBuf,
    pub enforcement_enabled: bool,
    pub ipv6_support: bool,
    pub restore_snapshot: bool,
    pub discovery: DiscoveryConfig,
    pub enforcement: EndpointConfig,
    pub advisory: EndpointConfig,
}

impl ServiceConfig {
    fn from_raw(raw: RawServiceConfig) -> Self {
        Self {
            socket_path: raw
                .socket_path
                .unwrap_or_else(mybaby_util::socket_path_without_env),
            data_dir: raw
                .data_dir
                .unwrap_or_else(mybaby_util::data_dir_without_env),
            enforcement_enabled: raw.enforcement_enabled.unwrap_or(true),
            ipv6_support: raw.ipv6_support.unwrap_or(false),
            restore_snapshot: raw.restore_snapshot.unwrap_or(true),
            discovery: DiscoveryConfig {
                url: raw.discovery.url,
                poll_interval: Duration::from_secs(raw.discovery.poll_interval_seconds.unwrap_or(60)),
                timeout: Duration::from_secs(raw.discovery.timeout_seconds.unwrap_or(5)),
                window_days: raw
                    .discovery
                    .window_days
                    .unwrap_or(DEFAULT_DISCOVERY_WINDOW_DAYS),
            },
            enforcement: EndpointConfig::from_raw(raw.enforcement, 5),
            advisory: EndpointConfig::from_raw(raw.advisory, 20),
        }
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self::from_raw(RawServiceConfig::default())
    }
}

/// Discovery polling configuration
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    /// None means discovery is not configured
    pub url: Option<String>,
    pub poll_interval: Duration,
    pub timeout: Duration,
    pub window_days: u32,
}

#[derive(Debug, Clone)]
pub struct EndpointConfig {
    pub url: Option<String>,
    pub timeout: Duration,
}

impl EndpointConfig {
    fn from_raw(raw: RawEndpointConfig, default_timeout_secs: u64) -> Self {
        Self {
            url: raw.url,
            timeout: Duration::from_secs(raw.timeout_seconds.unwrap_or(default_timeout_secs)),
        }
    }
}

/// Identification presets, keyed by canonical MAC and by OUI
#[derive(Debug, Clone, Default)]
pub struct PresetConfig {
    pub by_mac: HashMap<MacAddress, DevicePreset>,
    pub by_oui: HashMap<Oui, DevicePreset>,
}

impl PresetConfig {
    fn from_raw(raw: RawPresets) -> Self {
        Self {
            by_mac: raw
                .by_mac
                .into_iter()
                .filter_map(|(key, preset)| {
                    MacAddress::parse(&key).ok().map(|mac| (mac, convert_preset(preset)))
                })
                .collect(),
            by_oui: raw
                .by_oui
                .into_iter()
                .filter_map(|(key, preset)| {
                    Oui::parse(&key).ok().map(|oui| (oui, convert_preset(preset)))
                })
                .collect(),
        }
    }
}

// Conversion helpers

fn convert_defaults(raw: RawDefaults) -> QuotaConfig {
    QuotaConfig {
        weekday_limit_minutes: raw
            .weekday_limit_minutes
            .unwrap_or(DEFAULT_WEEKDAY_LIMIT_MINUTES),
        weekend_limit_minutes: raw
            .weekend_limit_minutes
            .unwrap_or(DEFAULT_WEEKEND_LIMIT_MINUTES),
    }
}

fn convert_preset(raw: RawPreset) -> DevicePreset {
    DevicePreset {
        name: raw.name,
        device_type: raw.device_type,
        model: raw.model,
        icon: raw.icon,
    }
}

fn convert_device(raw: RawDevice) -> DeviceDraft {
    DeviceDraft {
        id: raw.id.map(Into::into),
        mac: raw.mac,
        name: raw.name,
        mode: raw.mode,
        quota: raw.quota,
        schedules: raw.schedules.map(|windows| {
            windows
                .into_iter()
                .enumerate()
                .filter_map(|(i, w)| convert_schedule_window(i, w))
                .collect()
        }),
        platform_ids: raw
            .platforms
            .map(|ids| ids.into_iter().map(PlatformId::new).collect()),
    }
}

fn convert_schedule_window(index: usize, raw: RawScheduleWindow) -> Option<ScheduleWindow> {
    Some(ScheduleWindow {
        id: raw
            .id
            .map(WindowId::new)
            .unwrap_or_else(|| WindowId::new(format!("s{}", index + 1))),
        start: parse_time(&raw.start).ok()?,
        end: parse_time(&raw.end).ok()?,
        days: parse_days(&raw.days).ok()?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use mybaby_api::ControlMode;
    use mybaby_util::{DaySet, WallClock};

    #[test]
    fn test_service_defaults() {
        let service = ServiceConfig::default();
        assert!(service.enforcement_enabled);
        assert!(!service.ipv6_support);
        assert!(service.restore_snapshot);
        assert!(service.discovery.url.is_none());
        assert_eq!(service.discovery.window_days, 7);
        assert_eq!(service.advisory.timeout, Duration::from_secs(20));
    }

    #[test]
    fn test_schedule_window_ids_default_to_position() {
        let draft = convert_device(RawDevice {
            id: None,
            mac: "aa:bb:cc:dd:ee:ff".into(),
            name: "Tablet".into(),
            mode: ControlMode::Schedule,
            platforms: Some(vec!["1".into()]),
            quota: None,
            schedules: Some(vec![RawScheduleWindow {
                id: None,
                start: "18:30".into(),
                end: "20:00".into(),
                days: crate::RawDays::Preset("weekdays".into()),
            }]),
        });

        let windows = draft.schedules.unwrap();
        assert_eq!(windows[0].id.as_str(), "s1");
        assert_eq!(windows[0].start, WallClock::new(18, 30).unwrap());
        assert_eq!(windows[0].days, DaySet::WEEKDAYS);
        assert_eq!(draft.platform_ids, Some(vec![PlatformId::new("1")]));
    }

    #[test]
    fn test_presets_are_canonicalized() {
        let mut raw = RawPresets::default();
        raw.by_mac.insert(
            "ac-bc-32-00-ff-12".into(),
            RawPreset {
                name: Some("iPad Pro".into()),
                ..Default::default()
            },
        );
        raw.by_oui.insert("70-b3-d5".into(), RawPreset::default());

        let presets = PresetConfig::from_raw(raw);
        let mac = MacAddress::parse("AC:BC:32:00:FF:12").unwrap();
        assert_eq!(presets.by_mac[&mac].name.as_deref(), Some("iPad Pro"));
        assert!(presets.by_oui.contains_key(&Oui::parse("70:B3:D5").unwrap()));
    }
}
