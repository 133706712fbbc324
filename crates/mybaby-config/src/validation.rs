//! Configuration validation

use crate::schema::{RawConfig, RawDays, RawDevice, RawScheduleWindow};
use mybaby_api::ControlMode;
use mybaby_util::{DaySet, MacAddress, Oui, WallClock};
use std::collections::HashSet;
use thiserror::Error;

/// Validation error
#[derive(Debug, Clone, Error)]
pub enum ValidationError {
    #[error("Platform '{platform_id}': {message}")]
    PlatformError {
        platform_id: String,
        message: String,
    },

    #[error("Device '{device}': {message}")]
    DeviceError { device: String, message: String },

    #[error("Duplicate platform ID: {0}")]
    DuplicatePlatformId(String),

    #[error("Duplicate device ID: {0}")]
    DuplicateDeviceId(String),

    #[error("Duplicate MAC address: {0}")]
    DuplicateMac(String),

    #[error("Invalid MAC '{0}'")]
    InvalidMac(String),

    #[error("Invalid time format '{value}': {message}")]
    InvalidTimeFormat { value: String, message: String },

    #[error("Invalid day specification: {0}")]
    InvalidDaySpec(String),

    #[error("Global config error: {0}")]
    GlobalError(String),
}

/// Validate a raw configuration, collecting every problem
pub fn validate_config(config: &RawConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    let mut platform_ids = HashSet::new();
    for platform in &config.platforms {
        if !platform_ids.insert(platform.id.as_str()) {
            errors.push(ValidationError::DuplicatePlatformId(platform.id.clone()));
        }
        if platform.name.trim().is_empty() {
            errors.push(ValidationError::PlatformError {
                platform_id: platform.id.clone(),
                message: "name cannot be empty".into(),
            });
        }
        if platform.domains.is_empty() {
            errors.push(ValidationError::PlatformError {
                platform_id: platform.id.clone(),
                message: "domains must contain at least one pattern".into(),
            });
        } else if platform.domains.iter().any(|d| d.trim().is_empty()) {
            errors.push(ValidationError::PlatformError {
                platform_id: platform.id.clone(),
                message: "domain patterns cannot be blank".into(),
            });
        }
    }

    let mut device_ids = HashSet::new();
    let mut macs = HashSet::new();
    for device in &config.devices {
        if let Some(id) = &device.id
            && !device_ids.insert(id.as_str())
        {
            errors.push(ValidationError::DuplicateDeviceId(id.clone()));
        }

        match MacAddress::parse(&device.mac) {
            Ok(mac) => {
                if !macs.insert(mac) {
                    errors.push(ValidationError::DuplicateMac(mac.to_string()));
                }
            }
            Err(_) => errors.push(ValidationError::InvalidMac(device.mac.clone())),
        }

        errors.extend(validate_device(device, &platform_ids));
    }

    for key in config.presets.by_mac.keys() {
        if MacAddress::parse(key).is_err() {
            errors.push(ValidationError::InvalidMac(key.clone()));
        }
    }
    for key in config.presets.by_oui.keys() {
        if Oui::parse(key).is_err() {
            errors.push(ValidationError::GlobalError(format!(
                "Invalid OUI preset key '{}' (expected AA:BB:CC)",
                key
            )));
        }
    }

    let discovery = &config.service.discovery;
    if discovery.poll_interval_seconds == Some(0) {
        errors.push(ValidationError::GlobalError(
            "discovery poll_interval_seconds must be positive".into(),
        ));
    }
    if discovery.window_days == Some(0) {
        errors.push(ValidationError::GlobalError(
            "discovery window_days must be positive".into(),
        ));
    }
    for (name, timeout) in [
        ("discovery", discovery.timeout_seconds),
        ("enforcement", config.service.enforcement.timeout_seconds),
        ("advisory", config.service.advisory.timeout_seconds),
    ] {
        if timeout == Some(0) {
            errors.push(ValidationError::GlobalError(format!(
                "{} timeout_seconds must be positive",
                name
            )));
        }
    }

    errors
}

fn validate_device(device: &RawDevice, platform_ids: &HashSet<&str>) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    let label = device.id.clone().unwrap_or_else(|| device.mac.clone());
    let device_error = |message: String| ValidationError::DeviceError {
        device: label.clone(),
        message,
    };

    if device.name.trim().is_empty() {
        errors.push(device_error("name cannot be empty".into()));
    }

    match device.mode {
        ControlMode::Quota => {
            if device.quota.is_none() || device.schedules.is_some() {
                errors.push(device_error(
                    "mode \"quota\" requires quota and no schedules".into(),
                ));
            }
        }
        ControlMode::Schedule => {
            if device.schedules.is_none() || device.quota.is_some() {
                errors.push(device_error(
                    "mode \"schedule\" requires schedules and no quota".into(),
                ));
            }
        }
    }

    if let Some(platforms) = &device.platforms {
        for id in platforms {
            if !platform_ids.contains(id.as_str()) {
                errors.push(device_error(format!("unknown platform '{}'", id)));
            }
        }
    }

    for window in device.schedules.iter().flatten() {
        errors.extend(validate_schedule_window(window));
    }

    errors
}

fn validate_schedule_window(window: &RawScheduleWindow) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if let Err(e) = parse_days(&window.days) {
        errors.push(ValidationError::InvalidDaySpec(e));
    }

    for value in [&window.start, &window.end] {
        if let Err(e) = parse_time(value) {
            errors.push(ValidationError::InvalidTimeFormat {
                value: value.clone(),
                message: e,
            });
        }
    }

    errors
}

/// Parse HH:MM time format
pub fn parse_time(s: &str) -> Result<WallClock, String> {
    s.parse::<WallClock>().map_err(|e| e.message.to_string())
}

/// Parse days specification
pub fn parse_days(days: &RawDays) -> Result<DaySet, String> {
    match days {
        RawDays::Preset(preset) => match preset.to_lowercase().as_str() {
            "all" | "every" | "daily" => Ok(DaySet::ALL_DAYS),
            "weekdays" => Ok(DaySet::WEEKDAYS),
            "weekends" => Ok(DaySet::WEEKENDS),
            other => Err(format!("Unknown day preset: {}", other)),
        },
        RawDays::Indices(list) => DaySet::from_indices(list.iter().copied())
            .map_err(|e| format!("Day index {} out of range (0 = Sunday .. 6 = Saturday)", e.0)),
    }
}
