//! Configuration parsing and validation for mybabyd
//!
//! Supports TOML configuration with:
//! - Versioned schema
//! - Platform (rule set) and device definitions
//! - Quota and schedule control modes
//! - MAC and OUI identification presets
//! - Validation that reports every error at once

mod policy;
mod schema;
mod validation;

pub use policy::*;
pub use schema::*;
pub use validation::*;

use std::path::Path;
use thiserror::Error;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Validation failed: {errors:?}")]
    ValidationFailed { errors: Vec<ValidationError> },

    #[error("Unsupported config version: {0}")]
    UnsupportedVersion(u32),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Load and validate configuration from a TOML file
pub fn load_config(path: impl AsRef<Path>) -> ConfigResult<Policy> {
    let content = std::fs::read_to_string(path)?;
    parse_config(&content)
}

/// Parse and validate configuration from a TOML string
pub fn parse_config(content: &str) -> ConfigResult<Policy> {
    let raw: RawConfig = toml::from_str(content)?;

    if raw.config_version != CURRENT_CONFIG_VERSION {
        return Err(ConfigError::UnsupportedVersion(raw.config_version));
    }

    let errors = validate_config(&raw);
    if !errors.is_empty() {
        return Err(ConfigError::ValidationFailed { errors });
    }

    Ok(Policy::from_raw(raw))
}

/// Current supported config version
pub const CURRENT_CONFIG_VERSION: u32 = 1;

#[cfg(test)]
mod tests {
    use super::*;
    use mybaby_api::ControlMode;
    use std::io::Write;

    const SAMPLE: &str = r#"
        config_version = 1

        [service]
        enforcement_enabled = false
        ipv6_support = true

        [service.discovery]
        url = "http://127.0.0.1:8088/devices"
        window_days = 3

        [defaults]
        weekday_limit_minutes = 45

        [[platforms]]
        id = "1"
        name = "Douyin"
        domains = ["*.douyin.com", "*.snssdk.com"]

        [[platforms]]
        id = "2"
        name = "Bilibili"
        domains = ["*.bilibili.com"]
        enabled = false

        [[devices]]
        id = "d1"
        mac = "70-b3-d5-e2-b1-00"
        name = "Living room TV"
        mode = "quota"
        platforms = ["1"]
        quota = { weekday_limit_minutes = 60, weekend_limit_minutes = 120 }

        [[devices]]
        id = "d2"
        mac = "AC:BC:32:00:FF:12"
        name = "Tablet"
        mode = "schedule"

        [[devices.schedules]]
        id = "s1"
        start = "18:30"
        end = "20:00"
        days = [1, 2, 3, 4, 5]

        [presets.by_oui."70:B3:D5"]
        name = "Xiaomi TV"
        device_type = "tv"
    "#;

    #[test]
    fn parse_full_config() {
        let policy = parse_config(SAMPLE).unwrap();

        assert!(!policy.service.enforcement_enabled);
        assert!(policy.service.ipv6_support);
        assert_eq!(policy.service.discovery.window_days, 3);
        assert_eq!(policy.default_quota.weekday_limit_minutes, 45);
        assert_eq!(policy.default_quota.weekend_limit_minutes, 120);

        assert_eq!(policy.platforms.len(), 2);
        assert!(!policy.platforms[1].enabled);

        assert_eq!(policy.devices.len(), 2);
        assert_eq!(policy.devices[1].mode, ControlMode::Schedule);
        assert_eq!(policy.devices[1].schedules.as_ref().map(Vec::len), Some(1));
        assert_eq!(policy.presets.by_oui.len(), 1);
    }

    #[test]
    fn parse_minimal_config() {
        let policy = parse_config("config_version = 1").unwrap();
        assert!(policy.platforms.is_empty());
        assert!(policy.devices.is_empty());
        assert!(policy.service.enforcement_enabled);
    }

    #[test]
    fn reject_wrong_version() {
        let result = parse_config("config_version = 99");
        assert!(matches!(result, Err(ConfigError::UnsupportedVersion(99))));
    }

    #[test]
    fn reject_invalid_config() {
        let config = r#"
            config_version = 1

            [[platforms]]
            id = "1"
            name = "Empty"
            domains = []

            [[devices]]
            mac = "zz:zz:zz:zz:zz:zz"
            name = "Bad"
            mode = "schedule"
            quota = { weekday_limit_minutes = 1, weekend_limit_minutes = 1 }
        "#;

        match parse_config(config) {
            Err(ConfigError::ValidationFailed { errors }) => assert_eq!(errors.len(), 3),
            other => panic!("expected validation failure, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let policy = load_config(file.path()).unwrap();
        assert_eq!(policy.platforms.len(), 2);
    }
}
