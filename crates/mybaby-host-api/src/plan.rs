//! Enforcement plan handed to the backend

use chrono::{DateTime, Local};
use mybaby_api::Verdict;
use mybaby_util::{DeviceId, MacAddress, PlatformId};
use serde::{Deserialize, Serialize};

/// Everything the backend needs to block traffic right now
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnforcementPlan {
    /// False when the master switch is off; `devices` is then empty
    pub enabled: bool,
    pub ipv6_support: bool,
    pub generated_at: DateTime<Local>,
    pub devices: Vec<DeviceEnforcement>,
}

impl EnforcementPlan {
    /// A plan that blocks nothing
    pub fn disabled(ipv6_support: bool, generated_at: DateTime<Local>) -> Self {
        Self {
            enabled: false,
            ipv6_support,
            generated_at,
            devices: Vec::new(),
        }
    }

    pub fn device(&self, mac: &MacAddress) -> Option<&DeviceEnforcement> {
        self.devices.iter().find(|d| &d.mac == mac)
    }

    /// Number of (device, platform) pairs currently blocked
    pub fn blocked_rule_count(&self) -> usize {
        self.devices
            .iter()
            .flat_map(|d| &d.rules)
            .filter(|r| r.verdict == Verdict::Block)
            .count()
    }
}

/// Per-device slice of the plan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceEnforcement {
    pub device_id: DeviceId,
    pub mac: MacAddress,
    /// One rule per enabled, in-scope platform
    pub rules: Vec<PlatformRule>,
}

impl DeviceEnforcement {
    /// Domain patterns the backend must block for this device
    pub fn blocked_domains(&self) -> impl Iterator<Item = &str> {
        self.rules
            .iter()
            .filter(|r| r.verdict == Verdict::Block)
            .flat_map(|r| r.domains.iter().map(String::as_str))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformRule {
    pub platform_id: PlatformId,
    pub domains: Vec<String>,
    pub verdict: Verdict,
}
