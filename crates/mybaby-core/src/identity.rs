//! Identity resolution: MAC canonicalization and preset lookup

use mybaby_api::DevicePreset;
use mybaby_config::PresetConfig;
use mybaby_util::{MacAddress, Oui};
use std::collections::HashMap;

use crate::PolicyResult;

/// Canonicalize a raw MAC (`AA-bb-CC:dd:EE:ff` -> `AA:BB:CC:DD:EE:FF`)
pub fn normalize_mac(raw: &str) -> PolicyResult<MacAddress> {
    Ok(MacAddress::parse(raw)?)
}

/// Read-only identification hints
#[derive(Debug, Clone, Default)]
pub struct PresetTable {
    by_mac: HashMap<MacAddress, DevicePreset>,
    by_oui: HashMap<Oui, DevicePreset>,
}

impl PresetTable {
    pub fn new(
        by_mac: HashMap<MacAddress, DevicePreset>,
        by_oui: HashMap<Oui, DevicePreset>,
    ) -> Self {
        Self { by_mac, by_oui }
    }

    /// Exact MAC match first, then OUI; empty preset when neither matches
    pub fn resolve(&self, mac: &MacAddress) -> DevicePreset {
        self.by_mac
            .get(mac)
            .or_else(|| self.by_oui.get(&mac.oui()))
            .cloned()
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.by_mac.len() + self.by_oui.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_mac.is_empty() && self.by_oui.is_empty()
    }
}

impl From<PresetConfig> for PresetTable {
    fn from(config: PresetConfig) -> Self {
        Self::new(config.by_mac, config.by_oui)
    }
}

/// Pick a display name: explicit, then preset, then hostname, then the MAC
pub fn display_name(
    explicit: Option<&str>,
    preset: &DevicePreset,
    hostname: Option<&str>,
    mac: &MacAddress,
) -> String {
    [explicit, preset.name.as_deref(), hostname]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|s| !s.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| mac.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn preset(name: &str) -> DevicePreset {
        DevicePreset {
            name: Some(name.into()),
            ..Default::default()
        }
    }

    fn mac(s: &str) -> MacAddress {
        MacAddress::parse(s).unwrap()
    }

    fn table() -> PresetTable {
        let mut by_mac = HashMap::new();
        by_mac.insert(mac("70:B3:D5:E2:B1:00"), preset("Living room TV"));
        let mut by_oui = HashMap::new();
        by_oui.insert(Oui::parse("70:B3:D5").unwrap(), preset("Xiaomi TV"));
        PresetTable::new(by_mac, by_oui)
    }

    #[test]
    fn normalize_is_idempotent() {
        let a = normalize_mac("AA-BB-CC-DD-EE-FF").unwrap();
        let b = normalize_mac("aa:bb:cc:dd:ee:ff").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.to_string(), "AA:BB:CC:DD:EE:FF");
        assert_eq!(normalize_mac(&a.to_string()).unwrap(), a);
    }

    #[test]
    fn normalize_rejects_malformed() {
        assert!(normalize_mac("AA:BB:CC:DD:EE").is_err());
        assert!(normalize_mac("AABBCCDDEEFF").is_err());
    }

    #[test]
    fn exact_mac_beats_oui() {
        let table = table();
        assert_eq!(
            table.resolve(&mac("70-b3-d5-e2-b1-00")).name.as_deref(),
            Some("Living room TV")
        );
        assert_eq!(
            table.resolve(&mac("70:B3:D5:00:00:01")).name.as_deref(),
            Some("Xiaomi TV")
        );
    }

    #[test]
    fn miss_yields_empty_preset() {
        assert!(table().resolve(&mac("00:11:22:33:44:55")).is_empty());
        assert!(PresetTable::default().resolve(&mac("00:11:22:33:44:55")).is_empty());
    }

    #[test]
    fn display_name_precedence() {
        let m = mac("00:11:22:33:44:55");
        let p = preset("iPad Pro");
        let empty = DevicePreset::default();

        assert_eq!(display_name(Some("Kid's iPad"), &p, Some("ipad"), &m), "Kid's iPad");
        assert_eq!(display_name(None, &p, Some("ipad"), &m), "iPad Pro");
        assert_eq!(display_name(Some("  "), &empty, Some("ipad"), &m), "ipad");
        assert_eq!(display_name(None, &empty, None, &m), "00:11:22:33:44:55");
    }
}
