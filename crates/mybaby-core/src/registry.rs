//! Device registry: managed devices and their control policy

use chrono::{DateTime, Local};
use mybaby_api::{ControlMode, Device, DeviceControl, DeviceDraft, DeviceStatus};
use mybaby_util::{DeviceId, MacAddress, PlatformId};
use std::collections::BTreeSet;

use crate::{EntityKind, PolicyError, PolicyResult, normalize_mac};

/// Ordered set of devices, unique by id and by MAC
#[derive(Debug, Clone, Default)]
pub struct DeviceRegistry {
    devices: Vec<Device>,
}

/// Policy fields of a draft after validation
struct ValidDraft {
    mac: MacAddress,
    name: String,
    control: DeviceControl,
    platform_ids: Option<BTreeSet<PlatformId>>,
}

/// Check a draft as a whole. Nothing is committed here.
fn validate_draft(draft: &DeviceDraft) -> PolicyResult<ValidDraft> {
    let name = draft.name.trim();
    if name.is_empty() {
        return Err(PolicyError::EmptyName);
    }

    let mac = normalize_mac(&draft.mac)?;

    let control = match (draft.mode, &draft.quota, &draft.schedules) {
        (ControlMode::Quota, Some(quota), None) => DeviceControl::Quota { quota: *quota },
        (ControlMode::Schedule, None, Some(schedules)) => DeviceControl::Schedule {
            schedules: schedules.clone(),
        },
        (ControlMode::Quota, _, _) => {
            return Err(PolicyError::InconsistentMode {
                mode: ControlMode::Quota,
                reason: "requires a quota and no schedules",
            });
        }
        (ControlMode::Schedule, _, _) => {
            return Err(PolicyError::InconsistentMode {
                mode: ControlMode::Schedule,
                reason: "requires schedules and no quota",
            });
        }
    };

    Ok(ValidDraft {
        mac,
        name: name.to_string(),
        control,
        platform_ids: draft
            .platform_ids
            .as_ref()
            .map(|ids| ids.iter().cloned().collect()),
    })
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restore already-validated devices (e.g. from a snapshot). Entries that
    /// collide on id or MAC with an earlier one are skipped.
    pub fn from_devices(devices: impl IntoIterator<Item = Device>) -> Self {
        let mut registry = Self::new();
        for device in devices {
            if registry.get(&device.id).is_none() && registry.find_by_mac(&device.mac).is_none() {
                registry.devices.push(device);
            }
        }
        registry
    }

    pub fn get(&self, id: &DeviceId) -> Option<&Device> {
        self.devices.iter().find(|d| &d.id == id)
    }

    pub fn find_by_mac(&self, mac: &MacAddress) -> Option<&Device> {
        self.devices.iter().find(|d| &d.mac == mac)
    }

    pub fn list(&self) -> &[Device] {
        &self.devices
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Register a new device. A missing id is generated.
    pub fn add(&mut self, draft: &DeviceDraft) -> PolicyResult<&Device> {
        let valid = validate_draft(draft)?;

        let id = draft.id.clone().unwrap_or_else(DeviceId::generate);
        if self.get(&id).is_some() {
            return Err(PolicyError::DuplicateId {
                kind: EntityKind::Device,
                id: id.to_string(),
            });
        }
        self.check_mac_free(&valid.mac, None)?;

        self.devices.push(Device {
            id,
            mac: valid.mac,
            name: valid.name,
            control: valid.control,
            platform_ids: valid.platform_ids,
            time_used_today: 0,
            status: DeviceStatus::Offline,
            last_seen: None,
        });
        Ok(&self.devices[self.devices.len() - 1])
    }

    /// Replace a device's policy fields. Usage, status and last-seen are kept.
    pub fn update(&mut self, id: &DeviceId, draft: &DeviceDraft) -> PolicyResult<&Device> {
        let index = self.index_of(id)?;
        let valid = validate_draft(draft)?;
        self.check_mac_free(&valid.mac, Some(id))?;

        let device = &mut self.devices[index];
        device.mac = valid.mac;
        device.name = valid.name;
        device.control = valid.control;
        device.platform_ids = valid.platform_ids;
        Ok(&self.devices[index])
    }

    pub fn remove(&mut self, id: &DeviceId) -> PolicyResult<Device> {
        let index = self.index_of(id)?;
        Ok(self.devices.remove(index))
    }

    /// Add reported minutes. Returns the new total.
    pub fn add_usage(&mut self, id: &DeviceId, minutes: u32) -> PolicyResult<u32> {
        let index = self.index_of(id)?;
        let device = &mut self.devices[index];
        device.time_used_today = device.time_used_today.saturating_add(minutes);
        Ok(device.time_used_today)
    }

    /// Overwrite today's usage (restoring from the store)
    pub fn set_usage(&mut self, id: &DeviceId, minutes: u32) -> PolicyResult<()> {
        let index = self.index_of(id)?;
        self.devices[index].time_used_today = minutes;
        Ok(())
    }

    /// Zero every device's usage. Returns the number of devices reset.
    pub fn reset_usage(&mut self) -> usize {
        for device in &mut self.devices {
            device.time_used_today = 0;
        }
        self.devices.len()
    }

    /// Record a reported status. Online and blocked devices count as seen.
    pub fn set_status(
        &mut self,
        id: &DeviceId,
        status: DeviceStatus,
        now: DateTime<Local>,
    ) -> PolicyResult<&Device> {
        let index = self.index_of(id)?;
        let device = &mut self.devices[index];
        device.status = status;
        if status != DeviceStatus::Offline {
            device.last_seen = Some(now);
        }
        Ok(&self.devices[index])
    }

    /// Remove a platform id from every device subset. Returns the affected devices.
    pub fn detach_platform(&mut self, platform_id: &PlatformId) -> Vec<DeviceId> {
        self.devices
            .iter_mut()
            .filter_map(|device| {
                let ids = device.platform_ids.as_mut()?;
                ids.remove(platform_id).then(|| device.id.clone())
            })
            .collect()
    }

    fn check_mac_free(&self, mac: &MacAddress, except: Option<&DeviceId>) -> PolicyResult<()> {
        match self.find_by_mac(mac) {
            Some(existing) if Some(&existing.id) != except => Err(PolicyError::DuplicateMac {
                mac: *mac,
                existing: existing.id.clone(),
            }),
            _ => Ok(()),
        }
    }

    fn index_of(&self, id: &DeviceId) -> PolicyResult<usize> {
        self.devices
            .iter()
            .position(|d| &d.id == id)
            .ok_or_else(|| PolicyError::not_found(EntityKind::Device, id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use mybaby_api::{QuotaConfig, ScheduleWindow};
    use mybaby_util::{DaySet, WallClock, WindowId};

    fn quota() -> QuotaConfig {
        QuotaConfig {
            weekday_limit_minutes: 60,
            weekend_limit_minutes: 120,
        }
    }

    fn window() -> ScheduleWindow {
        ScheduleWindow {
            id: WindowId::new("s1"),
            start: WallClock::new(18, 30).unwrap(),
            end: WallClock::new(20, 0).unwrap(),
            days: DaySet::WEEKDAYS,
        }
    }

    fn tv() -> DeviceDraft {
        DeviceDraft::quota("70-b3-d5-e2-b1-00", "Living room TV", quota()).with_id("d1")
    }

    #[test]
    fn add_normalizes_mac_and_starts_fresh() {
        let mut registry = DeviceRegistry::new();
        let device = registry.add(&tv()).unwrap();

        assert_eq!(device.mac.to_string(), "70:B3:D5:E2:B1:00");
        assert_eq!(device.time_used_today, 0);
        assert_eq!(device.status, DeviceStatus::Offline);
        assert!(device.platform_ids.is_none());
    }

    #[test]
    fn add_generates_missing_id() {
        let mut registry = DeviceRegistry::new();
        let draft = DeviceDraft::quota("AA:BB:CC:DD:EE:FF", "Phone", quota());
        let id = registry.add(&draft).unwrap().id.clone();
        assert!(id.as_str().starts_with("d-"));
    }

    #[test]
    fn quota_mode_with_schedules_is_inconsistent() {
        let mut registry = DeviceRegistry::new();
        let mut draft = tv();
        draft.quota = None;
        draft.schedules = Some(vec![window()]);

        let err = registry.add(&draft).unwrap_err();
        assert!(matches!(
            err,
            PolicyError::InconsistentMode {
                mode: ControlMode::Quota,
                ..
            }
        ));
        assert!(registry.is_empty());
    }

    #[test]
    fn schedule_mode_with_both_is_inconsistent() {
        let mut draft = DeviceDraft::schedule("AA:BB:CC:DD:EE:FF", "Tablet", vec![window()]);
        draft.quota = Some(quota());
        assert!(matches!(
            DeviceRegistry::new().add(&draft),
            Err(PolicyError::InconsistentMode { .. })
        ));
    }

    #[test]
    fn empty_schedule_list_is_valid() {
        let draft = DeviceDraft::schedule("AA:BB:CC:DD:EE:FF", "Tablet", vec![]);
        let mut registry = DeviceRegistry::new();
        assert_eq!(registry.add(&draft).unwrap().schedules(), Some(&[][..]));
    }

    #[test]
    fn rejects_bad_mac_and_empty_name() {
        let mut registry = DeviceRegistry::new();

        let mut draft = tv();
        draft.mac = "70:B3:D5:E2:B1".into();
        assert!(matches!(registry.add(&draft), Err(PolicyError::InvalidMacFormat(_))));

        let mut draft = tv();
        draft.name = "   ".into();
        assert_eq!(registry.add(&draft).unwrap_err(), PolicyError::EmptyName);

        assert!(registry.is_empty());
    }

    #[test]
    fn duplicate_mac_after_normalization() {
        let mut registry = DeviceRegistry::new();
        registry.add(&tv()).unwrap();

        let other = DeviceDraft::quota("70:b3:d5:e2:b1:00", "Other", quota()).with_id("d2");
        let err = registry.add(&other).unwrap_err();
        assert!(matches!(err, PolicyError::DuplicateMac { ref existing, .. } if existing.as_str() == "d1"));

        let same_id = DeviceDraft::quota("11:22:33:44:55:66", "Other", quota()).with_id("d1");
        assert!(matches!(registry.add(&same_id), Err(PolicyError::DuplicateId { .. })));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn update_keeps_usage_and_allows_own_mac() {
        let mut registry = DeviceRegistry::new();
        let id = DeviceId::new("d1");
        registry.add(&tv()).unwrap();
        registry.add_usage(&id, 30).unwrap();

        let draft = DeviceDraft::schedule("70-B3-D5-E2-B1-00", "TV", vec![window()]);
        let device = registry.update(&id, &draft).unwrap();

        assert_eq!(device.mode(), ControlMode::Schedule);
        assert_eq!(device.time_used_today, 30);
        assert!(device.quota().is_none());
    }

    #[test]
    fn update_rejects_mac_of_another_device() {
        let mut registry = DeviceRegistry::new();
        registry.add(&tv()).unwrap();
        registry
            .add(&DeviceDraft::quota("11:22:33:44:55:66", "Phone", quota()).with_id("d2"))
            .unwrap();

        let steal = DeviceDraft::quota("70:B3:D5:E2:B1:00", "Phone", quota());
        assert!(matches!(
            registry.update(&DeviceId::new("d2"), &steal),
            Err(PolicyError::DuplicateMac { .. })
        ));
        assert_eq!(
            registry.get(&DeviceId::new("d2")).unwrap().mac.to_string(),
            "11:22:33:44:55:66"
        );
    }

    #[test]
    fn missing_ids_are_reported() {
        let mut registry = DeviceRegistry::new();
        let id = DeviceId::new("nope");
        assert!(matches!(registry.update(&id, &tv()), Err(PolicyError::NotFound { .. })));
        assert!(matches!(registry.remove(&id), Err(PolicyError::NotFound { .. })));
        assert!(matches!(registry.add_usage(&id, 1), Err(PolicyError::NotFound { .. })));
    }

    #[test]
    fn usage_accumulates_and_resets() {
        let mut registry = DeviceRegistry::new();
        let id = DeviceId::new("d1");
        registry.add(&tv()).unwrap();

        assert_eq!(registry.add_usage(&id, 20).unwrap(), 20);
        assert_eq!(registry.add_usage(&id, 25).unwrap(), 45);
        assert_eq!(registry.reset_usage(), 1);
        assert_eq!(registry.get(&id).unwrap().time_used_today, 0);
    }

    #[test]
    fn status_updates_last_seen() {
        let mut registry = DeviceRegistry::new();
        let id = DeviceId::new("d1");
        registry.add(&tv()).unwrap();
        let now = Local.with_ymd_and_hms(2025, 3, 5, 10, 0, 0).unwrap();

        let device = registry.set_status(&id, DeviceStatus::Online, now).unwrap();
        assert_eq!(device.last_seen, Some(now));

        let later = now + chrono::Duration::hours(1);
        let device = registry.set_status(&id, DeviceStatus::Offline, later).unwrap();
        assert_eq!(device.status, DeviceStatus::Offline);
        assert_eq!(device.last_seen, Some(now));
    }

    #[test]
    fn detach_platform_only_touches_explicit_subsets() {
        let mut registry = DeviceRegistry::new();
        registry.add(&tv().with_platforms(["1", "3"])).unwrap();
        registry
            .add(&DeviceDraft::quota("11:22:33:44:55:66", "Phone", quota()).with_id("d2"))
            .unwrap();

        let detached = registry.detach_platform(&PlatformId::new("3"));
        assert_eq!(detached, vec![DeviceId::new("d1")]);

        let tv = registry.get(&DeviceId::new("d1")).unwrap();
        assert_eq!(
            tv.platform_ids,
            Some([PlatformId::new("1")].into_iter().collect())
        );
        assert!(registry.get(&DeviceId::new("d2")).unwrap().platform_ids.is_none());
    }
}
