//! The owned policy aggregate: catalog plus registry

use chrono::{DateTime, Local};
use mybaby_api::{
    DashboardStats, Device, DeviceDraft, DeviceStatus, DeviceView, Platform, PlatformVerdict,
    Verdict,
};
use mybaby_util::{DeviceId, PlatformId};
use tracing::debug;

use crate::{
    DeviceRegistry, EntityKind, PolicyCatalog, PolicyError, PolicyResult, daily_limit, decide,
    next_window_start, remaining_minutes, window_minutes_left,
};

/// Catalog and registry, mutated only through the operations below.
///
/// Cross-collection invariants live here: device platform subsets only
/// reference catalog entries, and removing a platform detaches it everywhere.
#[derive(Debug, Clone, Default)]
pub struct PolicyState {
    catalog: PolicyCatalog,
    registry: DeviceRegistry,
}

impl PolicyState {
    /// Build from configured platforms and device drafts
    pub fn from_parts(platforms: Vec<Platform>, drafts: &[DeviceDraft]) -> PolicyResult<Self> {
        let mut state = Self {
            catalog: PolicyCatalog::from_platforms(platforms)?,
            registry: DeviceRegistry::new(),
        };
        for draft in drafts {
            state.add_device(draft)?;
        }
        Ok(state)
    }

    /// Rebuild from a saved snapshot. Dangling platform references are dropped.
    pub fn restore(platforms: Vec<Platform>, devices: Vec<Device>) -> PolicyResult<Self> {
        let catalog = PolicyCatalog::from_platforms(platforms)?;
        let devices = devices.into_iter().map(|mut device| {
            if let Some(ids) = device.platform_ids.as_mut() {
                ids.retain(|id| catalog.contains(id));
            }
            device
        });
        let registry = DeviceRegistry::from_devices(devices.collect::<Vec<_>>());
        Ok(Self { catalog, registry })
    }

    pub fn catalog(&self) -> &PolicyCatalog {
        &self.catalog
    }

    pub fn registry(&self) -> &DeviceRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut DeviceRegistry {
        &mut self.registry
    }

    // Platforms

    pub fn add_platform(&mut self, platform: Platform) -> PolicyResult<&Platform> {
        self.catalog.add(platform)
    }

    pub fn update_platform(&mut self, platform: Platform) -> PolicyResult<&Platform> {
        self.catalog.update(platform)
    }

    pub fn toggle_platform(&mut self, id: &PlatformId) -> PolicyResult<&Platform> {
        self.catalog.toggle(id)
    }

    /// Remove a platform and detach it from every device subset.
    /// Returns the removed platform and the devices it was detached from.
    pub fn remove_platform(&mut self, id: &PlatformId) -> PolicyResult<(Platform, Vec<DeviceId>)> {
        let platform = self.catalog.remove(id)?;
        let detached = self.registry.detach_platform(id);
        Ok((platform, detached))
    }

    // Devices

    pub fn add_device(&mut self, draft: &DeviceDraft) -> PolicyResult<&Device> {
        self.check_platform_refs(draft)?;
        self.registry.add(draft)
    }

    pub fn update_device(&mut self, id: &DeviceId, draft: &DeviceDraft) -> PolicyResult<&Device> {
        self.check_platform_refs(draft)?;
        self.registry.update(id, draft)
    }

    pub fn remove_device(&mut self, id: &DeviceId) -> PolicyResult<Device> {
        self.registry.remove(id)
    }

    fn check_platform_refs(&self, draft: &DeviceDraft) -> PolicyResult<()> {
        let unknown = draft
            .platform_ids
            .iter()
            .flatten()
            .find(|id| !self.catalog.contains(id));
        match unknown {
            Some(id) => Err(PolicyError::not_found(EntityKind::Platform, id)),
            None => Ok(()),
        }
    }

    // Evaluation

    /// Verdict by id. Unknown devices or platforms are not governed.
    pub fn decide(
        &self,
        device_id: &DeviceId,
        platform_id: &PlatformId,
        now: &DateTime<Local>,
    ) -> Verdict {
        let verdict = match self.registry.get(device_id) {
            Some(device) => decide(device, &self.catalog, platform_id, now),
            None => Verdict::NotGoverned,
        };
        debug!(
            device_id = %device_id,
            platform_id = %platform_id,
            verdict = %verdict,
            "Evaluated verdict"
        );
        verdict
    }

    /// Verdicts for every governed (device, platform) pair
    pub fn governed_verdicts(&self, now: &DateTime<Local>) -> Vec<(DeviceId, PlatformId, Verdict)> {
        self.registry
            .list()
            .iter()
            .flat_map(|device| {
                self.catalog
                    .enabled()
                    .filter(|p| device.covers_platform(&p.id))
                    .map(move |p| {
                        (
                            device.id.clone(),
                            p.id.clone(),
                            decide(device, &self.catalog, &p.id, now),
                        )
                    })
            })
            .collect()
    }

    pub fn device_view(&self, device: &Device, now: &DateTime<Local>) -> DeviceView {
        let schedules = device.schedules();

        DeviceView {
            device: device.clone(),
            daily_limit_minutes: device.quota().map(|q| daily_limit(q, now)),
            remaining_minutes: remaining_minutes(device, now),
            window_minutes_left: schedules.and_then(|w| window_minutes_left(w, now)),
            next_window_start: schedules.and_then(|w| next_window_start(w, now)),
            verdicts: self
                .catalog
                .list()
                .iter()
                .map(|p| PlatformVerdict {
                    platform_id: p.id.clone(),
                    verdict: decide(device, &self.catalog, &p.id, now),
                })
                .collect(),
        }
    }

    pub fn device_views(&self, now: &DateTime<Local>) -> Vec<DeviceView> {
        self.registry
            .list()
            .iter()
            .map(|d| self.device_view(d, now))
            .collect()
    }

    pub fn stats(&self) -> DashboardStats {
        let devices = self.registry.list();
        DashboardStats {
            device_count: devices.len(),
            online_count: devices
                .iter()
                .filter(|d| d.status == DeviceStatus::Online)
                .count(),
            blocked_count: devices
                .iter()
                .filter(|d| d.status == DeviceStatus::Blocked)
                .count(),
            enabled_platform_count: self.catalog.enabled().count(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use mybaby_api::QuotaConfig;

    fn platform(id: &str, enabled: bool) -> Platform {
        Platform {
            id: PlatformId::new(id),
            name: format!("Platform {}", id),
            icon: None,
            domains: vec![format!("*.p{}.com", id)],
            enabled,
        }
    }

    fn quota() -> QuotaConfig {
        QuotaConfig {
            weekday_limit_minutes: 60,
            weekend_limit_minutes: 120,
        }
    }

    fn state() -> PolicyState {
        PolicyState::from_parts(
            vec![platform("1", true), platform("2", true), platform("3", true)],
            &[
                DeviceDraft::quota("AA:BB:CC:DD:EE:01", "TV", quota())
                    .with_id("d1")
                    .with_platforms(["1", "3"]),
                DeviceDraft::quota("AA:BB:CC:DD:EE:02", "Tablet", quota())
                    .with_id("d2")
                    .with_platforms(["3"]),
                DeviceDraft::quota("AA:BB:CC:DD:EE:03", "Phone", quota()).with_id("d3"),
            ],
        )
        .unwrap()
    }

    // 2025-03-05 is a Wednesday
    fn wednesday() -> DateTime<Local> {
        Local.with_ymd_and_hms(2025, 3, 5, 15, 0, 0).unwrap()
    }

    #[test]
    fn removing_platform_cascades_to_devices() {
        let mut state = state();
        let (removed, detached) = state.remove_platform(&PlatformId::new("3")).unwrap();

        assert_eq!(removed.id.as_str(), "3");
        assert_eq!(detached, vec![DeviceId::new("d1"), DeviceId::new("d2")]);
        for device in state.registry().list() {
            assert!(
                device
                    .platform_ids
                    .as_ref()
                    .is_none_or(|ids| !ids.contains(&PlatformId::new("3")))
            );
        }
        assert_eq!(
            state.registry().get(&DeviceId::new("d2")).unwrap().platform_ids,
            Some(Default::default())
        );
    }

    #[test]
    fn device_cannot_reference_unknown_platform() {
        let mut state = state();
        let draft = DeviceDraft::quota("AA:BB:CC:DD:EE:09", "New", quota()).with_platforms(["42"]);
        let err = state.add_device(&draft).unwrap_err();
        assert!(matches!(
            err,
            PolicyError::NotFound {
                kind: EntityKind::Platform,
                ..
            }
        ));
        assert_eq!(state.registry().len(), 3);
    }

    #[test]
    fn decide_unknown_ids_is_not_governed() {
        let state = state();
        let now = wednesday();
        assert_eq!(
            state.decide(&DeviceId::new("ghost"), &PlatformId::new("1"), &now),
            Verdict::NotGoverned
        );
        assert_eq!(
            state.decide(&DeviceId::new("d1"), &PlatformId::new("9"), &now),
            Verdict::NotGoverned
        );
        assert_eq!(
            state.decide(&DeviceId::new("d1"), &PlatformId::new("1"), &now),
            Verdict::Allow
        );
    }

    #[test]
    fn disabled_platform_is_not_governed_for_subset_device() {
        let mut state = state();
        state.toggle_platform(&PlatformId::new("1")).unwrap();
        state
            .registry_mut()
            .add_usage(&DeviceId::new("d1"), 500)
            .unwrap();

        let now = wednesday();
        assert_eq!(
            state.decide(&DeviceId::new("d1"), &PlatformId::new("1"), &now),
            Verdict::NotGoverned
        );
        assert_eq!(
            state.decide(&DeviceId::new("d1"), &PlatformId::new("2"), &now),
            Verdict::NotGoverned
        );
        assert_eq!(
            state.decide(&DeviceId::new("d1"), &PlatformId::new("3"), &now),
            Verdict::Block
        );
    }

    #[test]
    fn governed_verdicts_cover_enabled_subset() {
        let mut state = state();
        state.toggle_platform(&PlatformId::new("2")).unwrap();

        let verdicts = state.governed_verdicts(&wednesday());
        let pairs: Vec<_> = verdicts
            .iter()
            .map(|(d, p, _)| format!("{}/{}", d, p))
            .collect();
        assert_eq!(pairs, vec!["d1/1", "d1/3", "d2/3", "d3/1", "d3/3"]);
    }

    #[test]
    fn view_and_stats() {
        let mut state = state();
        let now = wednesday();
        let id = DeviceId::new("d1");
        state.registry_mut().add_usage(&id, 45).unwrap();
        state
            .registry_mut()
            .set_status(&id, DeviceStatus::Online, now)
            .unwrap();

        let device = state.registry().get(&id).unwrap().clone();
        let view = state.device_view(&device, &now);
        assert_eq!(view.daily_limit_minutes, Some(60));
        assert_eq!(view.remaining_minutes, Some(15));
        assert_eq!(view.window_minutes_left, None);
        assert_eq!(view.verdicts.len(), 3);
        assert_eq!(view.verdicts[1].verdict, Verdict::NotGoverned);

        let stats = state.stats();
        assert_eq!(stats.device_count, 3);
        assert_eq!(stats.online_count, 1);
        assert_eq!(stats.blocked_count, 0);
        assert_eq!(stats.enabled_platform_count, 3);
    }

    #[test]
    fn restore_drops_dangling_platform_refs() {
        let original = state();
        let devices = original.registry().list().to_vec();
        let restored = PolicyState::restore(vec![platform("1", true)], devices).unwrap();

        let d1 = restored.registry().get(&DeviceId::new("d1")).unwrap();
        assert_eq!(
            d1.platform_ids,
            Some([PlatformId::new("1")].into_iter().collect())
        );
        assert_eq!(restored.registry().len(), 3);
    }
}
