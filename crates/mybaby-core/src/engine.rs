//! Core control engine

use chrono::{DateTime, Duration, Local, NaiveDate};
use mybaby_api::{
    API_VERSION, AuditEntryView, Device, DeviceDraft, DeviceStatus, DeviceView, DiscoveryReport,
    Platform, QuotaConfig, ServiceStateSnapshot, Verdict,
};
use mybaby_config::Policy;
use mybaby_host_api::{
    AdvisoryRequest, DeviceEnforcement, DiscoveryOutcome, EnforcementPlan, PlatformRule,
};
use mybaby_store::{AuditEvent, AuditEventType, PolicySnapshot, Store};
use mybaby_util::{DeviceId, PlatformId};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::{
    CoreEvent, EntityKind, PolicyError, PolicyResult, PolicyState, PresetTable, daily_limit,
    display_name, enrich, filter_recent, normalize_mac, remaining_minutes,
};

/// Usage rows older than this are pruned at rollover
const USAGE_RETENTION_DAYS: i64 = 30;

/// Outcome of a usage report
#[derive(Debug, Clone)]
pub struct UsageUpdate {
    pub device_id: DeviceId,
    pub time_used_today: u32,
    pub remaining_minutes: Option<i64>,
}

/// The core control engine.
///
/// Owns the policy aggregate and adds the stateful concerns around it:
/// usage persistence, daily rollover, verdict change tracking, the audit
/// log, snapshots and the enforcement plan. Mutations queue [`CoreEvent`]s
/// which the caller collects with [`ControlEngine::drain_events`].
pub struct ControlEngine {
    state: PolicyState,
    presets: PresetTable,
    store: Arc<dyn Store>,
    default_quota: QuotaConfig,
    enforcement_enabled: bool,
    ipv6_support: bool,
    discovery_window_days: u32,
    last_verdicts: HashMap<(DeviceId, PlatformId), Verdict>,
    current_day: NaiveDate,
    discovery_ok: bool,
    enforcement_ok: bool,
    pending: Vec<CoreEvent>,
}

impl ControlEngine {
    /// Build the engine from the loaded policy.
    ///
    /// When snapshot restore is on and the store holds one, its catalog and
    /// registry replace the configured lists. Today's usage is restored from
    /// the store either way.
    pub fn new(policy: Policy, store: Arc<dyn Store>, now: DateTime<Local>) -> PolicyResult<Self> {
        let Policy {
            service,
            default_quota,
            platforms,
            devices,
            presets,
        } = policy;

        let snapshot = if service.restore_snapshot {
            match store.load_snapshot() {
                Ok(snapshot) => snapshot,
                Err(e) => {
                    warn!(error = %e, "Failed to load policy snapshot, using configuration");
                    None
                }
            }
        } else {
            None
        };

        let restored = snapshot.is_some();
        let mut state = match snapshot {
            Some(snapshot) => PolicyState::restore(snapshot.platforms, snapshot.devices)?,
            None => PolicyState::from_parts(platforms, &devices)?,
        };

        let today = now.date_naive();
        let ids: Vec<DeviceId> = state.registry().list().iter().map(|d| d.id.clone()).collect();
        for id in ids {
            let used = store.get_usage(&id, today).unwrap_or_else(|e| {
                warn!(device_id = %id, error = %e, "Failed to restore usage");
                0
            });
            state.registry_mut().set_usage(&id, used)?;
        }

        let platform_count = state.catalog().len();
        let device_count = state.registry().len();
        let _ = store.append_audit(AuditEvent::new(AuditEventType::PolicyLoaded {
            platform_count,
            device_count,
            restored,
        }));

        info!(
            platform_count,
            device_count,
            restored,
            presets = presets.by_mac.len() + presets.by_oui.len(),
            "Control engine initialized"
        );

        let last_verdicts = verdict_map(&state, &now);

        Ok(Self {
            state,
            presets: presets.into(),
            store,
            default_quota,
            enforcement_enabled: service.enforcement_enabled,
            ipv6_support: service.ipv6_support,
            discovery_window_days: service.discovery.window_days,
            last_verdicts,
            current_day: today,
            discovery_ok: true,
            enforcement_ok: true,
            pending: Vec::new(),
        })
    }

    pub fn state(&self) -> &PolicyState {
        &self.state
    }

    /// Full state snapshot for clients
    pub fn get_state(&self, now: DateTime<Local>) -> ServiceStateSnapshot {
        ServiceStateSnapshot {
            api_version: API_VERSION,
            enforcement_enabled: self.enforcement_enabled,
            ipv6_support: self.ipv6_support,
            stats: self.state.stats(),
            devices: self.state.device_views(&now),
            platforms: self.state.catalog().list().to_vec(),
        }
    }

    pub fn list_devices(&self, now: DateTime<Local>) -> Vec<DeviceView> {
        self.state.device_views(&now)
    }

    pub fn list_platforms(&self) -> Vec<Platform> {
        self.state.catalog().list().to_vec()
    }

    pub fn device_view(&self, id: &DeviceId, now: DateTime<Local>) -> PolicyResult<DeviceView> {
        let device = self
            .state
            .registry()
            .get(id)
            .ok_or_else(|| PolicyError::not_found(EntityKind::Device, id))?;
        Ok(self.state.device_view(device, &now))
    }

    pub fn decide(
        &self,
        device_id: &DeviceId,
        platform_id: &PlatformId,
        now: DateTime<Local>,
    ) -> Verdict {
        self.state.decide(device_id, platform_id, &now)
    }

    // Device mutations

    pub fn add_device(&mut self, draft: &DeviceDraft, now: DateTime<Local>) -> PolicyResult<DeviceView> {
        let device = self.state.add_device(draft)?.clone();

        let _ = self.store.append_audit(AuditEvent::new(AuditEventType::DeviceAdded {
            device_id: device.id.clone(),
            mac: device.mac,
            mode: device.mode(),
        }));

        info!(
            device_id = %device.id,
            mac = %device.mac,
            mode = %device.mode(),
            "Device added"
        );

        Ok(self.after_device_change(&device, now))
    }

    pub fn update_device(
        &mut self,
        id: &DeviceId,
        draft: &DeviceDraft,
        now: DateTime<Local>,
    ) -> PolicyResult<DeviceView> {
        let device = self.state.update_device(id, draft)?.clone();

        let _ = self.store.append_audit(AuditEvent::new(AuditEventType::DeviceUpdated {
            device_id: device.id.clone(),
        }));

        info!(device_id = %device.id, mode = %device.mode(), "Device updated");

        Ok(self.after_device_change(&device, now))
    }

    /// Remove a device together with its stored usage.
    ///
    /// The usage rows go first; if the store refuses, the device stays.
    pub fn remove_device(&mut self, id: &DeviceId, now: DateTime<Local>) -> PolicyResult<Device> {
        self.device(id)?;
        self.store.clear_device_usage(id)?;
        let device = self.state.remove_device(id)?;

        let _ = self.store.append_audit(AuditEvent::new(AuditEventType::DeviceRemoved {
            device_id: device.id.clone(),
            mac: device.mac,
        }));

        info!(device_id = %device.id, mac = %device.mac, "Device removed");

        self.save_snapshot(now);
        self.pending.push(CoreEvent::DeviceRemoved {
            device_id: device.id.clone(),
        });
        self.refresh_verdicts(now);

        Ok(device)
    }

    /// Register a discovered device under the default quota.
    ///
    /// The name falls back from `name` to the preset name, the hostname and
    /// finally the MAC.
    pub fn promote_sighting(
        &mut self,
        raw_mac: &str,
        name: Option<&str>,
        hostname: Option<&str>,
        now: DateTime<Local>,
    ) -> PolicyResult<DeviceView> {
        let mac = normalize_mac(raw_mac)?;
        if let Some(existing) = self.state.registry().find_by_mac(&mac) {
            return Err(PolicyError::DuplicateMac {
                mac,
                existing: existing.id.clone(),
            });
        }

        let preset = self.presets.resolve(&mac);
        let name = display_name(name, &preset, hostname, &mac);
        let draft = DeviceDraft::quota(mac.to_string(), name, self.default_quota);
        let device = self.state.add_device(&draft)?.clone();

        let _ = self.store.append_audit(AuditEvent::new(AuditEventType::SightingPromoted {
            device_id: device.id.clone(),
            mac,
        }));

        info!(device_id = %device.id, mac = %mac, name = %device.name, "Sighting promoted");

        Ok(self.after_device_change(&device, now))
    }

    fn after_device_change(&mut self, device: &Device, now: DateTime<Local>) -> DeviceView {
        let view = self.state.device_view(device, &now);
        self.save_snapshot(now);
        self.pending.push(CoreEvent::DeviceChanged(view.clone()));
        self.refresh_verdicts(now);
        view
    }

    // Platform mutations

    pub fn add_platform(&mut self, platform: Platform, now: DateTime<Local>) -> PolicyResult<Platform> {
        let platform = self.state.add_platform(platform)?.clone();

        let _ = self.store.append_audit(AuditEvent::new(AuditEventType::PlatformAdded {
            platform_id: platform.id.clone(),
            name: platform.name.clone(),
        }));

        info!(platform_id = %platform.id, name = %platform.name, "Platform added");

        self.after_platform_change(&platform, now);
        Ok(platform)
    }

    pub fn update_platform(
        &mut self,
        platform: Platform,
        now: DateTime<Local>,
    ) -> PolicyResult<Platform> {
        let platform = self.state.update_platform(platform)?.clone();

        let _ = self.store.append_audit(AuditEvent::new(AuditEventType::PlatformUpdated {
            platform_id: platform.id.clone(),
        }));

        info!(platform_id = %platform.id, "Platform updated");

        self.after_platform_change(&platform, now);
        Ok(platform)
    }

    pub fn toggle_platform(
        &mut self,
        id: &PlatformId,
        now: DateTime<Local>,
    ) -> PolicyResult<Platform> {
        let platform = self.state.toggle_platform(id)?.clone();

        let _ = self.store.append_audit(AuditEvent::new(AuditEventType::PlatformToggled {
            platform_id: platform.id.clone(),
            enabled: platform.enabled,
        }));

        info!(platform_id = %platform.id, enabled = platform.enabled, "Platform toggled");

        self.after_platform_change(&platform, now);
        Ok(platform)
    }

    /// Remove a platform. Returns the devices whose subsets lost it.
    pub fn remove_platform(
        &mut self,
        id: &PlatformId,
        now: DateTime<Local>,
    ) -> PolicyResult<Vec<DeviceId>> {
        let (platform, detached_from) = self.state.remove_platform(id)?;

        let _ = self.store.append_audit(AuditEvent::new(AuditEventType::PlatformRemoved {
            platform_id: platform.id.clone(),
            detached_from: detached_from.clone(),
        }));

        info!(
            platform_id = %platform.id,
            detached = detached_from.len(),
            "Platform removed"
        );

        self.save_snapshot(now);
        self.pending.push(CoreEvent::PlatformRemoved {
            platform_id: platform.id,
            detached_from: detached_from.clone(),
        });
        self.refresh_verdicts(now);

        Ok(detached_from)
    }

    fn after_platform_change(&mut self, platform: &Platform, now: DateTime<Local>) {
        self.save_snapshot(now);
        self.pending.push(CoreEvent::PlatformChanged(platform.clone()));
        self.refresh_verdicts(now);
    }

    // Reports from the enforcement backend

    /// Add consumed minutes for the device with this MAC
    pub fn report_usage(
        &mut self,
        raw_mac: &str,
        minutes: u32,
        now: DateTime<Local>,
    ) -> PolicyResult<UsageUpdate> {
        self.check_rollover(now);

        let device_id = self.device_id_for_mac(raw_mac)?;
        let total = match self.store.add_usage(&device_id, now.date_naive(), minutes) {
            Ok(total) => {
                self.state.registry_mut().set_usage(&device_id, total)?;
                total
            }
            Err(e) => {
                warn!(device_id = %device_id, error = %e, "Failed to persist usage");
                self.state.registry_mut().add_usage(&device_id, minutes)?
            }
        };

        let _ = self.store.append_audit(AuditEvent::new(AuditEventType::UsageReported {
            device_id: device_id.clone(),
            minutes,
            time_used_today: total,
        }));

        debug!(device_id = %device_id, minutes, total, "Usage reported");

        let device = self.device(&device_id)?;
        let update = UsageUpdate {
            device_id: device_id.clone(),
            time_used_today: total,
            remaining_minutes: remaining_minutes(device, &now),
        };
        let view = self.state.device_view(device, &now);

        self.pending.push(CoreEvent::DeviceChanged(view));
        self.refresh_verdicts(now);

        Ok(update)
    }

    /// Record the reported status for the device with this MAC
    pub fn report_status(
        &mut self,
        raw_mac: &str,
        status: DeviceStatus,
        now: DateTime<Local>,
    ) -> PolicyResult<DeviceId> {
        let device_id = self.device_id_for_mac(raw_mac)?;
        let device = self
            .state
            .registry_mut()
            .set_status(&device_id, status, now)?
            .clone();

        let _ = self.store.append_audit(AuditEvent::new(AuditEventType::StatusReported {
            device_id: device_id.clone(),
            status,
        }));

        debug!(device_id = %device_id, status = ?status, "Status reported");

        let view = self.state.device_view(&device, &now);
        self.pending.push(CoreEvent::DeviceChanged(view));

        Ok(device_id)
    }

    fn device_id_for_mac(&self, raw_mac: &str) -> PolicyResult<DeviceId> {
        let mac = normalize_mac(raw_mac)?;
        self.state
            .registry()
            .find_by_mac(&mac)
            .map(|d| d.id.clone())
            .ok_or_else(|| PolicyError::not_found(EntityKind::Device, mac))
    }

    fn device(&self, id: &DeviceId) -> PolicyResult<&Device> {
        self.state
            .registry()
            .get(id)
            .ok_or_else(|| PolicyError::not_found(EntityKind::Device, id))
    }

    /// Zero today's usage for every device. Returns the number of devices reset.
    ///
    /// Nothing changes in memory when the stored usage cannot be reset, so a
    /// later report never brings the old total back.
    pub fn reset_daily_usage(&mut self, now: DateTime<Local>) -> PolicyResult<usize> {
        let today = now.date_naive();
        self.store.reset_usage(today)?;
        self.reset_usage(today, true);
        let count = self.state.registry().len();
        self.refresh_verdicts(now);
        Ok(count)
    }

    fn reset_usage(&mut self, day: NaiveDate, manual: bool) {
        let device_count = self.state.registry_mut().reset_usage();

        let _ = self.store.append_audit(AuditEvent::new(AuditEventType::DailyUsageReset {
            day,
            device_count,
            manual,
        }));

        info!(day = %day, device_count, manual, "Daily usage reset");

        self.pending.push(CoreEvent::DailyUsageReset { device_count });
    }

    fn check_rollover(&mut self, now: DateTime<Local>) {
        let today = now.date_naive();
        if today == self.current_day {
            return;
        }
        self.current_day = today;
        self.reset_usage(today, false);

        let cutoff = today - Duration::days(USAGE_RETENTION_DAYS);
        match self.store.prune_usage(cutoff) {
            Ok(0) => {}
            Ok(pruned) => debug!(pruned, cutoff = %cutoff, "Pruned old usage"),
            Err(e) => warn!(error = %e, "Failed to prune usage"),
        }
    }

    // Discovery

    /// Track discovery health. Emits an event when discovery degrades.
    pub fn note_discovery(&mut self, outcome: &DiscoveryOutcome) {
        match (&outcome.warning, self.discovery_ok) {
            (Some(message), true) => {
                let _ = self.store.append_audit(AuditEvent::new(AuditEventType::DiscoveryFailed {
                    message: message.clone(),
                }));
                warn!(message = %message, "Discovery degraded, serving cached sightings");
                self.discovery_ok = false;
                self.pending.push(CoreEvent::DiscoveryDegraded {
                    message: message.clone(),
                });
            }
            (None, false) => {
                info!("Discovery recovered");
                self.discovery_ok = true;
            }
            _ => {}
        }
    }

    /// Fresh sightings enriched with presets and registry membership
    pub fn recent_devices(
        &self,
        outcome: &DiscoveryOutcome,
        window_days: Option<u32>,
        now: DateTime<Local>,
    ) -> DiscoveryReport {
        let window_days = window_days.unwrap_or(self.discovery_window_days);
        let fresh = filter_recent(&outcome.sightings, &now, window_days);
        debug!(
            total = outcome.sightings.len(),
            fresh = fresh.len(),
            window_days,
            "Filtered sightings"
        );

        DiscoveryReport {
            devices: enrich(fresh, &self.presets, self.state.registry()),
            stale: outcome.stale,
            warning: outcome.warning.clone(),
            fetched_at: outcome.fetched_at,
        }
    }

    pub fn discovery_ok(&self) -> bool {
        self.discovery_ok
    }

    // Advisory

    pub fn advisory_request(
        &self,
        device_id: &DeviceId,
        now: DateTime<Local>,
    ) -> PolicyResult<AdvisoryRequest> {
        let device = self.device(device_id)?;
        let platforms = self
            .state
            .catalog()
            .enabled()
            .filter(|p| device.covers_platform(&p.id))
            .map(|p| p.name.clone())
            .collect();
        let limit = device.quota().map(|q| daily_limit(q, &now));
        Ok(AdvisoryRequest::for_device(device, limit, platforms))
    }

    // Enforcement

    pub fn enforcement_enabled(&self) -> bool {
        self.enforcement_enabled
    }

    /// Flip the master switch. Returns false when it was already in that position.
    pub fn set_enforcement_enabled(&mut self, enabled: bool) -> bool {
        if self.enforcement_enabled == enabled {
            return false;
        }
        self.enforcement_enabled = enabled;

        let _ = self.store.append_audit(AuditEvent::new(AuditEventType::EnforcementToggled {
            enabled,
        }));

        info!(enabled, "Enforcement switched");

        self.pending.push(CoreEvent::EnforcementToggled { enabled });
        true
    }

    /// Per-device rules for every governed platform. Blocks nothing when
    /// the master switch is off.
    pub fn enforcement_plan(&self, now: DateTime<Local>) -> EnforcementPlan {
        if !self.enforcement_enabled {
            return EnforcementPlan::disabled(self.ipv6_support, now);
        }

        let catalog = self.state.catalog();
        let devices = self
            .state
            .registry()
            .list()
            .iter()
            .map(|device| DeviceEnforcement {
                device_id: device.id.clone(),
                mac: device.mac,
                rules: catalog
                    .enabled()
                    .filter(|p| device.covers_platform(&p.id))
                    .map(|p| PlatformRule {
                        platform_id: p.id.clone(),
                        domains: p.domains.clone(),
                        verdict: crate::decide(device, catalog, &p.id, &now),
                    })
                    .collect(),
            })
            .collect();

        EnforcementPlan {
            enabled: true,
            ipv6_support: self.ipv6_support,
            generated_at: now,
            devices,
        }
    }

    pub fn note_enforcement_failure(&mut self, message: &str) {
        if self.enforcement_ok {
            let _ = self.store.append_audit(AuditEvent::new(AuditEventType::EnforcementPushFailed {
                message: message.to_string(),
            }));
        }
        self.enforcement_ok = false;
    }

    pub fn note_enforcement_success(&mut self) {
        if !self.enforcement_ok {
            info!("Enforcement backend recovered");
        }
        self.enforcement_ok = true;
    }

    pub fn enforcement_ok(&self) -> bool {
        self.enforcement_ok
    }

    // Housekeeping

    pub fn recent_audits(&self, limit: usize) -> PolicyResult<Vec<AuditEntryView>> {
        let events = self.store.get_recent_audits(limit)?;
        Ok(events.iter().map(AuditEvent::to_view).collect())
    }

    pub fn store_healthy(&self) -> bool {
        self.store.is_healthy()
    }

    /// Handle day rollover and re-evaluate verdicts. Returns all queued events.
    pub fn tick(&mut self, now: DateTime<Local>) -> Vec<CoreEvent> {
        self.check_rollover(now);
        self.refresh_verdicts(now);
        self.drain_events()
    }

    pub fn drain_events(&mut self) -> Vec<CoreEvent> {
        std::mem::take(&mut self.pending)
    }

    /// Compare governed verdicts against the last evaluation and queue a
    /// [`CoreEvent::VerdictChanged`] for every pair that flipped.
    fn refresh_verdicts(&mut self, now: DateTime<Local>) {
        let current = verdict_map(&self.state, &now);

        let mut changed: Vec<_> = current
            .iter()
            .filter(|(key, verdict)| {
                self.last_verdicts
                    .get(*key)
                    .is_some_and(|previous| previous != *verdict)
            })
            .map(|((device_id, platform_id), verdict)| {
                (device_id.clone(), platform_id.clone(), *verdict)
            })
            .collect();
        changed.sort_by(|a, b| (&a.0, &a.1).cmp(&(&b.0, &b.1)));

        for (device_id, platform_id, verdict) in changed {
            let _ = self.store.append_audit(AuditEvent::new(AuditEventType::VerdictChanged {
                device_id: device_id.clone(),
                platform_id: platform_id.clone(),
                verdict,
            }));

            info!(
                device_id = %device_id,
                platform_id = %platform_id,
                verdict = %verdict,
                "Verdict changed"
            );

            self.pending.push(CoreEvent::VerdictChanged {
                device_id,
                platform_id,
                verdict,
            });
        }

        self.last_verdicts = current;
    }

    fn save_snapshot(&self, now: DateTime<Local>) {
        let snapshot = PolicySnapshot {
            timestamp: now,
            platforms: self.state.catalog().list().to_vec(),
            devices: self.state.registry().list().to_vec(),
        };
        if let Err(e) = self.store.save_snapshot(&snapshot) {
            warn!(error = %e, "Failed to save policy snapshot");
        }
    }
}

fn verdict_map(
    state: &PolicyState,
    now: &DateTime<Local>,
) -> HashMap<(DeviceId, PlatformId), Verdict> {
    state
        .governed_verdicts(now)
        .into_iter()
        .map(|(device_id, platform_id, verdict)| ((device_id, platform_id), verdict))
        .collect()
}
