//! Command dispatch for IPC requests

use chrono::{DateTime, Local};
use mybaby_api::{
    Advice, ClientInfo, Command, ErrorCode, ErrorInfo, HealthStatus, Response, ResponsePayload,
};
use mybaby_core::{ControlEngine, PolicyError, PolicyResult, normalize_mac};
use mybaby_host_api::{
    ADVISOR_PLACEHOLDER, AdvisoryService, CachedDiscovery, DiscoveryOutcome, advice_or_placeholder,
};
use mybaby_util::MacAddress;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Everything a command may touch
#[derive(Clone)]
pub struct Context {
    pub engine: Arc<Mutex<ControlEngine>>,
    /// None when no discovery service is configured
    pub discovery: Option<Arc<CachedDiscovery>>,
    /// None when no advisory service is configured
    pub advisor: Option<Arc<dyn AdvisoryService>>,
}

impl Context {
    /// Fetch sightings through the cache and record discovery health
    pub async fn poll_discovery(&self) -> Option<DiscoveryOutcome> {
        let discovery = self.discovery.as_ref()?;
        let outcome = discovery.fetch().await;
        self.engine.lock().await.note_discovery(&outcome);
        Some(outcome)
    }

    fn cached_hostname(&self, mac: &MacAddress) -> Option<String> {
        let (sightings, _) = self.discovery.as_ref()?.cached()?;
        sightings
            .into_iter()
            .find(|s| normalize_mac(&s.mac).is_ok_and(|m| &m == mac))
            .and_then(|s| s.hostname)
    }
}

/// Commands whose handling waits on a remote collaborator
pub fn calls_collaborator(command: &Command) -> bool {
    matches!(
        command,
        Command::GetAdvice { .. } | Command::ListRecentDevices { .. }
    )
}

fn error_info(e: &PolicyError) -> ErrorInfo {
    ErrorInfo::new(e.code(), e.to_string())
}

/// Handle one command from a client.
///
/// Mutating commands need the admin role. Core failures come back as error
/// responses carrying the matching error code.
pub async fn handle_command(
    ctx: &Context,
    client: &ClientInfo,
    request_id: u64,
    command: Command,
) -> Response {
    if command.requires_admin() && !client.role.can_mutate() {
        warn!(
            client_id = %client.client_id,
            role = ?client.role,
            "Rejected command that requires admin"
        );
        return Response::error(
            request_id,
            ErrorInfo::new(ErrorCode::PermissionDenied, "Admin role required"),
        );
    }

    let now = mybaby_util::now();
    match dispatch(ctx, client, command, now).await {
        Ok(payload) => Response::success(request_id, payload),
        Err(e) => {
            debug!(request_id, error = %e, "Command failed");
            Response::error(request_id, error_info(&e))
        }
    }
}

async fn dispatch(
    ctx: &Context,
    client: &ClientInfo,
    command: Command,
    now: DateTime<Local>,
) -> PolicyResult<ResponsePayload> {
    let payload = match command {
        Command::GetState => ResponsePayload::State(ctx.engine.lock().await.get_state(now)),

        Command::ListDevices => ResponsePayload::Devices {
            devices: ctx.engine.lock().await.list_devices(now),
        },

        Command::ListPlatforms => ResponsePayload::Platforms {
            platforms: ctx.engine.lock().await.list_platforms(),
        },

        Command::AddDevice { draft } => {
            ResponsePayload::Device(ctx.engine.lock().await.add_device(&draft, now)?)
        }

        Command::UpdateDevice { device_id, draft } => {
            ResponsePayload::Device(ctx.engine.lock().await.update_device(&device_id, &draft, now)?)
        }

        Command::RemoveDevice { device_id } => {
            let device = ctx.engine.lock().await.remove_device(&device_id, now)?;
            ResponsePayload::DeviceRemoved {
                device_id: device.id,
            }
        }

        Command::AddPlatform { platform } => {
            ResponsePayload::Platform(ctx.engine.lock().await.add_platform(platform, now)?)
        }

        Command::UpdatePlatform { platform } => {
            ResponsePayload::Platform(ctx.engine.lock().await.update_platform(platform, now)?)
        }

        Command::TogglePlatform { platform_id } => {
            ResponsePayload::Platform(ctx.engine.lock().await.toggle_platform(&platform_id, now)?)
        }

        Command::RemovePlatform { platform_id } => {
            let detached_from = ctx.engine.lock().await.remove_platform(&platform_id, now)?;
            ResponsePayload::PlatformRemoved {
                platform_id,
                detached_from,
            }
        }

        Command::Decide {
            device_id,
            platform_id,
            at_time,
        } => {
            let at_time = at_time.unwrap_or(now);
            let verdict = ctx
                .engine
                .lock()
                .await
                .decide(&device_id, &platform_id, at_time);
            ResponsePayload::Decision {
                device_id,
                platform_id,
                at_time,
                verdict,
            }
        }

        Command::ListRecentDevices { window_days } => {
            let outcome = match ctx.poll_discovery().await {
                Some(outcome) => outcome,
                None => DiscoveryOutcome {
                    sightings: Vec::new(),
                    stale: false,
                    warning: None,
                    fetched_at: None,
                },
            };
            let report = ctx
                .engine
                .lock()
                .await
                .recent_devices(&outcome, window_days, now);
            ResponsePayload::RecentDevices(report)
        }

        Command::PromoteSighting { mac, name } => {
            let hostname = normalize_mac(&mac)
                .ok()
                .and_then(|mac| ctx.cached_hostname(&mac));
            let view = ctx.engine.lock().await.promote_sighting(
                &mac,
                name.as_deref(),
                hostname.as_deref(),
                now,
            )?;
            ResponsePayload::Device(view)
        }

        Command::ReportUsage { mac, minutes } => {
            let update = ctx.engine.lock().await.report_usage(&mac, minutes, now)?;
            ResponsePayload::UsageRecorded {
                device_id: update.device_id,
                time_used_today: update.time_used_today,
                remaining_minutes: update.remaining_minutes,
            }
        }

        Command::ReportStatus { mac, status } => {
            let device_id = ctx.engine.lock().await.report_status(&mac, status, now)?;
            ResponsePayload::StatusRecorded { device_id }
        }

        Command::ResetDailyUsage => ResponsePayload::DailyUsageReset {
            device_count: ctx.engine.lock().await.reset_daily_usage(now)?,
        },

        Command::GetAdvice { device_id } => {
            // Engine lock is released before the advisor is awaited
            let request = ctx.engine.lock().await.advisory_request(&device_id, now)?;
            let (text, degraded) = match &ctx.advisor {
                Some(advisor) => advice_or_placeholder(advisor.as_ref(), &request).await,
                None => (ADVISOR_PLACEHOLDER.to_string(), true),
            };
            ResponsePayload::Advice(Advice {
                device_id,
                text,
                degraded,
            })
        }

        Command::SetEnforcementEnabled { enabled } => {
            ctx.engine.lock().await.set_enforcement_enabled(enabled);
            ResponsePayload::EnforcementSet { enabled }
        }

        Command::GetRecentAudits { limit } => ResponsePayload::Audits {
            entries: ctx.engine.lock().await.recent_audits(limit)?,
        },

        Command::SubscribeEvents => ResponsePayload::Subscribed {
            client_id: client.client_id.clone(),
        },

        Command::UnsubscribeEvents => ResponsePayload::Unsubscribed,

        Command::GetHealth => {
            let engine = ctx.engine.lock().await;
            ResponsePayload::Health(HealthStatus {
                live: true,
                ready: true,
                store_ok: engine.store_healthy(),
                discovery_ok: engine.discovery_ok(),
                enforcement_ok: engine.enforcement_ok(),
            })
        }

        Command::Ping => ResponsePayload::Pong,
    };

    Ok(payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mybaby_api::{
        ClientRole, DeviceDraft, DeviceStatus, Platform, QuotaConfig, RecentDeviceSighting,
        ResponseResult, Verdict,
    };
    use mybaby_config::{Policy, ServiceConfig};
    use mybaby_host_api::{MockAdvisor, MockDiscovery};
    use mybaby_store::{SqliteStore, Store};
    use mybaby_util::{DeviceId, PlatformId};
    use std::time::Duration;

    fn platform(id: &str) -> Platform {
        Platform {
            id: PlatformId::new(id),
            name: format!("Platform {}", id),
            icon: None,
            domains: vec![format!("*.p{}.com", id)],
            enabled: true,
        }
    }

    // Same limit every day so results do not depend on the weekday
    fn quota() -> QuotaConfig {
        QuotaConfig {
            weekday_limit_minutes: 60,
            weekend_limit_minutes: 60,
        }
    }

    fn policy() -> Policy {
        Policy {
            service: ServiceConfig {
                restore_snapshot: false,
                ..Default::default()
            },
            default_quota: quota(),
            platforms: vec![platform("1"), platform("2")],
            devices: vec![
                DeviceDraft::quota("AA:BB:CC:DD:EE:01", "TV", quota())
                    .with_id("d1")
                    .with_platforms(["1", "2"]),
                DeviceDraft::quota("AA:BB:CC:DD:EE:02", "Tablet", quota())
                    .with_id("d2")
                    .with_platforms(["2"]),
            ],
            presets: Default::default(),
        }
    }

    fn context(
        discovery: Option<Arc<MockDiscovery>>,
        advisor: Option<Arc<dyn AdvisoryService>>,
    ) -> Context {
        let store: Arc<dyn Store> = Arc::new(SqliteStore::in_memory().unwrap());
        let engine = ControlEngine::new(policy(), store, mybaby_util::now()).unwrap();
        Context {
            engine: Arc::new(Mutex::new(engine)),
            discovery: discovery
                .map(|d| Arc::new(CachedDiscovery::new(d, Duration::from_secs(1)))),
            advisor,
        }
    }

    fn admin() -> ClientInfo {
        ClientInfo::new(ClientRole::Admin)
    }

    async fn ok(ctx: &Context, command: Command) -> ResponsePayload {
        match handle_command(ctx, &admin(), 1, command).await.result {
            ResponseResult::Ok(payload) => payload,
            ResponseResult::Err(e) => panic!("unexpected error: {:?}", e),
        }
    }

    async fn err(ctx: &Context, client: &ClientInfo, command: Command) -> ErrorCode {
        match handle_command(ctx, client, 1, command).await.result {
            ResponseResult::Ok(payload) => panic!("unexpected success: {:?}", payload),
            ResponseResult::Err(e) => e.code,
        }
    }

    #[tokio::test]
    async fn observer_cannot_mutate() {
        let ctx = context(None, None);
        let observer = ClientInfo::new(ClientRole::Observer);

        let code = err(&ctx, &observer, Command::AddPlatform { platform: platform("3") }).await;
        assert_eq!(code, ErrorCode::PermissionDenied);
        assert_eq!(ctx.engine.lock().await.list_platforms().len(), 2);

        let code = err(&ctx, &observer, Command::GetRecentAudits { limit: 10 }).await;
        assert_eq!(code, ErrorCode::PermissionDenied);

        // Reads are fine
        let response = handle_command(&ctx, &observer, 2, Command::ListPlatforms).await;
        assert!(matches!(response.result, ResponseResult::Ok(ResponsePayload::Platforms { .. })));
    }

    #[tokio::test]
    async fn boundary_validation_maps_to_error_codes() {
        let ctx = context(None, None);

        let draft = DeviceDraft::quota("not-a-mac", "Broken", quota());
        assert_eq!(
            err(&ctx, &admin(), Command::AddDevice { draft }).await,
            ErrorCode::InvalidMacFormat
        );

        let mut empty = platform("3");
        empty.domains.clear();
        assert_eq!(
            err(&ctx, &admin(), Command::AddPlatform { platform: empty }).await,
            ErrorCode::EmptyDomainList
        );

        let draft = DeviceDraft::quota("aa-bb-cc-dd-ee-01", "Same TV", quota());
        assert_eq!(
            err(&ctx, &admin(), Command::AddDevice { draft }).await,
            ErrorCode::DuplicateMac
        );

        assert_eq!(
            err(
                &ctx,
                &admin(),
                Command::RemoveDevice {
                    device_id: DeviceId::new("ghost")
                }
            )
            .await,
            ErrorCode::NotFound
        );
    }

    #[tokio::test]
    async fn usage_report_exhausts_quota() {
        let ctx = context(None, None);

        let payload = ok(
            &ctx,
            Command::ReportUsage {
                mac: "aa:bb:cc:dd:ee:01".into(),
                minutes: 70,
            },
        )
        .await;
        match payload {
            ResponsePayload::UsageRecorded {
                device_id,
                time_used_today,
                remaining_minutes,
            } => {
                assert_eq!(device_id.as_str(), "d1");
                assert_eq!(time_used_today, 70);
                assert_eq!(remaining_minutes, Some(-10));
            }
            other => panic!("unexpected payload: {:?}", other),
        }

        let decide = |device: &str| Command::Decide {
            device_id: DeviceId::new(device),
            platform_id: PlatformId::new("1"),
            at_time: None,
        };
        match ok(&ctx, decide("d1")).await {
            ResponsePayload::Decision { verdict, .. } => assert_eq!(verdict, Verdict::Block),
            other => panic!("unexpected payload: {:?}", other),
        }
        match ok(&ctx, decide("d2")).await {
            ResponsePayload::Decision { verdict, .. } => assert_eq!(verdict, Verdict::NotGoverned),
            other => panic!("unexpected payload: {:?}", other),
        }

        match ok(&ctx, Command::ResetDailyUsage).await {
            ResponsePayload::DailyUsageReset { device_count } => assert_eq!(device_count, 2),
            other => panic!("unexpected payload: {:?}", other),
        }
        match ok(&ctx, decide("d1")).await {
            ResponsePayload::Decision { verdict, .. } => assert_eq!(verdict, Verdict::Allow),
            other => panic!("unexpected payload: {:?}", other),
        }
    }

    #[tokio::test]
    async fn status_report_for_unknown_mac_is_not_found() {
        let ctx = context(None, None);
        let code = err(
            &ctx,
            &admin(),
            Command::ReportStatus {
                mac: "11:22:33:44:55:66".into(),
                status: DeviceStatus::Online,
            },
        )
        .await;
        assert_eq!(code, ErrorCode::NotFound);
    }

    #[tokio::test]
    async fn removing_platform_reports_detached_devices() {
        let ctx = context(None, None);
        match ok(
            &ctx,
            Command::RemovePlatform {
                platform_id: PlatformId::new("2"),
            },
        )
        .await
        {
            ResponsePayload::PlatformRemoved { detached_from, .. } => {
                assert_eq!(detached_from, vec![DeviceId::new("d1"), DeviceId::new("d2")]);
            }
            other => panic!("unexpected payload: {:?}", other),
        }
    }

    #[tokio::test]
    async fn recent_devices_without_discovery_is_empty() {
        let ctx = context(None, None);
        match ok(&ctx, Command::ListRecentDevices { window_days: None }).await {
            ResponsePayload::RecentDevices(report) => {
                assert!(report.devices.is_empty());
                assert!(!report.stale);
                assert!(report.warning.is_none());
            }
            other => panic!("unexpected payload: {:?}", other),
        }
    }

    #[tokio::test]
    async fn promote_uses_discovered_hostname() {
        let now_secs = mybaby_util::now().timestamp();
        let discovery = Arc::new(MockDiscovery::with_sightings(vec![
            RecentDeviceSighting {
                mac: "aa-bb-cc-00-00-09".into(),
                ip: None,
                hostname: Some("kids-laptop".into()),
                last_seen_at: Some(now_secs - 60),
                last_seen: None,
                online: true,
            },
            RecentDeviceSighting {
                mac: "AA:BB:CC:DD:EE:01".into(),
                ip: None,
                hostname: None,
                last_seen_at: Some(now_secs - 60),
                last_seen: None,
                online: true,
            },
        ]));
        let ctx = context(Some(discovery), None);

        match ok(&ctx, Command::ListRecentDevices { window_days: None }).await {
            ResponsePayload::RecentDevices(report) => {
                assert_eq!(report.devices.len(), 2);
                assert!(report.devices[0].controlled_by.is_none());
                assert_eq!(report.devices[1].controlled_by, Some(DeviceId::new("d1")));
            }
            other => panic!("unexpected payload: {:?}", other),
        }

        match ok(
            &ctx,
            Command::PromoteSighting {
                mac: "AA:BB:CC:00:00:09".into(),
                name: None,
            },
        )
        .await
        {
            ResponsePayload::Device(view) => {
                assert_eq!(view.device.name, "kids-laptop");
                assert_eq!(view.device.quota(), Some(&quota()));
            }
            other => panic!("unexpected payload: {:?}", other),
        }

        let code = err(
            &ctx,
            &admin(),
            Command::PromoteSighting {
                mac: "aa:bb:cc:00:00:09".into(),
                name: Some("Again".into()),
            },
        )
        .await;
        assert_eq!(code, ErrorCode::DuplicateMac);
    }

    #[tokio::test]
    async fn slow_advice_leaves_engine_available() {
        let advisor = MockAdvisor::replying("Screens off at dinner").delayed(Duration::from_secs(3));
        let ctx = context(None, Some(Arc::new(advisor)));

        let advice_ctx = ctx.clone();
        let advice = tokio::spawn(async move {
            handle_command(
                &advice_ctx,
                &admin(),
                1,
                Command::GetAdvice {
                    device_id: DeviceId::new("d1"),
                },
            )
            .await
        });
        tokio::time::sleep(Duration::from_millis(50)).await;

        let decide = Command::Decide {
            device_id: DeviceId::new("d1"),
            platform_id: PlatformId::new("1"),
            at_time: None,
        };
        let payload = tokio::time::timeout(Duration::from_secs(1), ok(&ctx, decide))
            .await
            .expect("decide should not wait for the advisor");
        assert!(matches!(
            payload,
            ResponsePayload::Decision {
                verdict: Verdict::Allow,
                ..
            }
        ));
        assert!(!advice.is_finished());

        match advice.await.unwrap().result {
            ResponseResult::Ok(ResponsePayload::Advice(advice)) => {
                assert_eq!(advice.text, "Screens off at dinner");
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn remote_commands_are_detached() {
        assert!(calls_collaborator(&Command::GetAdvice {
            device_id: DeviceId::new("d1")
        }));
        assert!(calls_collaborator(&Command::ListRecentDevices { window_days: None }));
        assert!(!calls_collaborator(&Command::Ping));
        assert!(!calls_collaborator(&Command::ResetDailyUsage));
    }

    #[tokio::test]
    async fn advice_falls_back_to_placeholder() {
        let ctx = context(None, None);
        let get = || Command::GetAdvice {
            device_id: DeviceId::new("d1"),
        };

        match ok(&ctx, get()).await {
            ResponsePayload::Advice(advice) => {
                assert!(advice.degraded);
                assert_eq!(advice.text, ADVISOR_PLACEHOLDER);
            }
            other => panic!("unexpected payload: {:?}", other),
        }

        let ctx = context(None, Some(Arc::new(MockAdvisor::replying("Try a wind-down hour"))));
        match ok(&ctx, get()).await {
            ResponsePayload::Advice(advice) => {
                assert!(!advice.degraded);
                assert_eq!(advice.text, "Try a wind-down hour");
            }
            other => panic!("unexpected payload: {:?}", other),
        }

        let ctx = context(None, Some(Arc::new(MockAdvisor::failing())));
        match ok(&ctx, get()).await {
            ResponsePayload::Advice(advice) => assert!(advice.degraded),
            other => panic!("unexpected payload: {:?}", other),
        }
    }

    #[tokio::test]
    async fn health_reflects_discovery_failure() {
        let discovery = Arc::new(MockDiscovery::new());
        discovery.set_failing(true);
        let ctx = context(Some(discovery), None);

        match ok(&ctx, Command::ListRecentDevices { window_days: None }).await {
            ResponsePayload::RecentDevices(report) => {
                assert!(report.stale);
                assert!(report.warning.is_some());
            }
            other => panic!("unexpected payload: {:?}", other),
        }

        match ok(&ctx, Command::GetHealth).await {
            ResponsePayload::Health(health) => {
                assert!(health.store_ok);
                assert!(!health.discovery_ok);
                assert!(health.enforcement_ok);
            }
            other => panic!("unexpected payload: {:?}", other),
        }
    }
}
