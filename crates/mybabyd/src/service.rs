//! The daemon service: startup wiring and the main event loop

use anyhow::{Context as _, Result};
use mybaby_api::{
    ClientInfo, ClientRole, Command, ErrorCode, ErrorInfo, Event, EventPayload, Response,
};
use mybaby_config::{ServiceConfig, load_config};
use mybaby_core::{ControlEngine, CoreEvent};
use mybaby_host_api::{AdvisoryService, CachedDiscovery, EnforcementBackend, EnforcementPlan};
use mybaby_host_http::{HttpAdvisor, HttpDiscovery, HttpEnforcement, LoggingEnforcement};
use mybaby_ipc::{IpcServer, ServerMessage};
use mybaby_store::{AuditEvent, AuditEventType, SqliteStore, Store};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::Args;
use crate::commands::{Context, calls_collaborator, handle_command};

/// Verdicts are re-evaluated this often
const TICK_INTERVAL: Duration = Duration::from_secs(1);

const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

type PlanSender = Arc<watch::Sender<Option<EnforcementPlan>>>;

/// Main service state
pub struct Service {
    ctx: Context,
    enforcement: Arc<dyn EnforcementBackend>,
    poll_interval: Duration,
    ipc: Arc<IpcServer>,
    store: Arc<dyn Store>,
}

impl Service {
    pub async fn new(args: &Args) -> Result<Self> {
        let policy = load_config(&args.config)
            .with_context(|| format!("Failed to load config from {:?}", args.config))?;

        info!(
            config_path = %args.config.display(),
            platform_count = policy.platforms.len(),
            device_count = policy.devices.len(),
            "Configuration loaded"
        );

        let socket_path = args
            .socket
            .clone()
            .unwrap_or_else(|| policy.service.socket_path.clone());

        let data_dir = args
            .data_dir
            .clone()
            .unwrap_or_else(|| policy.service.data_dir.clone());

        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("Failed to create data directory {:?}", data_dir))?;

        let db_path = data_dir.join("mybabyd.db");
        let store: Arc<dyn Store> = Arc::new(
            SqliteStore::open(&db_path)
                .with_context(|| format!("Failed to open database {:?}", db_path))?,
        );

        info!(db_path = %db_path.display(), "Store initialized");

        store.append_audit(AuditEvent::new(AuditEventType::ServiceStarted))?;

        let discovery = build_discovery(&policy.service)?;
        let enforcement = build_enforcement(&policy.service)?;
        let advisor = build_advisor(&policy.service)?;
        let poll_interval = policy.service.discovery.poll_interval;

        let engine = ControlEngine::new(policy, store.clone(), mybaby_util::now())
            .context("Failed to build policy state")?;

        let mut ipc = IpcServer::new(&socket_path);
        ipc.start().await?;

        info!(socket_path = %socket_path.display(), "IPC server started");

        Ok(Self {
            ctx: Context {
                engine: Arc::new(Mutex::new(engine)),
                discovery,
                advisor,
            },
            enforcement,
            poll_interval,
            ipc: Arc::new(ipc),
            store,
        })
    }

    pub async fn run(self) -> Result<()> {
        let Self {
            ctx,
            enforcement,
            poll_interval,
            ipc,
            store,
        } = self;

        let mut ipc_messages = ipc
            .take_message_receiver()
            .await
            .context("IPC message receiver already taken")?;

        let ipc_accept = ipc.clone();
        tokio::spawn(async move {
            if let Err(e) = ipc_accept.run().await {
                error!(error = %e, "IPC server error");
            }
        });

        // The pusher always applies the newest plan; intermediate ones are skipped
        let initial = ctx.engine.lock().await.enforcement_plan(mybaby_util::now());
        let (plans, plan_rx) = watch::channel(Some(initial));
        let plans = Arc::new(plans);
        let pusher = tokio::spawn(push_plans(ctx.engine.clone(), enforcement, plan_rx));

        let mut sigterm =
            signal(SignalKind::terminate()).context("Failed to create SIGTERM handler")?;
        let mut sigint =
            signal(SignalKind::interrupt()).context("Failed to create SIGINT handler")?;
        let mut sighup =
            signal(SignalKind::hangup()).context("Failed to create SIGHUP handler")?;

        let mut tick_timer = tokio::time::interval(TICK_INTERVAL);
        let mut discovery_timer = tokio::time::interval(poll_interval);
        let mut discovery_poll: Option<JoinHandle<()>> = None;

        info!("Service running");

        loop {
            tokio::select! {
                _ = sigterm.recv() => {
                    info!("Received SIGTERM, shutting down gracefully");
                    break;
                }
                _ = sigint.recv() => {
                    info!("Received SIGINT, shutting down gracefully");
                    break;
                }
                _ = sighup.recv() => {
                    info!("Received SIGHUP, shutting down gracefully");
                    break;
                }

                // Day rollover and verdict changes
                _ = tick_timer.tick() => {
                    let events = ctx.engine.lock().await.tick(mybaby_util::now());
                    publish_events(&ctx, &ipc, &plans, events).await;
                }

                // Keep the discovery cache warm and its health current
                _ = discovery_timer.tick(), if ctx.discovery.is_some() => {
                    if discovery_poll.as_ref().is_some_and(|poll| !poll.is_finished()) {
                        debug!("Previous discovery poll still running, skipping");
                    } else {
                        discovery_poll = Some(spawn_discovery_poll(&ctx, &ipc, &plans));
                    }
                }

                Some(msg) = ipc_messages.recv() => {
                    route_ipc_message(&ctx, &ipc, &store, &plans, msg).await;
                }
            }
        }

        info!("Shutting down mybabyd");

        if let Some(poll) = discovery_poll {
            poll.abort();
        }

        ipc.broadcast_event(Event::new(EventPayload::Shutdown));
        ipc.shutdown();
        // Detached requests may still hold a plan sender until their collaborator answers
        drop(plans);
        match tokio::time::timeout(SHUTDOWN_GRACE, pusher).await {
            Ok(Err(e)) => warn!(error = %e, "Plan pusher task failed"),
            Err(_) => warn!("Plan pusher did not finish in time"),
            Ok(Ok(())) => {}
        }

        if let Err(e) = store.append_audit(AuditEvent::new(AuditEventType::ServiceStopped)) {
            warn!(error = %e, "Failed to log service shutdown");
        }

        info!("Shutdown complete");
        Ok(())
    }
}

fn build_discovery(config: &ServiceConfig) -> Result<Option<Arc<CachedDiscovery>>> {
    let Some(url) = &config.discovery.url else {
        info!("No discovery service configured");
        return Ok(None);
    };

    let timeout = config.discovery.timeout;
    let http = HttpDiscovery::new(url.clone(), timeout)
        .context("Failed to build discovery client")?;
    info!(url = %url, interval = ?config.discovery.poll_interval, "Discovery service configured");
    Ok(Some(Arc::new(CachedDiscovery::new(Arc::new(http), timeout))))
}

fn build_enforcement(config: &ServiceConfig) -> Result<Arc<dyn EnforcementBackend>> {
    let backend: Arc<dyn EnforcementBackend> = match &config.enforcement.url {
        Some(url) => Arc::new(
            HttpEnforcement::new(url.clone(), config.enforcement.timeout)
                .context("Failed to build enforcement client")?,
        ),
        None => Arc::new(LoggingEnforcement),
    };
    info!(backend = backend.name(), "Enforcement backend configured");
    Ok(backend)
}

fn build_advisor(config: &ServiceConfig) -> Result<Option<Arc<dyn AdvisoryService>>> {
    let Some(url) = &config.advisory.url else {
        info!("No advisory service configured, advice will use the placeholder");
        return Ok(None);
    };

    let advisor = HttpAdvisor::new(url.clone(), config.advisory.timeout)
        .context("Failed to build advisory client")?;
    Ok(Some(Arc::new(advisor)))
}

/// Poll discovery off the main loop; the fetch may wait on its timeout
fn spawn_discovery_poll(ctx: &Context, ipc: &Arc<IpcServer>, plans: &PlanSender) -> JoinHandle<()> {
    let ctx = ctx.clone();
    let ipc = ipc.clone();
    let plans = plans.clone();
    tokio::spawn(async move {
        if ctx.poll_discovery().await.is_some() {
            let events = ctx.engine.lock().await.drain_events();
            publish_events(&ctx, &ipc, &plans, events).await;
        }
    })
}

/// Apply each new plan to the backend and track its health
async fn push_plans(
    engine: Arc<Mutex<ControlEngine>>,
    backend: Arc<dyn EnforcementBackend>,
    mut plans: watch::Receiver<Option<EnforcementPlan>>,
) {
    loop {
        let plan = plans.borrow_and_update().clone();

        if let Some(plan) = plan {
            match backend.apply_plan(&plan).await {
                Ok(()) => {
                    debug!(
                        backend = backend.name(),
                        devices = plan.devices.len(),
                        blocked = plan.blocked_rule_count(),
                        "Enforcement plan applied"
                    );
                    engine.lock().await.note_enforcement_success();
                }
                Err(e) => {
                    warn!(backend = backend.name(), error = %e, "Failed to apply enforcement plan");
                    engine.lock().await.note_enforcement_failure(&e.to_string());
                }
            }
        }

        if plans.changed().await.is_err() {
            break;
        }
    }
}

/// Broadcast core events and queue a new plan when any of them may change it
async fn publish_events(ctx: &Context, ipc: &IpcServer, plans: &PlanSender, events: Vec<CoreEvent>) {
    if events.is_empty() {
        return;
    }

    let mut replan = false;
    let mut state_changed = false;

    for event in events {
        replan |= event.affects_enforcement();
        state_changed |= matches!(
            event,
            CoreEvent::DailyUsageReset { .. } | CoreEvent::EnforcementToggled { .. }
        );
        ipc.broadcast_event(Event::new(event_payload(event)));
    }

    let now = mybaby_util::now();
    let engine = ctx.engine.lock().await;

    if state_changed {
        ipc.broadcast_event(Event::new(EventPayload::StateChanged(engine.get_state(now))));
    }

    if replan {
        plans.send_replace(Some(engine.enforcement_plan(now)));
    }
}

fn event_payload(event: CoreEvent) -> EventPayload {
    match event {
        CoreEvent::DeviceChanged(view) => EventPayload::DeviceChanged(view),
        CoreEvent::DeviceRemoved { device_id } => EventPayload::DeviceRemoved { device_id },
        CoreEvent::PlatformChanged(platform) => EventPayload::PlatformChanged(platform),
        CoreEvent::PlatformRemoved {
            platform_id,
            detached_from,
        } => EventPayload::PlatformRemoved {
            platform_id,
            detached_from,
        },
        CoreEvent::VerdictChanged {
            device_id,
            platform_id,
            verdict,
        } => {
            info!(
                device_id = %device_id,
                platform_id = %platform_id,
                verdict = %verdict,
                "Verdict changed"
            );
            EventPayload::VerdictChanged {
                device_id,
                platform_id,
                verdict,
            }
        }
        CoreEvent::DailyUsageReset { device_count } => {
            EventPayload::DailyUsageReset { device_count }
        }
        CoreEvent::EnforcementToggled { enabled } => EventPayload::EnforcementToggled { enabled },
        CoreEvent::DiscoveryDegraded { message } => EventPayload::DiscoveryDegraded { message },
    }
}

/// Requests that wait on a remote collaborator run in their own task so the
/// loop keeps ticking and answering everything else.
async fn route_ipc_message(
    ctx: &Context,
    ipc: &Arc<IpcServer>,
    store: &Arc<dyn Store>,
    plans: &PlanSender,
    msg: ServerMessage,
) {
    let detach = matches!(&msg, ServerMessage::Request { request, .. } if calls_collaborator(&request.command));
    if !detach {
        handle_ipc_message(ctx, ipc, store, plans, msg).await;
        return;
    }

    let ctx = ctx.clone();
    let ipc = ipc.clone();
    let store = store.clone();
    let plans = plans.clone();
    tokio::spawn(async move {
        handle_ipc_message(&ctx, &ipc, &store, &plans, msg).await;
    });
}

async fn handle_ipc_message(
    ctx: &Context,
    ipc: &IpcServer,
    store: &Arc<dyn Store>,
    plans: &PlanSender,
    msg: ServerMessage,
) {
    match msg {
        ServerMessage::Request { client_id, request } => {
            let Some(client) = ipc.get_client_info(&client_id).await else {
                // Disconnected before the request was handled
                let response = Response::error(
                    request.request_id,
                    ErrorInfo::new(ErrorCode::InternalError, "Unknown client"),
                );
                let _ = ipc.send_response(&client_id, response).await;
                return;
            };

            let subscribing = matches!(request.command, Command::SubscribeEvents);
            let response = handle_command(ctx, &client, request.request_id, request.command).await;
            let _ = ipc.send_response(&client_id, response).await;

            // New subscribers start from a full snapshot
            if subscribing {
                let state = ctx.engine.lock().await.get_state(mybaby_util::now());
                ipc.broadcast_event(Event::new(EventPayload::StateChanged(state)));
            }

            let events = ctx.engine.lock().await.drain_events();
            publish_events(ctx, ipc, plans, events).await;
        }

        ServerMessage::ClientConnected { client_id, info } => {
            log_connected(store, &client_id, &info);
        }

        ServerMessage::ClientDisconnected { client_id } => {
            debug!(client_id = %client_id, "Client disconnected");

            let _ = store.append_audit(AuditEvent::new(AuditEventType::ClientDisconnected {
                client_id: client_id.to_string(),
            }));
        }
    }
}

fn log_connected(store: &Arc<dyn Store>, client_id: &mybaby_util::ClientId, info: &ClientInfo) {
    if info.role == ClientRole::Admin {
        info!(client_id = %client_id, uid = ?info.uid, "Admin client connected");
    } else {
        debug!(client_id = %client_id, uid = ?info.uid, "Observer client connected");
    }

    let _ = store.append_audit(AuditEvent::new(AuditEventType::ClientConnected {
        client_id: client_id.to_string(),
        role: format!("{:?}", info.role),
        uid: info.uid,
    }));
}

#[cfg(test)]
mod tests {
    use super::*;
    use mybaby_api::{ResponsePayload, ResponseResult, Verdict};
    use mybaby_config::parse_config;
    use mybaby_host_api::MockAdvisor;
    use mybaby_ipc::IpcClient;
    use mybaby_util::{DeviceId, PlatformId};

    const CONFIG: &str = r#"
        config_version = 1

        [[platforms]]
        id = "1"
        name = "Douyin"
        domains = ["*.douyin.com"]

        [[devices]]
        id = "d1"
        mac = "AA:BB:CC:DD:EE:01"
        name = "TV"
        mode = "quota"
        quota = { weekday_limit_minutes = 60, weekend_limit_minutes = 60 }
    "#;

    #[tokio::test]
    async fn slow_advisor_does_not_stall_the_loop() {
        let dir = tempfile::tempdir().unwrap();
        let socket_path = dir.path().join("mybabyd.sock");

        let store: Arc<dyn Store> = Arc::new(SqliteStore::in_memory().unwrap());
        let policy = parse_config(CONFIG).unwrap();
        let engine = ControlEngine::new(policy, store.clone(), mybaby_util::now()).unwrap();
        let advisor = MockAdvisor::replying("Lights out at nine").delayed(Duration::from_secs(3));
        let ctx = Context {
            engine: Arc::new(Mutex::new(engine)),
            discovery: None,
            advisor: Some(Arc::new(advisor)),
        };

        let mut server = IpcServer::new(&socket_path);
        server.start().await.unwrap();
        let mut messages = server.take_message_receiver().await.unwrap();
        let ipc = Arc::new(server);

        let runner = ipc.clone();
        tokio::spawn(async move {
            let _ = runner.run().await;
        });

        let (plans, _plan_rx) = watch::channel(None);
        let plans = Arc::new(plans);
        let loop_ipc = ipc.clone();
        tokio::spawn(async move {
            while let Some(msg) = messages.recv().await {
                route_ipc_message(&ctx, &loop_ipc, &store, &plans, msg).await;
            }
        });

        let mut advice_client = IpcClient::connect(&socket_path).await.unwrap();
        let advice = tokio::spawn(async move {
            advice_client
                .send(Command::GetAdvice {
                    device_id: DeviceId::new("d1"),
                })
                .await
                .unwrap()
        });
        tokio::time::sleep(Duration::from_millis(100)).await;

        let mut client = IpcClient::connect(&socket_path).await.unwrap();
        let decide = client.send(Command::Decide {
            device_id: DeviceId::new("d1"),
            platform_id: PlatformId::new("1"),
            at_time: None,
        });
        let response = tokio::time::timeout(Duration::from_secs(1), decide)
            .await
            .expect("decide should be answered while advice is pending")
            .unwrap();
        assert!(matches!(
            response.result,
            ResponseResult::Ok(ResponsePayload::Decision {
                verdict: Verdict::Allow,
                ..
            })
        ));
        assert!(!advice.is_finished());

        match advice.await.unwrap().result {
            ResponseResult::Ok(ResponsePayload::Advice(advice)) => {
                assert_eq!(advice.text, "Lights out at nine");
                assert!(!advice.degraded);
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
