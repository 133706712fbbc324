//! Rendering of responses and events

use anyhow::Result;
use mybaby_api::{
    DeviceView, DiscoveryReport, Event, EventPayload, Platform, ResponsePayload, Verdict,
};
use mybaby_util::format_minutes;

use crate::cli::OutputFormat;

pub fn print_payload(payload: &ResponsePayload, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(payload)?),
        OutputFormat::Plain => {
            for line in render_payload(payload) {
                println!("{}", line);
            }
        }
    }
    Ok(())
}

pub fn print_event(event: &Event, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string(event)?),
        OutputFormat::Plain => println!(
            "{} {}",
            event.timestamp.format("%H:%M:%S"),
            render_event(&event.payload)
        ),
    }
    Ok(())
}

fn verdict_label(verdict: Verdict) -> &'static str {
    match verdict {
        Verdict::Allow => "allow",
        Verdict::Block => "BLOCK",
        Verdict::NotGoverned => "-",
    }
}

fn device_line(view: &DeviceView) -> String {
    let device = &view.device;
    let budget = match (view.remaining_minutes, view.window_minutes_left) {
        (Some(remaining), _) => format!("{} left today", format_minutes(remaining)),
        (None, Some(left)) => format!("window open, {} left", format_minutes(left.into())),
        (None, None) => match view.next_window_start {
            Some(next) => format!("next window {}", next.format("%a %H:%M")),
            None => "no upcoming window".to_string(),
        },
    };
    let verdicts = view
        .verdicts
        .iter()
        .map(|v| format!("{}:{}", v.platform_id, verdict_label(v.verdict)))
        .collect::<Vec<_>>()
        .join(" ");

    format!(
        "{:<12} {:<20} {} {:<8} {:<9} {:<28} {}",
        device.id,
        device.name,
        device.mac,
        device.mode(),
        format!("{:?}", device.status).to_lowercase(),
        budget,
        verdicts
    )
}

fn platform_line(platform: &Platform) -> String {
    format!(
        "{:<6} {:<16} {:<8} {}",
        platform.id,
        platform.name,
        if platform.enabled { "enabled" } else { "disabled" },
        platform.domains.join(", ")
    )
}

fn discovery_lines(report: &DiscoveryReport) -> Vec<String> {
    let mut lines = Vec::new();
    if let Some(warning) = &report.warning {
        lines.push(format!("warning: {}", warning));
    }
    if report.stale {
        let since = report
            .fetched_at
            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "never".to_string());
        lines.push(format!("(cached results, last fetched {})", since));
    }
    for device in &report.devices {
        let ip = device.ip.as_deref().unwrap_or_default();
        let controlled = match &device.controlled_by {
            Some(id) => format!("controlled by {}", id),
            None => "uncontrolled".to_string(),
        };
        lines.push(format!(
            "{} {:<16} {:<24} {:<7} {}",
            device.mac,
            ip,
            device.display_name,
            if device.online { "online" } else { "offline" },
            controlled
        ));
    }
    if report.devices.is_empty() {
        lines.push("No recent devices".to_string());
    }
    lines
}

fn render_payload(payload: &ResponsePayload) -> Vec<String> {
    match payload {
        ResponsePayload::State(state) => {
            let mut lines = vec![
                format!(
                    "enforcement: {}  ipv6: {}",
                    if state.enforcement_enabled { "on" } else { "off" },
                    state.ipv6_support
                ),
                format!(
                    "devices: {} ({} online, {} blocked)  enabled platforms: {}",
                    state.stats.device_count,
                    state.stats.online_count,
                    state.stats.blocked_count,
                    state.stats.enabled_platform_count
                ),
            ];
            lines.extend(state.devices.iter().map(device_line));
            lines.extend(state.platforms.iter().map(platform_line));
            lines
        }
        ResponsePayload::Devices { devices } => devices.iter().map(device_line).collect(),
        ResponsePayload::Platforms { platforms } => platforms.iter().map(platform_line).collect(),
        ResponsePayload::Device(view) => vec![device_line(view)],
        ResponsePayload::DeviceRemoved { device_id } => vec![format!("Removed device {}", device_id)],
        ResponsePayload::Platform(platform) => vec![platform_line(platform)],
        ResponsePayload::PlatformRemoved {
            platform_id,
            detached_from,
        } => {
            let mut line = format!("Removed platform {}", platform_id);
            if !detached_from.is_empty() {
                let ids: Vec<_> = detached_from.iter().map(ToString::to_string).collect();
                line.push_str(&format!(" (detached from {})", ids.join(", ")));
            }
            vec![line]
        }
        ResponsePayload::Decision {
            device_id,
            platform_id,
            at_time,
            verdict,
        } => vec![format!(
            "{} on {} at {}: {}",
            device_id,
            platform_id,
            at_time.format("%a %H:%M"),
            verdict
        )],
        ResponsePayload::RecentDevices(report) => discovery_lines(report),
        ResponsePayload::UsageRecorded {
            device_id,
            time_used_today,
            remaining_minutes,
        } => {
            let mut line = format!(
                "{}: {} used today",
                device_id,
                format_minutes((*time_used_today).into())
            );
            if let Some(remaining) = remaining_minutes {
                line.push_str(&format!(", {} left", format_minutes(*remaining)));
            }
            vec![line]
        }
        ResponsePayload::StatusRecorded { device_id } => {
            vec![format!("Status recorded for {}", device_id)]
        }
        ResponsePayload::DailyUsageReset { device_count } => {
            vec![format!("Usage reset for {} devices", device_count)]
        }
        ResponsePayload::Advice(advice) => {
            let mut lines = vec![advice.text.clone()];
            if advice.degraded {
                lines.push("(advisor unavailable)".to_string());
            }
            lines
        }
        ResponsePayload::EnforcementSet { enabled } => vec![format!(
            "Enforcement {}",
            if *enabled { "enabled" } else { "disabled" }
        )],
        ResponsePayload::Audits { entries } => entries
            .iter()
            .map(|e| {
                format!(
                    "{} {:<22} {}",
                    e.timestamp.format("%Y-%m-%d %H:%M:%S"),
                    e.event_type,
                    e.details
                )
            })
            .collect(),
        ResponsePayload::Subscribed { client_id } => vec![format!("Subscribed as {}", client_id)],
        ResponsePayload::Unsubscribed => vec!["Unsubscribed".to_string()],
        ResponsePayload::Health(health) => vec![format!(
            "live: {}  ready: {}  store: {}  discovery: {}  enforcement: {}",
            health.live,
            health.ready,
            ok_label(health.store_ok),
            ok_label(health.discovery_ok),
            ok_label(health.enforcement_ok)
        )],
        ResponsePayload::Pong => vec!["pong".to_string()],
    }
}

fn ok_label(ok: bool) -> &'static str {
    if ok { "ok" } else { "degraded" }
}

fn render_event(payload: &EventPayload) -> String {
    match payload {
        EventPayload::StateChanged(state) => format!(
            "state: {} devices, enforcement {}",
            state.stats.device_count,
            if state.enforcement_enabled { "on" } else { "off" }
        ),
        EventPayload::DeviceChanged(view) => format!("device changed: {}", device_line(view)),
        EventPayload::DeviceRemoved { device_id } => format!("device removed: {}", device_id),
        EventPayload::PlatformChanged(platform) => {
            format!("platform changed: {}", platform_line(platform))
        }
        EventPayload::PlatformRemoved { platform_id, .. } => {
            format!("platform removed: {}", platform_id)
        }
        EventPayload::VerdictChanged {
            device_id,
            platform_id,
            verdict,
        } => format!("verdict: {} on {} -> {}", device_id, platform_id, verdict),
        EventPayload::DailyUsageReset { device_count } => {
            format!("daily usage reset ({} devices)", device_count)
        }
        EventPayload::EnforcementToggled { enabled } => {
            format!("enforcement {}", if *enabled { "on" } else { "off" })
        }
        EventPayload::DiscoveryDegraded { message } => format!("discovery degraded: {}", message),
        EventPayload::Shutdown => "service shutting down".to_string(),
    }
}
