//! Command line structure and conversion into IPC commands

use anyhow::{Context, Result, anyhow, bail};
use chrono::{DateTime, Local, NaiveDateTime, TimeZone};
use clap::{Args, Parser, Subcommand, ValueEnum};
use mybaby_api::{Command, DeviceDraft, DeviceStatus, Platform, QuotaConfig, ScheduleWindow};
use mybaby_util::{DaySet, DeviceId, PlatformId, WallClock, WindowId};
use std::path::PathBuf;

/// mybabyctl - Operate the mybabyd screen-time service
#[derive(Parser, Debug)]
#[command(name = "mybabyctl")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Socket path (default: per-user runtime dir)
    #[arg(short, long, env = "MYBABY_SOCKET", global = true)]
    pub socket: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Plain, global = true)]
    pub format: OutputFormat,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Plain,
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Dashboard summary: counters, devices and platforms
    State,

    /// Manage controlled devices
    #[command(subcommand)]
    Device(DeviceCommands),

    /// Manage the platform catalog
    #[command(subcommand)]
    Platform(PlatformCommands),

    /// Evaluate the verdict for a device on a platform
    Decide {
        device_id: String,
        platform_id: String,

        /// Evaluate at "YYYY-MM-DD HH:MM" local time instead of now
        #[arg(long, value_parser = parse_local_time)]
        at: Option<DateTime<Local>>,
    },

    /// List devices seen on the network recently
    Discover {
        /// Freshness window in days (default from config)
        #[arg(long)]
        days: Option<u32>,
    },

    /// Report consumed minutes for a MAC
    ReportUsage { mac: String, minutes: u32 },

    /// Report a device's connection status
    ReportStatus {
        mac: String,
        #[arg(value_enum)]
        status: StatusArg,
    },

    /// Zero today's usage for every device
    ResetUsage,

    /// Ask the advisor about a device
    Advice { device_id: String },

    /// Turn enforcement on or off
    Enforcement {
        #[arg(value_enum)]
        switch: Switch,
    },

    /// Show the most recent audit log entries
    Audit {
        #[arg(short = 'n', long, default_value_t = 20)]
        limit: usize,
    },

    /// Stream events until interrupted
    Watch,

    /// Service health
    Health,

    Ping,
}

#[derive(Subcommand, Debug)]
pub enum DeviceCommands {
    List,

    /// Register a new device
    Add(DeviceArgs),

    /// Replace a device's policy fields
    Update {
        device_id: String,
        #[command(flatten)]
        device: DeviceArgs,
    },

    Remove { device_id: String },

    /// Register a discovered MAC under the default quota
    Promote {
        mac: String,
        #[arg(long)]
        name: Option<String>,
    },
}

#[derive(Args, Debug)]
pub struct DeviceArgs {
    #[arg(long)]
    pub mac: String,

    #[arg(long)]
    pub name: String,

    /// Explicit id (generated when omitted)
    #[arg(long)]
    pub id: Option<String>,

    /// Quota mode: Monday-Friday minutes
    #[arg(long, default_value_t = 60)]
    pub weekday_minutes: u32,

    /// Quota mode: Saturday-Sunday minutes
    #[arg(long, default_value_t = 120)]
    pub weekend_minutes: u32,

    /// Schedule mode window "HH:MM-HH:MM@1,2,3" (days 0=Sunday). Repeatable.
    #[arg(long = "window")]
    pub windows: Vec<String>,

    /// Restrict to these platform ids. Repeatable; all platforms when omitted.
    #[arg(long = "platform")]
    pub platforms: Vec<String>,
}

#[derive(Subcommand, Debug)]
pub enum PlatformCommands {
    List,

    Add(PlatformArgs),

    Update(PlatformArgs),

    /// Flip a platform between enabled and disabled
    Toggle { platform_id: String },

    /// Remove a platform and detach it from every device
    Remove { platform_id: String },
}

#[derive(Args, Debug)]
pub struct PlatformArgs {
    #[arg(long)]
    pub id: String,

    #[arg(long)]
    pub name: String,

    /// Domain pattern such as "*.example.com". Repeatable.
    #[arg(long = "domain")]
    pub domains: Vec<String>,

    #[arg(long)]
    pub icon: Option<String>,

    /// Create the platform disabled
    #[arg(long)]
    pub disabled: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum StatusArg {
    Online,
    Offline,
    Blocked,
}

impl From<StatusArg> for DeviceStatus {
    fn from(status: StatusArg) -> Self {
        match status {
            StatusArg::Online => DeviceStatus::Online,
            StatusArg::Offline => DeviceStatus::Offline,
            StatusArg::Blocked => DeviceStatus::Blocked,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum Switch {
    On,
    Off,
}

fn parse_local_time(s: &str) -> Result<DateTime<Local>, String> {
    let naive = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M")
        .map_err(|e| format!("expected \"YYYY-MM-DD HH:MM\": {}", e))?;
    Local
        .from_local_datetime(&naive)
        .single()
        .ok_or_else(|| format!("'{}' is ambiguous or skipped in local time", s))
}

/// Parse "HH:MM-HH:MM@d,d,d" into a schedule window
pub fn parse_window(spec: &str, id: WindowId) -> Result<ScheduleWindow> {
    let (times, days) = spec
        .split_once('@')
        .ok_or_else(|| anyhow!("window '{}' is missing '@days'", spec))?;
    let (start, end) = times
        .split_once('-')
        .ok_or_else(|| anyhow!("window '{}' is missing '-' between times", spec))?;

    let start: WallClock = start.trim().parse()?;
    let end: WallClock = end.trim().parse()?;

    let indices = days
        .split(',')
        .map(|d| {
            d.trim()
                .parse::<u8>()
                .with_context(|| format!("invalid day '{}' in window '{}'", d, spec))
        })
        .collect::<Result<Vec<_>>>()?;
    let days = DaySet::from_indices(indices)?;

    Ok(ScheduleWindow {
        id,
        start,
        end,
        days,
    })
}

impl DeviceArgs {
    /// Schedule mode when any window is given, quota mode otherwise
    pub fn to_draft(&self) -> Result<DeviceDraft> {
        let mut draft = if self.windows.is_empty() {
            DeviceDraft::quota(
                &self.mac,
                &self.name,
                QuotaConfig {
                    weekday_limit_minutes: self.weekday_minutes,
                    weekend_limit_minutes: self.weekend_minutes,
                },
            )
        } else {
            let windows = self
                .windows
                .iter()
                .enumerate()
                .map(|(i, spec)| parse_window(spec, WindowId::new(format!("s{}", i + 1))))
                .collect::<Result<Vec<_>>>()?;
            DeviceDraft::schedule(&self.mac, &self.name, windows)
        };

        if let Some(id) = &self.id {
            draft = draft.with_id(id.as_str());
        }
        if !self.platforms.is_empty() {
            draft = draft.with_platforms(self.platforms.iter().map(String::as_str));
        }
        Ok(draft)
    }
}

impl PlatformArgs {
    pub fn to_platform(&self) -> Platform {
        Platform {
            id: PlatformId::new(&self.id),
            name: self.name.clone(),
            icon: self.icon.clone(),
            domains: self.domains.clone(),
            enabled: !self.disabled,
        }
    }
}

impl Commands {
    /// The IPC command this invocation sends
    pub fn to_command(&self) -> Result<Command> {
        let command = match self {
            Commands::State => Command::GetState,

            Commands::Device(device) => match device {
                DeviceCommands::List => Command::ListDevices,
                DeviceCommands::Add(args) => Command::AddDevice {
                    draft: args.to_draft()?,
                },
                DeviceCommands::Update { device_id, device } => {
                    if device.id.as_ref().is_some_and(|id| id != device_id) {
                        bail!("--id does not match the device being updated");
                    }
                    Command::UpdateDevice {
                        device_id: DeviceId::new(device_id),
                        draft: device.to_draft()?,
                    }
                }
                DeviceCommands::Remove { device_id } => Command::RemoveDevice {
                    device_id: DeviceId::new(device_id),
                },
                DeviceCommands::Promote { mac, name } => Command::PromoteSighting {
                    mac: mac.clone(),
                    name: name.clone(),
                },
            },

            Commands::Platform(platform) => match platform {
                PlatformCommands::List => Command::ListPlatforms,
                PlatformCommands::Add(args) => Command::AddPlatform {
                    platform: args.to_platform(),
                },
                PlatformCommands::Update(args) => Command::UpdatePlatform {
                    platform: args.to_platform(),
                },
                PlatformCommands::Toggle { platform_id } => Command::TogglePlatform {
                    platform_id: PlatformId::new(platform_id),
                },
                PlatformCommands::Remove { platform_id } => Command::RemovePlatform {
                    platform_id: PlatformId::new(platform_id),
                },
            },

            Commands::Decide {
                device_id,
                platform_id,
                at,
            } => Command::Decide {
                device_id: DeviceId::new(device_id),
                platform_id: PlatformId::new(platform_id),
                at_time: *at,
            },

            Commands::Discover { days } => Command::ListRecentDevices { window_days: *days },

            Commands::ReportUsage { mac, minutes } => Command::ReportUsage {
                mac: mac.clone(),
                minutes: *minutes,
            },

            Commands::ReportStatus { mac, status } => Command::ReportStatus {
                mac: mac.clone(),
                status: (*status).into(),
            },

            Commands::ResetUsage => Command::ResetDailyUsage,

            Commands::Advice { device_id } => Command::GetAdvice {
                device_id: DeviceId::new(device_id),
            },

            Commands::Enforcement { switch } => Command::SetEnforcementEnabled {
                enabled: *switch == Switch::On,
            },

            Commands::Audit { limit } => Command::GetRecentAudits { limit: *limit },

            Commands::Watch => Command::SubscribeEvents,

            Commands::Health => Command::GetHealth,

            Commands::Ping => Command::Ping,
        };

        Ok(command)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mybaby_api::ControlMode;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("mybabyctl").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn quota_device_by_default() {
        let cli = parse(&[
            "device", "add", "--mac", "70-b3-d5-e2-b1-00", "--name", "TV", "--platform", "1",
        ]);
        match cli.command.to_command().unwrap() {
            Command::AddDevice { draft } => {
                assert_eq!(draft.mode, ControlMode::Quota);
                assert_eq!(
                    draft.quota,
                    Some(QuotaConfig {
                        weekday_limit_minutes: 60,
                        weekend_limit_minutes: 120,
                    })
                );
                assert_eq!(draft.platform_ids, Some(vec![PlatformId::new("1")]));
                assert!(draft.id.is_none());
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn windows_select_schedule_mode() {
        let cli = parse(&[
            "device",
            "add",
            "--mac",
            "AC:BC:32:00:FF:12",
            "--name",
            "Tablet",
            "--window",
            "18:30-20:00@1,2,3,4,5",
            "--window",
            "09:00-11:00@0,6",
        ]);
        match cli.command.to_command().unwrap() {
            Command::AddDevice { draft } => {
                assert_eq!(draft.mode, ControlMode::Schedule);
                assert!(draft.quota.is_none());
                let windows = draft.schedules.unwrap();
                assert_eq!(windows.len(), 2);
                assert_eq!(windows[0].id.as_str(), "s1");
                assert_eq!(windows[0].start.to_string(), "18:30");
                assert_eq!(windows[1].days.indices(), vec![0, 6]);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn window_spec_errors() {
        let id = || WindowId::new("s1");
        assert!(parse_window("18:30-20:00", id()).is_err());
        assert!(parse_window("18:30@1", id()).is_err());
        assert!(parse_window("25:00-26:00@1", id()).is_err());
        assert!(parse_window("18:30-20:00@7", id()).is_err());
        assert!(parse_window("18:30-20:00@x", id()).is_err());
    }

    #[test]
    fn update_rejects_mismatched_id() {
        let cli = parse(&[
            "device", "update", "d1", "--mac", "AA:BB:CC:DD:EE:01", "--name", "TV", "--id", "d2",
        ]);
        assert!(cli.command.to_command().is_err());
    }

    #[test]
    fn platform_and_switch_commands() {
        let cli = parse(&[
            "platform", "add", "--id", "7", "--name", "Kuaishou", "--domain", "*.kuaishou.com",
            "--disabled",
        ]);
        match cli.command.to_command().unwrap() {
            Command::AddPlatform { platform } => {
                assert_eq!(platform.domains, vec!["*.kuaishou.com"]);
                assert!(!platform.enabled);
            }
            other => panic!("unexpected command: {:?}", other),
        }

        let cli = parse(&["enforcement", "off"]);
        assert!(matches!(
            cli.command.to_command().unwrap(),
            Command::SetEnforcementEnabled { enabled: false }
        ));

        let cli = parse(&["report-status", "aa:bb:cc:dd:ee:01", "blocked"]);
        assert!(matches!(
            cli.command.to_command().unwrap(),
            Command::ReportStatus {
                status: DeviceStatus::Blocked,
                ..
            }
        ));
    }

    #[test]
    fn decide_at_local_time() {
        let cli = parse(&["decide", "d1", "1", "--at", "2025-03-05 19:00", "-f", "json"]);
        assert_eq!(cli.format, OutputFormat::Json);
        match cli.command.to_command().unwrap() {
            Command::Decide { at_time, .. } => {
                assert_eq!(at_time.unwrap().format("%H:%M").to_string(), "19:00");
            }
            other => panic!("unexpected command: {:?}", other),
        }

        assert!(Cli::try_parse_from(["mybabyctl", "decide", "d1", "1", "--at", "tonight"]).is_err());
    }
}
