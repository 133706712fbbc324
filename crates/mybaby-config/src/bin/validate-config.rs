//! Config validation CLI tool
//!
//! Validates a mybabyd configuration file and reports any errors.

use mybaby_api::DeviceDraft;
use mybaby_util::default_config_path;
use std::path::PathBuf;
use std::process::ExitCode;

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();

    let config_path = match args.get(1) {
        Some(path) => PathBuf::from(path),
        None => {
            let default_path = default_config_path();
            eprintln!("Usage: validate-config [config-file]");
            eprintln!();
            eprintln!("Validates a mybabyd configuration file.");
            eprintln!();
            eprintln!("If no path is provided, uses: {}", default_path.display());
            eprintln!();
            eprintln!("Example:");
            eprintln!("  validate-config {}", default_path.display());
            eprintln!("  validate-config config.example.toml");
            return ExitCode::from(2);
        }
    };

    if !config_path.exists() {
        eprintln!("Error: Configuration file not found: {}", config_path.display());
        return ExitCode::from(1);
    }

    match mybaby_config::load_config(&config_path) {
        Ok(policy) => {
            println!("✓ Configuration is valid");
            println!();
            println!("Summary:");
            println!("  Config version: {}", mybaby_config::CURRENT_CONFIG_VERSION);
            println!("  Platforms: {}", policy.platforms.len());
            println!("  Devices: {}", policy.devices.len());
            println!(
                "  Presets: {} by MAC, {} by OUI",
                policy.presets.by_mac.len(),
                policy.presets.by_oui.len()
            );

            if !policy.platforms.is_empty() {
                println!();
                println!("Platforms:");
                for platform in &policy.platforms {
                    let state = if platform.enabled { "enabled" } else { "disabled" };
                    println!(
                        "  - {} [{}]: {} ({} domains)",
                        platform.id,
                        state,
                        platform.name,
                        platform.domains.len()
                    );
                }
            }

            if !policy.devices.is_empty() {
                println!();
                println!("Devices:");
                for device in &policy.devices {
                    println!("  - {} [{}]: {}", device.mac, describe_control(device), device.name);
                }
            }

            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("✗ Configuration validation failed");
            eprintln!();
            match &e {
                mybaby_config::ConfigError::ReadError(io_err) => {
                    eprintln!("Failed to read file: {}", io_err);
                }
                mybaby_config::ConfigError::ParseError(parse_err) => {
                    eprintln!("TOML parse error:");
                    eprintln!("  {}", parse_err);
                }
                mybaby_config::ConfigError::ValidationFailed { errors } => {
                    eprintln!("Validation errors ({}):", errors.len());
                    for err in errors {
                        eprintln!("  - {}", err);
                    }
                }
                mybaby_config::ConfigError::UnsupportedVersion(ver) => {
                    eprintln!(
                        "Unsupported config version: {} (expected {})",
                        ver,
                        mybaby_config::CURRENT_CONFIG_VERSION
                    );
                }
            }
            ExitCode::from(1)
        }
    }
}

fn describe_control(device: &DeviceDraft) -> String {
    match (&device.quota, &device.schedules) {
        (Some(quota), _) => format!(
            "quota {}m/{}m",
            quota.weekday_limit_minutes, quota.weekend_limit_minutes
        ),
        (None, Some(windows)) => format!("schedule, {} windows", windows.len()),
        (None, None) => device.mode.to_string(),
    }
}
