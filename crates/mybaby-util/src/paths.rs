//! Default paths for mybabyd components
//!
//! - Socket: `$XDG_RUNTIME_DIR/mybaby/mybabyd.sock` or `/tmp/mybaby-$USER/mybabyd.sock`
//! - Data: `$XDG_DATA_HOME/mybaby` or `~/.local/share/mybaby`
//! - Config: `$XDG_CONFIG_HOME/mybaby/config.toml` or `~/.config/mybaby/config.toml`

use std::path::PathBuf;

/// Environment variable for overriding the socket path
pub const MYBABY_SOCKET_ENV: &str = "MYBABY_SOCKET";

/// Environment variable for overriding the data directory
pub const MYBABY_DATA_DIR_ENV: &str = "MYBABY_DATA_DIR";

/// Environment variable for overriding the config file
pub const MYBABY_CONFIG_ENV: &str = "MYBABY_CONFIG";

const SOCKET_FILENAME: &str = "mybabyd.sock";
const CONFIG_FILENAME: &str = "config.toml";
const APP_DIR: &str = "mybaby";

/// Get the default socket path.
///
/// Order of precedence:
/// 1. `$MYBABY_SOCKET`
/// 2. `$XDG_RUNTIME_DIR/mybaby/mybabyd.sock`
/// 3. `/tmp/mybaby-$USER/mybabyd.sock`
pub fn default_socket_path() -> PathBuf {
    if let Ok(path) = std::env::var(MYBABY_SOCKET_ENV) {
        return PathBuf::from(path);
    }

    socket_path_without_env()
}

/// Get the socket path without checking `MYBABY_SOCKET`.
/// Used for config defaults where the env var is checked separately (by clap).
pub fn socket_path_without_env() -> PathBuf {
    if let Ok(runtime_dir) = std::env::var("XDG_RUNTIME_DIR") {
        return PathBuf::from(runtime_dir).join(APP_DIR).join(SOCKET_FILENAME);
    }

    let username = std::env::var("USER").unwrap_or_else(|_| "unknown".to_string());
    PathBuf::from(format!("/tmp/{}-{}", APP_DIR, username)).join(SOCKET_FILENAME)
}

/// Get the default data directory.
///
/// Order of precedence:
/// 1. `$MYBABY_DATA_DIR`
/// 2. `$XDG_DATA_HOME/mybaby`
/// 3. `~/.local/share/mybaby`
pub fn default_data_dir() -> PathBuf {
    if let Ok(path) = std::env::var(MYBABY_DATA_DIR_ENV) {
        return PathBuf::from(path);
    }

    data_dir_without_env()
}

/// Get the data directory without checking `MYBABY_DATA_DIR`.
pub fn data_dir_without_env() -> PathBuf {
    if let Ok(data_home) = std::env::var("XDG_DATA_HOME") {
        return PathBuf::from(data_home).join(APP_DIR);
    }

    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".local").join("share").join(APP_DIR);
    }

    PathBuf::from("/tmp").join(APP_DIR).join("data")
}

/// Get the default configuration file path.
///
/// Order of precedence:
/// 1. `$MYBABY_CONFIG`
/// 2. `$XDG_CONFIG_HOME/mybaby/config.toml`
/// 3. `~/.config/mybaby/config.toml`
pub fn default_config_path() -> PathBuf {
    if let Ok(path) = std::env::var(MYBABY_CONFIG_ENV) {
        return PathBuf::from(path);
    }

    if let Ok(config_home) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(config_home).join(APP_DIR).join(CONFIG_FILENAME);
    }

    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".config").join(APP_DIR).join(CONFIG_FILENAME);
    }

    PathBuf::from("/etc").join(APP_DIR).join(CONFIG_FILENAME)
}
