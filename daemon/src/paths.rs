/// Canonical file paths for presence-daemon data files.
///
/// All files live under the data directory:
///   - config.toml     Written by the user, read by the daemon.
///   - status.toml     Written by the daemon, read by anything watching it.
///   - indicator.toml  The published presence indicator, present only while
///                     a presence is live.
use std::path::PathBuf;

pub const HOME_ENV: &str = "PRESENCE_HOME";
const APP_DIR_NAME: &str = ".presence";
pub const CONFIG_FILE_NAME: &str = "config.toml";
pub const STATUS_FILE_NAME: &str = "status.toml";
pub const INDICATOR_FILE_NAME: &str = "indicator.toml";

/// Returns the data directory: `$PRESENCE_HOME`, else `$HOME/.presence`, else
/// `presence` under the system temp directory.
pub fn app_data_dir() -> PathBuf {
    if let Some(dir) = std::env::var_os(HOME_ENV) {
        return PathBuf::from(dir);
    }
    match std::env::var_os("HOME") {
        Some(home) => PathBuf::from(home).join(APP_DIR_NAME),
        None => std::env::temp_dir().join("presence"),
    }
}

pub fn config_file_path() -> PathBuf {
    app_data_dir().join(CONFIG_FILE_NAME)
}

pub fn status_file_path() -> PathBuf {
    app_data_dir().join(STATUS_FILE_NAME)
}

pub fn indicator_file_path() -> PathBuf {
    app_data_dir().join(INDICATOR_FILE_NAME)
}
