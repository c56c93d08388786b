use anyhow::{Context, Result};
use notify::{RecursiveMode, Watcher};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

use crate::event::DaemonEvent;
use crate::permission::{Capability, GrantTable, Thresholds};

pub const DEFAULT_OS_VERSION: u32 = 34;
pub const DEFAULT_BASE_CAPABILITY_THRESHOLD: u32 = 33;
pub const DEFAULT_CATEGORY_DECLARATION_THRESHOLD: u32 = 34;

/// Root configuration structure. Deserialized from `<data dir>/config.toml`.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub platform: PlatformConfig,
    #[serde(default)]
    pub permissions: PermissionsConfig,
    #[serde(default)]
    pub handlers: Vec<HandlerConfig>,
}

/// What the host OS reports about itself, and where its requirements kick in.
#[derive(Debug, Clone, Deserialize)]
pub struct PlatformConfig {
    #[serde(default = "default_os_version")]
    pub os_version: u32,
    /// At or above this generation the base indicator capability is mandatory.
    #[serde(default = "default_base_capability_threshold")]
    pub base_capability_threshold: u32,
    /// At or above this generation every presence must declare a work category.
    #[serde(default = "default_category_declaration_threshold")]
    pub category_declaration_threshold: u32,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            os_version: DEFAULT_OS_VERSION,
            base_capability_threshold: DEFAULT_BASE_CAPABILITY_THRESHOLD,
            category_declaration_threshold: DEFAULT_CATEGORY_DECLARATION_THRESHOLD,
        }
    }
}

/// Capabilities the OS has granted to this process.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct PermissionsConfig {
    #[serde(default)]
    pub granted: Vec<Capability>,
}

/// Maps a task name to the command that performs it.
#[derive(Debug, Clone, Deserialize)]
pub struct HandlerConfig {
    pub task_name: String,
    /// Program followed by its arguments.
    pub command: Vec<String>,
}

impl Config {
    pub fn thresholds(&self) -> Thresholds {
        Thresholds {
            base_capability: self.platform.base_capability_threshold,
            category_declaration: self.platform.category_declaration_threshold,
        }
    }

    pub fn grant_table(&self) -> GrantTable {
        GrantTable::new(self.platform.os_version, self.permissions.granted.iter().copied())
    }
}

/// Loads the config file at `path`, returning `Config::default()` if the file does not exist.
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load_or_default(path: &Path) -> Result<Config> {
    if !path.exists() {
        return Ok(Config::default());
    }
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Watches `path` and posts `ConfigReloaded` each time it is rewritten with a
/// parseable config. Parse failures keep the current config in force.
///
/// The parent directory is watched so replace-by-rename saves are seen too.
pub async fn watch_config(path: PathBuf, tx: mpsc::Sender<DaemonEvent>) {
    let Some(dir) = path.parent().map(Path::to_path_buf) else {
        error!(path = %path.display(), "config path has no parent directory; hot reload disabled");
        return;
    };

    let (fs_tx, mut fs_rx) = mpsc::channel::<notify::Event>(16);
    let watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
        if let Ok(event) = res {
            let _ = fs_tx.blocking_send(event);
        }
    });
    let mut watcher = match watcher {
        Ok(w) => w,
        Err(e) => {
            error!("Failed to create config watcher: {e}");
            return;
        }
    };
    if let Err(e) = watcher.watch(&dir, RecursiveMode::NonRecursive) {
        error!(dir = %dir.display(), "Failed to watch config directory: {e}");
        return;
    }
    debug!(path = %path.display(), "watching config");

    while let Some(event) = fs_rx.recv().await {
        if !rewrites(&event, &path) {
            continue;
        }
        let config = match load_or_default(&path) {
            Ok(config) => config,
            Err(e) => {
                warn!("Keeping previous config: {e:#}");
                continue;
            }
        };
        if tx.send(DaemonEvent::ConfigReloaded(config)).await.is_err() {
            break;
        }
    }
}

/// True when `event` creates or modifies the file at `path`.
fn rewrites(event: &notify::Event, path: &Path) -> bool {
    let is_write = matches!(
        event.kind,
        notify::EventKind::Create(_) | notify::EventKind::Modify(_)
    );
    is_write && event.paths.iter().any(|p| p == path)
}

fn default_os_version() -> u32 {
    DEFAULT_OS_VERSION
}

fn default_base_capability_threshold() -> u32 {
    DEFAULT_BASE_CAPABILITY_THRESHOLD
}

fn default_category_declaration_threshold() -> u32 {
    DEFAULT_CATEGORY_DECLARATION_THRESHOLD
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::permission::CapabilitySource;

    // ── defaults ──────────────────────────────────────────────────────────────

    #[test]
    fn platform_config_default_values() {
        let p = PlatformConfig::default();
        assert_eq!(p.os_version, DEFAULT_OS_VERSION);
        assert_eq!(p.base_capability_threshold, DEFAULT_BASE_CAPABILITY_THRESHOLD);
        assert_eq!(p.category_declaration_threshold, DEFAULT_CATEGORY_DECLARATION_THRESHOLD);
    }

    #[test]
    fn config_default_grants_nothing() {
        let c = Config::default();
        assert!(c.permissions.granted.is_empty());
        assert!(c.handlers.is_empty());
        assert!(!c.grant_table().is_granted(Capability::PostIndicator));
    }

    // ── load_or_default ───────────────────────────────────────────────────────

    #[test]
    fn load_or_default_missing_file_returns_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nonexistent.toml");
        let config = load_or_default(&path).unwrap();
        assert_eq!(config.platform.os_version, DEFAULT_OS_VERSION);
        assert!(config.handlers.is_empty());
    }

    #[test]
    fn load_or_default_parses_valid_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[platform]
os_version = 35
base_capability_threshold = 30
category_declaration_threshold = 31

[permissions]
granted = ["post_indicator", "location_work"]

[[handlers]]
task_name = "sync"
command = ["/usr/bin/rsync", "-a", "src", "dst"]
"#,
        )
        .unwrap();

        let config = load_or_default(&path).unwrap();
        assert_eq!(config.platform.os_version, 35);
        assert_eq!(
            config.thresholds(),
            Thresholds { base_capability: 30, category_declaration: 31 }
        );
        let grants = config.grant_table();
        assert_eq!(grants.os_version(), 35);
        assert!(grants.is_granted(Capability::PostIndicator));
        assert!(grants.is_granted(Capability::LocationWork));
        assert!(!grants.is_granted(Capability::MediaPlaybackWork));
        assert_eq!(config.handlers.len(), 1);
        assert_eq!(config.handlers[0].task_name, "sync");
        assert_eq!(config.handlers[0].command[0], "/usr/bin/rsync");
    }

    #[test]
    fn load_or_default_partial_toml_uses_field_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        // Only override one field; the rest should get their defaults.
        std::fs::write(&path, "[platform]\nos_version = 29\n").unwrap();

        let config = load_or_default(&path).unwrap();
        assert_eq!(config.platform.os_version, 29);
        assert_eq!(config.platform.base_capability_threshold, DEFAULT_BASE_CAPABILITY_THRESHOLD);
        assert!(config.permissions.granted.is_empty());
    }

    #[test]
    fn load_or_default_invalid_toml_returns_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "this is not valid toml ][[[").unwrap();
        assert!(load_or_default(&path).is_err());
    }

    #[test]
    fn load_or_default_unknown_capability_returns_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[permissions]\ngranted = [\"camera\"]\n").unwrap();
        assert!(load_or_default(&path).is_err());
    }

    // ── watcher filtering ─────────────────────────────────────────────────────

    #[test]
    fn rewrites_matches_create_and_modify_of_config_only() {
        use notify::event::{CreateKind, ModifyKind, RemoveKind};
        use notify::{Event, EventKind};

        let path = PathBuf::from("/data/config.toml");
        let created = Event::new(EventKind::Create(CreateKind::File)).add_path(path.clone());
        let modified = Event::new(EventKind::Modify(ModifyKind::Any)).add_path(path.clone());
        let removed = Event::new(EventKind::Remove(RemoveKind::File)).add_path(path.clone());
        let sibling = Event::new(EventKind::Modify(ModifyKind::Any))
            .add_path(PathBuf::from("/data/status.toml"));

        assert!(rewrites(&created, &path));
        assert!(rewrites(&modified, &path));
        assert!(!rewrites(&removed, &path));
        assert!(!rewrites(&sibling, &path));
    }
}
