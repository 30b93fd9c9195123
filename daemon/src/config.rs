use anyhow::{Context, Result};
use notify::{Config as NotifyConfig, RecommendedWatcher, RecursiveMode, Watcher};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::event::DaemonEvent;

pub const MIN_POLL_INTERVAL_SECS: u64 = 1;
pub const MAX_POLL_INTERVAL_SECS: u64 = 60;
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 2;

/// Root configuration structure. Deserialized from `<data dir>/config.toml`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub global: GlobalConfig,
    #[serde(default)]
    pub applications: Vec<ApplicationConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GlobalConfig {
    /// Seconds between process list scans. Clamped to [1, 60].
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
        }
    }
}

impl GlobalConfig {
    pub fn effective_poll_interval(&self) -> u64 {
        self.poll_interval_secs
            .clamp(MIN_POLL_INTERVAL_SECS, MAX_POLL_INTERVAL_SECS)
    }
}

/// A game whose playtime is tracked.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct ApplicationConfig {
    /// Name shown in summaries and the settings list.
    pub display_name: String,
    /// Executable file name (e.g. "RocketLeague.exe"). Matched
    /// case-insensitively and used as the ledger id.
    pub executable_name: String,
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

/// Creates a watcher on the parent directory of `path`. Filesystem events are
/// forwarded into the returned channel; feed both into [`watch_config`].
pub fn create_watcher(
    path: &Path,
) -> Result<(RecommendedWatcher, mpsc::Receiver<notify::Event>)> {
    let (watch_tx, watch_rx) = mpsc::channel::<notify::Event>(16);

    let mut watcher = RecommendedWatcher::new(
        move |res: notify::Result<notify::Event>| {
            if let Ok(event) = res {
                let _ = watch_tx.blocking_send(event);
            }
        },
        NotifyConfig::default(),
    )
    .context("Failed to create file watcher")?;

    // Watch the parent directory rather than the file directly so we catch
    // editor-style atomic saves (write-new + rename).
    let watch_dir = path
        .parent()
        .context("Config path has no parent directory")?;
    watcher
        .watch(watch_dir, RecursiveMode::NonRecursive)
        .with_context(|| format!("Failed to watch {}", watch_dir.display()))?;

    Ok((watcher, watch_rx))
}

/// Reloads the config whenever `path` is created or modified and sends a
/// `ConfigReloaded` event. A file that fails to parse is skipped and the
/// previous config stays in effect.
pub async fn watch_config(
    path: PathBuf,
    watcher: RecommendedWatcher,
    mut watch_rx: mpsc::Receiver<notify::Event>,
    tx: mpsc::Sender<DaemonEvent>,
) {
    // Dropping the watcher stops event delivery.
    let _watcher = watcher;

    while let Some(event) = watch_rx.recv().await {
        // Only the parent directory is watched, so the file name identifies the config.
        let affects_config = event
            .paths
            .iter()
            .any(|p| p.file_name() == path.file_name());
        let is_write = matches!(
            event.kind,
            notify::EventKind::Create(_) | notify::EventKind::Modify(_)
        );

        if !(affects_config && is_write) {
            continue;
        }

        match load_or_default(&path) {
            Ok(config) => {
                info!(
                    applications = config.applications.len(),
                    "Config file changed"
                );
                if tx.send(DaemonEvent::ConfigReloaded(config)).await.is_err() {
                    break;
                }
            }
            Err(e) => warn!("Failed to reload config: {e:#}"),
        }
    }
    debug!("Config watcher stopped");
}

fn default_poll_interval() -> u64 {
    DEFAULT_POLL_INTERVAL_SECS
}
