use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::warn;

/// Current operational state of the daemon.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
#[serde(rename_all = "lowercase")]
pub enum DaemonState {
    /// No watched game is running.
    Idle,
    /// At least one watched game is running and its session is open.
    Tracking,
}

/// Runtime status written by the daemon to `<data dir>/status.toml`.
/// External tools read this file to display what is being tracked.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DaemonStatus {
    /// Daemon binary version (set from Cargo.toml at compile time).
    pub version: String,
    pub state: DaemonState,
    /// Display names of the games with an open session, sorted.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub running_games: Vec<String>,
    /// Display name of the game whose session closed most recently.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_closed_game: Option<String>,
    /// RFC 3339 timestamp of that close.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_closed_at: Option<String>,
    /// Human-readable error message if the daemon encountered a non-fatal error.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DaemonStatus {
    /// Constructs the initial idle status on daemon startup.
    pub fn new() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            state: DaemonState::Idle,
            running_games: Vec::new(),
            last_closed_game: None,
            last_closed_at: None,
            error: None,
        }
    }

    /// Replaces the running set and derives the state from it.
    pub fn set_running(&mut self, mut games: Vec<String>) {
        games.sort();
        self.state = if games.is_empty() {
            DaemonState::Idle
        } else {
            DaemonState::Tracking
        };
        self.running_games = games;
    }
}

/// Serializes `status` to TOML and writes it to `path`.
/// Creates the parent directory if it does not exist.
/// Failures are logged and never crash the daemon.
pub fn write_status(path: &Path, status: &DaemonStatus) {
    if let Some(parent) = path.parent() {
        if let Err(e) = std::fs::create_dir_all(parent) {
            warn!("Failed to create directory {}: {e}", parent.display());
            return;
        }
    }
    match toml::to_string_pretty(status) {
        Ok(content) => {
            if let Err(e) = std::fs::write(path, content) {
                warn!("Failed to write status file: {e}");
            }
        }
        Err(e) => warn!("Failed to serialize status: {e}"),
    }
}
