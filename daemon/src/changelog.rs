/// Tracks whether the changelog for the running version has been shown.
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::persistence::{KeyValueStore, CURRENT_VERSION_INFO_KEY};

pub struct ChangelogEntry {
    pub title: &'static str,
    /// "added", "improved" or "fixed".
    pub kind: &'static str,
    pub items: &'static [&'static str],
}

pub const CHANGELOG: &[ChangelogEntry] = &[ChangelogEntry {
    title: "0.1.0",
    kind: "added",
    items: &["Initial release"],
}];

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentVersionInfo {
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub has_shown_changelog: bool,
}

/// True when the changelog has not yet been shown for `version`.
/// A missing or malformed record counts as "not shown".
pub fn changelog_pending(store: &dyn KeyValueStore, version: &str) -> bool {
    let info: CurrentVersionInfo = store
        .load(CURRENT_VERSION_INFO_KEY)
        .ok()
        .flatten()
        .and_then(|v| serde_json::from_value(v).ok())
        .unwrap_or_default();
    !info.has_shown_changelog || info.version != version
}

pub fn mark_changelog_shown(store: &dyn KeyValueStore, version: &str) {
    let info = CurrentVersionInfo {
        version: version.to_string(),
        has_shown_changelog: true,
    };
    let value = match serde_json::to_value(&info) {
        Ok(v) => v,
        Err(e) => {
            warn!("Failed to encode version info: {e}");
            return;
        }
    };
    if let Err(e) = store.save(CURRENT_VERSION_INFO_KEY, &value) {
        warn!("Failed to persist version info: {e}");
    }
}

/// Logs the changelog once per version and records that it was shown.
/// Returns whether anything was shown.
pub fn show_changelog_if_needed(store: &dyn KeyValueStore, version: &str) -> bool {
    if !changelog_pending(store, version) {
        return false;
    }
    for entry in CHANGELOG {
        for item in entry.items {
            info!(version = entry.title, kind = entry.kind, "{item}");
        }
    }
    mark_changelog_shown(store, version);
    true
}
