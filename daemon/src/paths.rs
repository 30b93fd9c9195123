/// Canonical file locations for the playtime daemon.
///
/// Everything lives under one application data directory:
///   - config.toml  Watched games and polling options.
///   - status.toml  Written by the daemon, read by external tools.
///   - data/        One JSON document per persisted key.
use std::path::{Path, PathBuf};

const APP_DIR_NAME: &str = "PlaytimeTracker";
pub const CONFIG_FILE_NAME: &str = "config.toml";
pub const STATUS_FILE_NAME: &str = "status.toml";
pub const STORE_DIR_NAME: &str = "data";

/// Returns the default application data directory, e.g.
/// `%APPDATA%\PlaytimeTracker` or `~/.local/share/PlaytimeTracker`.
pub fn default_app_dir() -> Option<PathBuf> {
    dirs::data_dir().map(|d| d.join(APP_DIR_NAME))
}

pub fn config_file_path(app_dir: &Path) -> PathBuf {
    app_dir.join(CONFIG_FILE_NAME)
}

pub fn status_file_path(app_dir: &Path) -> PathBuf {
    app_dir.join(STATUS_FILE_NAME)
}

pub fn store_dir(app_dir: &Path) -> PathBuf {
    app_dir.join(STORE_DIR_NAME)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_app_dir_ends_with_app_name() {
        if let Some(dir) = default_app_dir() {
            assert_eq!(dir.file_name().unwrap(), APP_DIR_NAME);
        }
    }

    #[test]
    fn files_share_the_app_dir() {
        let app = Path::new("/tmp/pt");
        assert_eq!(config_file_path(app).parent(), Some(app));
        assert_eq!(status_file_path(app).parent(), Some(app));
        assert_eq!(store_dir(app).parent(), Some(app));
    }

    #[test]
    fn file_names_are_fixed() {
        let app = Path::new("/tmp/pt");
        assert_eq!(config_file_path(app).file_name().unwrap(), CONFIG_FILE_NAME);
        assert_eq!(status_file_path(app).file_name().unwrap(), STATUS_FILE_NAME);
        assert_eq!(store_dir(app).file_name().unwrap(), STORE_DIR_NAME);
    }
}
