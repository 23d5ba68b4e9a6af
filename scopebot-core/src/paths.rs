// ABOUTME: XDG Base Directory paths for config, data and logs
// ABOUTME: Falls back to local directories when no home directory is available

use directories::ProjectDirs;
use std::path::PathBuf;

const QUALIFIER: &str = "org";
const ORGANIZATION: &str = "scopebot";
const APPLICATION: &str = "scopebot";

pub fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from(QUALIFIER, ORGANIZATION, APPLICATION)
}

/// Data directory (e.g., ~/.local/share/scopebot/), `./data` as fallback
pub fn data_dir() -> PathBuf {
    project_dirs()
        .map(|p| p.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("./data"))
}

pub fn log_dir() -> PathBuf {
    data_dir().join("logs")
}

/// Default location of the scope database
pub fn database_file() -> PathBuf {
    data_dir().join("scopebot.db")
}

/// Config directory (e.g., ~/.config/scopebot/), current directory as fallback
pub fn config_dir() -> PathBuf {
    project_dirs()
        .map(|p| p.config_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."))
}

pub fn config_file() -> PathBuf {
    config_dir().join("config.toml")
}
