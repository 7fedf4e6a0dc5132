//! XDG Base Directory paths for skillmark.
//!
//! The operator CLI keeps its layered config and its default store snapshot
//! under XDG paths on every platform, the same way tools like gh and kubectl do.

use std::path::PathBuf;

/// Directory name appended to every XDG base.
const APP_DIR: &str = "skillmark";

/// File name of the default JSON store snapshot inside the data directory.
pub const SNAPSHOT_FILE: &str = "store.json";

/// Resolve `$<var>/skillmark`, falling back to `~/<home_fallback>/skillmark`.
fn xdg_dir(var: &str, home_fallback: &str) -> PathBuf {
    match std::env::var(var) {
        Ok(base) if !base.trim().is_empty() => PathBuf::from(base).join(APP_DIR),
        _ => dirs::home_dir()
            .map(|home| home.join(home_fallback))
            .unwrap_or_else(|| PathBuf::from(home_fallback))
            .join(APP_DIR),
    }
}

/// Get the skillmark config directory.
///
/// Returns `$XDG_CONFIG_HOME/skillmark` if set, otherwise `~/.config/skillmark`.
///
/// # Examples
///
/// ```
/// use skillmark_paths::config_dir;
///
/// let user_config = config_dir().join("config.toml");
/// assert!(user_config.ends_with("skillmark/config.toml"));
/// ```
pub fn config_dir() -> PathBuf {
    xdg_dir("XDG_CONFIG_HOME", ".config")
}

/// Get the skillmark data directory.
///
/// Returns `$XDG_DATA_HOME/skillmark` if set, otherwise `~/.local/share/skillmark`.
pub fn data_dir() -> PathBuf {
    xdg_dir("XDG_DATA_HOME", ".local/share")
}

/// Default location of the store snapshot used by the CLI.
pub fn snapshot_path() -> PathBuf {
    data_dir().join(SNAPSHOT_FILE)
}
