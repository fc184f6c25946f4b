//! Platform directories for settings, the saved queue and the song cache.
//!
//! | what            | base (`dirs`)      | Linux example                                   |
//! |-----------------|--------------------|-------------------------------------------------|
//! | `settings.toml` | `config_dir`       | `~/.config/karaoke-session/settings.toml`       |
//! | `session.json`  | `config_dir`       | `~/.config/karaoke-session/session.json`        |
//! | song cache      | `data_local_dir`   | `~/.local/share/karaoke-session/karaoke_data/`  |
//!
//! A platform without a standard location falls back to the working directory.

use std::path::{Path, PathBuf};

const APP_DIR: &str = "karaoke-session";
const CACHE_DIR: &str = "karaoke_data";

#[derive(Debug, Clone, PartialEq)]
pub struct AppPaths {
    /// Holds `settings.toml` and `session.json`.
    pub config_dir: PathBuf,
    pub settings_file: PathBuf,
    /// Saved queue and play history.
    pub session_file: PathBuf,
    /// Default root of the prepared-song cache.
    pub cache_dir: PathBuf,
}

impl AppPaths {
    pub fn new() -> Self {
        let here = || PathBuf::from(".");
        Self::with_roots(
            &dirs::config_dir().unwrap_or_else(here),
            &dirs::data_local_dir().unwrap_or_else(here),
        )
    }

    /// Lay the application out under explicit base directories.
    pub fn with_roots(config_base: &Path, data_base: &Path) -> Self {
        let config_dir = config_base.join(APP_DIR);
        Self {
            settings_file: config_dir.join("settings.toml"),
            session_file: config_dir.join("session.json"),
            cache_dir: data_base.join(APP_DIR).join(CACHE_DIR),
            config_dir,
        }
    }
}

impl Default for AppPaths {
    fn default() -> Self {
        Self::new()
    }
}
