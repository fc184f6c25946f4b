//! Application settings structs, defaults and TOML persistence.
//!
//! All structs implement `Serialize`, `Deserialize`, `Default` and `Clone`
//! so they can be round-tripped through TOML files.  Every section is
//! `#[serde(default)]`, so a settings file only needs the keys it changes.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::collab::{
    CommandDownloader, CommandResolver, CommandSeparator, CommandSpec, CommandTranscriber,
    CommandVideoFetcher, ProcessTransportFactory,
};

use super::AppPaths;

/// Bounds for the playback tick.
const MIN_TICK_MS: u64 = 10;
const MAX_TICK_MS: u64 = 100;

// ---------------------------------------------------------------------------
// CacheConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Cache root; `None` means the platform data directory.
    pub root_dir: Option<PathBuf>,
}

impl CacheConfig {
    pub fn resolved_root(&self) -> PathBuf {
        self.root_dir
            .clone()
            .unwrap_or_else(|| AppPaths::new().cache_dir)
    }
}

// ---------------------------------------------------------------------------
// PipelineConfig
// ---------------------------------------------------------------------------

/// External tools used to prepare a song.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Also download a video track for each song.
    pub fetch_video: bool,
    /// Demucs model name, substituted for `{model}`.
    pub separation_model: String,
    /// Results requested from the resolver per search.
    pub search_limit: usize,
    pub download: CommandSpec,
    pub separate: CommandSpec,
    pub transcribe: CommandSpec,
    pub video: CommandSpec,
    pub search: CommandSpec,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            fetch_video: false,
            separation_model: CommandSeparator::default_model().into(),
            search_limit: 5,
            download: CommandDownloader::default_command(),
            separate: CommandSeparator::default_command(),
            transcribe: CommandTranscriber::default_command(),
            video: CommandVideoFetcher::default_command(),
            search: CommandResolver::default_command(),
        }
    }
}

// ---------------------------------------------------------------------------
// PlaybackConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Lyric sync / completion poll period in milliseconds (10 – 100).
    pub tick_ms: u64,
    /// Start with the guide vocals audible.
    pub vocals_enabled: bool,
    pub audio_player: CommandSpec,
    pub video_player: CommandSpec,
}

impl PlaybackConfig {
    /// `tick_ms` clamped to the supported range.
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_ms.clamp(MIN_TICK_MS, MAX_TICK_MS))
    }
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            tick_ms: 50,
            vocals_enabled: false,
            audio_player: ProcessTransportFactory::default_audio_command(),
            video_player: ProcessTransportFactory::default_video_command(),
        }
    }
}

// ---------------------------------------------------------------------------
// SessionConfig / RemoteConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Where the queue is saved; `None` means `session.json` in the config dir.
    pub state_file: Option<PathBuf>,
    /// Submitter name for songs queued from the local console.
    pub default_submitter: String,
}

impl SessionConfig {
    pub fn resolved_state_file(&self) -> PathBuf {
        self.state_file
            .clone()
            .unwrap_or_else(|| AppPaths::new().session_file)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            state_file: None,
            default_submitter: "console".into(),
        }
    }
}

/// Line-oriented TCP control interface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    pub enabled: bool,
    pub bind_addr: String,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bind_addr: "127.0.0.1:5005".into(),
        }
    }
}

// ---------------------------------------------------------------------------
// AppConfig  (top-level)
// ---------------------------------------------------------------------------

/// Top-level application configuration, serialised as `settings.toml`.
///
/// ```rust,no_run
/// use karaoke_session::config::AppConfig;
///
/// // Load (returns Default when file is missing)
/// let config = AppConfig::load().unwrap();
/// assert!(config.playback.tick_interval().as_millis() <= 100);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub cache: CacheConfig,
    pub pipeline: PipelineConfig,
    pub playback: PlaybackConfig,
    pub session: SessionConfig,
    pub remote: RemoteConfig,
}

impl AppConfig {
    /// Load configuration from the platform-appropriate `settings.toml`.
    ///
    /// Returns `Ok(AppConfig::default())` when the file does not exist yet.
    pub fn load() -> Result<Self> {
        Self::load_from(&AppPaths::new().settings_file)
    }

    /// Load from an explicit path (useful for tests).
    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to the platform-appropriate `settings.toml`,
    /// creating parent directories as needed.
    pub fn save(&self) -> Result<()> {
        self.save_to(&AppPaths::new().settings_file)
    }

    /// Save to an explicit path (useful for tests).
    pub fn save_to(&self, path: &std::path::Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn round_trip_toml() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("settings.toml");

        let mut original = AppConfig::default();
        original.pipeline.fetch_video = true;
        original.remote.enabled = true;
        original.cache.root_dir = Some(dir.path().join("cache"));
        original.save_to(&path).expect("save");

        let loaded = AppConfig::load_from(&path).expect("load");
        assert_eq!(original, loaded);
    }

    /// `load_from` on a non-existent path must return `Default` without error.
    #[test]
    fn load_missing_returns_default() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("nonexistent.toml");

        let config = AppConfig::load_from(&path).expect("should not error");
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("settings.toml");
        std::fs::write(
            &path,
            "[playback]\ntick_ms = 20\n\n[pipeline.download]\nprogram = \"my-dl\"\nargs = [\"{source}\"]\n",
        )
        .unwrap();

        let config = AppConfig::load_from(&path).expect("load");
        assert_eq!(config.playback.tick_ms, 20);
        assert!(!config.playback.vocals_enabled);
        assert_eq!(config.pipeline.download.program, "my-dl");
        assert_eq!(config.pipeline.separate, CommandSeparator::default_command());
        assert_eq!(config.remote.bind_addr, "127.0.0.1:5005");
    }

    #[test]
    fn tick_interval_is_clamped() {
        let mut playback = PlaybackConfig::default();
        assert_eq!(playback.tick_interval(), Duration::from_millis(50));
        playback.tick_ms = 1_000;
        assert_eq!(playback.tick_interval(), Duration::from_millis(100));
        playback.tick_ms = 0;
        assert_eq!(playback.tick_interval(), Duration::from_millis(10));
    }

    #[test]
    fn invalid_toml_is_an_error() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("settings.toml");
        std::fs::write(&path, "tick_ms = [").unwrap();
        assert!(AppConfig::load_from(&path).is_err());
    }
}
