//! Configuration module for the karaoke session engine.
//!
//! Provides `AppConfig` (top-level settings), one sub-config per subsystem,
//! `AppPaths` for cross-platform directories, and TOML persistence via
//! `AppConfig::load` / `AppConfig::save`.

pub mod paths;
pub mod settings;

pub use paths::AppPaths;
pub use settings::{
    AppConfig, CacheConfig, PipelineConfig, PlaybackConfig, RemoteConfig, SessionConfig,
};
