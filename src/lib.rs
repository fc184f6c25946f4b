//! Karaoke session engine.
//!
//! Songs are queued by several submitters, rotated fairly, prepared in the
//! background (download, vocal separation, lyric transcription, optional
//! video) into a per-song cache, and played back with time-synced lyrics.
//!
//! ```text
//! console / remote ──▶ session::SessionHandle
//!                              │
//!                              ▼
//!                     session::SessionController
//!                      ├─ queue::QueueScheduler ── rotation
//!                      ├─ pipeline::PreparationPipeline ── collab::* + cache::CacheStore
//!                      └─ playback::PlaybackEngine ── collab::Transport
//! ```

pub mod cache;
pub mod collab;
pub mod config;
pub mod pipeline;
pub mod playback;
pub mod queue;
pub mod remote;
pub mod session;
pub mod song;
