//! Playback synchronization: multi-track transport control and lyric display.
//!
//! # Architecture
//!
//! ```text
//! SessionController ──load/pause/resume/skip/tick──▶ PlaybackEngine
//!                                                      │
//!                         TransportFactory::open ◀─────┤  instrumental (required)
//!                                                      │  vocals (muted unless enabled)
//!                                                      │  video (optional, clock source)
//!                                                      │
//!                         LyricCursor::advance ◀───────┘
//!                                                      │
//! SessionController ◀──── PlaybackEvent (mpsc) ────────┘
//! ```

pub mod cursor;
pub mod engine;
pub mod state;

pub use cursor::LyricCursor;
pub use engine::{PlaybackEngine, PlaybackError};
pub use state::{CompletionReason, LyricDisplay, PlaybackEvent, PlaybackState};
