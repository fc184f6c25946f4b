//! Playback states, lyric display frames and engine events.

use std::fmt;
use std::time::Duration;

use serde::Serialize;

use crate::song::{LyricLine, SongIdentity};

// ---------------------------------------------------------------------------
// PlaybackState
// ---------------------------------------------------------------------------

/// Engine state machine.
///
/// ```text
/// Idle ─load─▶ Loading ─▶ Playing ⇄ Paused
///                            │         │
///                 finish/skip▼   skip  ▼
///                         Completed ◀──┘ ─load─▶ Loading …
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackState {
    #[default]
    Idle,
    Loading,
    Playing,
    Paused,
    Completed,
}

impl PlaybackState {
    pub fn label(self) -> &'static str {
        match self {
            PlaybackState::Idle => "idle",
            PlaybackState::Loading => "loading",
            PlaybackState::Playing => "playing",
            PlaybackState::Paused => "paused",
            PlaybackState::Completed => "completed",
        }
    }
}

impl fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Why a song left the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionReason {
    /// Every track played out.
    Finished,
    Skipped,
    /// The instrumental track could not be started.
    TransportFailed,
}

// ---------------------------------------------------------------------------
// LyricDisplay
// ---------------------------------------------------------------------------

/// One lyric transition for a double-buffered caption view.
///
/// `buffer` alternates between 0 and 1 with every line, so a front end can
/// render `up_next` into the hidden buffer ahead of time and swap it in
/// when the next frame arrives.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LyricDisplay {
    /// Index of `now_showing` in the timeline.
    pub index: usize,
    pub now_showing: LyricLine,
    pub up_next: Option<LyricLine>,
    pub buffer: usize,
}

// ---------------------------------------------------------------------------
// PlaybackEvent
// ---------------------------------------------------------------------------

/// Everything the engine reports.  The set is closed.
#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackEvent {
    Started {
        identity: SongIdentity,
        has_vocals: bool,
        has_video: bool,
    },
    /// Elapsed time heartbeat, carrying a lyric transition when one happened.
    Progress {
        identity: SongIdentity,
        elapsed: Duration,
        lyric: Option<LyricDisplay>,
    },
    Completed {
        identity: SongIdentity,
        reason: CompletionReason,
    },
    Error {
        identity: SongIdentity,
        message: String,
    },
}
