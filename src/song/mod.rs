//! Song data model shared by every part of the session engine.
//!
//! * [`SongIdentity`]: normalized (artist, title) cache key.
//! * [`SongRequest`]: what a submitter queued.
//! * [`PreparedSong`]: separated tracks plus lyric timeline, ready to play.
//! * [`LyricTimeline`] / [`LyricLine`]: time-aligned captions.
//! * [`SearchResult`]: one hit returned by a resolver.

pub mod identity;
pub mod lyrics;

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

pub use identity::{sanitize_key, SongIdentity};
pub use lyrics::{format_timestamp, LyricLine, LyricTimeline};

// ---------------------------------------------------------------------------
// SongRequest
// ---------------------------------------------------------------------------

/// A song queued by a submitter.  Never mutated once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SongRequest {
    pub identity: SongIdentity,
    /// Where the media comes from (typically a playback URL).
    pub source: String,
    pub submitter: String,
}

impl SongRequest {
    pub fn new(
        artist: &str,
        title: &str,
        source: impl Into<String>,
        submitter: impl Into<String>,
    ) -> Self {
        Self {
            identity: SongIdentity::new(artist, title),
            source: source.into(),
            submitter: submitter.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// PreparedSong
// ---------------------------------------------------------------------------

/// Playback-ready bundle for one identity.
///
/// Vocals and video are optional: a song always has an instrumental track,
/// and an empty [`LyricTimeline`] simply means no captions.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedSong {
    pub identity: SongIdentity,
    pub instrumental: PathBuf,
    pub vocals: Option<PathBuf>,
    pub video: Option<PathBuf>,
    pub timeline: LyricTimeline,
    pub source: String,
}

// ---------------------------------------------------------------------------
// SearchResult
// ---------------------------------------------------------------------------

/// One candidate returned by a [`Resolver`](crate::collab::Resolver).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub title: String,
    pub artist: String,
    pub duration_secs: Option<f64>,
    pub source: String,
}

impl SearchResult {
    /// Turn this hit into a queue request for `submitter`.
    pub fn into_request(self, submitter: impl Into<String>) -> SongRequest {
        SongRequest::new(&self.artist, &self.title, self.source, submitter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_normalizes_identity() {
        let req = SongRequest::new(" ABBA ", "Waterloo", "https://example.com/w", "alice");
        assert_eq!(req.identity, SongIdentity::new("ABBA", "Waterloo"));
        assert_eq!(req.submitter, "alice");
    }

    #[test]
    fn search_result_becomes_request() {
        let hit = SearchResult {
            title: "Dancing Queen".into(),
            artist: "ABBA".into(),
            duration_secs: Some(231.0),
            source: "https://example.com/dq".into(),
        };
        let req = hit.into_request("bob");
        assert_eq!(req.identity.title(), "Dancing Queen");
        assert_eq!(req.source, "https://example.com/dq");
        assert_eq!(req.submitter, "bob");
    }
}
