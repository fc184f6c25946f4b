//! Stages, outcomes and errors of a song preparation.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;

use crate::song::{PreparedSong, SongIdentity};

// ---------------------------------------------------------------------------
// PrepareStage
// ---------------------------------------------------------------------------

/// Progress marker reported while a song is being prepared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum PrepareStage {
    /// The cache already held a complete record.
    CacheHit,
    Download,
    Separate,
    Transcribe,
    FetchVideo,
    /// Writing the finished record to the cache.
    Store,
}

impl PrepareStage {
    pub fn label(self) -> &'static str {
        match self {
            PrepareStage::CacheHit => "cache-hit",
            PrepareStage::Download => "download",
            PrepareStage::Separate => "separate",
            PrepareStage::Transcribe => "transcribe",
            PrepareStage::FetchVideo => "fetch-video",
            PrepareStage::Store => "store",
        }
    }
}

impl fmt::Display for PrepareStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Called on every stage transition.  Must not block.
pub type ProgressCallback = Arc<dyn Fn(&SongIdentity, PrepareStage) + Send + Sync>;

/// A callback that discards progress.
pub fn no_progress() -> ProgressCallback {
    Arc::new(|_, _| {})
}

// ---------------------------------------------------------------------------
// PrepareError / PrepareWarning
// ---------------------------------------------------------------------------

/// A failure that leaves the song unplayable.
#[derive(Debug, Clone, Error)]
pub enum PrepareError {
    #[error("download of '{identity}' failed: {message}")]
    DownloadFailed {
        identity: SongIdentity,
        message: String,
    },

    #[error("vocal separation of '{identity}' failed: {message}")]
    SeparationFailed {
        identity: SongIdentity,
        message: String,
    },

    /// Task join failure or an unexpected filesystem error.
    #[error("preparing '{identity}' failed: {message}")]
    Internal {
        identity: SongIdentity,
        stage: PrepareStage,
        message: String,
    },
}

impl PrepareError {
    pub fn identity(&self) -> &SongIdentity {
        match self {
            PrepareError::DownloadFailed { identity, .. }
            | PrepareError::SeparationFailed { identity, .. }
            | PrepareError::Internal { identity, .. } => identity,
        }
    }

    /// The stage that failed.
    pub fn stage(&self) -> PrepareStage {
        match self {
            PrepareError::DownloadFailed { .. } => PrepareStage::Download,
            PrepareError::SeparationFailed { .. } => PrepareStage::Separate,
            PrepareError::Internal { stage, .. } => *stage,
        }
    }
}

/// A degraded but playable outcome.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PrepareWarning {
    #[error("transcription failed, playing without lyrics: {0}")]
    TranscriptionFailed(String),

    #[error("video unavailable, playing audio only: {0}")]
    VideoFetchFailed(String),

    #[error("could not write cache record: {0}")]
    CacheWriteFailed(String),
}

// ---------------------------------------------------------------------------
// Preparation
// ---------------------------------------------------------------------------

/// Successful result of [`PreparationPipeline::prepare`](super::PreparationPipeline::prepare).
#[derive(Debug, Clone)]
pub struct Preparation {
    pub song: PreparedSong,
    pub warnings: Vec<PrepareWarning>,
    pub from_cache: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_labels_are_kebab_case() {
        assert_eq!(PrepareStage::FetchVideo.label(), "fetch-video");
        assert_eq!(PrepareStage::CacheHit.to_string(), "cache-hit");
        assert_eq!(
            serde_json::to_string(&PrepareStage::FetchVideo).unwrap(),
            "\"fetch-video\""
        );
    }

    #[test]
    fn error_names_identity_and_stage() {
        let err = PrepareError::SeparationFailed {
            identity: SongIdentity::new("A", "B"),
            message: "oom".into(),
        };
        assert_eq!(err.stage(), PrepareStage::Separate);
        assert_eq!(err.identity(), &SongIdentity::new("A", "B"));
        assert!(err.to_string().contains("A - B"));
    }
}
