//! Preparation pipeline: turns a [`SongRequest`] into a [`PreparedSong`].
//!
//! # Flow
//!
//! ```text
//! SongRequest
//!   └─▶ spawn_blocking(cache.lookup)                 [cache-hit] ─▶ done
//!         └─ miss
//!             ├─▶ downloader.download                [download]    fatal
//!             ├─▶ separator.separate                 [separate]    fatal
//!             ├─▶ transcriber.transcribe             [transcribe]  warning → empty timeline
//!             ├─▶ video.fetch (optional)             [fetch-video] warning → audio only
//!             └─▶ spawn_blocking(cache.store)        [store]       warning
//! ```
//!
//! Artifacts are written straight into the song's cache directory, so a
//! failed run leaves its partial output where the next attempt can reuse it.
//! The directory is claimed first; output left there by a different identity
//! is cleared rather than reused.

use std::path::PathBuf;
use std::sync::Arc;

use crate::cache::{CacheStore, TrackArtifacts};
use crate::collab::{Downloader, Separator, Transcriber, VideoFetcher};
use crate::song::{LyricTimeline, PreparedSong, SongIdentity, SongRequest};

use super::state::{PrepareError, PrepareStage, PrepareWarning, Preparation, ProgressCallback};

/// The external tools a preparation needs.  Video is optional.
#[derive(Clone)]
pub struct Collaborators {
    pub downloader: Arc<dyn Downloader>,
    pub separator: Arc<dyn Separator>,
    pub transcriber: Arc<dyn Transcriber>,
    pub video: Option<Arc<dyn VideoFetcher>>,
}

// ---------------------------------------------------------------------------
// PreparationPipeline
// ---------------------------------------------------------------------------

/// Cache-first preparation of one song at a time.
///
/// The pipeline holds no per-song state; the queue scheduler guarantees that
/// at most one [`prepare`](Self::prepare) call is in flight.
pub struct PreparationPipeline {
    cache: CacheStore,
    collab: Collaborators,
}

impl PreparationPipeline {
    pub fn new(cache: CacheStore, collab: Collaborators) -> Self {
        Self { cache, collab }
    }

    pub fn cache(&self) -> &CacheStore {
        &self.cache
    }

    /// Prepare `request`, reporting each stage through `progress`.
    pub async fn prepare(
        &self,
        request: &SongRequest,
        progress: &ProgressCallback,
    ) -> Result<Preparation, PrepareError> {
        let identity = &request.identity;

        // ── 1. Cache ─────────────────────────────────────────────────────
        if let Some(song) = self.lookup_cached(request).await? {
            log::info!("pipeline: cache hit for '{identity}'");
            progress(identity, PrepareStage::CacheHit);
            return Ok(Preparation {
                song,
                warnings: Vec::new(),
                from_cache: true,
            });
        }

        let dir = self.claim_dir(identity).await?;

        // ── 2. Download ──────────────────────────────────────────────────
        progress(identity, PrepareStage::Download);
        let raw = self
            .collab
            .downloader
            .download(&request.source, &dir)
            .await
            .map_err(|e| PrepareError::DownloadFailed {
                identity: identity.clone(),
                message: e.to_string(),
            })?;
        log::debug!("pipeline: downloaded '{identity}' to {}", raw.display());

        // ── 3. Separate ──────────────────────────────────────────────────
        progress(identity, PrepareStage::Separate);
        let tracks = self
            .collab
            .separator
            .separate(&raw, &dir)
            .await
            .map_err(|e| PrepareError::SeparationFailed {
                identity: identity.clone(),
                message: e.to_string(),
            })?;

        let mut warnings = Vec::new();

        // ── 4. Transcribe ────────────────────────────────────────────────
        progress(identity, PrepareStage::Transcribe);
        let timeline = match self.collab.transcriber.transcribe(&tracks.vocals).await {
            Ok(timeline) => timeline,
            Err(e) => {
                log::warn!("pipeline: transcription of '{identity}' failed: {e}");
                warnings.push(PrepareWarning::TranscriptionFailed(e.to_string()));
                LyricTimeline::empty()
            }
        };

        // ── 5. Video (optional) ──────────────────────────────────────────
        let video = match &self.collab.video {
            Some(fetcher) => {
                progress(identity, PrepareStage::FetchVideo);
                match fetcher.fetch(&request.source, &dir).await {
                    Ok(path) => Some(path),
                    Err(e) => {
                        log::warn!("pipeline: video for '{identity}' unavailable: {e}");
                        warnings.push(PrepareWarning::VideoFetchFailed(e.to_string()));
                        None
                    }
                }
            }
            None => None,
        };

        // ── 6. Store ─────────────────────────────────────────────────────
        progress(identity, PrepareStage::Store);
        let artifacts = TrackArtifacts {
            instrumental: tracks.instrumental,
            vocals: Some(tracks.vocals),
            video,
        };
        if let Err(message) = self
            .store(identity, &request.source, &artifacts, &timeline)
            .await
        {
            log::warn!("pipeline: cache write for '{identity}' failed: {message}");
            warnings.push(PrepareWarning::CacheWriteFailed(message));
        }

        let song = PreparedSong {
            identity: identity.clone(),
            instrumental: artifacts.instrumental,
            vocals: artifacts.vocals,
            video: artifacts.video,
            timeline,
            source: request.source.clone(),
        };

        log::info!(
            "pipeline: prepared '{identity}' ({} lyric line(s), {} warning(s))",
            song.timeline.len(),
            warnings.len()
        );
        Ok(Preparation {
            song,
            warnings,
            from_cache: false,
        })
    }

    // -----------------------------------------------------------------------
    // Blocking cache access
    // -----------------------------------------------------------------------

    async fn lookup_cached(
        &self,
        request: &SongRequest,
    ) -> Result<Option<PreparedSong>, PrepareError> {
        let cache = self.cache.clone();
        let identity = request.identity.clone();

        let found = tokio::task::spawn_blocking(move || {
            let record = cache.lookup(&identity)?;
            match LyricTimeline::load(&record.lyrics) {
                Ok(timeline) => Some(record.into_prepared(timeline)),
                Err(e) => {
                    log::warn!(
                        "pipeline: cached lyrics for '{identity}' unreadable ({e}); re-preparing"
                    );
                    None
                }
            }
        })
        .await
        .map_err(|e| internal(&request.identity, PrepareStage::CacheHit, e))?;

        if let Some(song) = &found {
            if song.source != request.source {
                log::info!(
                    "pipeline: '{}' cached from {}, requested from {}; using cache",
                    request.identity,
                    song.source,
                    request.source
                );
            }
        }
        Ok(found)
    }

    async fn claim_dir(&self, identity: &SongIdentity) -> Result<PathBuf, PrepareError> {
        let cache = self.cache.clone();
        let owner = identity.clone();
        tokio::task::spawn_blocking(move || cache.claim(&owner))
            .await
            .map_err(|e| internal(identity, PrepareStage::Download, e))?
            .map_err(|e| internal(identity, PrepareStage::Download, e))
    }

    async fn store(
        &self,
        identity: &SongIdentity,
        source: &str,
        artifacts: &TrackArtifacts,
        timeline: &LyricTimeline,
    ) -> Result<(), String> {
        let cache = self.cache.clone();
        let identity = identity.clone();
        let source = source.to_string();
        let artifacts = artifacts.clone();
        let timeline = timeline.clone();

        tokio::task::spawn_blocking(move || {
            cache
                .store(&identity, &source, &artifacts, &timeline)
                .map(|_| ())
                .map_err(|e| e.to_string())
        })
        .await
        .map_err(|e| e.to_string())?
    }
}

fn internal(identity: &SongIdentity, stage: PrepareStage, e: impl std::fmt::Display) -> PrepareError {
    PrepareError::Internal {
        identity: identity.clone(),
        stage,
        message: e.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
