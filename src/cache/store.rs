//! [`CacheStore`]: lookup and store of prepared-song records.
//!
//! No locking is done here: the queue scheduler guarantees that at most one
//! preparation touches the cache at a time, and each file is replaced
//! atomically.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::song::{LyricTimeline, PreparedSong, SongIdentity};

use super::{write_atomic, LYRICS_FILE, META_FILE, OWNER_FILE};

// ---------------------------------------------------------------------------
// CacheError
// ---------------------------------------------------------------------------

/// Errors raised while writing to the cache.
///
/// Reads never fail: an unreadable or incomplete record is a cache miss.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode cache metadata: {0}")]
    Encode(#[from] serde_json::Error),
}

// ---------------------------------------------------------------------------
// CacheRecord
// ---------------------------------------------------------------------------

/// Persisted description of one prepared song (`meta.json`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheRecord {
    pub identity: SongIdentity,
    pub source: String,
    pub instrumental: PathBuf,
    #[serde(default)]
    pub vocals: Option<PathBuf>,
    pub lyrics: PathBuf,
    #[serde(default)]
    pub video: Option<PathBuf>,
}

impl CacheRecord {
    /// Required artifacts that are missing on disk.
    fn missing_artifacts(&self) -> Vec<&Path> {
        let mut required: Vec<&Path> = vec![&self.instrumental, &self.lyrics];
        if let Some(vocals) = &self.vocals {
            required.push(vocals);
        }
        required.into_iter().filter(|p| !p.is_file()).collect()
    }

    /// Combine this record with its parsed timeline into a playable song.
    pub fn into_prepared(self, timeline: LyricTimeline) -> PreparedSong {
        PreparedSong {
            identity: self.identity,
            instrumental: self.instrumental,
            vocals: self.vocals,
            video: self.video,
            timeline,
            source: self.source,
        }
    }
}

/// Track files produced by a preparation, handed to [`CacheStore::store`].
#[derive(Debug, Clone, PartialEq)]
pub struct TrackArtifacts {
    pub instrumental: PathBuf,
    pub vocals: Option<PathBuf>,
    pub video: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// CacheStore
// ---------------------------------------------------------------------------

/// Content-addressed record of previously prepared songs, keyed by
/// [`SongIdentity::storage_key`].
#[derive(Debug, Clone)]
pub struct CacheStore {
    root: PathBuf,
}

impl CacheStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding every artifact for `identity`.
    pub fn song_dir(&self, identity: &SongIdentity) -> PathBuf {
        self.root.join(identity.storage_key())
    }

    /// Return the record for `identity` if it exists and all of its required
    /// artifacts are present.
    ///
    /// A record whose artifacts were deleted out-of-band is logged and
    /// treated as absent.  A missing optional video is dropped from the
    /// returned record.
    pub fn lookup(&self, identity: &SongIdentity) -> Option<CacheRecord> {
        let meta_path = self.song_dir(identity).join(META_FILE);
        let mut record = read_record(&meta_path)?;

        if &record.identity != identity {
            // Two identities can share a storage key.
            log::warn!(
                "cache: {} holds '{}', not '{}'; ignoring",
                meta_path.display(),
                record.identity,
                identity
            );
            return None;
        }

        let missing = record.missing_artifacts();
        if !missing.is_empty() {
            log::warn!(
                "cache: record for '{}' is missing {} artifact(s) ({}); treating as miss",
                identity,
                missing.len(),
                missing
                    .iter()
                    .map(|p| p.display().to_string())
                    .collect::<Vec<_>>()
                    .join(", ")
            );
            return None;
        }

        if record.video.as_deref().is_some_and(|v| !v.is_file()) {
            log::info!("cache: video for '{identity}' is gone, continuing audio-only");
            record.video = None;
        }

        Some(record)
    }

    /// Take the song directory of `identity` for a new preparation.
    ///
    /// Collaborators reuse whatever partial output they find in the
    /// directory, so output left by a different identity sharing the storage
    /// key is removed before the directory is handed out.
    pub fn claim(&self, identity: &SongIdentity) -> Result<PathBuf, CacheError> {
        let dir = self.song_dir(identity);

        if let Some(owner) = owner_of(&dir) {
            if &owner != identity {
                log::warn!(
                    "cache: {} belonged to '{owner}'; clearing it for '{identity}'",
                    dir.display()
                );
                std::fs::remove_dir_all(&dir).map_err(io_at(&dir))?;
            }
        }

        std::fs::create_dir_all(&dir).map_err(io_at(&dir))?;
        let owner_path = dir.join(OWNER_FILE);
        let json = serde_json::to_vec_pretty(identity)?;
        write_atomic(&owner_path, &json).map_err(io_at(&owner_path))?;
        Ok(dir)
    }

    /// Persist `timeline` and the metadata for `identity`, overwriting any
    /// previous record.
    pub fn store(
        &self,
        identity: &SongIdentity,
        source: &str,
        artifacts: &TrackArtifacts,
        timeline: &LyricTimeline,
    ) -> Result<CacheRecord, CacheError> {
        let dir = self.song_dir(identity);
        let lyrics = dir.join(LYRICS_FILE);
        write_atomic(&lyrics, timeline.to_lrc().as_bytes()).map_err(|source| CacheError::Io {
            path: lyrics.clone(),
            source,
        })?;

        let record = CacheRecord {
            identity: identity.clone(),
            source: source.to_string(),
            instrumental: artifacts.instrumental.clone(),
            vocals: artifacts.vocals.clone(),
            lyrics,
            video: artifacts.video.clone(),
        };

        let meta_path = dir.join(META_FILE);
        let json = serde_json::to_vec_pretty(&record)?;
        write_atomic(&meta_path, &json).map_err(|source| CacheError::Io {
            path: meta_path.clone(),
            source,
        })?;

        log::debug!("cache: stored '{}' at {}", identity, dir.display());
        Ok(record)
    }

    /// Every valid record under the cache root, sorted by identity.
    pub fn list(&self) -> Vec<CacheRecord> {
        let Ok(entries) = std::fs::read_dir(&self.root) else {
            return Vec::new();
        };

        let mut records: Vec<CacheRecord> = entries
            .filter_map(Result::ok)
            .filter(|e| e.path().is_dir())
            .filter_map(|e| read_record(&e.path().join(META_FILE)))
            .filter_map(|r| self.lookup(&r.identity))
            .collect();
        records.sort_by(|a, b| a.identity.to_string().cmp(&b.identity.to_string()));
        records
    }
}

fn io_at(path: &Path) -> impl FnOnce(std::io::Error) -> CacheError {
    let path = path.to_path_buf();
    move |source| CacheError::Io { path, source }
}

/// Identity that last claimed or stored into `dir`, if any.
fn owner_of(dir: &Path) -> Option<SongIdentity> {
    let claimed = std::fs::read_to_string(dir.join(OWNER_FILE))
        .ok()
        .and_then(|c| serde_json::from_str(&c).ok());
    claimed.or_else(|| read_record(&dir.join(META_FILE)).map(|r| r.identity))
}

fn read_record(meta_path: &Path) -> Option<CacheRecord> {
    let content = match std::fs::read_to_string(meta_path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
        Err(e) => {
            log::warn!("cache: cannot read {}: {e}", meta_path.display());
            return None;
        }
    };

    match serde_json::from_str(&content) {
        Ok(record) => Some(record),
        Err(e) => {
            log::warn!("cache: invalid metadata in {}: {e}", meta_path.display());
            None
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
