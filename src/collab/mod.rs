//! External collaborators consumed by the session engine.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────── collaborator traits ──────────────────────┐
//! │ Resolver      search(query)              → Vec<SearchResult>    │
//! │ Downloader    download(source, dir)      → raw media path       │
//! │ Separator     separate(raw, dir)         → instrumental+vocals  │
//! │ Transcriber   transcribe(vocals)         → LyricTimeline        │
//! │ VideoFetcher  fetch(source, dir)         → video path           │
//! │ Transport     start/pause/resume/stop/is_active/elapsed/volume  │
//! └─────────────────────────────────────────────────────────────────┘
//!          ▲ implemented by
//! ┌────────┴──────── command-line adapters ─────────────────────────┐
//! │ CommandResolver / CommandDownloader / CommandVideoFetcher (yt-dlp)
//! │ CommandSeparator (demucs)   CommandTranscriber (whisper)        │
//! │ ProcessTransport (ffplay)                                       │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The traits are object-safe and `Send + Sync` so the pipeline can hold them
//! as `Arc<dyn …>`.  The adapters only assemble arguments, run the tool and
//! pick up its output files.

pub mod command;
pub mod downloader;
pub mod resolver;
pub mod separator;
pub mod transcriber;
pub mod transport;
pub mod video;

#[cfg(test)]
pub mod mock;

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;

use crate::song::{LyricTimeline, SearchResult};

pub use command::CommandSpec;
pub use downloader::CommandDownloader;
pub use resolver::CommandResolver;
pub use separator::CommandSeparator;
pub use transcriber::CommandTranscriber;
pub use transport::{
    ProcessTransport, ProcessTransportFactory, TrackKind, Transport, TransportError,
    TransportFactory,
};
pub use video::CommandVideoFetcher;

// ---------------------------------------------------------------------------
// ToolError
// ---------------------------------------------------------------------------

/// Errors surfaced by collaborator implementations.
#[derive(Debug, Error)]
pub enum ToolError {
    /// The external program could not be started at all.
    #[error("failed to launch `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The external program ran but reported failure.
    #[error("`{program}` exited with {status}: {stderr}")]
    Exit {
        program: String,
        status: std::process::ExitStatus,
        stderr: String,
    },

    /// The program succeeded but the expected output file is not there.
    #[error("expected output not found: {}", .0.display())]
    MissingOutput(PathBuf),

    /// Tool output could not be interpreted.
    #[error("could not parse tool output: {0}")]
    Parse(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A collaborator-specific failure described in prose.
    #[error("{0}")]
    Other(String),
}

// ---------------------------------------------------------------------------
// Collaborator traits
// ---------------------------------------------------------------------------

/// Finds candidate songs for a free-text query.
#[async_trait]
pub trait Resolver: Send + Sync {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchResult>, ToolError>;
}

/// Fetches the raw media behind a source reference into `dest_dir`.
#[async_trait]
pub trait Downloader: Send + Sync {
    async fn download(&self, source: &str, dest_dir: &Path) -> Result<PathBuf, ToolError>;
}

/// Output of a [`Separator`].
#[derive(Debug, Clone, PartialEq)]
pub struct SeparatedTracks {
    pub instrumental: PathBuf,
    pub vocals: PathBuf,
}

/// Splits raw audio into instrumental and vocal tracks inside `dest_dir`.
#[async_trait]
pub trait Separator: Send + Sync {
    async fn separate(&self, raw_audio: &Path, dest_dir: &Path)
        -> Result<SeparatedTracks, ToolError>;
}

/// Turns an isolated vocal track into time-aligned lyric lines.
#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, vocals: &Path) -> Result<LyricTimeline, ToolError>;
}

/// Best-effort download of a video track for a source reference.
#[async_trait]
pub trait VideoFetcher: Send + Sync {
    async fn fetch(&self, source: &str, dest_dir: &Path) -> Result<PathBuf, ToolError>;
}

// Compile-time assertion: every collaborator must be usable as a trait object.
const _: fn() = || {
    fn _assert_object_safe(
        _: Box<dyn Resolver>,
        _: Box<dyn Downloader>,
        _: Box<dyn Separator>,
        _: Box<dyn Transcriber>,
        _: Box<dyn VideoFetcher>,
        _: Box<dyn TransportFactory>,
    ) {
    }
};
