//! Test doubles for every collaborator.
//!
//! The preparation mocks write small real files into the destination
//! directory so the cache layer sees genuine artifacts.  Each mock counts its
//! calls so tests can assert that a cache hit skipped the pipeline.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::cache::{INSTRUMENTAL_FILE, VIDEO_FILE, VOCALS_FILE};
use crate::song::{LyricLine, LyricTimeline, SearchResult};

use super::{
    Downloader, Resolver, SeparatedTracks, Separator, ToolError, TrackKind, Transcriber,
    Transport, TransportError, TransportFactory, VideoFetcher,
};

// ---------------------------------------------------------------------------
// Preparation collaborators
// ---------------------------------------------------------------------------

/// Writes `source.webm`; fails for every source listed in `fail_sources`.
#[derive(Debug, Default)]
pub struct MockDownloader {
    fail_sources: Vec<String>,
    calls: AtomicUsize,
}

impl MockDownloader {
    pub fn failing_for(sources: &[&str]) -> Self {
        Self {
            fail_sources: sources.iter().map(|s| s.to_string()).collect(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Downloader for MockDownloader {
    async fn download(&self, source: &str, dest_dir: &Path) -> Result<PathBuf, ToolError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_sources.iter().any(|s| s == source) {
            return Err(ToolError::Other(format!("no media at {source}")));
        }
        std::fs::create_dir_all(dest_dir)?;
        let path = dest_dir.join("source.webm");
        std::fs::write(&path, source.as_bytes())?;
        Ok(path)
    }
}

#[derive(Debug, Default)]
pub struct MockSeparator {
    fail: bool,
    calls: AtomicUsize,
}

impl MockSeparator {
    pub fn failing() -> Self {
        Self {
            fail: true,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Separator for MockSeparator {
    async fn separate(
        &self,
        _raw_audio: &Path,
        dest_dir: &Path,
    ) -> Result<SeparatedTracks, ToolError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(ToolError::Other("model crashed".into()));
        }
        let tracks = SeparatedTracks {
            instrumental: dest_dir.join(INSTRUMENTAL_FILE),
            vocals: dest_dir.join(VOCALS_FILE),
        };
        std::fs::write(&tracks.instrumental, b"instrumental")?;
        std::fs::write(&tracks.vocals, b"vocals")?;
        Ok(tracks)
    }
}

/// Returns a fixed timeline, or fails when built with [`failing`](Self::failing).
#[derive(Debug)]
pub struct MockTranscriber {
    response: Result<LyricTimeline, String>,
    calls: AtomicUsize,
}

impl MockTranscriber {
    pub fn ok(timeline: LyricTimeline) -> Self {
        Self {
            response: Ok(timeline),
            calls: AtomicUsize::new(0),
        }
    }

    /// Two lines at 0.0 s and 1.0 s.
    pub fn two_lines() -> Self {
        Self::ok(LyricTimeline::new(vec![
            LyricLine::new(0.0, "first line"),
            LyricLine::new(1.0, "second line"),
        ]))
    }

    pub fn failing() -> Self {
        Self {
            response: Err("speech model unavailable".into()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transcriber for MockTranscriber {
    async fn transcribe(&self, _vocals: &Path) -> Result<LyricTimeline, ToolError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.response.clone().map_err(ToolError::Other)
    }
}

#[derive(Debug, Default)]
pub struct MockVideoFetcher {
    fail: bool,
    calls: AtomicUsize,
}

impl MockVideoFetcher {
    pub fn failing() -> Self {
        Self {
            fail: true,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VideoFetcher for MockVideoFetcher {
    async fn fetch(&self, _source: &str, dest_dir: &Path) -> Result<PathBuf, ToolError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(ToolError::Other("video unavailable".into()));
        }
        let path = dest_dir.join(VIDEO_FILE);
        std::fs::write(&path, b"video")?;
        Ok(path)
    }
}

#[derive(Debug, Default)]
pub struct MockResolver {
    pub results: Vec<SearchResult>,
}

#[async_trait]
impl Resolver for MockResolver {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchResult>, ToolError> {
        let query = query.to_lowercase();
        Ok(self
            .results
            .iter()
            .filter(|r| {
                r.title.to_lowercase().contains(&query) || r.artist.to_lowercase().contains(&query)
            })
            .take(limit)
            .cloned()
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Transports
// ---------------------------------------------------------------------------

/// Observable state of one mock track.
#[derive(Debug, Clone)]
pub struct MockTrackState {
    pub kind: TrackKind,
    pub path: PathBuf,
    pub started: bool,
    pub paused: bool,
    pub stopped: bool,
    pub finished: bool,
    pub volume: f32,
    pub elapsed: Duration,
    /// Remaining `is_active` polls before the track ends by itself.
    pub polls_left: Option<u32>,
    /// Added to `elapsed` on each `is_active` poll while playing.
    pub step: Duration,
}

pub type TrackHandle = Arc<Mutex<MockTrackState>>;

pub struct MockTransport {
    state: TrackHandle,
}

impl Transport for MockTransport {
    fn start(&mut self) -> Result<(), TransportError> {
        let mut s = self.state.lock().unwrap();
        s.started = true;
        Ok(())
    }

    fn pause(&mut self) -> Result<(), TransportError> {
        self.state.lock().unwrap().paused = true;
        Ok(())
    }

    fn resume(&mut self) -> Result<(), TransportError> {
        self.state.lock().unwrap().paused = false;
        Ok(())
    }

    fn stop(&mut self) {
        self.state.lock().unwrap().stopped = true;
    }

    fn is_active(&mut self) -> bool {
        let mut s = self.state.lock().unwrap();
        if !s.started || s.stopped || s.finished {
            return false;
        }
        if s.paused {
            return true;
        }
        let step = s.step;
        s.elapsed += step;
        if let Some(left) = s.polls_left.as_mut() {
            if *left == 0 {
                s.finished = true;
                return false;
            }
            *left -= 1;
        }
        true
    }

    fn elapsed(&self) -> Duration {
        self.state.lock().unwrap().elapsed
    }

    fn set_volume(&mut self, volume: f32) -> Result<(), TransportError> {
        self.state.lock().unwrap().volume = volume;
        Ok(())
    }
}

/// Records every opened track.  Kinds in `fail_kinds` fail to open.
#[derive(Default)]
pub struct MockTransportFactory {
    opened: Mutex<Vec<TrackHandle>>,
    fail_kinds: Vec<TrackKind>,
    polls_until_finish: Option<u32>,
    step: Duration,
}

impl MockTransportFactory {
    /// Tracks that never finish on their own.
    pub fn endless() -> Self {
        Self::default()
    }

    /// Tracks that end after `polls` activity checks, advancing `step` each.
    pub fn finishing_after(polls: u32, step: Duration) -> Self {
        Self {
            polls_until_finish: Some(polls),
            step,
            ..Self::default()
        }
    }

    pub fn failing(mut self, kind: TrackKind) -> Self {
        self.fail_kinds.push(kind);
        self
    }

    pub fn opened(&self) -> Vec<TrackHandle> {
        self.opened.lock().unwrap().clone()
    }

    /// Snapshot of the most recently opened track of `kind`.
    pub fn last(&self, kind: TrackKind) -> Option<MockTrackState> {
        self.opened
            .lock()
            .unwrap()
            .iter()
            .rev()
            .map(|h| h.lock().unwrap().clone())
            .find(|s| s.kind == kind)
    }

    /// Set the position of every open track.
    pub fn set_elapsed(&self, elapsed: Duration) {
        for handle in self.opened.lock().unwrap().iter() {
            handle.lock().unwrap().elapsed = elapsed;
        }
    }

    /// End every track as if it had played out.
    pub fn finish_all(&self) {
        for handle in self.opened.lock().unwrap().iter() {
            handle.lock().unwrap().finished = true;
        }
    }
}

impl TransportFactory for MockTransportFactory {
    fn open(&self, path: &Path, kind: TrackKind) -> Result<Box<dyn Transport>, TransportError> {
        if self.fail_kinds.contains(&kind) {
            return Err(TransportError::Start {
                kind,
                message: "mock refused".into(),
            });
        }
        let state = Arc::new(Mutex::new(MockTrackState {
            kind,
            path: path.to_path_buf(),
            started: false,
            paused: false,
            stopped: false,
            finished: false,
            volume: 1.0,
            elapsed: Duration::ZERO,
            polls_left: self.polls_until_finish,
            step: self.step,
        }));
        self.opened.lock().unwrap().push(Arc::clone(&state));
        Ok(Box::new(MockTransport { state }))
    }
}
