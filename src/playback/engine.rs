//! [`PlaybackEngine`]: drives the tracks of one prepared song and its lyrics.
//!
//! The engine is synchronous: the session loop calls its methods and a
//! periodic [`tick`](PlaybackEngine::tick).  Everything it has to say goes out
//! as [`PlaybackEvent`]s on an unbounded channel, so no call ever blocks.
//!
//! # Tick
//!
//! ```text
//! tick() [Playing only]
//!   ├─ elapsed = video clock if loaded, else instrumental clock
//!   ├─ cursor.advance(timeline, elapsed) → Progress{lyric} per new line
//!   ├─ whole second changed              → Progress{lyric: None}
//!   └─ every track inactive              → Completed{Finished}
//! ```

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc;

use crate::collab::{TrackKind, Transport, TransportError, TransportFactory};
use crate::song::{PreparedSong, SongIdentity};

use super::cursor::LyricCursor;
use super::state::{CompletionReason, LyricDisplay, PlaybackEvent, PlaybackState};

#[derive(Debug, Error)]
pub enum PlaybackError {
    #[error("cannot {op} while {state}")]
    InvalidState {
        op: &'static str,
        state: PlaybackState,
    },

    #[error(transparent)]
    Transport(#[from] TransportError),
}

pub struct PlaybackEngine {
    state: PlaybackState,
    factory: Arc<dyn TransportFactory>,
    events: mpsc::UnboundedSender<PlaybackEvent>,
    song: Option<PreparedSong>,
    tracks: Vec<(TrackKind, Box<dyn Transport>)>,
    cursor: LyricCursor,
    current_lyric: Option<LyricDisplay>,
    vocals_enabled: bool,
    last_heartbeat_secs: u64,
}

impl PlaybackEngine {
    pub fn new(
        factory: Arc<dyn TransportFactory>,
        events: mpsc::UnboundedSender<PlaybackEvent>,
        vocals_enabled: bool,
    ) -> Self {
        Self {
            state: PlaybackState::Idle,
            factory,
            events,
            song: None,
            tracks: Vec::new(),
            cursor: LyricCursor::new(),
            current_lyric: None,
            vocals_enabled,
            last_heartbeat_secs: 0,
        }
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn current_lyric(&self) -> Option<&LyricDisplay> {
        self.current_lyric.as_ref()
    }

    pub fn vocals_enabled(&self) -> bool {
        self.vocals_enabled
    }

    pub fn now_playing(&self) -> Option<&SongIdentity> {
        self.song.as_ref().map(|s| &s.identity)
    }

    // -----------------------------------------------------------------------
    // Commands
    // -----------------------------------------------------------------------

    /// Start playing `song`.
    ///
    /// Fails with [`PlaybackError::InvalidState`] unless the engine is idle or
    /// has completed the previous song.  When the instrumental track cannot
    /// start, the song is reported as completed with
    /// [`CompletionReason::TransportFailed`] before the error is returned.
    pub fn load(&mut self, song: PreparedSong) -> Result<(), PlaybackError> {
        if !matches!(self.state, PlaybackState::Idle | PlaybackState::Completed) {
            return Err(PlaybackError::InvalidState {
                op: "load",
                state: self.state,
            });
        }

        self.state = PlaybackState::Loading;
        self.cursor.reset();
        self.current_lyric = None;
        self.last_heartbeat_secs = 0;
        let identity = song.identity.clone();
        log::info!("playback: loading '{identity}'");

        // ── Instrumental (required) ─────────────────────────────────────
        match self.open_track(&song.instrumental, TrackKind::Instrumental, 1.0) {
            Ok(track) => self.tracks.push((TrackKind::Instrumental, track)),
            Err(e) => {
                log::error!("playback: '{identity}' cannot start: {e}");
                self.emit(PlaybackEvent::Error {
                    identity: identity.clone(),
                    message: e.to_string(),
                });
                self.state = PlaybackState::Completed;
                self.emit(PlaybackEvent::Completed {
                    identity,
                    reason: CompletionReason::TransportFailed,
                });
                return Err(e.into());
            }
        }

        // ── Vocals and video (optional) ─────────────────────────────────
        let vocal_volume = if self.vocals_enabled { 1.0 } else { 0.0 };
        if let Some(vocals) = &song.vocals {
            match self.open_track(vocals, TrackKind::Vocals, vocal_volume) {
                Ok(track) => self.tracks.push((TrackKind::Vocals, track)),
                Err(e) => log::warn!("playback: dropping vocals for '{identity}': {e}"),
            }
        }
        if let Some(video) = &song.video {
            match self.open_track(video, TrackKind::Video, 1.0) {
                Ok(track) => self.tracks.push((TrackKind::Video, track)),
                Err(e) => log::warn!("playback: dropping video for '{identity}': {e}"),
            }
        }

        self.state = PlaybackState::Playing;
        self.emit(PlaybackEvent::Started {
            identity,
            has_vocals: self.has_track(TrackKind::Vocals),
            has_video: self.has_track(TrackKind::Video),
        });
        self.song = Some(song);
        let elapsed = self.clock();
        self.sync_lyrics(elapsed);
        Ok(())
    }

    /// Pause every track.  Returns `false` (and does nothing) unless playing.
    pub fn pause(&mut self) -> bool {
        if self.state != PlaybackState::Playing {
            return false;
        }
        for (kind, track) in &mut self.tracks {
            if let Err(e) = track.pause() {
                log::warn!("playback: pausing {kind} track failed: {e}");
            }
        }
        self.state = PlaybackState::Paused;
        true
    }

    /// Resume every track.  Returns `false` (and does nothing) unless paused.
    pub fn resume(&mut self) -> bool {
        if self.state != PlaybackState::Paused {
            return false;
        }
        for (kind, track) in &mut self.tracks {
            if let Err(e) = track.resume() {
                log::warn!("playback: resuming {kind} track failed: {e}");
            }
        }
        self.state = PlaybackState::Playing;
        true
    }

    /// Make the guide vocals audible or silent.  Kept for later songs too.
    pub fn set_vocal_enabled(&mut self, enabled: bool) {
        self.vocals_enabled = enabled;
        let volume = if enabled { 1.0 } else { 0.0 };
        for (kind, track) in &mut self.tracks {
            if *kind == TrackKind::Vocals {
                if let Err(e) = track.set_volume(volume) {
                    log::warn!("playback: changing vocal volume failed: {e}");
                }
            }
        }
    }

    /// Stop the current song and report it as completed.
    ///
    /// Returns `false` when nothing is loaded.
    pub fn skip(&mut self) -> bool {
        if !matches!(
            self.state,
            PlaybackState::Loading | PlaybackState::Playing | PlaybackState::Paused
        ) {
            return false;
        }
        self.finish(CompletionReason::Skipped);
        true
    }

    /// Advance lyrics and detect the end of the song.  No-op unless playing.
    pub fn tick(&mut self) {
        if self.state != PlaybackState::Playing {
            return;
        }

        let elapsed = self.clock();
        self.sync_lyrics(elapsed);

        let secs = elapsed.as_secs();
        if secs != self.last_heartbeat_secs {
            self.last_heartbeat_secs = secs;
            if let Some(identity) = self.now_playing().cloned() {
                self.emit(PlaybackEvent::Progress {
                    identity,
                    elapsed,
                    lyric: None,
                });
            }
        }

        let mut any_active = false;
        for (_, track) in &mut self.tracks {
            if track.is_active() {
                any_active = true;
            }
        }
        if !any_active {
            self.finish(CompletionReason::Finished);
        }
    }

    /// Stop everything without reporting a completion.
    pub fn shutdown(&mut self) {
        for (_, track) in &mut self.tracks {
            track.stop();
        }
        self.tracks.clear();
        self.song = None;
        self.current_lyric = None;
        self.state = PlaybackState::Idle;
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn open_track(
        &self,
        path: &Path,
        kind: TrackKind,
        volume: f32,
    ) -> Result<Box<dyn Transport>, TransportError> {
        let mut track = self.factory.open(path, kind)?;
        track.set_volume(volume)?;
        track.start()?;
        Ok(track)
    }

    fn has_track(&self, kind: TrackKind) -> bool {
        self.tracks.iter().any(|(k, _)| *k == kind)
    }

    /// Position of the authoritative track.
    fn clock(&self) -> Duration {
        self.tracks
            .iter()
            .find(|(k, _)| *k == TrackKind::Video)
            .or_else(|| {
                self.tracks
                    .iter()
                    .find(|(k, _)| *k == TrackKind::Instrumental)
            })
            .map(|(_, t)| t.elapsed())
            .unwrap_or_default()
    }

    fn sync_lyrics(&mut self, elapsed: Duration) {
        let Some(song) = &self.song else {
            return;
        };
        let shown = self.cursor.advance(&song.timeline, elapsed.as_secs_f64());
        let identity = song.identity.clone();

        for display in shown {
            self.current_lyric = Some(display.clone());
            self.emit(PlaybackEvent::Progress {
                identity: identity.clone(),
                elapsed,
                lyric: Some(display),
            });
        }
    }

    fn finish(&mut self, reason: CompletionReason) {
        for (_, track) in &mut self.tracks {
            track.stop();
        }
        self.tracks.clear();
        self.current_lyric = None;
        self.state = PlaybackState::Completed;

        if let Some(song) = self.song.take() {
            log::info!("playback: '{}' completed ({reason:?})", song.identity);
            self.emit(PlaybackEvent::Completed {
                identity: song.identity,
                reason,
            });
        }
    }

    fn emit(&self, event: PlaybackEvent) {
        if self.events.send(event).is_err() {
            log::debug!("playback: event receiver dropped");
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collab::mock::MockTransportFactory;
    use crate::song::{LyricLine, LyricTimeline};

    fn song(timeline: LyricTimeline, video: bool) -> PreparedSong {
        PreparedSong {
            identity: SongIdentity::new("Artist", "Title"),
            instrumental: "/cache/instrumental.wav".into(),
            vocals: Some("/cache/vocals.wav".into()),
            video: video.then(|| "/cache/video.mp4".into()),
            timeline,
            source: "src".into(),
        }
    }

    fn lyrics() -> LyricTimeline {
        LyricTimeline::new(vec![
            LyricLine::new(0.0, "zero"),
            LyricLine::new(2.0, "two"),
            LyricLine::new(4.0, "four"),
        ])
    }

    fn engine(
        factory: MockTransportFactory,
    ) -> (
        PlaybackEngine,
        Arc<MockTransportFactory>,
        mpsc::UnboundedReceiver<PlaybackEvent>,
    ) {
        let factory = Arc::new(factory);
        let (tx, rx) = mpsc::unbounded_channel();
        let engine = PlaybackEngine::new(factory.clone(), tx, false);
        (engine, factory, rx)
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<PlaybackEvent>) -> Vec<PlaybackEvent> {
        let mut out = Vec::new();
        while let Ok(e) = rx.try_recv() {
            out.push(e);
        }
        out
    }

    fn lyric_texts(events: &[PlaybackEvent]) -> Vec<String> {
        events
            .iter()
            .filter_map(|e| match e {
                PlaybackEvent::Progress {
                    lyric: Some(d), ..
                } => Some(d.now_showing.text.clone()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn load_starts_every_track_with_vocals_muted() {
        let (mut engine, factory, mut rx) = engine(MockTransportFactory::endless());
        engine.load(song(lyrics(), true)).unwrap();

        assert_eq!(engine.state(), PlaybackState::Playing);
        assert_eq!(factory.opened().len(), 3);
        assert_eq!(factory.last(TrackKind::Vocals).unwrap().volume, 0.0);
        assert!(factory.last(TrackKind::Instrumental).unwrap().started);

        let events = drain(&mut rx);
        assert!(matches!(
            events[0],
            PlaybackEvent::Started {
                has_vocals: true,
                has_video: true,
                ..
            }
        ));
        // The line at 0.0 s is shown immediately.
        assert_eq!(lyric_texts(&events), vec!["zero"]);
    }

    #[test]
    fn load_while_playing_is_invalid() {
        let (mut engine, _, _rx) = engine(MockTransportFactory::endless());
        engine.load(song(lyrics(), false)).unwrap();
        let err = engine.load(song(lyrics(), false)).unwrap_err();
        assert!(matches!(
            err,
            PlaybackError::InvalidState {
                state: PlaybackState::Playing,
                ..
            }
        ));
    }

    #[test]
    fn pause_from_idle_is_a_no_op() {
        let (mut engine, _, mut rx) = engine(MockTransportFactory::endless());
        assert!(!engine.pause());
        assert!(!engine.resume());
        assert_eq!(engine.state(), PlaybackState::Idle);
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn skip_from_paused_completes_without_resuming() {
        let (mut engine, factory, mut rx) = engine(MockTransportFactory::endless());
        engine.load(song(lyrics(), false)).unwrap();
        assert!(engine.pause());
        drain(&mut rx);

        assert!(engine.skip());

        assert_eq!(engine.state(), PlaybackState::Completed);
        assert!(engine.current_lyric().is_none());
        let inst = factory.last(TrackKind::Instrumental).unwrap();
        assert!(inst.paused, "tracks are stopped, never resumed");
        assert!(inst.stopped);
        assert_eq!(
            drain(&mut rx),
            vec![PlaybackEvent::Completed {
                identity: SongIdentity::new("Artist", "Title"),
                reason: CompletionReason::Skipped,
            }]
        );
    }

    #[test]
    fn skip_when_idle_does_nothing() {
        let (mut engine, _, mut rx) = engine(MockTransportFactory::endless());
        assert!(!engine.skip());
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn lyrics_follow_the_video_clock() {
        let (mut engine, factory, mut rx) = engine(MockTransportFactory::endless());
        engine.load(song(lyrics(), true)).unwrap();
        drain(&mut rx);

        for handle in factory.opened() {
            let mut s = handle.lock().unwrap();
            s.elapsed = if s.kind == TrackKind::Video {
                Duration::from_secs_f64(2.5)
            } else {
                Duration::ZERO
            };
        }
        engine.tick();

        assert_eq!(lyric_texts(&drain(&mut rx)), vec!["two"]);
        assert_eq!(engine.current_lyric().unwrap().up_next.as_ref().unwrap().text, "four");
    }

    #[test]
    fn paused_engine_does_not_advance_lyrics() {
        let (mut engine, factory, mut rx) = engine(MockTransportFactory::endless());
        engine.load(song(lyrics(), false)).unwrap();
        engine.pause();
        drain(&mut rx);

        factory.set_elapsed(Duration::from_secs(10));
        engine.tick();
        assert!(drain(&mut rx).is_empty());

        engine.resume();
        engine.tick();
        assert_eq!(lyric_texts(&drain(&mut rx)), vec!["two", "four"]);
    }

    #[test]
    fn empty_timeline_plays_to_completion_without_error() {
        let (mut engine, _, mut rx) =
            engine(MockTransportFactory::finishing_after(3, Duration::from_millis(400)));
        engine.load(song(LyricTimeline::empty(), false)).unwrap();

        for _ in 0..10 {
            engine.tick();
        }

        assert_eq!(engine.state(), PlaybackState::Completed);
        let events = drain(&mut rx);
        assert!(!events
            .iter()
            .any(|e| matches!(e, PlaybackEvent::Error { .. })));
        assert!(lyric_texts(&events).is_empty());
        assert!(matches!(
            events.last(),
            Some(PlaybackEvent::Completed {
                reason: CompletionReason::Finished,
                ..
            })
        ));
    }

    #[test]
    fn instrumental_failure_reports_error_then_completion() {
        let (mut engine, _, mut rx) =
            engine(MockTransportFactory::endless().failing(TrackKind::Instrumental));
        let err = engine.load(song(lyrics(), false)).unwrap_err();

        assert!(matches!(err, PlaybackError::Transport(_)));
        assert_eq!(engine.state(), PlaybackState::Completed);
        let events = drain(&mut rx);
        assert!(matches!(events[0], PlaybackEvent::Error { .. }));
        assert!(matches!(
            events[1],
            PlaybackEvent::Completed {
                reason: CompletionReason::TransportFailed,
                ..
            }
        ));

        // The engine accepts the next song afterwards.
        assert!(matches!(
            engine.load(song(lyrics(), false)),
            Err(PlaybackError::Transport(_))
        ));
    }

    #[test]
    fn vocal_failure_is_not_fatal() {
        let (mut engine, _, mut rx) =
            engine(MockTransportFactory::endless().failing(TrackKind::Vocals));
        engine.load(song(lyrics(), false)).unwrap();
        assert_eq!(engine.state(), PlaybackState::Playing);
        assert!(matches!(
            drain(&mut rx)[0],
            PlaybackEvent::Started {
                has_vocals: false,
                ..
            }
        ));
    }

    #[test]
    fn vocal_setting_survives_the_next_load() {
        let (mut engine, factory, _rx) = engine(MockTransportFactory::endless());
        engine.load(song(lyrics(), false)).unwrap();
        engine.set_vocal_enabled(true);
        assert_eq!(factory.last(TrackKind::Vocals).unwrap().volume, 1.0);
        assert_eq!(engine.state(), PlaybackState::Playing);

        engine.skip();
        engine.load(song(lyrics(), false)).unwrap();
        assert_eq!(factory.last(TrackKind::Vocals).unwrap().volume, 1.0);
    }
}
