//! [`SessionController`]: actor loop composing scheduler, pipeline and engine.
//!
//! # Loop
//!
//! ```text
//! select! {
//!   command  ─▶ scheduler / engine call ─▶ publish ─▶ reply
//!   prepared ─▶ scheduler.preparation_finished ─▶ apply actions
//!   playback ─▶ Completed ⇒ scheduler.advance ─▶ apply actions
//!   tick     ─▶ engine.tick
//! }
//! ```
//!
//! Scheduler actions are applied in order: `StartPreparing` spawns the
//! pipeline, `Play` loads the engine, `Failed` / `QueueEmpty` are relayed.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::collab::{Resolver, TransportFactory};
use crate::pipeline::{PrepareError, Preparation, PreparationPipeline, ProgressCallback};
use crate::playback::{PlaybackEngine, PlaybackEvent};
use crate::queue::{QueueScheduler, SchedulerAction};
use crate::song::{SongIdentity, SongRequest};

use super::{
    Reply, SessionCommand, SessionError, SessionEvent, SessionHandle, SessionSnapshot,
    SessionState,
};

/// Capacity of the command inbox.
const COMMAND_QUEUE: usize = 64;
/// Capacity of the outward event channel; slow subscribers lag, never block.
const EVENT_CAPACITY: usize = 256;

/// Construction parameters for [`SessionController::new`].
#[derive(Clone)]
pub struct SessionOptions {
    /// Where the queue is persisted.
    pub state_file: PathBuf,
    /// Engine tick period.
    pub tick: Duration,
    pub vocals_enabled: bool,
    pub resolver: Option<Arc<dyn Resolver>>,
    pub search_limit: usize,
}

struct PreparedMsg {
    identity: SongIdentity,
    result: Result<Preparation, PrepareError>,
}

// ---------------------------------------------------------------------------
// SessionController
// ---------------------------------------------------------------------------

/// Owns all mutable session state.  Create with [`new`](Self::new), then
/// spawn [`run`](Self::run).
///
/// ```rust,no_run
/// # use std::sync::Arc;
/// # use karaoke_session::session::{SessionController, SessionOptions};
/// # async fn example(
/// #     pipeline: Arc<karaoke_session::pipeline::PreparationPipeline>,
/// #     factory: Arc<dyn karaoke_session::collab::TransportFactory>,
/// #     options: SessionOptions,
/// # ) {
/// let (controller, handle) = SessionController::new(pipeline, factory, options);
/// tokio::spawn(controller.run());
/// handle.play().await.ok();
/// # }
/// ```
pub struct SessionController {
    core: Core,
    commands: mpsc::Receiver<(SessionCommand, Reply)>,
    prepared: mpsc::UnboundedReceiver<PreparedMsg>,
    playback: mpsc::UnboundedReceiver<PlaybackEvent>,
    tick: Duration,
}

struct Core {
    scheduler: QueueScheduler,
    engine: PlaybackEngine,
    pipeline: Arc<PreparationPipeline>,
    state_file: PathBuf,
    events: broadcast::Sender<SessionEvent>,
    snapshot: watch::Sender<SessionSnapshot>,
    prepared_tx: mpsc::UnboundedSender<PreparedMsg>,
    in_flight: Option<JoinHandle<()>>,
}

impl SessionController {
    /// Build the controller, restoring the saved queue from
    /// `options.state_file`.  An unreadable state file is logged and the
    /// session starts empty.
    pub fn new(
        pipeline: Arc<PreparationPipeline>,
        factory: Arc<dyn TransportFactory>,
        options: SessionOptions,
    ) -> (Self, SessionHandle) {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_QUEUE);
        let (prepared_tx, prepared_rx) = mpsc::unbounded_channel();
        let (playback_tx, playback_rx) = mpsc::unbounded_channel();
        let (event_tx, _) = broadcast::channel(EVENT_CAPACITY);

        let mut scheduler = QueueScheduler::new();
        match SessionState::load_from(&options.state_file) {
            Ok(saved) => {
                if !saved.queue.is_empty() {
                    log::info!(
                        "session: restored {} queued song(s) from {}",
                        saved.queue.len(),
                        options.state_file.display()
                    );
                }
                scheduler.restore(saved.queue, saved.completed);
            }
            Err(e) => log::warn!("session: starting with an empty queue: {e:#}"),
        }

        let engine = PlaybackEngine::new(factory, playback_tx, options.vocals_enabled);
        let initial = SessionSnapshot {
            queue: scheduler.snapshot(),
            playback: engine.state(),
            vocals_enabled: engine.vocals_enabled(),
            lyric: None,
        };
        let (snapshot_tx, snapshot_rx) = watch::channel(initial);

        let handle = SessionHandle {
            commands: command_tx,
            events: event_tx.clone(),
            snapshot: snapshot_rx,
            resolver: options.resolver,
            search_limit: options.search_limit,
            cache: pipeline.cache().clone(),
        };

        let controller = Self {
            core: Core {
                scheduler,
                engine,
                pipeline,
                state_file: options.state_file,
                events: event_tx,
                snapshot: snapshot_tx,
                prepared_tx,
                in_flight: None,
            },
            commands: command_rx,
            prepared: prepared_rx,
            playback: playback_rx,
            tick: options.tick,
        };
        (controller, handle)
    }

    /// Run until a `Shutdown` command arrives or every handle is dropped.
    pub async fn run(self) {
        let Self {
            mut core,
            mut commands,
            mut prepared,
            mut playback,
            tick,
        } = self;

        let mut ticker = tokio::time::interval(tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let actions = core.scheduler.pump();
        core.apply(actions);
        core.publish();

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some((SessionCommand::Shutdown, reply)) => {
                        core.shutdown();
                        let _ = reply.send(Ok(()));
                        break;
                    }
                    Some((command, reply)) => {
                        let result = core.handle(command);
                        core.publish();
                        let _ = reply.send(result);
                    }
                    None => {
                        core.shutdown();
                        break;
                    }
                },
                Some(msg) = prepared.recv() => core.on_prepared(msg),
                Some(event) = playback.recv() => core.on_playback(event),
                _ = ticker.tick() => core.engine.tick(),
            }
            core.publish();
        }

        log::info!("session: controller stopped");
    }
}

// ---------------------------------------------------------------------------
// Core
// ---------------------------------------------------------------------------

impl Core {
    fn handle(&mut self, command: SessionCommand) -> Result<(), SessionError> {
        match command {
            SessionCommand::Enqueue(request) => {
                let actions = self.scheduler.enqueue(request);
                self.queue_changed();
                self.apply(actions);
            }
            SessionCommand::Remove(position) => {
                let actions = self.scheduler.remove(position)?;
                self.queue_changed();
                self.apply(actions);
            }
            SessionCommand::Promote(position) => {
                let actions = self.scheduler.promote_to_front(position)?;
                self.queue_changed();
                self.apply(actions);
            }
            SessionCommand::Play => {
                if self.engine.resume() {
                    self.emit(SessionEvent::Resumed);
                } else {
                    let actions = self.scheduler.pump();
                    self.apply(actions);
                }
            }
            SessionCommand::Pause => {
                if self.engine.pause() {
                    self.emit(SessionEvent::Paused);
                }
            }
            SessionCommand::Resume => {
                if self.engine.resume() {
                    self.emit(SessionEvent::Resumed);
                }
            }
            SessionCommand::Skip => {
                if !self.engine.skip() {
                    log::debug!("session: skip ignored, nothing is playing");
                }
            }
            SessionCommand::SetVocals(enabled) => self.engine.set_vocal_enabled(enabled),
            SessionCommand::Shutdown => self.shutdown(),
        }
        Ok(())
    }

    fn apply(&mut self, actions: Vec<SchedulerAction>) {
        for action in actions {
            match action {
                SchedulerAction::StartPreparing(request) => self.start_preparing(request),
                SchedulerAction::Play(song) => {
                    let identity = song.identity.clone();
                    if let Err(e) = self.engine.load(song) {
                        // A transport failure also arrives as a Completed event.
                        log::warn!("session: cannot play '{identity}': {e}");
                    }
                }
                SchedulerAction::Failed { identity, error } => {
                    self.emit(SessionEvent::PreparationFailed {
                        identity,
                        stage: error.stage(),
                        message: error.to_string(),
                    });
                }
                SchedulerAction::QueueEmpty => {
                    log::info!("session: queue is empty");
                    self.emit(SessionEvent::QueueEmpty);
                }
            }
        }
    }

    fn start_preparing(&mut self, request: SongRequest) {
        log::info!("session: preparing '{}'", request.identity);

        let pipeline = Arc::clone(&self.pipeline);
        let results = self.prepared_tx.clone();
        let events = self.events.clone();
        let progress: ProgressCallback = Arc::new(move |identity: &SongIdentity, stage| {
            let _ = events.send(SessionEvent::Preparing {
                identity: identity.clone(),
                stage,
            });
        });

        self.in_flight = Some(tokio::spawn(async move {
            let result = pipeline.prepare(&request, &progress).await;
            let _ = results.send(PreparedMsg {
                identity: request.identity,
                result,
            });
        }));
    }

    fn on_prepared(&mut self, msg: PreparedMsg) {
        self.in_flight = None;
        let PreparedMsg { identity, result } = msg;

        let result = match result {
            Ok(preparation) => {
                for warning in &preparation.warnings {
                    self.emit(SessionEvent::Warning {
                        identity: identity.clone(),
                        message: warning.to_string(),
                    });
                }
                self.emit(SessionEvent::Prepared {
                    identity: identity.clone(),
                    from_cache: preparation.from_cache,
                });
                Ok(preparation.song)
            }
            Err(e) => {
                log::warn!("session: {e}");
                Err(e)
            }
        };

        let actions = self.scheduler.preparation_finished(&identity, result);
        if actions
            .iter()
            .any(|a| matches!(a, SchedulerAction::Failed { .. }))
        {
            self.queue_changed();
        }
        self.apply(actions);
    }

    fn on_playback(&mut self, event: PlaybackEvent) {
        match event {
            PlaybackEvent::Started { identity, .. } => {
                self.emit(SessionEvent::NowPlaying { identity });
            }
            PlaybackEvent::Progress {
                lyric: Some(display),
                ..
            } => self.emit(SessionEvent::Lyric(display)),
            PlaybackEvent::Progress { .. } => {}
            PlaybackEvent::Completed { identity, reason } => {
                self.emit(SessionEvent::SongFinished { identity, reason });
                let actions = self.scheduler.advance();
                self.queue_changed();
                self.apply(actions);
            }
            PlaybackEvent::Error { identity, message } => {
                self.emit(SessionEvent::PlaybackError { identity, message });
            }
        }
    }

    fn shutdown(&mut self) {
        log::info!("session: shutting down");
        if let Some(task) = self.in_flight.take() {
            task.abort();
        }
        self.engine.shutdown();
        self.persist();
    }

    fn queue_changed(&mut self) {
        self.persist();
        self.emit(SessionEvent::QueueChanged);
    }

    fn persist(&self) {
        let state = SessionState {
            queue: self.scheduler.persisted_queue(),
            completed: self.scheduler.completed().to_vec(),
        };
        if let Err(e) = state.save_to(&self.state_file) {
            log::error!("session: failed to save queue: {e:#}");
        }
    }

    fn publish(&self) {
        let next = SessionSnapshot {
            queue: self.scheduler.snapshot(),
            playback: self.engine.state(),
            vocals_enabled: self.engine.vocals_enabled(),
            lyric: self.engine.current_lyric().cloned(),
        };
        self.snapshot.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
    }

    fn emit(&self, event: SessionEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::path::Path;

    use tempfile::{tempdir, TempDir};
    use tokio::sync::broadcast::error::RecvError;

    use super::*;
    use crate::cache::CacheStore;
    use crate::collab::mock::{
        MockDownloader, MockResolver, MockSeparator, MockTranscriber, MockTransportFactory,
    };
    use crate::collab::{Downloader, Transcriber};
    use crate::pipeline::{Collaborators, PrepareStage};
    use crate::playback::{CompletionReason, PlaybackState};
    use crate::song::SearchResult;

    const WAIT: Duration = Duration::from_secs(5);

    struct Setup {
        dir: TempDir,
        downloader: Arc<dyn Downloader>,
        transcriber: Arc<dyn Transcriber>,
        factory: Arc<MockTransportFactory>,
    }

    impl Setup {
        fn new() -> Self {
            Self {
                dir: tempdir().expect("temp dir"),
                downloader: Arc::new(MockDownloader::default()),
                transcriber: Arc::new(MockTranscriber::two_lines()),
                factory: Arc::new(MockTransportFactory::finishing_after(
                    3,
                    Duration::from_millis(200),
                )),
            }
        }

        fn state_file(&self) -> PathBuf {
            self.dir.path().join("session.json")
        }

        fn start(&self) -> SessionHandle {
            let (controller, handle) = self.build();
            tokio::spawn(controller.run());
            handle
        }

        fn build(&self) -> (SessionController, SessionHandle) {
            let collab = Collaborators {
                downloader: Arc::clone(&self.downloader),
                separator: Arc::new(MockSeparator::default()),
                transcriber: Arc::clone(&self.transcriber),
                video: None,
            };
            let pipeline = Arc::new(PreparationPipeline::new(
                CacheStore::new(self.dir.path().join("cache")),
                collab,
            ));
            let resolver = MockResolver {
                results: vec![SearchResult {
                    title: "Waterloo".into(),
                    artist: "ABBA".into(),
                    duration_secs: Some(164.0),
                    source: "https://example.com/waterloo".into(),
                }],
            };
            SessionController::new(
                pipeline,
                self.factory.clone(),
                SessionOptions {
                    state_file: self.state_file(),
                    tick: Duration::from_millis(10),
                    vocals_enabled: false,
                    resolver: Some(Arc::new(resolver)),
                    search_limit: 5,
                },
            )
        }
    }

    fn req(submitter: &str, title: &str) -> SongRequest {
        SongRequest::new("Artist", title, format!("src-{title}"), submitter)
    }

    async fn wait_for(
        rx: &mut broadcast::Receiver<SessionEvent>,
        mut pred: impl FnMut(&SessionEvent) -> bool,
    ) -> SessionEvent {
        tokio::time::timeout(WAIT, async {
            loop {
                match rx.recv().await {
                    Ok(event) if pred(&event) => return event,
                    Ok(_) | Err(RecvError::Lagged(_)) => continue,
                    Err(RecvError::Closed) => panic!("event channel closed"),
                }
            }
        })
        .await
        .expect("timed out waiting for event")
    }

    fn now_playing_title(event: &SessionEvent) -> Option<String> {
        match event {
            SessionEvent::NowPlaying { identity } => Some(identity.title().to_string()),
            _ => None,
        }
    }

    fn saved_titles(path: &Path) -> Vec<String> {
        SessionState::load_from(path)
            .unwrap()
            .queue
            .iter()
            .map(|e| e.request.identity.title().to_string())
            .collect()
    }

    #[tokio::test]
    async fn two_submitters_play_interleaved() {
        let setup = Setup::new();
        let handle = setup.start();
        let mut events = handle.subscribe();

        for (who, title) in [
            ("alice", "alice1"),
            ("bob", "bob1"),
            ("alice", "alice2"),
            ("bob", "bob2"),
        ] {
            handle.enqueue(req(who, title)).await.unwrap();
        }

        let mut order = Vec::new();
        while order.len() < 4 {
            let e = wait_for(&mut events, |e| now_playing_title(e).is_some()).await;
            order.extend(now_playing_title(&e));
        }
        assert_eq!(order, vec!["alice1", "bob1", "alice2", "bob2"]);

        wait_for(&mut events, |e| matches!(e, SessionEvent::QueueEmpty)).await;
        // A round trip guarantees the snapshot after QueueEmpty is published.
        handle.play().await.unwrap();
        let state = handle.state();
        assert_eq!(state.queue.completed.len(), 4);
        assert!(state.queue.pending.is_empty());
    }

    #[tokio::test]
    async fn transcription_failure_still_plays_to_the_end() {
        let mut setup = Setup::new();
        setup.transcriber = Arc::new(MockTranscriber::failing());
        let handle = setup.start();
        let mut events = handle.subscribe();

        handle.enqueue(req("alice", "quiet")).await.unwrap();

        wait_for(&mut events, |e| matches!(e, SessionEvent::Warning { .. })).await;
        let mut saw_error = false;
        let finished = wait_for(&mut events, |e| {
            saw_error |= matches!(e, SessionEvent::PlaybackError { .. });
            matches!(e, SessionEvent::SongFinished { .. })
        })
        .await;

        assert!(!saw_error);
        assert!(matches!(
            finished,
            SessionEvent::SongFinished {
                reason: CompletionReason::Finished,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn failed_head_is_reported_and_skipped() {
        let mut setup = Setup::new();
        setup.downloader = Arc::new(MockDownloader::failing_for(&["src-broken"]));
        let handle = setup.start();
        let mut events = handle.subscribe();

        handle.enqueue(req("alice", "broken")).await.unwrap();
        handle.enqueue(req("bob", "fine")).await.unwrap();

        let failed = wait_for(&mut events, |e| {
            matches!(e, SessionEvent::PreparationFailed { .. })
        })
        .await;
        match failed {
            SessionEvent::PreparationFailed {
                identity, stage, ..
            } => {
                assert_eq!(identity.title(), "broken");
                assert_eq!(stage, PrepareStage::Download);
            }
            other => panic!("unexpected {other:?}"),
        }

        let playing = wait_for(&mut events, |e| now_playing_title(e).is_some()).await;
        assert_eq!(now_playing_title(&playing).as_deref(), Some("fine"));
        assert!(handle
            .state()
            .queue
            .completed
            .iter()
            .all(|id| id.title() != "broken"));
    }

    #[tokio::test]
    async fn pause_resume_and_skip() {
        let mut setup = Setup::new();
        setup.factory = Arc::new(MockTransportFactory::endless());
        let handle = setup.start();
        let mut events = handle.subscribe();

        handle.enqueue(req("alice", "long")).await.unwrap();
        wait_for(&mut events, |e| now_playing_title(e).is_some()).await;

        handle.pause().await.unwrap();
        assert_eq!(handle.state().playback, PlaybackState::Paused);

        handle.play().await.unwrap();
        assert_eq!(handle.state().playback, PlaybackState::Playing);

        handle.skip().await.unwrap();
        let finished = wait_for(&mut events, |e| {
            matches!(e, SessionEvent::SongFinished { .. })
        })
        .await;
        assert!(matches!(
            finished,
            SessionEvent::SongFinished {
                reason: CompletionReason::Skipped,
                ..
            }
        ));
        wait_for(&mut events, |e| matches!(e, SessionEvent::QueueEmpty)).await;
    }

    #[tokio::test]
    async fn queue_survives_a_restart() {
        let mut setup = Setup::new();
        setup.factory = Arc::new(MockTransportFactory::endless());
        let handle = setup.start();
        let mut events = handle.subscribe();

        handle.enqueue(req("alice", "one")).await.unwrap();
        wait_for(&mut events, |e| now_playing_title(e).is_some()).await;
        handle.enqueue(req("bob", "two")).await.unwrap();
        handle.enqueue(req("alice", "three")).await.unwrap();
        handle.shutdown().await.unwrap();

        assert_eq!(saved_titles(&setup.state_file()), vec!["one", "two", "three"]);

        let (_controller, restored) = setup.build();
        let pending: Vec<_> = restored
            .state()
            .queue
            .pending
            .iter()
            .map(|e| e.request.identity.title().to_string())
            .collect();
        assert_eq!(pending, vec!["one", "two", "three"]);
    }

    #[tokio::test]
    async fn invalid_position_is_rejected() {
        let setup = Setup::new();
        let handle = setup.start();
        assert_eq!(
            handle.remove(2).await,
            Err(SessionError::InvalidPosition {
                position: 2,
                len: 0
            })
        );
    }

    #[tokio::test]
    async fn vocals_toggle_reaches_the_track() {
        let mut setup = Setup::new();
        setup.factory = Arc::new(MockTransportFactory::endless());
        let handle = setup.start();
        let mut events = handle.subscribe();

        handle.enqueue(req("alice", "duet")).await.unwrap();
        wait_for(&mut events, |e| now_playing_title(e).is_some()).await;

        handle.set_vocals(true).await.unwrap();
        assert!(handle.state().vocals_enabled);
        let vocals = setup
            .factory
            .last(crate::collab::TrackKind::Vocals)
            .expect("vocal track opened");
        assert_eq!(vocals.volume, 1.0);
    }

    #[tokio::test]
    async fn search_goes_through_the_resolver() {
        let setup = Setup::new();
        let handle = setup.start();
        let hits = handle.search("waterloo").await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].artist, "ABBA");
    }

    #[tokio::test]
    async fn cached_lists_prepared_songs_without_queueing() {
        let setup = Setup::new();
        let handle = setup.start();
        assert!(handle.cached().await.unwrap().is_empty());

        // Prepare straight into the session's cache root, bypassing the queue.
        let warm = PreparationPipeline::new(
            CacheStore::new(setup.dir.path().join("cache")),
            Collaborators {
                downloader: Arc::clone(&setup.downloader),
                separator: Arc::new(MockSeparator::default()),
                transcriber: Arc::clone(&setup.transcriber),
                video: None,
            },
        );
        warm.prepare(&req("alice", "warm"), &crate::pipeline::no_progress())
            .await
            .unwrap();

        let cached = handle.cached().await.unwrap();
        assert_eq!(cached.len(), 1);
        assert_eq!(cached[0].identity.title(), "warm");
        assert_eq!(cached[0].source, "src-warm");
        assert!(handle.state().queue.pending.is_empty());
        assert!(handle.state().queue.now_playing.is_none());
    }

    #[tokio::test]
    async fn commands_after_shutdown_fail_closed() {
        let setup = Setup::new();
        let handle = setup.start();
        handle.shutdown().await.unwrap();
        assert_eq!(handle.play().await, Err(SessionError::Closed));
    }
}
