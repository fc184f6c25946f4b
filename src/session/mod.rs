//! Session controller: the single owner of the queue and the playback engine.
//!
//! # Architecture
//!
//! ```text
//! front ends ──SessionHandle──▶ mpsc<(SessionCommand, oneshot reply)>
//!                                          │
//!                                          ▼
//!                         SessionController::run()  (one tokio task)
//!                          ├─ QueueScheduler      (pure state machine)
//!                          ├─ PlaybackEngine      (sync, ticked)
//!                          ├─ PreparationPipeline (spawned, ≤ 1 in flight)
//!                          └─ session.json        (saved on every queue change)
//!                                          │
//!            broadcast<SessionEvent> ◀─────┤
//!            watch<SessionSnapshot>  ◀─────┘
//! ```
//!
//! All mutations are serialized through the command inbox, so readers of the
//! watch channel only ever see complete states.

pub mod controller;
pub mod state;

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, oneshot, watch};

use crate::cache::{CacheRecord, CacheStore};
use crate::collab::Resolver;
use crate::pipeline::PrepareStage;
use crate::playback::{CompletionReason, LyricDisplay, PlaybackState};
use crate::queue::{QueueError, QueueSnapshot};
use crate::song::{SearchResult, SongIdentity, SongRequest};

pub use controller::{SessionController, SessionOptions};
pub use state::SessionState;

// ---------------------------------------------------------------------------
// Commands, events, snapshots
// ---------------------------------------------------------------------------

/// Operations accepted by the controller.  Positions are 0-based.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionCommand {
    Enqueue(SongRequest),
    Remove(usize),
    Promote(usize),
    /// Resume when paused, otherwise start the queue.
    Play,
    Pause,
    Resume,
    Skip,
    SetVocals(bool),
    Shutdown,
}

/// Outward notifications, broadcast to every subscriber.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
    QueueChanged,
    Preparing {
        identity: SongIdentity,
        stage: PrepareStage,
    },
    Prepared {
        identity: SongIdentity,
        from_cache: bool,
    },
    Warning {
        identity: SongIdentity,
        message: String,
    },
    PreparationFailed {
        identity: SongIdentity,
        stage: PrepareStage,
        message: String,
    },
    NowPlaying {
        identity: SongIdentity,
    },
    Lyric(LyricDisplay),
    Paused,
    Resumed,
    SongFinished {
        identity: SongIdentity,
        reason: CompletionReason,
    },
    PlaybackError {
        identity: SongIdentity,
        message: String,
    },
    QueueEmpty,
}

/// Everything a front end needs to render the session.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SessionSnapshot {
    pub queue: QueueSnapshot,
    pub playback: PlaybackState,
    pub vocals_enabled: bool,
    pub lyric: Option<LyricDisplay>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("no entry at position {position} (queue has {len})")]
    InvalidPosition { position: usize, len: usize },

    #[error("session has shut down")]
    Closed,

    #[error("search failed: {0}")]
    Search(String),

    #[error("cache listing failed: {0}")]
    Cache(String),
}

impl From<QueueError> for SessionError {
    fn from(e: QueueError) -> Self {
        match e {
            QueueError::InvalidPosition { position, len } => {
                SessionError::InvalidPosition { position, len }
            }
        }
    }
}

pub(crate) type Reply = oneshot::Sender<Result<(), SessionError>>;

// ---------------------------------------------------------------------------
// SessionHandle
// ---------------------------------------------------------------------------

/// Cloneable front-end access to a running [`SessionController`].
#[derive(Clone)]
pub struct SessionHandle {
    commands: mpsc::Sender<(SessionCommand, Reply)>,
    events: broadcast::Sender<SessionEvent>,
    snapshot: watch::Receiver<SessionSnapshot>,
    resolver: Option<Arc<dyn Resolver>>,
    search_limit: usize,
    cache: CacheStore,
}

impl SessionHandle {
    /// Send `command` and wait until the controller has applied it.
    pub async fn send(&self, command: SessionCommand) -> Result<(), SessionError> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send((command, tx))
            .await
            .map_err(|_| SessionError::Closed)?;
        rx.await.map_err(|_| SessionError::Closed)?
    }

    pub async fn enqueue(&self, request: SongRequest) -> Result<(), SessionError> {
        self.send(SessionCommand::Enqueue(request)).await
    }

    pub async fn remove(&self, position: usize) -> Result<(), SessionError> {
        self.send(SessionCommand::Remove(position)).await
    }

    pub async fn promote(&self, position: usize) -> Result<(), SessionError> {
        self.send(SessionCommand::Promote(position)).await
    }

    pub async fn play(&self) -> Result<(), SessionError> {
        self.send(SessionCommand::Play).await
    }

    pub async fn pause(&self) -> Result<(), SessionError> {
        self.send(SessionCommand::Pause).await
    }

    pub async fn resume(&self) -> Result<(), SessionError> {
        self.send(SessionCommand::Resume).await
    }

    pub async fn skip(&self) -> Result<(), SessionError> {
        self.send(SessionCommand::Skip).await
    }

    pub async fn set_vocals(&self, enabled: bool) -> Result<(), SessionError> {
        self.send(SessionCommand::SetVocals(enabled)).await
    }

    pub async fn shutdown(&self) -> Result<(), SessionError> {
        self.send(SessionCommand::Shutdown).await
    }

    /// Latest published state.
    pub fn state(&self) -> SessionSnapshot {
        self.snapshot.borrow().clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Look up candidate songs.  Does not touch the queue.
    pub async fn search(&self, query: &str) -> Result<Vec<SearchResult>, SessionError> {
        let Some(resolver) = &self.resolver else {
            return Err(SessionError::Search("no resolver configured".into()));
        };
        resolver
            .search(query, self.search_limit)
            .await
            .map_err(|e| SessionError::Search(e.to_string()))
    }

    /// Songs already prepared on disk, sorted by identity.  Does not touch
    /// the queue.
    pub async fn cached(&self) -> Result<Vec<CacheRecord>, SessionError> {
        let cache = self.cache.clone();
        tokio::task::spawn_blocking(move || cache.list())
            .await
            .map_err(|e| SessionError::Cache(e.to_string()))
    }
}
