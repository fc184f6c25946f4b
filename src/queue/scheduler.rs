//! [`QueueScheduler`]: single-owner queue state machine.
//!
//! The scheduler never performs I/O.  Its owner (the session controller)
//! applies each returned [`SchedulerAction`]:
//!
//! ```text
//!  enqueue / remove / promote ──┐
//!  advance (song finished) ─────┼──▶ pump() ──▶ [StartPreparing | Play | Failed | QueueEmpty]
//!  preparation_finished ────────┘
//! ```
//!
//! Pump invariant: whenever no preparation is in flight, the head of the
//! pending list is either being prepared or already prepared ("ready").
//! When nothing is playing and the head is ready it is dequeued and played.

use serde::Serialize;
use thiserror::Error;

use crate::pipeline::PrepareError;
use crate::song::{PreparedSong, SongIdentity, SongRequest};

use super::{rotate, QueueEntry};

/// Work the owner of a [`QueueScheduler`] must carry out.
#[derive(Debug, Clone)]
pub enum SchedulerAction {
    /// Run the preparation pipeline for this request.
    StartPreparing(SongRequest),
    /// Hand this song to the playback engine.
    Play(PreparedSong),
    /// The head could not be prepared and was dropped from the queue.
    Failed {
        identity: SongIdentity,
        error: PrepareError,
    },
    /// Nothing left to play or prepare.
    QueueEmpty,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
    #[error("no entry at position {position} (queue has {len})")]
    InvalidPosition { position: usize, len: usize },
}

/// Consistent read-only copy of the scheduler state.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QueueSnapshot {
    pub now_playing: Option<QueueEntry>,
    pub pending: Vec<QueueEntry>,
    pub completed: Vec<SongIdentity>,
    pub preparing: Option<SongIdentity>,
    pub ready: Option<SongIdentity>,
}

// ---------------------------------------------------------------------------
// QueueScheduler
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct QueueScheduler {
    entries: Vec<QueueEntry>,
    completed: Vec<SongIdentity>,
    now_playing: Option<QueueEntry>,
    /// Identity of the one preparation in flight.
    preparing: Option<SongIdentity>,
    /// Prepared result for the current head.
    ready: Option<PreparedSong>,
    next_seq: u64,
}

impl QueueScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the pending list and history verbatim, without rotation.
    pub fn restore(&mut self, entries: Vec<QueueEntry>, completed: Vec<SongIdentity>) {
        self.next_seq = entries.iter().map(|e| e.seq + 1).max().unwrap_or(0);
        self.entries = entries;
        self.completed = completed;
        self.now_playing = None;
        self.preparing = None;
        self.ready = None;
    }

    // -----------------------------------------------------------------------
    // Mutations
    // -----------------------------------------------------------------------

    pub fn enqueue(&mut self, request: SongRequest) -> Vec<SchedulerAction> {
        log::info!(
            "queue: '{}' enqueued by {}",
            request.identity,
            request.submitter
        );
        self.entries.push(QueueEntry::new(request, self.next_seq));
        self.next_seq += 1;
        self.entries = rotate(&self.entries);
        self.pump()
    }

    /// Remove the pending entry at `position` (0 = head).
    ///
    /// A preparation already running for it is left to finish; its result is
    /// discarded because the identity no longer matches the head.
    pub fn remove(&mut self, position: usize) -> Result<Vec<SchedulerAction>, QueueError> {
        self.check_position(position)?;
        let removed = self.entries.remove(position);
        log::info!("queue: removed '{}'", removed.request.identity);
        self.entries = rotate(&self.entries);
        Ok(self.pump())
    }

    /// Move the entry at `position` to the head, bypassing rotation.
    pub fn promote_to_front(&mut self, position: usize) -> Result<Vec<SchedulerAction>, QueueError> {
        self.check_position(position)?;
        let mut entry = self.entries.remove(position);
        log::info!("queue: promoted '{}' to the front", entry.request.identity);
        entry.promoted = true;
        self.entries.insert(0, entry);
        Ok(self.pump())
    }

    /// The current song ended (naturally, skipped or failed in playback).
    pub fn advance(&mut self) -> Vec<SchedulerAction> {
        let finished = self.now_playing.take();
        if let Some(entry) = &finished {
            self.completed.push(entry.request.identity.clone());
        }

        let mut actions = self.pump();
        if finished.is_some() && self.is_idle() {
            actions.push(SchedulerAction::QueueEmpty);
        }
        actions
    }

    /// Accept the outcome of the preparation started for `identity`.
    pub fn preparation_finished(
        &mut self,
        identity: &SongIdentity,
        result: Result<PreparedSong, PrepareError>,
    ) -> Vec<SchedulerAction> {
        if self.preparing.as_ref() != Some(identity) {
            log::debug!("queue: ignoring stale preparation result for '{identity}'");
            return self.pump();
        }
        self.preparing = None;

        let is_head = self
            .entries
            .first()
            .is_some_and(|e| &e.request.identity == identity);

        let mut actions = Vec::new();
        let mut failed = false;
        match result {
            Ok(song) if is_head => self.ready = Some(song),
            Ok(_) => log::debug!("queue: '{identity}' is no longer the head; result discarded"),
            Err(error) if is_head => {
                log::warn!("queue: skipping '{identity}': {error}");
                self.entries.remove(0);
                actions.push(SchedulerAction::Failed {
                    identity: identity.clone(),
                    error,
                });
                failed = true;
            }
            Err(error) => {
                log::debug!("queue: failed preparation of removed '{identity}' ignored: {error}")
            }
        }

        actions.extend(self.pump());
        if failed && self.is_idle() {
            actions.push(SchedulerAction::QueueEmpty);
        }
        actions
    }

    /// Re-establish the prefetch invariant and start playback when possible.
    pub fn pump(&mut self) -> Vec<SchedulerAction> {
        let mut actions = Vec::new();

        let head = self.entries.first().map(|e| &e.request.identity);
        if self.ready.as_ref().is_some_and(|r| Some(&r.identity) != head) {
            log::debug!("queue: head changed, dropping prepared result");
            self.ready = None;
        }

        if self.now_playing.is_none() {
            if let Some(song) = self.ready.take() {
                let entry = self.entries.remove(0);
                log::info!("queue: now playing '{}'", entry.request.identity);
                self.now_playing = Some(entry);
                actions.push(SchedulerAction::Play(song));
            }
        }

        if self.preparing.is_none() && self.ready.is_none() {
            if let Some(head) = self.entries.first() {
                self.preparing = Some(head.request.identity.clone());
                actions.push(SchedulerAction::StartPreparing(head.request.clone()));
            }
        }

        actions
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    pub fn pending(&self) -> &[QueueEntry] {
        &self.entries
    }

    pub fn completed(&self) -> &[SongIdentity] {
        &self.completed
    }

    pub fn now_playing(&self) -> Option<&QueueEntry> {
        self.now_playing.as_ref()
    }

    pub fn is_playing(&self) -> bool {
        self.now_playing.is_some()
    }

    pub fn preparing(&self) -> Option<&SongIdentity> {
        self.preparing.as_ref()
    }

    /// Queue as it should be saved: the interrupted song first, then pending.
    pub fn persisted_queue(&self) -> Vec<QueueEntry> {
        self.now_playing
            .iter()
            .chain(self.entries.iter())
            .cloned()
            .collect()
    }

    pub fn snapshot(&self) -> QueueSnapshot {
        QueueSnapshot {
            now_playing: self.now_playing.clone(),
            pending: self.entries.clone(),
            completed: self.completed.clone(),
            preparing: self.preparing.clone(),
            ready: self.ready.as_ref().map(|s| s.identity.clone()),
        }
    }

    fn is_idle(&self) -> bool {
        self.entries.is_empty() && self.now_playing.is_none()
    }

    fn check_position(&self, position: usize) -> Result<(), QueueError> {
        if position < self.entries.len() {
            Ok(())
        } else {
            Err(QueueError::InvalidPosition {
                position,
                len: self.entries.len(),
            })
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
