//! Fairness-rotated song queue and its one-song-ahead scheduler.
//!
//! * [`rotate`]: pure round-robin ordering across submitters.
//! * [`QueueScheduler`]: pending list, now playing, completed history and
//!   the prefetch state machine.  Every operation returns the
//!   [`SchedulerAction`]s its owner must carry out.

pub mod rotation;
pub mod scheduler;

use serde::{Deserialize, Serialize};

use crate::song::SongRequest;

pub use rotation::rotate;
pub use scheduler::{QueueError, QueueScheduler, QueueSnapshot, SchedulerAction};

/// A request waiting in the queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueEntry {
    pub request: SongRequest,
    pub submitter: String,
    /// Monotonic enqueue counter; orders entries within one submitter.
    pub seq: u64,
    /// Moved to the front explicitly; exempt from rotation.
    #[serde(default)]
    pub promoted: bool,
}

impl QueueEntry {
    pub fn new(request: SongRequest, seq: u64) -> Self {
        Self {
            submitter: request.submitter.clone(),
            request,
            seq,
            promoted: false,
        }
    }
}
