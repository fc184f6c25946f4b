//! Persisted session state (`session.json`).
//!
//! ```json
//! { "queue": [ { "request": {…}, "submitter": "alice", "seq": 3, "promoted": false } ],
//!   "completed": [ { "artist": "Queen", "title": "Under Pressure" } ] }
//! ```

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::cache::write_atomic;
use crate::queue::QueueEntry;
use crate::song::SongIdentity;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    #[serde(default)]
    pub queue: Vec<QueueEntry>,
    #[serde(default)]
    pub completed: Vec<SongIdentity>,
}

impl SessionState {
    /// Load from `path`; a missing file is an empty session.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => {
                return Err(e).with_context(|| format!("reading {}", path.display()));
            }
        };
        serde_json::from_str::<Self>(&content).with_context(|| format!("parsing {}", path.display()))
    }

    /// Replace the file at `path` atomically.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_vec_pretty(self)?;
        write_atomic(path, &json).with_context(|| format!("writing {}", path.display()))
    }
}
