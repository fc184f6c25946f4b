//! Song preparation: cache lookup, then download → separate → transcribe →
//! (video) → store.
//!
//! # Architecture
//!
//! ```text
//! SessionController
//!        │ tokio::spawn (at most one at a time)
//!        ▼
//! PreparationPipeline::prepare(request, progress)
//!        │
//!        ├─ CacheStore::lookup ──── hit ──▶ Preparation { from_cache: true }
//!        │
//!        └─ miss ─▶ Downloader ─▶ Separator ─▶ Transcriber ─▶ VideoFetcher
//!                                                    │
//!                                    CacheStore::store ◀┘
//!                                                    │
//!                                                    ▼
//!                               Preparation { song, warnings, from_cache: false }
//! ```
//!
//! Download and separation failures are fatal ([`PrepareError`]); the other
//! stages degrade the result and add a [`PrepareWarning`].

pub mod runner;
pub mod state;

// ---------------------------------------------------------------------------
// Public re-exports
// ---------------------------------------------------------------------------

pub use runner::{Collaborators, PreparationPipeline};
pub use state::{
    no_progress, PrepareError, PrepareStage, PrepareWarning, Preparation, ProgressCallback,
};
