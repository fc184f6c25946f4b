//! Content-addressed on-disk cache of prepared songs.
//!
//! # Layout
//!
//! ```text
//! <cache root>/
//!   <storage key>/          e.g. "Queen_Bohemian Rhapsody"
//!     owner.json            identity that claimed the directory
//!     meta.json             CacheRecord (identity, source, artifact paths)
//!     source.<ext>          raw download (left in place for re-entry)
//!     instrumental.wav
//!     vocals.wav
//!     lyrics.lrc            [mm:ss.cc] timed text
//!     video.mp4             optional
//! ```
//!
//! A record is only returned by [`CacheStore::lookup`] when every artifact it
//! needs is physically present.

pub mod store;

use std::io::{self, Write};
use std::path::Path;

pub use store::{CacheError, CacheRecord, CacheStore, TrackArtifacts};

pub const META_FILE: &str = "meta.json";
pub const OWNER_FILE: &str = "owner.json";
pub const INSTRUMENTAL_FILE: &str = "instrumental.wav";
pub const VOCALS_FILE: &str = "vocals.wav";
pub const LYRICS_FILE: &str = "lyrics.lrc";
pub const VIDEO_FILE: &str = "video.mp4";

/// Write `contents` to `path` through a temporary sibling file and a rename,
/// so readers never observe a half-written file.
pub(crate) fn write_atomic(path: &Path, contents: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".tmp");
    let tmp = path.with_file_name(tmp_name);

    {
        let mut file = std::fs::File::create(&tmp)?;
        file.write_all(contents)?;
        file.sync_all()?;
    }
    std::fs::rename(&tmp, path)
}
