//! Normalized (artist, title) song identity and storage-key sanitising.
//!
//! Two requests whose identities compare equal are the same song for caching
//! purposes.  The storage key derived from an identity is safe to use as a
//! directory name on every platform the cache runs on.  When sanitising loses
//! information the key carries a short digest of the full identity, so
//! near-identical long titles still get their own directories.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Characters that are not allowed in a storage key on Windows or Unix.
const FORBIDDEN_KEY_CHARS: &[char] = &['\\', '/', ':', '*', '?', '"', '<', '>', '|'];

/// Storage keys longer than this many characters are truncated.
pub const MAX_KEY_CHARS: usize = 50;

/// Appended to a truncated storage key.
pub const TRUNCATION_MARKER: char = '…';

/// Hex digits of the identity digest appended to a lossy storage key.
const DIGEST_CHARS: usize = 8;

// ---------------------------------------------------------------------------
// SongIdentity
// ---------------------------------------------------------------------------

/// Normalized (artist, title) pair identifying one song.
///
/// Surrounding whitespace is trimmed and inner whitespace runs collapse to a
/// single space, so `"  Queen "` and `"Queen"` are the same artist.
///
/// ```
/// use karaoke_session::song::SongIdentity;
///
/// let a = SongIdentity::new(" Queen ", "Bohemian   Rhapsody");
/// let b = SongIdentity::new("Queen", "Bohemian Rhapsody");
/// assert_eq!(a, b);
/// assert_eq!(a.storage_key(), "Queen_Bohemian Rhapsody");
/// ```
///
/// Deserialised identities are normalized the same way as [`new`](Self::new).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "IdentityFields")]
pub struct SongIdentity {
    artist: String,
    title: String,
}

impl SongIdentity {
    pub fn new(artist: &str, title: &str) -> Self {
        Self {
            artist: normalize(artist),
            title: normalize(title),
        }
    }

    pub fn artist(&self) -> &str {
        &self.artist
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    /// Directory-safe key for this identity, `"{artist}_{title}"` sanitised
    /// with [`sanitize_key`].
    ///
    /// If sanitising changed the name, `~` and the first hex digits of a
    /// SHA-256 over the full identity are appended.
    pub fn storage_key(&self) -> String {
        let name = format!("{}_{}", self.artist, self.title);
        let key = sanitize_key(&name);
        if key == name {
            return key;
        }
        let digest = self.digest_hex();
        format!("{key}~{}", &digest[..DIGEST_CHARS])
    }

    fn digest_hex(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.artist.as_bytes());
        hasher.update([0x1f]);
        hasher.update(self.title.as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

#[derive(Deserialize)]
struct IdentityFields {
    artist: String,
    title: String,
}

impl From<IdentityFields> for SongIdentity {
    fn from(fields: IdentityFields) -> Self {
        Self::new(&fields.artist, &fields.title)
    }
}

impl fmt::Display for SongIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {}", self.artist, self.title)
    }
}

fn normalize(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

// ---------------------------------------------------------------------------
// sanitize_key
// ---------------------------------------------------------------------------

/// Make `name` safe to use as a single path component.
///
/// Forbidden path characters and control characters are stripped, trailing
/// dots and spaces are trimmed, and anything longer than [`MAX_KEY_CHARS`]
/// characters is cut and marked with [`TRUNCATION_MARKER`].
pub fn sanitize_key(name: &str) -> String {
    let stripped: String = name
        .chars()
        .filter(|c| !FORBIDDEN_KEY_CHARS.contains(c) && !c.is_control())
        .collect();
    let trimmed = stripped.trim_end_matches(['.', ' ']);

    if trimmed.chars().count() > MAX_KEY_CHARS {
        let mut key: String = trimmed.chars().take(MAX_KEY_CHARS).collect();
        key.push(TRUNCATION_MARKER);
        key
    } else {
        trimmed.to_string()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
