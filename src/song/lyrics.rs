//! Time-aligned lyric lines and the `[mm:ss.cc]` timed-text format.
//!
//! A [`LyricTimeline`] is always sorted by start offset.  The persisted form
//! is one caption per line, each prefixed with a `[mm:ss.cc]` tag:
//!
//! ```text
//! [00:12.50]Is this the real life?
//! [00:16.04]Is this just fantasy?
//! ```
//!
//! Offsets are stored internally in whole centiseconds' worth of seconds, so
//! `parse(serialize(t)) == t` holds for every timeline produced by parsing.

use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// LyricLine
// ---------------------------------------------------------------------------

/// One caption: its start offset (seconds from song start) and its text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LyricLine {
    pub start: f64,
    pub text: String,
}

impl LyricLine {
    /// Build a line, rounding `start` to centiseconds and flattening the text
    /// onto a single trimmed line.
    pub fn new(start: f64, text: impl AsRef<str>) -> Self {
        let start = if start.is_finite() && start > 0.0 {
            from_centis(to_centis(start))
        } else {
            0.0
        };
        let text = text
            .as_ref()
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        Self { start, text }
    }
}

// ---------------------------------------------------------------------------
// LyricTimeline
// ---------------------------------------------------------------------------

/// Ordered sequence of [`LyricLine`]s with non-decreasing start offsets.
///
/// An empty timeline is valid: the song plays without captions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LyricTimeline {
    lines: Vec<LyricLine>,
}

impl LyricTimeline {
    /// Build a timeline, stable-sorting `lines` by start offset.
    pub fn new(mut lines: Vec<LyricLine>) -> Self {
        lines.sort_by(|a, b| a.start.total_cmp(&b.start));
        Self { lines }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> &[LyricLine] {
        &self.lines
    }

    pub fn get(&self, index: usize) -> Option<&LyricLine> {
        self.lines.get(index)
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Parse the timed-text format.
    ///
    /// Lines without a leading time tag (blank lines, `[ar:…]` metadata) are
    /// skipped.  A line carrying several leading tags yields one caption per
    /// tag, all with the same text.
    ///
    /// ```
    /// use karaoke_session::song::LyricTimeline;
    ///
    /// let t = LyricTimeline::parse_lrc("[ar:Queen]\n[00:05.00][01:05.00]Mama\n[00:01.50]Intro\n");
    /// let starts: Vec<f64> = t.lines().iter().map(|l| l.start).collect();
    /// assert_eq!(starts, vec![1.5, 5.0, 65.0]);
    /// ```
    pub fn parse_lrc(content: &str) -> Self {
        let mut lines = Vec::new();

        for raw in content.lines() {
            let mut rest = raw.trim_start_matches('\u{feff}').trim();
            let mut starts = Vec::new();

            while let Some(tag_body) = rest.strip_prefix('[') {
                let Some(close) = tag_body.find(']') else {
                    break;
                };
                match parse_timestamp(&tag_body[..close]) {
                    Some(centis) => starts.push(centis),
                    None => break,
                }
                rest = &tag_body[close + 1..];
            }

            for centis in starts {
                lines.push(LyricLine::new(from_centis(centis), rest));
            }
        }

        Self::new(lines)
    }

    /// Serialize to the timed-text format, one `[mm:ss.cc]text` per line.
    pub fn to_lrc(&self) -> String {
        let mut out = String::new();
        for line in &self.lines {
            out.push_str(&format_timestamp(line.start));
            out.push_str(&line.text);
            out.push('\n');
        }
        out
    }

    /// Read and parse a timed-text file.
    pub fn load(path: &Path) -> io::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(Self::parse_lrc(&content))
    }
}

// ---------------------------------------------------------------------------
// Timestamp helpers
// ---------------------------------------------------------------------------

fn to_centis(seconds: f64) -> u64 {
    (seconds * 100.0).round() as u64
}

fn from_centis(centis: u64) -> f64 {
    centis as f64 / 100.0
}

/// `[mm:ss.cc]` for `seconds`; minutes keep counting past 99.
pub fn format_timestamp(seconds: f64) -> String {
    let total = to_centis(seconds.max(0.0));
    let minutes = total / 6000;
    let secs = (total / 100) % 60;
    let centis = total % 100;
    format!("[{minutes:02}:{secs:02}.{centis:02}]")
}

/// Parse the inside of a time tag (`mm:ss`, `mm:ss.c`, `mm:ss.cc`, `mm:ss.mmm`)
/// into centiseconds.
fn parse_timestamp(tag: &str) -> Option<u64> {
    let (minutes, seconds) = tag.split_once(':')?;
    if minutes.is_empty() || !minutes.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let minutes: u64 = minutes.parse().ok()?;

    let (whole, fraction) = match seconds.split_once('.') {
        Some((whole, fraction)) => (whole, fraction),
        None => (seconds, ""),
    };
    if whole.is_empty() || !whole.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if !fraction.bytes().all(|b| b.is_ascii_digit()) || fraction.len() > 3 {
        return None;
    }
    let whole: u64 = whole.parse().ok()?;

    let fraction_centis = match fraction.len() {
        0 => 0,
        1 => fraction.parse::<u64>().ok()? * 10,
        2 => fraction.parse::<u64>().ok()?,
        // milliseconds, rounded to the nearest centisecond
        _ => (fraction.parse::<u64>().ok()? + 5) / 10,
    };

    minutes
        .checked_mul(6000)?
        .checked_add(whole.checked_mul(100)?)?
        .checked_add(fraction_centis)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
