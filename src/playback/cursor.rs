//! Monotonic lyric cursor.

use crate::song::LyricTimeline;

use super::state::LyricDisplay;

/// Position in a [`LyricTimeline`]; only moves forward until [`reset`](Self::reset).
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LyricCursor {
    next: usize,
}

impl LyricCursor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        self.next = 0;
    }

    /// Emit every not-yet-shown line whose start is at or before
    /// `elapsed_secs`, each paired with the line after it.
    pub fn advance(&mut self, timeline: &LyricTimeline, elapsed_secs: f64) -> Vec<LyricDisplay> {
        let mut shown = Vec::new();
        while let Some(line) = timeline.get(self.next) {
            if line.start > elapsed_secs {
                break;
            }
            shown.push(LyricDisplay {
                index: self.next,
                now_showing: line.clone(),
                up_next: timeline.get(self.next + 1).cloned(),
                buffer: self.next % 2,
            });
            self.next += 1;
        }
        shown
    }
}
