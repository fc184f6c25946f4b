//! Round-robin fairness ordering.
//!
//! ```text
//! input : a1 a2 a3 b1 c1 b2          (a/b/c = submitters, n = enqueue order)
//! groups: a:[a1 a2 a3] b:[b1 b2] c:[c1]
//! output: a1 b1 c1 | a2 b2 | a3      (one pick per group per pass)
//! ```
//!
//! Group order is the order in which submitters first appear in the input.
//! Promoted entries are placed first, in the order they already have.

use super::QueueEntry;

/// Reorder `entries` so no submitter gets a second slot before every other
/// submitter with pending songs has had one.
pub fn rotate(entries: &[QueueEntry]) -> Vec<QueueEntry> {
    let mut out = Vec::with_capacity(entries.len());
    let mut groups: Vec<(&str, Vec<&QueueEntry>)> = Vec::new();

    for entry in entries {
        if entry.promoted {
            out.push(entry.clone());
            continue;
        }
        match groups.iter_mut().find(|(s, _)| *s == entry.submitter) {
            Some((_, group)) => group.push(entry),
            None => groups.push((entry.submitter.as_str(), vec![entry])),
        }
    }

    for (_, group) in &mut groups {
        group.sort_by_key(|e| e.seq);
    }

    let mut iters: Vec<_> = groups.into_iter().map(|(_, g)| g.into_iter()).collect();
    loop {
        let before = out.len();
        for it in &mut iters {
            if let Some(entry) = it.next() {
                out.push(entry.clone());
            }
        }
        if out.len() == before {
            break;
        }
    }
    out
}
