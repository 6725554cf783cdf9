//! Candidate frame construction for a sync's when clause.
//!
//! Matching is semi-naive: when an entry is scanned, only frames in which at
//! least one when pattern is bound to that entry are built. The other patterns
//! are matched against the whole current trace, so a multi-pattern rule can
//! join entries produced in different iterations of the same request.

use crate::frame::{Frame, Frames};
use crate::pattern::ActionPattern;
use crate::trace::ActionTrace;

/// Candidate frames plus whether they were truncated at the limit.
#[allow(missing_docs)]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Candidates {
    pub frames: Frames,
    pub truncated: bool,
}

/// Builds the frames of `when` anchored on trace entry `anchor`.
///
/// Frames are produced per anchored pattern position, in when-clause order,
/// and capped at `limit`.
#[must_use]
pub fn anchored_frames(
    when: &[ActionPattern],
    trace: &ActionTrace,
    anchor: u64,
    limit: usize,
) -> Candidates {
    let Some(entry) = trace.get(anchor) else {
        return Candidates::default();
    };

    let mut out: Vec<Frame> = Vec::new();
    let mut truncated = false;

    for (i, pattern) in when.iter().enumerate() {
        let Some(seed) = pattern.match_entry(entry) else {
            continue;
        };

        let mut frames = vec![seed];
        for (j, other) in when.iter().enumerate() {
            if i == j {
                continue;
            }
            let (joined, cut) = join_pattern(&frames, other, trace, limit);
            frames = joined;
            truncated |= cut;
            if frames.is_empty() {
                break;
            }
        }

        let room = limit.saturating_sub(out.len());
        if frames.len() > room {
            frames.truncate(room);
            truncated = true;
        }
        out.extend(frames);
        if out.len() >= limit {
            break;
        }
    }

    Candidates {
        frames: out.into(),
        truncated,
    }
}

/// Natural join of all matches of `when` over the whole trace, unanchored.
#[cfg(test)]
fn all_frames(when: &[ActionPattern], trace: &ActionTrace, limit: usize) -> Candidates {
    let mut frames = vec![Frame::new()];
    let mut truncated = false;
    for pattern in when {
        let (joined, cut) = join_pattern(&frames, pattern, trace, limit);
        frames = joined;
        truncated |= cut;
        if frames.is_empty() {
            break;
        }
    }
    Candidates {
        frames: frames.into(),
        truncated,
    }
}

fn join_pattern(
    frames: &[Frame],
    pattern: &ActionPattern,
    trace: &ActionTrace,
    limit: usize,
) -> (Vec<Frame>, bool) {
    let matches: Vec<Frame> = trace
        .find(&pattern.concept, &pattern.action)
        .filter_map(|e| pattern.match_entry(e))
        .collect();

    let mut out = Vec::new();
    for left in frames {
        for right in &matches {
            if let Some(f) = left.unify(right) {
                if out.len() >= limit {
                    return (out, true);
                }
                out.push(f);
            }
        }
    }
    (out, false)
}
