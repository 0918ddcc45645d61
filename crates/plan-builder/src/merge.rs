//! Interval coalescing for per-pair contact windows.

use contact_plan::SimTime;

/// A half-open-ish time window `(start, end)` with `start < end`.
pub type Window = (SimTime, SimTime);

/// Coalesce overlapping or abutting windows into the minimal set of
/// non-overlapping, non-adjacent windows with the same union, sorted
/// ascending by start.
///
/// Single left-to-right sweep after the sort: when the next window starts
/// beyond the open window's end the open one is emitted, otherwise the open
/// window's end extends to the max of the two. Merging is idempotent and
/// independent of input order; zero-length windows carry no time and are
/// dropped up front.
pub fn merge_intervals(mut windows: Vec<Window>) -> Vec<Window> {
    windows.retain(|(start, end)| end > start);
    windows.sort_unstable();

    let mut merged = Vec::with_capacity(windows.len());
    let mut iter = windows.into_iter();
    let Some(mut open) = iter.next() else {
        return merged;
    };
    for (start, end) in iter {
        if start > open.1 {
            merged.push(open);
            open = (start, end);
        } else if end > open.1 {
            open.1 = end;
        }
    }
    merged.push(open);
    merged
}
