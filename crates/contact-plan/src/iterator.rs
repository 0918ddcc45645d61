//! Event-driven iteration over a loaded plan.
//!
//! Two binary min-heaps over the same entries: upcoming ordered by start
//! time, active ordered by end time. Whichever top is earlier is the next
//! instant anything changes. Pure logic; no I/O and no clock of its own.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::Arc;

use crate::{entry::PlanEvent, SimTime};

/// Optional clamp on the gap between consecutive wake-ups.
///
/// `min_timestep` keeps same-instant storms from producing zero-length
/// steps; `max_timestep` forces periodic wake-ups through long static
/// stretches of the plan so dependent polling logic still runs.
#[derive(Debug, Clone, Copy)]
pub struct TimestepBounds {
    pub min_timestep: SimTime,
    pub max_timestep: SimTime,
}

/// Upcoming-heap key: ascending start time.
struct ByStart<E>(Arc<E>);

/// Active-heap key: ascending end time.
struct ByEnd<E>(Arc<E>);

impl<E: PlanEvent> Ord for ByStart<E> {
    fn cmp(&self, other: &Self) -> Ordering {
        // reversed: BinaryHeap is a max-heap
        other.0.start_time().cmp(&self.0.start_time())
    }
}

impl<E: PlanEvent> Ord for ByEnd<E> {
    fn cmp(&self, other: &Self) -> Ordering {
        other.0.end_time().cmp(&self.0.end_time())
    }
}

impl<E: PlanEvent> PartialOrd for ByStart<E> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<E: PlanEvent> PartialOrd for ByEnd<E> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<E: PlanEvent> PartialEq for ByStart<E> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl<E: PlanEvent> PartialEq for ByEnd<E> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl<E: PlanEvent> Eq for ByStart<E> {}
impl<E: PlanEvent> Eq for ByEnd<E> {}

/// Cursor over a sorted contact (or interference) schedule.
///
/// Invariant: at any simulated instant every entry is in exactly one of
/// upcoming, active, or already-expired-and-removed; `all` additionally
/// retains every entry for the lifetime of the iterator.
pub struct PlanIterator<E: PlanEvent> {
    upcoming: BinaryHeap<ByStart<E>>,
    active: BinaryHeap<ByEnd<E>>,
    all: Vec<Arc<E>>,
    bounds: Option<TimestepBounds>,
}

impl<E: PlanEvent> Default for PlanIterator<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: PlanEvent> PlanIterator<E> {
    pub fn new() -> Self {
        Self {
            upcoming: BinaryHeap::new(),
            active: BinaryHeap::new(),
            all: Vec::new(),
            bounds: None,
        }
    }

    pub fn with_bounds(bounds: TimestepBounds) -> Self {
        Self {
            bounds: Some(bounds),
            ..Self::new()
        }
    }

    /// Load entries into the schedule. Everything starts in the upcoming
    /// heap: even entries whose window already began must flow through
    /// [`changes_until`](Self::changes_until) to become active, so one code
    /// path handles "open at load time" and "opens later". Disabled entries
    /// are retained in `all` but never scheduled.
    pub fn set_events(&mut self, events: impl IntoIterator<Item = E>) {
        for event in events {
            let event = Arc::new(event);
            if event.enabled() {
                self.upcoming.push(ByStart(Arc::clone(&event)));
            }
            self.all.push(event);
        }
    }

    /// The next instant anything changes: the earlier of the soonest
    /// activation and the soonest expiry, clamped into
    /// `[now + min_timestep, now + max_timestep]` when bounds are
    /// configured. `None` once both heaps are empty.
    pub fn next_change(&self, now: SimTime) -> Option<SimTime> {
        let next_start = self.upcoming.peek().map(|e| e.0.start_time());
        let next_end = self.active.peek().map(|e| e.0.end_time());
        let next = match (next_start, next_end) {
            (Some(s), Some(e)) => s.min(e),
            (Some(s), None) => s,
            (None, Some(e)) => e,
            (None, None) => return None,
        };
        Some(match self.bounds {
            Some(b) => next.max(now + b.min_timestep).min(now + b.max_timestep),
            None => next,
        })
    }

    /// Every change up to and including `time`: expired entries
    /// (`end_time <= time`, removed from active) followed by newly-active
    /// ones (`start_time <= time`, moved into active), each in heap-pop
    /// order. An entry whose whole window has already passed is reported
    /// once, as expired.
    ///
    /// The two kinds are NOT merged into one chronologically sorted
    /// sequence; callers needing strict order across both must re-sort.
    pub fn changes_until(&mut self, time: SimTime) -> Vec<Arc<E>> {
        let mut expired = Vec::new();
        let mut activated = Vec::new();

        while let Some(top) = self.active.peek() {
            if top.0.end_time() > time {
                break;
            }
            if let Some(entry) = self.active.pop() {
                expired.push(entry.0);
            }
        }

        while let Some(top) = self.upcoming.peek() {
            if top.0.start_time() > time {
                break;
            }
            if let Some(entry) = self.upcoming.pop() {
                let event = entry.0;
                if event.end_time() <= time {
                    // opened and closed within this step
                    expired.push(event);
                } else {
                    self.active.push(ByEnd(Arc::clone(&event)));
                    activated.push(event);
                }
            }
        }

        expired.extend(activated);
        expired
    }

    /// Snapshot of every entry ever loaded (read-only history/lookup).
    pub fn all_events(&self) -> Vec<Arc<E>> {
        self.all.clone()
    }

    /// Snapshot of the currently open entries. A copy, never the live heap.
    pub fn active_events(&self) -> Vec<Arc<E>> {
        self.active.iter().map(|e| Arc::clone(&e.0)).collect()
    }

    /// Snapshot of the not-yet-open entries. A copy, never the live heap.
    pub fn upcoming_events(&self) -> Vec<Arc<E>> {
        self.upcoming.iter().map(|e| Arc::clone(&e.0)).collect()
    }

    /// True once every entry has expired.
    pub fn is_exhausted(&self) -> bool {
        self.upcoming.is_empty() && self.active.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::ContactPlanEntry;

    fn contact(start: SimTime, end: SimTime) -> ContactPlanEntry {
        ContactPlanEntry::new(1, 2, start, end, 9600, 100)
    }

    #[test]
    fn everything_starts_upcoming() {
        let mut it = PlanIterator::new();
        it.set_events(vec![contact(-5, 20), contact(10, 30)]);
        assert_eq!(it.upcoming_events().len(), 2);
        assert!(it.active_events().is_empty());
        // the past-dated entry still flows through changes_until
        let changes = it.changes_until(0);
        assert_eq!(changes.len(), 1);
        assert_eq!(it.active_events().len(), 1);
    }

    #[test]
    fn iterator_invariant_scenario() {
        // A(10,20), B(15,25), C(30,40)
        let mut it = PlanIterator::new();
        it.set_events(vec![contact(10, 20), contact(15, 25), contact(30, 40)]);

        let changes = it.changes_until(22);
        // A expired, B activated, C untouched
        assert_eq!(changes.len(), 2);
        assert_eq!((changes[0].start_time, changes[0].end_time), (10, 20));
        assert_eq!((changes[1].start_time, changes[1].end_time), (15, 25));
        assert_eq!(it.active_events().len(), 1);
        assert_eq!(it.upcoming_events().len(), 1);

        // B's remaining end, not C's start
        assert_eq!(it.next_change(22), Some(25));
    }

    #[test]
    fn next_change_clamping() {
        let bounds = TimestepBounds {
            min_timestep: 5,
            max_timestep: 50,
        };
        let t = 100;

        let mut near = PlanIterator::with_bounds(bounds);
        near.set_events(vec![contact(t + 3, t + 200)]);
        assert_eq!(near.next_change(t), Some(t + 5));

        let mut far = PlanIterator::with_bounds(bounds);
        far.set_events(vec![contact(t + 100, t + 200)]);
        assert_eq!(far.next_change(t), Some(t + 50));

        let empty: PlanIterator<ContactPlanEntry> = PlanIterator::with_bounds(bounds);
        assert_eq!(empty.next_change(t), None);
    }

    #[test]
    fn expired_before_activated_in_one_batch() {
        let mut it = PlanIterator::new();
        it.set_events(vec![contact(0, 10), contact(5, 50)]);
        assert!(!it.changes_until(2).is_empty());
        let changes = it.changes_until(12);
        // (0,10) expires, (5,50) activates; expiry reported first
        assert_eq!(changes.len(), 2);
        assert_eq!(changes[0].end_time, 10);
        assert_eq!(changes[1].end_time, 50);
    }

    #[test]
    fn whole_window_in_the_past_reports_once_as_expired() {
        let mut it = PlanIterator::new();
        it.set_events(vec![contact(10, 20)]);
        let changes = it.changes_until(100);
        assert_eq!(changes.len(), 1);
        assert!(it.is_exhausted());
        assert_eq!(it.next_change(100), None);
    }

    #[test]
    fn disabled_entries_never_schedule() {
        let mut disabled = contact(0, 10);
        disabled.enabled = false;
        let mut it = PlanIterator::new();
        it.set_events(vec![disabled, contact(5, 15)]);
        assert_eq!(it.all_events().len(), 2);
        assert_eq!(it.upcoming_events().len(), 1);
        let changes = it.changes_until(20);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].start_time, 5);
    }

    #[test]
    fn snapshots_do_not_drain_the_heaps() {
        let mut it = PlanIterator::new();
        it.set_events(vec![contact(0, 10)]);
        let _ = it.upcoming_events();
        let _ = it.upcoming_events();
        assert_eq!(it.upcoming_events().len(), 1);
    }
}
