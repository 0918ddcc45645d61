//! Contact and interference plan entries.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::{NodeId, SimTime};

/// Sentinel for the optional observed-distance extrema.
pub const DISTANCE_UNSET_KM: i64 = -1;

/// Anything the plan iterator can schedule: a time-bounded, switchable event.
pub trait PlanEvent {
    fn start_time(&self) -> SimTime;
    fn end_time(&self) -> SimTime;
    fn enabled(&self) -> bool;
}

/// A plan event between two endpoints.
pub trait PlanRecord: PlanEvent {
    fn source(&self) -> NodeId;
    fn sink(&self) -> NodeId;
}

/// A directed, time-bounded link opportunity.
///
/// Never mutated after entering the iterator except for the `enabled` flag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactPlanEntry {
    pub source: NodeId,
    pub sink: NodeId,
    /// Derived at read time from the ID ranges in the plan-file header.
    pub source_is_ground_station: bool,
    pub sink_is_ground_station: bool,
    /// Window start (s); invariant `start_time <= end_time`.
    pub start_time: SimTime,
    /// Window end (s); entries with `start_time >= end_time` are dropped on
    /// write.
    pub end_time: SimTime,
    /// Link capacity (bits/s)
    pub bitrate_bps: i64,
    /// Distance used for propagation-delay modeling (km here; the format
    /// leaves the unit to the producer).
    pub range: i64,
    /// Observed distance extrema over the window (km); -1 = unset.
    pub min_distance_km: i64,
    pub max_distance_km: i64,
    /// Disabled entries stay in memory but are skipped on write and by the
    /// iterator.
    pub enabled: bool,
    /// Horizon the producing plan was generated for (diagnostics).
    pub max_sim_time: SimTime,
}

impl ContactPlanEntry {
    pub fn new(
        source: NodeId,
        sink: NodeId,
        start_time: SimTime,
        end_time: SimTime,
        bitrate_bps: i64,
        range: i64,
    ) -> Self {
        Self {
            source,
            sink,
            source_is_ground_station: false,
            sink_is_ground_station: false,
            start_time,
            end_time,
            bitrate_bps,
            range,
            min_distance_km: DISTANCE_UNSET_KM,
            max_distance_km: DISTANCE_UNSET_KM,
            enabled: true,
            max_sim_time: -1,
        }
    }

    /// Endpoint-pair comparison. The original implementation defined value
    /// equality on `(source, sink)` alone, which silently merges distinct
    /// time windows when entries land in hashed containers; here `==` is
    /// full-record equality and the endpoint comparison carries its own
    /// name.
    pub fn same_endpoints(&self, other: &Self) -> bool {
        self.source == other.source && self.sink == other.sink
    }

    /// Zero-or-negative-duration windows carry no information and never
    /// enter a written plan.
    pub fn is_degenerate(&self) -> bool {
        self.start_time >= self.end_time
    }

    pub fn is_loopback(&self) -> bool {
        self.source == self.sink
    }

    pub fn duration(&self) -> SimTime {
        self.end_time - self.start_time
    }

    /// Is the window open at `time`?
    pub fn covers(&self, time: SimTime) -> bool {
        self.start_time <= time && time < self.end_time
    }
}

impl PlanEvent for ContactPlanEntry {
    fn start_time(&self) -> SimTime {
        self.start_time
    }

    fn end_time(&self) -> SimTime {
        self.end_time
    }

    fn enabled(&self) -> bool {
        self.enabled
    }
}

impl PlanRecord for ContactPlanEntry {
    fn source(&self) -> NodeId {
        self.source
    }

    fn sink(&self) -> NodeId {
        self.sink
    }
}

/// A record that the `source -> sink` link is corrupted while the named
/// interferers transmit concurrently.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterferencePlanEntry {
    pub source: NodeId,
    pub sink: NodeId,
    pub source_is_ground_station: bool,
    pub sink_is_ground_station: bool,
    pub start_time: SimTime,
    pub end_time: SimTime,
    /// Ascending node IDs whose simultaneous transmission corrupts the link.
    pub interfering_nodes: Vec<NodeId>,
    pub enabled: bool,
    pub max_sim_time: SimTime,
}

impl InterferencePlanEntry {
    pub fn new(
        source: NodeId,
        sink: NodeId,
        start_time: SimTime,
        end_time: SimTime,
        mut interfering_nodes: Vec<NodeId>,
    ) -> Self {
        interfering_nodes.sort_unstable();
        Self {
            source,
            sink,
            source_is_ground_station: false,
            sink_is_ground_station: false,
            start_time,
            end_time,
            interfering_nodes,
            enabled: true,
            max_sim_time: -1,
        }
    }

    pub fn is_degenerate(&self) -> bool {
        self.start_time >= self.end_time
    }
}

impl PlanEvent for InterferencePlanEntry {
    fn start_time(&self) -> SimTime {
        self.start_time
    }

    fn end_time(&self) -> SimTime {
        self.end_time
    }

    fn enabled(&self) -> bool {
        self.enabled
    }
}

impl PlanRecord for InterferencePlanEntry {
    fn source(&self) -> NodeId {
        self.source
    }

    fn sink(&self) -> NodeId {
        self.sink
    }
}

/// Time-first writer order: start, end, source, sink.
pub fn time_order<E: PlanRecord>(a: &E, b: &E) -> Ordering {
    a.start_time()
        .cmp(&b.start_time())
        .then_with(|| a.end_time().cmp(&b.end_time()))
        .then_with(|| a.source().cmp(&b.source()))
        .then_with(|| a.sink().cmp(&b.sink()))
}

/// Node-first writer order: source, sink, start.
pub fn node_order<E: PlanRecord>(a: &E, b: &E) -> Ordering {
    a.source()
        .cmp(&b.source())
        .then_with(|| a.sink().cmp(&b.sink()))
        .then_with(|| a.start_time().cmp(&b.start_time()))
}

/// A set of contacts, unique by endpoint pair, that can coexist without
/// mutual interference at one instant. Candidate solutions order by size
/// (larger preferred), then lexicographically by endpoint pairs, so a
/// maximal solution is the `max()` of the candidates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndependentSet {
    pairs: Vec<(NodeId, NodeId)>,
}

impl IndependentSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an endpoint pair; false when the pair is already present.
    pub fn insert(&mut self, source: NodeId, sink: NodeId) -> bool {
        match self.pairs.binary_search(&(source, sink)) {
            Ok(_) => false,
            Err(idx) => {
                self.pairs.insert(idx, (source, sink));
                true
            }
        }
    }

    pub fn contains(&self, source: NodeId, sink: NodeId) -> bool {
        self.pairs.binary_search(&(source, sink)).is_ok()
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn pairs(&self) -> &[(NodeId, NodeId)] {
        &self.pairs
    }
}

impl Ord for IndependentSet {
    fn cmp(&self, other: &Self) -> Ordering {
        // bigger sets first; for equal sizes the lexicographically smaller
        // pair list is the preferred (greater) solution
        self.pairs
            .len()
            .cmp(&other.pairs.len())
            .then_with(|| other.pairs.cmp(&self.pairs))
    }
}

impl PartialOrd for IndependentSet {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_endpoints_ignores_the_window() {
        let a = ContactPlanEntry::new(1, 2, 0, 10, 9600, 500);
        let b = ContactPlanEntry::new(1, 2, 50, 60, 9600, 700);
        assert!(a.same_endpoints(&b));
        assert_ne!(a, b); // full-record equality keeps the windows distinct
    }

    #[test]
    fn degenerate_windows() {
        assert!(ContactPlanEntry::new(1, 2, 10, 10, 0, 0).is_degenerate());
        assert!(ContactPlanEntry::new(1, 2, 10, 5, 0, 0).is_degenerate());
        assert!(!ContactPlanEntry::new(1, 2, 10, 11, 0, 0).is_degenerate());
    }

    #[test]
    fn interference_entry_sorts_its_interferers() {
        let e = InterferencePlanEntry::new(1, 2, 0, 10, vec![9, 3, 7]);
        assert_eq!(e.interfering_nodes, vec![3, 7, 9]);
    }

    #[test]
    fn time_order_sorts_start_first() {
        let mut entries = vec![
            ContactPlanEntry::new(2, 1, 20, 30, 0, 0),
            ContactPlanEntry::new(1, 2, 10, 30, 0, 0),
            ContactPlanEntry::new(1, 3, 10, 20, 0, 0),
        ];
        entries.sort_by(time_order);
        assert_eq!(
            entries.iter().map(|e| (e.source, e.sink)).collect::<Vec<_>>(),
            vec![(1, 3), (1, 2), (2, 1)]
        );
    }

    #[test]
    fn node_order_groups_by_endpoints() {
        let mut entries = vec![
            ContactPlanEntry::new(2, 1, 0, 5, 0, 0),
            ContactPlanEntry::new(1, 2, 50, 60, 0, 0),
            ContactPlanEntry::new(1, 2, 10, 20, 0, 0),
        ];
        entries.sort_by(node_order);
        assert_eq!(
            entries
                .iter()
                .map(|e| (e.source, e.sink, e.start_time))
                .collect::<Vec<_>>(),
            vec![(1, 2, 10), (1, 2, 50), (2, 1, 0)]
        );
    }

    #[test]
    fn independent_set_prefers_size_then_lexicographic() {
        let mut small = IndependentSet::new();
        small.insert(1, 2);
        let mut big = IndependentSet::new();
        big.insert(3, 4);
        big.insert(5, 6);
        assert!(big > small);

        let mut left = IndependentSet::new();
        left.insert(1, 2);
        let mut right = IndependentSet::new();
        right.insert(1, 3);
        // equal size: lexicographically smaller pair list wins
        assert!(left > right);
    }

    #[test]
    fn independent_set_is_unique_by_pair() {
        let mut set = IndependentSet::new();
        assert!(set.insert(1, 2));
        assert!(!set.insert(1, 2));
        assert_eq!(set.len(), 1);
    }
}
