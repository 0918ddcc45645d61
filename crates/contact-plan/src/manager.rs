//! Run-time coordination of the contact plan against the live node set.
//!
//! One manager per simulation run owns the iterator, drives the run's
//! self-scheduled wake-ups at each plan change, and announces new and
//! expired contacts to the node registry.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::barrier::CountdownBarrier;
use crate::entry::ContactPlanEntry;
use crate::io;
use crate::iterator::{PlanIterator, TimestepBounds};
use crate::{NodeId, PlanError, Result, SimTime};

/// At-most-one enforcement across the process; constructing a second
/// manager while one is alive is a configuration error, caught at
/// construction rather than through a bare global pointer.
static MANAGER_LIVE: AtomicBool = AtomicBool::new(false);

/// A node the manager can announce contact changes to.
pub trait NodeHandle {
    fn add_contact_to(&self, peer: NodeId);
    fn remove_contact_to(&self, peer: NodeId);
    /// Re-evaluate packets held because no contact was available.
    /// Implementations call `done.notify()` once finished, possibly from
    /// another execution context.
    fn recheck_pending_packets(&self, done: &CountdownBarrier);
}

/// The live node set, consulted for every announced change.
pub trait NodeRegistry {
    fn node(&self, id: NodeId) -> Option<&dyn NodeHandle>;
    fn is_ground_station(&self, id: NodeId) -> bool;
    fn node_ids(&self) -> Vec<NodeId>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ManagerConfig {
    /// Broadcast a pending-packet recheck on every wake-up and block on the
    /// barrier until all nodes acknowledge.
    pub recheck_pending_packets: bool,
    /// Optional clamp on the wake-up cadence (see [`TimestepBounds`]).
    pub timestep_bounds: Option<TimestepBounds>,
}

pub struct ContactPlanManager<R: NodeRegistry> {
    iterator: PlanIterator<ContactPlanEntry>,
    registry: R,
    config: ManagerConfig,
    barrier: Arc<CountdownBarrier>,
}

impl<R: NodeRegistry> ContactPlanManager<R> {
    pub fn new(registry: R, config: ManagerConfig) -> Result<Self> {
        if MANAGER_LIVE.swap(true, Ordering::SeqCst) {
            return Err(PlanError::ManagerAlreadyRunning);
        }
        let iterator = match config.timestep_bounds {
            Some(bounds) => PlanIterator::with_bounds(bounds),
            None => PlanIterator::new(),
        };
        Ok(Self {
            iterator,
            registry,
            config,
            barrier: Arc::new(CountdownBarrier::new()),
        })
    }

    /// Read a contact plan file into the iterator and return the first
    /// wake-up time. A missing or unreadable file is fatal.
    pub fn load_plan(&mut self, path: impl AsRef<Path>) -> Result<Option<SimTime>> {
        let plan = io::read_contact_plan(path)?;
        self.set_contacts(plan.entries);
        Ok(self.iterator.next_change(0))
    }

    /// Feed contacts directly, bypassing the file format (used by the plan
    /// builder and by tests).
    pub fn set_contacts(&mut self, entries: Vec<ContactPlanEntry>) {
        info!("Scheduling {} contacts", entries.len());
        self.iterator.set_events(entries);
    }

    /// The barrier nodes acknowledge pending-packet rechecks on.
    pub fn barrier(&self) -> Arc<CountdownBarrier> {
        Arc::clone(&self.barrier)
    }

    /// Handle one wake-up at simulated time `now`: announce every change up
    /// to `now` to the registry and return the next wake-up time, if any.
    ///
    /// The change list is fully computed (heap-consistent) before any node
    /// hears about it, so no node can observe a half-applied plan change.
    pub fn process_wakeup(&mut self, now: SimTime) -> Option<SimTime> {
        let changes = self.iterator.changes_until(now);
        debug!("{} plan changes at t={}", changes.len(), now);

        let mut awaiting = 0u32;
        if self.config.recheck_pending_packets {
            // arm before broadcasting: acknowledgements may arrive from
            // other execution contexts before we reach the wait below
            let ids = self.registry.node_ids();
            awaiting = ids.len() as u32;
            self.barrier.expect(awaiting);
            for id in ids {
                if let Some(node) = self.registry.node(id) {
                    node.recheck_pending_packets(&self.barrier);
                } else {
                    self.barrier.notify();
                }
            }
        }

        for entry in &changes {
            self.announce(entry, now);
        }

        if awaiting > 0 {
            debug!("waiting for {} pending-packet acknowledgements", awaiting);
            self.barrier.wait();
        }

        self.iterator.next_change(now)
    }

    fn announce(&self, entry: &ContactPlanEntry, now: SimTime) {
        if entry.is_loopback() {
            // self-contacts carry no routing information
            return;
        }
        let expired = entry.end_time <= now;

        match self.registry.node(entry.source) {
            Some(node) => {
                if expired {
                    node.remove_contact_to(entry.sink);
                } else {
                    node.add_contact_to(entry.sink);
                }
            }
            None => {
                // a partially-wired scenario should still run as far as it
                // can; one dangling reference is not worth aborting for
                warn!(
                    "contact {} -> {} references an unknown source node, skipping",
                    entry.source, entry.sink
                );
                return;
            }
        }

        // ground links are bidirectional for notification purposes
        // regardless of how the plan was built
        if self.registry.is_ground_station(entry.sink) {
            if let Some(node) = self.registry.node(entry.sink) {
                if expired {
                    node.remove_contact_to(entry.source);
                } else {
                    node.add_contact_to(entry.source);
                }
            }
        }
    }

    // -- query surface ------------------------------------------------------

    pub fn all_contacts(&self) -> Vec<Arc<ContactPlanEntry>> {
        self.iterator.all_events()
    }

    pub fn active_contacts(&self) -> Vec<Arc<ContactPlanEntry>> {
        self.iterator.active_events()
    }

    pub fn upcoming_contacts(&self) -> Vec<Arc<ContactPlanEntry>> {
        self.iterator.upcoming_events()
    }

    /// Every contact ever loaded between the given endpoints.
    pub fn contacts_between(&self, source: NodeId, sink: NodeId) -> Vec<Arc<ContactPlanEntry>> {
        self.iterator
            .all_events()
            .into_iter()
            .filter(|e| e.source == source && e.sink == sink)
            .collect()
    }

    /// The open contact from `source` (to `sink`, when given). With the
    /// sink unspecified the earliest-ending match wins.
    pub fn active_contact_between(
        &self,
        source: NodeId,
        sink: Option<NodeId>,
    ) -> Option<Arc<ContactPlanEntry>> {
        self.iterator
            .active_events()
            .into_iter()
            .filter(|e| e.source == source && sink.map_or(true, |s| e.sink == s))
            .min_by_key(|e| e.end_time)
    }

    /// The next not-yet-open contact from `source` (to `sink`, when given),
    /// earliest start first.
    pub fn next_contact_between(
        &self,
        source: NodeId,
        sink: Option<NodeId>,
    ) -> Option<Arc<ContactPlanEntry>> {
        self.iterator
            .upcoming_events()
            .into_iter()
            .filter(|e| e.source == source && sink.map_or(true, |s| e.sink == s))
            .min_by_key(|e| e.start_time)
    }
}

impl<R: NodeRegistry> Drop for ContactPlanManager<R> {
    fn drop(&mut self) {
        MANAGER_LIVE.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    // manager tests share the process-wide instance guard; serialize them
    static GUARD: Mutex<()> = Mutex::new(());

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Announcement {
        Add(NodeId, NodeId),
        Remove(NodeId, NodeId),
        Recheck(NodeId),
    }

    struct MockNode {
        id: NodeId,
        log: Arc<Mutex<Vec<Announcement>>>,
    }

    impl NodeHandle for MockNode {
        fn add_contact_to(&self, peer: NodeId) {
            self.log
                .lock()
                .unwrap()
                .push(Announcement::Add(self.id, peer));
        }

        fn remove_contact_to(&self, peer: NodeId) {
            self.log
                .lock()
                .unwrap()
                .push(Announcement::Remove(self.id, peer));
        }

        fn recheck_pending_packets(&self, done: &CountdownBarrier) {
            self.log.lock().unwrap().push(Announcement::Recheck(self.id));
            done.notify();
        }
    }

    struct MockRegistry {
        nodes: HashMap<NodeId, MockNode>,
        ground_stations: Vec<NodeId>,
    }

    impl MockRegistry {
        fn new(ids: &[NodeId], ground_stations: &[NodeId], log: &Arc<Mutex<Vec<Announcement>>>) -> Self {
            let nodes = ids
                .iter()
                .map(|&id| {
                    (
                        id,
                        MockNode {
                            id,
                            log: Arc::clone(log),
                        },
                    )
                })
                .collect();
            Self {
                nodes,
                ground_stations: ground_stations.to_vec(),
            }
        }
    }

    impl NodeRegistry for MockRegistry {
        fn node(&self, id: NodeId) -> Option<&dyn NodeHandle> {
            self.nodes.get(&id).map(|n| n as &dyn NodeHandle)
        }

        fn is_ground_station(&self, id: NodeId) -> bool {
            self.ground_stations.contains(&id)
        }

        fn node_ids(&self) -> Vec<NodeId> {
            let mut ids: Vec<NodeId> = self.nodes.keys().copied().collect();
            ids.sort_unstable();
            ids
        }
    }

    fn drain(log: &Arc<Mutex<Vec<Announcement>>>) -> Vec<Announcement> {
        std::mem::take(&mut *log.lock().unwrap())
    }

    #[test]
    fn announces_adds_and_removals_across_wakeups() {
        let _guard = GUARD.lock().unwrap_or_else(|e| e.into_inner());
        let log = Arc::new(Mutex::new(Vec::new()));
        let registry = MockRegistry::new(&[1, 2], &[], &log);
        let mut manager = ContactPlanManager::new(registry, ManagerConfig::default()).unwrap();
        manager.set_contacts(vec![
            ContactPlanEntry::new(1, 2, 10, 20, 9600, 100),
            ContactPlanEntry::new(1, 1, 0, 100, 9600, 0), // loopback: never announced
        ]);

        let next = manager.process_wakeup(10);
        assert_eq!(next, Some(20));
        assert_eq!(drain(&log), vec![Announcement::Add(1, 2)]);

        let next = manager.process_wakeup(20);
        assert_eq!(next, Some(100)); // the loopback's own expiry
        assert_eq!(drain(&log), vec![Announcement::Remove(1, 2)]);

        assert_eq!(manager.process_wakeup(100), None);
    }

    #[test]
    fn ground_station_sinks_hear_the_reverse_announcement() {
        let _guard = GUARD.lock().unwrap_or_else(|e| e.into_inner());
        let log = Arc::new(Mutex::new(Vec::new()));
        let registry = MockRegistry::new(&[1, 41], &[41], &log);
        let mut manager = ContactPlanManager::new(registry, ManagerConfig::default()).unwrap();
        manager.set_contacts(vec![ContactPlanEntry::new(1, 41, 0, 50, 9600, 100)]);

        manager.process_wakeup(0);
        assert_eq!(
            drain(&log),
            vec![Announcement::Add(1, 41), Announcement::Add(41, 1)]
        );

        manager.process_wakeup(50);
        assert_eq!(
            drain(&log),
            vec![Announcement::Remove(1, 41), Announcement::Remove(41, 1)]
        );
    }

    #[test]
    fn unknown_source_is_skipped_not_fatal() {
        let _guard = GUARD.lock().unwrap_or_else(|e| e.into_inner());
        let log = Arc::new(Mutex::new(Vec::new()));
        let registry = MockRegistry::new(&[2], &[], &log);
        let mut manager = ContactPlanManager::new(registry, ManagerConfig::default()).unwrap();
        manager.set_contacts(vec![
            ContactPlanEntry::new(99, 2, 0, 50, 9600, 100), // no node 99
            ContactPlanEntry::new(2, 99, 0, 60, 9600, 100),
        ]);

        let next = manager.process_wakeup(0);
        assert_eq!(next, Some(50));
        assert_eq!(drain(&log), vec![Announcement::Add(2, 99)]);
    }

    #[test]
    fn recheck_broadcast_reaches_every_node_and_drains_the_barrier() {
        let _guard = GUARD.lock().unwrap_or_else(|e| e.into_inner());
        let log = Arc::new(Mutex::new(Vec::new()));
        let registry = MockRegistry::new(&[1, 2, 3], &[], &log);
        let config = ManagerConfig {
            recheck_pending_packets: true,
            timestep_bounds: None,
        };
        let mut manager = ContactPlanManager::new(registry, config).unwrap();
        manager.set_contacts(vec![ContactPlanEntry::new(1, 2, 0, 50, 9600, 100)]);

        manager.process_wakeup(0);
        let events = drain(&log);
        assert!(events.contains(&Announcement::Recheck(1)));
        assert!(events.contains(&Announcement::Recheck(2)));
        assert!(events.contains(&Announcement::Recheck(3)));
        assert!(events.contains(&Announcement::Add(1, 2)));
        assert_eq!(manager.barrier().pending(), 0);
    }

    #[test]
    fn query_surface_filters_the_snapshots() {
        let _guard = GUARD.lock().unwrap_or_else(|e| e.into_inner());
        let log = Arc::new(Mutex::new(Vec::new()));
        let registry = MockRegistry::new(&[1, 2, 3], &[], &log);
        let mut manager = ContactPlanManager::new(registry, ManagerConfig::default()).unwrap();
        manager.set_contacts(vec![
            ContactPlanEntry::new(1, 2, 0, 50, 9600, 100),
            ContactPlanEntry::new(1, 3, 0, 30, 9600, 100),
            ContactPlanEntry::new(1, 2, 100, 150, 9600, 100),
        ]);
        manager.process_wakeup(0);

        assert_eq!(manager.all_contacts().len(), 3);
        assert_eq!(manager.active_contacts().len(), 2);
        assert_eq!(manager.contacts_between(1, 2).len(), 2);

        // sink unspecified: earliest-ending active match
        let earliest = manager.active_contact_between(1, None).unwrap();
        assert_eq!(earliest.sink, 3);

        let next = manager.next_contact_between(1, Some(2)).unwrap();
        assert_eq!(next.start_time, 100);
        assert!(manager.next_contact_between(2, None).is_none());
    }

    #[test]
    fn at_most_one_manager_per_process() {
        let _guard = GUARD.lock().unwrap_or_else(|e| e.into_inner());
        let log = Arc::new(Mutex::new(Vec::new()));
        let first = ContactPlanManager::new(
            MockRegistry::new(&[1], &[], &log),
            ManagerConfig::default(),
        )
        .unwrap();

        let second = ContactPlanManager::new(
            MockRegistry::new(&[1], &[], &log),
            ManagerConfig::default(),
        );
        assert!(matches!(second, Err(PlanError::ManagerAlreadyRunning)));

        drop(first);
        // the slot frees once the first instance is gone
        let third = ContactPlanManager::new(
            MockRegistry::new(&[1], &[], &log),
            ManagerConfig::default(),
        );
        assert!(third.is_ok());
    }

    #[test]
    fn loading_a_missing_plan_is_fatal() {
        let _guard = GUARD.lock().unwrap_or_else(|e| e.into_inner());
        let log = Arc::new(Mutex::new(Vec::new()));
        let registry = MockRegistry::new(&[1], &[], &log);
        let mut manager = ContactPlanManager::new(registry, ManagerConfig::default()).unwrap();
        assert!(manager.load_plan("/no/such/plan.txt").is_err());
    }
}
