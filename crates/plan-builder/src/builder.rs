//! Contact and interference plan construction.
//!
//! The builder marches a configured check interval across the simulated
//! horizon. Each step: rebuild the spatial index from current positions,
//! radius-search candidates per radio, test link feasibility per candidate
//! pair, resolve concurrent-transmission conflicts through a maximal
//! independent set, and record the surviving links as windows. At the end
//! the per-pair windows are coalesced and flattened into plan entries.

use std::collections::{BTreeMap, HashMap};

use tracing::{debug, info};

use contact_plan::{
    time_order, ContactPlanEntry, IndependentSet, InterferencePlanEntry, NodeId, PlanMetadata,
    SimTime,
};
use link_physics::{
    check_interfering, further_interference_checks, is_working_contact, received_power_dbm,
};
use orbital_dynamics::StateVector;

use crate::kdtree::{compute_comm_radius, RadioPoint, RadioTree};
use crate::merge::{merge_intervals, Window};
use crate::{BuilderError, RadioNode, Result};

/// Strongest interferer candidates considered per link; the combination
/// search is exponential in this count.
const MAX_INTERFERERS_CONSIDERED: usize = 8;

#[derive(Debug, Clone, Copy)]
pub struct BuilderConfig {
    /// Horizon to generate the plan for (s).
    pub max_sim_time: SimTime,
    /// Re-index and re-test cadence (s).
    pub check_interval: SimTime,
    /// Record the reverse contact whenever the forward one works.
    pub assume_bidirectional: bool,
    /// Track which interferer combinations corrupt each link.
    pub track_interference: bool,
    /// Capacity of the synthetic self-to-self and backhaul contacts (bits/s).
    pub loopback_bitrate_bps: i64,
}

impl Default for BuilderConfig {
    fn default() -> Self {
        Self {
            max_sim_time: 86_400,
            check_interval: 60,
            assume_bidirectional: false,
            track_interference: false,
            loopback_bitrate_bps: 1_000_000_000,
        }
    }
}

/// Everything the builder produced for one run.
#[derive(Debug)]
pub struct BuildResult {
    pub contacts: Vec<ContactPlanEntry>,
    pub interference: Vec<InterferencePlanEntry>,
    pub metadata: PlanMetadata,
}

/// Running per-pair aggregation while the horizon is marched.
#[derive(Debug)]
struct PairTrack {
    windows: Vec<Window>,
    bitrate_bps: i64,
    min_distance_km: f64,
    max_distance_km: f64,
}

/// A feasible transmission at one step, by node index.
#[derive(Debug, Clone, Copy)]
struct WorkingLink {
    tx: usize,
    rx: usize,
    distance_km: f64,
    bitrate_bps: i64,
}

pub struct PlanBuilder {
    config: BuilderConfig,
    nodes: Vec<RadioNode>,
    index_by_id: HashMap<NodeId, usize>,
    /// Worst-case search radius per transmitter, computed once up front;
    /// candidates are re-checked against the exact pairwise radius.
    search_radius_km: Vec<f64>,
    contact_map: BTreeMap<(NodeId, NodeId), PairTrack>,
    interference_map: BTreeMap<(NodeId, NodeId, Vec<NodeId>), Vec<Window>>,
}

impl PlanBuilder {
    pub fn new(config: BuilderConfig, nodes: Vec<RadioNode>) -> Result<Self> {
        if config.max_sim_time <= 0 || config.check_interval <= 0 {
            return Err(BuilderError::InvalidScenario(format!(
                "horizon {} s and check interval {} s must both be positive",
                config.max_sim_time, config.check_interval
            )));
        }
        if nodes.is_empty() {
            return Err(BuilderError::InvalidScenario("no radio nodes".to_string()));
        }
        let mut index_by_id = HashMap::with_capacity(nodes.len());
        for (i, node) in nodes.iter().enumerate() {
            node.radio.validate()?;
            if index_by_id.insert(node.id, i).is_some() {
                return Err(BuilderError::InvalidScenario(format!(
                    "duplicate node id {}",
                    node.id
                )));
            }
        }
        Ok(Self {
            config,
            nodes,
            index_by_id,
            search_radius_km: Vec::new(),
            contact_map: BTreeMap::new(),
            interference_map: BTreeMap::new(),
        })
    }

    /// March the horizon and produce the plans.
    pub fn run(&mut self) -> Result<BuildResult> {
        info!(
            "Building plan for {} nodes over {} s at {} s intervals",
            self.nodes.len(),
            self.config.max_sim_time,
            self.config.check_interval
        );
        self.compute_search_envelopes()?;

        let mut now = 0;
        while now < self.config.max_sim_time {
            self.step(now)?;
            now += self.config.check_interval;
        }

        self.finalize()
    }

    fn compute_search_envelopes(&mut self) -> Result<()> {
        let n = self.nodes.len();
        let mut radii = vec![0.0f64; n];
        for a in 0..n {
            for b in 0..n {
                if a == b {
                    continue;
                }
                let r = compute_comm_radius(&self.nodes[a], &self.nodes[b], 0.0)?;
                if r > radii[a] {
                    radii[a] = r;
                }
            }
        }
        self.search_radius_km = radii;
        Ok(())
    }

    /// One pass at simulated time `now`.
    fn step(&mut self, now: SimTime) -> Result<()> {
        let t = now as f64;
        let states = self
            .nodes
            .iter()
            .map(|n| n.propagator.state_at(t))
            .collect::<orbital_dynamics::Result<Vec<StateVector>>>()?;

        let tree = RadioTree::build(
            self.nodes
                .iter()
                .zip(&states)
                .map(|(n, s)| RadioPoint {
                    node_id: n.id,
                    position_km: s.position_km,
                })
                .collect(),
        );

        let mut links: Vec<WorkingLink> = Vec::new();
        for (a, node) in self.nodes.iter().enumerate() {
            for (peer_id, distance_sq) in
                tree.unsorted_radius_search(node.id, self.search_radius_km[a])
            {
                let Some(&b) = self.index_by_id.get(&peer_id) else {
                    continue;
                };
                let peer = &self.nodes[b];
                let distance_km = distance_sq.sqrt();
                // the search envelope is inflated and transmitter-wide; the
                // exact pairwise bound decides
                if distance_km > compute_comm_radius(node, peer, t)? {
                    continue;
                }
                if let Some(estimate) = is_working_contact(&node.radio, &peer.radio, distance_km)
                {
                    links.push(WorkingLink {
                        tx: a,
                        rx: b,
                        distance_km,
                        bitrate_bps: estimate.bitrate_bps,
                    });
                }
            }
        }

        if self.config.assume_bidirectional {
            self.mirror_links(&mut links);
        }

        let links = if self.config.track_interference {
            self.select_independent(links, &states)
        } else {
            links
        };

        debug!("t={}: {} working links", now, links.len());

        let window_end = (now + self.config.check_interval).min(self.config.max_sim_time);
        for link in &links {
            self.record_contact(link, now, window_end);
        }

        if self.config.track_interference {
            self.record_interference(&links, &states, now, window_end);
        }
        Ok(())
    }

    /// A single one-way success also records the reverse contact.
    fn mirror_links(&self, links: &mut Vec<WorkingLink>) {
        let existing: Vec<(usize, usize)> = links.iter().map(|l| (l.tx, l.rx)).collect();
        let mirrored: Vec<WorkingLink> = links
            .iter()
            .filter(|l| !existing.contains(&(l.rx, l.tx)))
            .map(|l| WorkingLink {
                tx: l.rx,
                rx: l.tx,
                distance_km: l.distance_km,
                bitrate_bps: self.nodes[l.rx].radio.bitrate_bps,
            })
            .collect();
        links.extend(mirrored);
    }

    /// Resolve concurrent-transmission conflicts: keep a maximal set of
    /// links with one serving transmitter per receiver that do not corrupt
    /// each other. Candidate solutions are grown greedily from every seed
    /// link and compared by size, then lexicographically by endpoint pairs.
    fn select_independent(
        &self,
        mut links: Vec<WorkingLink>,
        states: &[StateVector],
    ) -> Vec<WorkingLink> {
        if links.len() <= 1 {
            return links;
        }
        links.sort_by_key(|l| (self.nodes[l.tx].id, self.nodes[l.rx].id));

        let mut best: Option<(IndependentSet, Vec<usize>)> = None;
        for seed in 0..links.len() {
            let mut members = vec![seed];
            for candidate in 0..links.len() {
                if candidate != seed && self.compatible(&links, &members, candidate, states) {
                    members.push(candidate);
                }
            }
            let mut set = IndependentSet::new();
            for &m in &members {
                set.insert(self.nodes[links[m].tx].id, self.nodes[links[m].rx].id);
            }
            if best.as_ref().map_or(true, |(b, _)| set > *b) {
                best = Some((set, members));
            }
        }

        match best {
            Some((_, members)) => members.into_iter().map(|i| links[i]).collect(),
            None => links,
        }
    }

    /// Would adding `candidate` keep every link in the set receivable with
    /// all of the set's transmitters keyed up?
    fn compatible(
        &self,
        links: &[WorkingLink],
        members: &[usize],
        candidate: usize,
        states: &[StateVector],
    ) -> bool {
        if members
            .iter()
            .any(|&m| links[m].rx == links[candidate].rx)
        {
            // one serving transmitter per receiver
            return false;
        }

        let mut set: Vec<usize> = members.to_vec();
        set.push(candidate);

        for &li in &set {
            let link = &links[li];
            let rx_node = &self.nodes[link.rx];
            let powers: Vec<f64> = set
                .iter()
                .filter(|&&o| o != li && links[o].tx != link.tx)
                .map(|&o| {
                    let tx_node = &self.nodes[links[o].tx];
                    let d =
                        (states[links[o].tx].position_km - states[link.rx].position_km).norm();
                    received_power_dbm(&tx_node.radio, &rx_node.radio, d)
                })
                .collect();
            if !powers.is_empty()
                && check_interfering(
                    &self.nodes[link.tx].radio,
                    &rx_node.radio,
                    link.distance_km,
                    &powers,
                )
            {
                return false;
            }
        }
        true
    }

    fn record_contact(&mut self, link: &WorkingLink, start: SimTime, end: SimTime) {
        let source = self.nodes[link.tx].id;
        let sink = self.nodes[link.rx].id;
        let track = self
            .contact_map
            .entry((source, sink))
            .or_insert_with(|| PairTrack {
                windows: Vec::new(),
                bitrate_bps: link.bitrate_bps,
                min_distance_km: f64::INFINITY,
                max_distance_km: 0.0,
            });
        track.windows.push((start, end));
        track.min_distance_km = track.min_distance_km.min(link.distance_km);
        track.max_distance_km = track.max_distance_km.max(link.distance_km);
    }

    /// For every surviving link, find which combinations of the other
    /// radios in the scene would corrupt it if they transmitted during this
    /// window. Keyed by the exact combination: different combinations never
    /// merge even when time-adjacent.
    fn record_interference(
        &mut self,
        links: &[WorkingLink],
        states: &[StateVector],
        start: SimTime,
        end: SimTime,
    ) {
        for link in links {
            let rx_node = &self.nodes[link.rx];
            let tx_node = &self.nodes[link.tx];

            // every other radio is a potential concurrent transmitter;
            // strongest arrivals first, bounded for the subset enumeration
            let mut candidates: Vec<(NodeId, f64)> = self
                .nodes
                .iter()
                .enumerate()
                .filter(|(i, _)| *i != link.tx && *i != link.rx)
                .map(|(i, n)| {
                    let d = (states[i].position_km - states[link.rx].position_km).norm();
                    (n.id, received_power_dbm(&n.radio, &rx_node.radio, d))
                })
                .collect();
            candidates.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
            candidates.truncate(MAX_INTERFERERS_CONSIDERED);

            let combos = further_interference_checks(
                &tx_node.radio,
                &rx_node.radio,
                link.distance_km,
                &candidates,
            );
            let source = tx_node.id;
            let sink = rx_node.id;
            for combo in combos {
                self.interference_map
                    .entry((source, sink, combo))
                    .or_default()
                    .push((start, end));
            }
        }
    }

    /// Invert and flatten the running maps into plan entries: coalesce
    /// per-pair windows, add synthetic loopback and backhaul contacts, and
    /// sort time-first for the writer.
    fn finalize(&mut self) -> Result<BuildResult> {
        let metadata = self.metadata();
        let mut contacts = Vec::new();

        for ((source, sink), track) in &self.contact_map {
            for (start, end) in merge_intervals(track.windows.clone()) {
                let mut entry = ContactPlanEntry::new(
                    *source,
                    *sink,
                    start,
                    end,
                    track.bitrate_bps,
                    track.max_distance_km.ceil() as i64,
                );
                entry.min_distance_km = track.min_distance_km.floor() as i64;
                entry.max_distance_km = track.max_distance_km.ceil() as i64;
                entry.source_is_ground_station = metadata.is_ground_station(*source);
                entry.sink_is_ground_station = metadata.is_ground_station(*sink);
                entry.max_sim_time = self.config.max_sim_time;
                contacts.push(entry);
            }
        }

        // every node can always deliver to itself
        for node in &self.nodes {
            let mut entry = ContactPlanEntry::new(
                node.id,
                node.id,
                0,
                self.config.max_sim_time,
                self.config.loopback_bitrate_bps,
                0,
            );
            entry.source_is_ground_station = node.is_ground_station;
            entry.sink_is_ground_station = node.is_ground_station;
            entry.max_sim_time = self.config.max_sim_time;
            contacts.push(entry);
        }

        // ground stations with backhaul reach each other without an RF link
        let backhaul: Vec<NodeId> = self
            .nodes
            .iter()
            .filter(|n| n.is_ground_station && n.internet_backhaul)
            .map(|n| n.id)
            .collect();
        for &a in &backhaul {
            for &b in &backhaul {
                if a == b {
                    continue;
                }
                let mut entry = ContactPlanEntry::new(
                    a,
                    b,
                    0,
                    self.config.max_sim_time,
                    self.config.loopback_bitrate_bps,
                    0,
                );
                entry.source_is_ground_station = true;
                entry.sink_is_ground_station = true;
                entry.max_sim_time = self.config.max_sim_time;
                contacts.push(entry);
            }
        }

        contacts.sort_by(time_order);

        let mut interference = Vec::new();
        for ((source, sink, combo), windows) in &self.interference_map {
            for (start, end) in merge_intervals(windows.clone()) {
                let mut entry =
                    InterferencePlanEntry::new(*source, *sink, start, end, combo.clone());
                entry.source_is_ground_station = metadata.is_ground_station(*source);
                entry.sink_is_ground_station = metadata.is_ground_station(*sink);
                entry.max_sim_time = self.config.max_sim_time;
                interference.push(entry);
            }
        }
        interference.sort_by(time_order);

        info!(
            "Plan complete: {} contacts, {} interference entries",
            contacts.len(),
            interference.len()
        );
        Ok(BuildResult {
            contacts,
            interference,
            metadata,
        })
    }

    fn metadata(&self) -> PlanMetadata {
        let max_satellite_id = self
            .nodes
            .iter()
            .filter(|n| !n.is_ground_station)
            .map(|n| n.id)
            .max()
            .unwrap_or(0);
        let max_node_id = self.nodes.iter().map(|n| n.id).max().unwrap_or(0);
        PlanMetadata::new(max_satellite_id, max_node_id, self.config.max_sim_time)
    }
}
