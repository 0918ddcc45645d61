//! Reception decisions and interference feasibility.
//!
//! The reception decision is the single oracle for "does this link close":
//! contact feasibility, the fake-transmission interference test, and the
//! combinatorial interferer search all funnel through [`Reception::decide`]
//! instead of re-deriving the math.

use tracing::trace;

use crate::{dbm_to_mw, free_space_path_loss_db, mw_to_dbm, RadioParams};

/// Feasibility verdict for a working link.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinkEstimate {
    /// Capacity of the closed link (bits/s)
    pub bitrate_bps: i64,
    /// Distance the estimate was computed at (km)
    pub range_km: f64,
}

/// Signal power arriving at `rx` from `tx` over `distance_km`.
pub fn received_power_dbm(tx: &RadioParams, rx: &RadioParams, distance_km: f64) -> f64 {
    tx.tx_power_dbm + tx.tx_gain_dbi + rx.rx_gain_dbi
        - free_space_path_loss_db(distance_km, tx.frequency_hz)
}

/// A synthesized reception: the wanted signal plus the powers of every
/// concurrent transmission arriving at the same receiver.
#[derive(Debug, Clone)]
pub struct Reception {
    pub signal_dbm: f64,
    pub interferer_dbm: Vec<f64>,
}

impl Reception {
    pub fn clean(signal_dbm: f64) -> Self {
        Self {
            signal_dbm,
            interferer_dbm: Vec::new(),
        }
    }

    pub fn with_interferers(signal_dbm: f64, interferer_dbm: Vec<f64>) -> Self {
        Self {
            signal_dbm,
            interferer_dbm,
        }
    }

    /// Signal to noise-plus-interference ratio (dB). Noise and interference
    /// add in the linear domain; infinite when there is neither.
    pub fn snir_db(&self, noise_floor_dbm: Option<f64>) -> f64 {
        let noise_mw = noise_floor_dbm.map(dbm_to_mw).unwrap_or(0.0);
        let interference_mw: f64 = self.interferer_dbm.iter().copied().map(dbm_to_mw).sum();
        let denominator_mw = noise_mw + interference_mw;
        if denominator_mw <= 0.0 {
            return f64::INFINITY;
        }
        self.signal_dbm - mw_to_dbm(denominator_mw)
    }

    /// Can `rx` successfully receive this transmission?
    pub fn decide(&self, rx: &RadioParams) -> bool {
        self.signal_dbm >= rx.rx_sensitivity_dbm
            && self.snir_db(rx.noise_floor_dbm) >= rx.snir_threshold_db
    }
}

/// Link feasibility for a transmitter/receiver pair at the given distance.
///
/// Idealized model (a configured fixed range on either radio) decides on
/// distance alone; otherwise the physical reception decision applies.
pub fn is_working_contact(
    tx: &RadioParams,
    rx: &RadioParams,
    distance_km: f64,
) -> Option<LinkEstimate> {
    let estimate = LinkEstimate {
        bitrate_bps: tx.bitrate_bps,
        range_km: distance_km,
    };

    if let Some(max_range_km) = fixed_range(tx, rx) {
        return (distance_km <= max_range_km).then_some(estimate);
    }

    let reception = Reception::clean(received_power_dbm(tx, rx, distance_km));
    reception.decide(rx).then_some(estimate)
}

fn fixed_range(tx: &RadioParams, rx: &RadioParams) -> Option<f64> {
    match (tx.max_range_km, rx.max_range_km) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (Some(a), None) => Some(a),
        (None, Some(b)) => Some(b),
        (None, None) => None,
    }
}

/// Fake-transmission test: synthesize the reception with the interferer set
/// included and inspect the decision. True when a link that closes on its
/// own is broken by the interferers.
pub fn check_interfering(
    tx: &RadioParams,
    rx: &RadioParams,
    distance_km: f64,
    interferer_dbm: &[f64],
) -> bool {
    let signal_dbm = received_power_dbm(tx, rx, distance_km);
    if !Reception::clean(signal_dbm).decide(rx) {
        // nothing to corrupt
        return false;
    }
    !Reception::with_interferers(signal_dbm, interferer_dbm.to_vec()).decide(rx)
}

/// Every combination of candidate interferers whose simultaneous
/// transmission breaks the `tx -> rx` link.
///
/// Interference is not monotonic in the number of interferers sharing a
/// band, so subsets are enumerated (already-considered vs. remaining)
/// rather than short-circuiting on the first hit. Returned combinations are
/// sorted ascending by node id.
pub fn further_interference_checks(
    tx: &RadioParams,
    rx: &RadioParams,
    distance_km: f64,
    candidates: &[(u32, f64)],
) -> Vec<Vec<u32>> {
    let mut found = Vec::new();
    let mut considered: Vec<(u32, f64)> = Vec::new();
    recurse(tx, rx, distance_km, &mut considered, candidates, &mut found);
    trace!(
        "interference search over {} candidates found {} breaking combinations",
        candidates.len(),
        found.len()
    );
    found
}

fn recurse(
    tx: &RadioParams,
    rx: &RadioParams,
    distance_km: f64,
    considered: &mut Vec<(u32, f64)>,
    remaining: &[(u32, f64)],
    found: &mut Vec<Vec<u32>>,
) {
    if !considered.is_empty() {
        let powers: Vec<f64> = considered.iter().map(|(_, p)| *p).collect();
        if check_interfering(tx, rx, distance_km, &powers) {
            let mut ids: Vec<u32> = considered.iter().map(|(id, _)| *id).collect();
            ids.sort_unstable();
            found.push(ids);
        }
    }
    for (i, candidate) in remaining.iter().enumerate() {
        considered.push(*candidate);
        recurse(tx, rx, distance_km, considered, &remaining[i + 1..], found);
        considered.pop();
    }
}
