//! Orbital Dynamics Library
//!
//! Position propagation (Kepler, SGP4, linear, sampled) and simulation time
//! for the Meridian constellation simulator. All state vectors are
//! Earth-Centered-Inertial, kilometers and kilometers per second.

use nalgebra::Vector3;
use thiserror::Error;

pub mod attitude;
mod cache;
pub mod fixed;
pub mod kepler;
pub mod sgp4prop;
pub mod time;

pub use cache::StateCache;
pub use fixed::{GroundStationPropagator, LinearPropagator, StateListPropagator};
pub use kepler::{solve_eccentric_anomaly, KeplerElements, KeplerPropagator};
pub use sgp4prop::{Sgp4ListPropagator, Sgp4Propagator};
pub use time::SimEpoch;

/// Earth gravitational parameter (km^3/s^2)
pub const MU_EARTH_KM3_S2: f64 = 398_600.4418;
/// Mean Earth radius (km)
pub const EARTH_RADIUS_KM: f64 = 6371.0;
/// Equatorial Earth radius, WGS84 (km)
pub const EARTH_EQUATORIAL_RADIUS_KM: f64 = 6378.137;
/// WGS84 flattening
pub const EARTH_FLATTENING: f64 = 1.0 / 298.257223563;
/// Earth rotation rate (rad/s)
pub const EARTH_ROTATION_RAD_S: f64 = 7.292_115_9e-5;

#[derive(Error, Debug)]
pub enum PropagationError {
    #[error("Invalid TLE format: {0}")]
    InvalidTle(String),
    #[error("Propagation failed: {0}")]
    PropagationFailed(String),
    #[error("Invalid orbital elements: {0}")]
    InvalidElements(String),
    #[error("Kepler solver did not converge within {0} iterations")]
    SolverDiverged(u32),
    #[error("State sample list is empty")]
    EmptyStateList,
    #[error("TLE list is empty")]
    EmptyTleList,
}

pub type Result<T> = std::result::Result<T, PropagationError>;

/// Inertial state at a simulation instant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StateVector {
    /// ECI position (km)
    pub position_km: Vector3<f64>,
    /// ECI velocity (km/s)
    pub velocity_km_s: Vector3<f64>,
    /// Simulation time the state is valid for (s)
    pub sim_time_s: f64,
}

impl StateVector {
    pub fn radius_km(&self) -> f64 {
        self.position_km.norm()
    }

    pub fn speed_km_s(&self) -> f64 {
        self.velocity_km_s.norm()
    }

    /// Instantaneous semi-major axis via vis-viva (km).
    pub fn semi_major_axis_km(&self) -> f64 {
        let r = self.radius_km();
        let v2 = self.velocity_km_s.norm_squared();
        1.0 / (2.0 / r - v2 / MU_EARTH_KM3_S2)
    }

    /// Instantaneous eccentricity from the eccentricity vector.
    pub fn eccentricity(&self) -> f64 {
        let r = self.position_km;
        let v = self.velocity_km_s;
        let rn = r.norm();
        let v2 = v.norm_squared();
        let rv = r.dot(&v);
        let e_vec = ((v2 - MU_EARTH_KM3_S2 / rn) * r - rv * v) / MU_EARTH_KM3_S2;
        e_vec.norm()
    }
}

/// Position propagator: a closed set of variants dispatched by pattern match.
///
/// Propagation is expensive and most queries ask for times close to the last
/// one, so every propagator memoizes its last state behind [`StateCache`] and
/// only recomputes once the predicted drift exceeds the configured accuracy.
#[derive(Debug)]
pub struct Propagator {
    kind: PropagatorKind,
    cache: StateCache,
}

#[derive(Debug)]
pub enum PropagatorKind {
    Kepler(KeplerPropagator),
    Sgp4(Sgp4Propagator),
    Sgp4List(Sgp4ListPropagator),
    Linear(LinearPropagator),
    GroundStation(GroundStationPropagator),
    StateList(StateListPropagator),
}

impl Propagator {
    pub fn new(kind: PropagatorKind, min_accuracy_km: f64) -> Self {
        Self {
            kind,
            cache: StateCache::new(min_accuracy_km),
        }
    }

    pub fn kind(&self) -> &PropagatorKind {
        &self.kind
    }

    /// Inertial state at `sim_s`, served from cache while the predicted
    /// drift stays below the accuracy threshold.
    pub fn state_at(&self, sim_s: f64) -> Result<StateVector> {
        if let Some(hit) = self.cache.lookup(sim_s) {
            return Ok(hit);
        }
        let state = self.kind.compute_state(sim_s)?;
        self.cache.store(state);
        Ok(state)
    }

    /// Would a query at `sim_s` trigger a recomputation?
    pub fn needs_state_update(&self, sim_s: f64) -> bool {
        self.cache.needs_state_update(sim_s)
    }

    /// Orbital period, when the variant has a defined orbit.
    pub fn orbital_period_s(&self) -> Option<f64> {
        match &self.kind {
            PropagatorKind::Kepler(k) => Some(k.elements().orbital_period_s()),
            PropagatorKind::Sgp4(s) => Some(s.orbital_period_s()),
            PropagatorKind::Sgp4List(s) => s.orbital_period_s(),
            _ => None,
        }
    }

    /// Distance from the Earth center at `sim_s` (km).
    pub fn orbital_radius_km(&self, sim_s: f64) -> Result<f64> {
        match &self.kind {
            PropagatorKind::Kepler(k) => k.orbital_radius_km(sim_s),
            _ => Ok(self.state_at(sim_s)?.radius_km()),
        }
    }

    /// `(semi_major_axis_km, eccentricity)` when the variant carries Kepler
    /// elements; callers without one derive instantaneous elements from the
    /// state vector instead.
    pub fn kepler_shape(&self) -> Option<(f64, f64)> {
        match &self.kind {
            PropagatorKind::Kepler(k) => Some((
                k.elements().semi_major_axis_km,
                k.elements().eccentricity,
            )),
            _ => None,
        }
    }
}

impl PropagatorKind {
    fn compute_state(&self, sim_s: f64) -> Result<StateVector> {
        match self {
            PropagatorKind::Kepler(k) => k.compute_state(sim_s),
            PropagatorKind::Sgp4(s) => s.compute_state(sim_s),
            PropagatorKind::Sgp4List(s) => s.compute_state(sim_s),
            PropagatorKind::Linear(l) => Ok(l.compute_state(sim_s)),
            PropagatorKind::GroundStation(g) => Ok(g.compute_state(sim_s)),
            PropagatorKind::StateList(s) => Ok(s.compute_state(sim_s)),
        }
    }
}
