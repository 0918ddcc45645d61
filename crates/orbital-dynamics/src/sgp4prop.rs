//! SGP4 propagation from two-line element sets.

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::{PropagationError, Result, SimEpoch, StateVector};

/// SGP4 propagation for a single fixed TLE.
pub struct Sgp4Propagator {
    elements: sgp4::Elements,
    tle_epoch: DateTime<Utc>,
    sim_epoch: SimEpoch,
    orbital_period_s: f64,
}

impl std::fmt::Debug for Sgp4Propagator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sgp4Propagator")
            .field("norad_id", &self.elements.norad_id)
            .field("tle_epoch", &self.tle_epoch)
            .finish()
    }
}

impl Sgp4Propagator {
    /// Parse a TLE pair and set up the propagator. Malformed input is a
    /// fatal configuration error, as is a TLE the perturbation model
    /// rejects; both are validated here rather than at first query.
    pub fn from_tle(line1: &str, line2: &str, sim_epoch: SimEpoch) -> Result<Self> {
        let elements = sgp4::Elements::from_tle(None, line1.as_bytes(), line2.as_bytes())
            .map_err(|e| PropagationError::InvalidTle(format!("{:?}", e)))?;
        sgp4::Constants::from_elements(&elements)
            .map_err(|e| PropagationError::PropagationFailed(format!("{:?}", e)))?;

        let tle_epoch = DateTime::<Utc>::from_naive_utc_and_offset(elements.datetime, Utc);
        // mean motion is revolutions per day
        let orbital_period_s = 86_400.0 / elements.mean_motion;
        debug!(
            "SGP4 propagator for NORAD {} with epoch {}",
            elements.norad_id, tle_epoch
        );

        Ok(Self {
            elements,
            tle_epoch,
            sim_epoch,
            orbital_period_s,
        })
    }

    pub fn norad_id(&self) -> u64 {
        self.elements.norad_id
    }

    /// TLE epoch as simulation seconds.
    pub fn tle_epoch_sim_s(&self) -> f64 {
        self.sim_epoch.sim_seconds(self.tle_epoch)
    }

    pub fn orbital_period_s(&self) -> f64 {
        self.orbital_period_s
    }

    pub(crate) fn compute_state(&self, sim_s: f64) -> Result<StateVector> {
        let target = self.sim_epoch.datetime(sim_s);
        let minutes_since_epoch =
            target.signed_duration_since(self.tle_epoch).num_seconds() as f64 / 60.0;

        let constants = sgp4::Constants::from_elements(&self.elements)
            .map_err(|e| PropagationError::PropagationFailed(format!("{:?}", e)))?;
        let prediction = constants
            .propagate(minutes_since_epoch)
            .map_err(|e| PropagationError::PropagationFailed(format!("{:?}", e)))?;

        Ok(StateVector {
            position_km: nalgebra::Vector3::from(prediction.position),
            velocity_km_s: nalgebra::Vector3::from(prediction.velocity),
            sim_time_s: sim_s,
        })
    }
}

/// SGP4 propagation switching between an ordered list of TLE sets based on
/// their epoch brackets: the set with the latest epoch at or before the
/// query time wins, and queries before the first epoch use the first set.
#[derive(Debug)]
pub struct Sgp4ListPropagator {
    propagators: Vec<Sgp4Propagator>,
}

impl Sgp4ListPropagator {
    pub fn from_tles(tles: &[(String, String)], sim_epoch: SimEpoch) -> Result<Self> {
        if tles.is_empty() {
            return Err(PropagationError::EmptyTleList);
        }
        let mut propagators = tles
            .iter()
            .map(|(l1, l2)| Sgp4Propagator::from_tle(l1, l2, sim_epoch))
            .collect::<Result<Vec<_>>>()?;
        propagators.sort_by(|a, b| {
            a.tle_epoch_sim_s()
                .partial_cmp(&b.tle_epoch_sim_s())
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        Ok(Self { propagators })
    }

    pub fn len(&self) -> usize {
        self.propagators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.propagators.is_empty()
    }

    pub fn orbital_period_s(&self) -> Option<f64> {
        self.propagators.first().map(|p| p.orbital_period_s())
    }

    fn select(&self, sim_s: f64) -> &Sgp4Propagator {
        self.propagators
            .iter()
            .rev()
            .find(|p| p.tle_epoch_sim_s() <= sim_s)
            .unwrap_or(&self.propagators[0])
    }

    pub(crate) fn compute_state(&self, sim_s: f64) -> Result<StateVector> {
        self.select(sim_s).compute_state(sim_s)
    }
}
