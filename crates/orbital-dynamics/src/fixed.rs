//! Non-orbital propagators: linear motion, Earth-fixed ground stations,
//! and precomputed state sample lists.

use nalgebra::{Rotation3, Vector3};

use crate::{
    PropagationError, Result, StateVector, EARTH_EQUATORIAL_RADIUS_KM, EARTH_FLATTENING,
    EARTH_ROTATION_RAD_S,
};

/// Constant-velocity motion from an initial state.
#[derive(Debug, Clone)]
pub struct LinearPropagator {
    initial: StateVector,
}

impl LinearPropagator {
    pub fn new(initial: StateVector) -> Self {
        Self { initial }
    }

    pub(crate) fn compute_state(&self, sim_s: f64) -> StateVector {
        let dt = sim_s - self.initial.sim_time_s;
        StateVector {
            position_km: self.initial.position_km + self.initial.velocity_km_s * dt,
            velocity_km_s: self.initial.velocity_km_s,
            sim_time_s: sim_s,
        }
    }
}

/// A geodetic site rotating with the Earth, expressed in the inertial frame.
#[derive(Debug, Clone)]
pub struct GroundStationPropagator {
    /// Site position in the Earth-fixed frame (km)
    ecef_km: Vector3<f64>,
}

impl GroundStationPropagator {
    pub fn new(latitude_deg: f64, longitude_deg: f64, altitude_m: f64) -> Self {
        Self {
            ecef_km: geodetic_to_ecef(latitude_deg, longitude_deg, altitude_m / 1000.0),
        }
    }

    pub(crate) fn compute_state(&self, sim_s: f64) -> StateVector {
        let theta = EARTH_ROTATION_RAD_S * sim_s;
        let rotation = Rotation3::from_axis_angle(&Vector3::z_axis(), theta);
        let position_km = rotation * self.ecef_km;
        let omega = Vector3::new(0.0, 0.0, EARTH_ROTATION_RAD_S);
        StateVector {
            velocity_km_s: omega.cross(&position_km),
            position_km,
            sim_time_s: sim_s,
        }
    }
}

/// Geodetic coordinates to the Earth-fixed frame (km).
pub fn geodetic_to_ecef(latitude_deg: f64, longitude_deg: f64, altitude_km: f64) -> Vector3<f64> {
    let lat_rad = latitude_deg.to_radians();
    let lon_rad = longitude_deg.to_radians();

    let n = EARTH_EQUATORIAL_RADIUS_KM
        / (1.0 - EARTH_FLATTENING * lat_rad.sin().powi(2)).sqrt();

    Vector3::new(
        (n + altitude_km) * lat_rad.cos() * lon_rad.cos(),
        (n + altitude_km) * lat_rad.cos() * lon_rad.sin(),
        (n * (1.0 - EARTH_FLATTENING) + altitude_km) * lat_rad.sin(),
    )
}

/// Precomputed `(time, state)` samples with linear interpolation between
/// brackets; queries outside the sampled range clamp to the end samples.
#[derive(Debug, Clone)]
pub struct StateListPropagator {
    samples: Vec<StateVector>,
}

impl StateListPropagator {
    pub fn new(mut samples: Vec<StateVector>) -> Result<Self> {
        if samples.is_empty() {
            return Err(PropagationError::EmptyStateList);
        }
        samples.sort_by(|a, b| {
            a.sim_time_s
                .partial_cmp(&b.sim_time_s)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        Ok(Self { samples })
    }

    pub(crate) fn compute_state(&self, sim_s: f64) -> StateVector {
        let first = &self.samples[0];
        let last = &self.samples[self.samples.len() - 1];
        if sim_s <= first.sim_time_s {
            return StateVector { sim_time_s: sim_s, ..*first };
        }
        if sim_s >= last.sim_time_s {
            return StateVector { sim_time_s: sim_s, ..*last };
        }

        let upper = self
            .samples
            .partition_point(|s| s.sim_time_s <= sim_s);
        let a = &self.samples[upper - 1];
        let b = &self.samples[upper];
        let span = b.sim_time_s - a.sim_time_s;
        let frac = if span > 0.0 { (sim_s - a.sim_time_s) / span } else { 0.0 };

        StateVector {
            position_km: a.position_km.lerp(&b.position_km, frac),
            velocity_km_s: a.velocity_km_s.lerp(&b.velocity_km_s, frac),
            sim_time_s: sim_s,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(t: f64, x: f64) -> StateVector {
        StateVector {
            position_km: Vector3::new(x, 0.0, 0.0),
            velocity_km_s: Vector3::new(1.0, 0.0, 0.0),
            sim_time_s: t,
        }
    }

    #[test]
    fn linear_extrapolates_both_directions() {
        let prop = LinearPropagator::new(state(10.0, 100.0));
        assert!((prop.compute_state(15.0).position_km.x - 105.0).abs() < 1e-12);
        assert!((prop.compute_state(0.0).position_km.x - 90.0).abs() < 1e-12);
    }

    #[test]
    fn ground_station_stays_on_the_surface() {
        let prop = GroundStationPropagator::new(48.5, 11.3, 550.0);
        let r0 = prop.compute_state(0.0).radius_km();
        let r1 = prop.compute_state(3600.0).radius_km();
        assert!((r0 - r1).abs() < 1e-6);
        assert!((6350.0..6400.0).contains(&r0), "radius {}", r0);
    }

    #[test]
    fn ground_station_rotates_a_full_turn_per_sidereal_day() {
        let prop = GroundStationPropagator::new(0.0, 0.0, 0.0);
        let sidereal_day = 2.0 * std::f64::consts::PI / EARTH_ROTATION_RAD_S;
        let p0 = prop.compute_state(0.0).position_km;
        let p1 = prop.compute_state(sidereal_day).position_km;
        assert!((p0 - p1).norm() < 1e-3);
    }

    #[test]
    fn state_list_interpolates_and_clamps() {
        let prop =
            StateListPropagator::new(vec![state(0.0, 0.0), state(10.0, 100.0)]).unwrap();
        assert!((prop.compute_state(5.0).position_km.x - 50.0).abs() < 1e-9);
        assert!((prop.compute_state(-5.0).position_km.x - 0.0).abs() < 1e-9);
        assert!((prop.compute_state(50.0).position_km.x - 100.0).abs() < 1e-9);
    }

    #[test]
    fn empty_state_list_rejected() {
        assert!(matches!(
            StateListPropagator::new(vec![]),
            Err(PropagationError::EmptyStateList)
        ));
    }
}
