//! Classical orbital elements and Kepler's-equation propagation.

use std::f64::consts::PI;

use nalgebra::{Rotation3, Vector3};
use serde::{Deserialize, Serialize};

use crate::{
    PropagationError, Result, StateVector, EARTH_RADIUS_KM, MU_EARTH_KM3_S2,
};

/// Iteration bound for the eccentric-anomaly solver.
pub const MAX_SOLVER_ITERATIONS: u32 = 100;
const SOLVER_TOLERANCE: f64 = 1e-12;

/// Six classical orbital elements plus their epoch.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct KeplerElements {
    /// Semi-major axis (km)
    pub semi_major_axis_km: f64,
    /// Eccentricity, [0, 1)
    pub eccentricity: f64,
    /// Inclination (rad)
    pub inclination_rad: f64,
    /// Right ascension of the ascending node (rad)
    pub raan_rad: f64,
    /// Argument of periapsis (rad)
    pub arg_periapsis_rad: f64,
    /// Mean anomaly at epoch (rad)
    pub mean_anomaly_rad: f64,
    /// Element epoch (simulation seconds)
    pub epoch_s: f64,
}

impl KeplerElements {
    /// A circular orbit at the given semi-major axis and inclination.
    pub fn circular(semi_major_axis_km: f64, inclination_rad: f64) -> Self {
        Self {
            semi_major_axis_km,
            eccentricity: 0.0,
            inclination_rad,
            raan_rad: 0.0,
            arg_periapsis_rad: 0.0,
            mean_anomaly_rad: 0.0,
            epoch_s: 0.0,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.semi_major_axis_km <= EARTH_RADIUS_KM {
            return Err(PropagationError::InvalidElements(format!(
                "semi-major axis {} km is below the Earth surface",
                self.semi_major_axis_km
            )));
        }
        if !(0.0..1.0).contains(&self.eccentricity) {
            return Err(PropagationError::InvalidElements(format!(
                "eccentricity {} outside [0, 1)",
                self.eccentricity
            )));
        }
        Ok(())
    }

    pub fn orbital_period_s(&self) -> f64 {
        2.0 * PI * (self.semi_major_axis_km.powi(3) / MU_EARTH_KM3_S2).sqrt()
    }

    pub fn mean_motion_rad_s(&self) -> f64 {
        (MU_EARTH_KM3_S2 / self.semi_major_axis_km.powi(3)).sqrt()
    }

    /// Apogee distance from the Earth center (km).
    pub fn apogee_radius_km(&self) -> f64 {
        self.semi_major_axis_km * (1.0 + self.eccentricity)
    }
}

/// Solve Kepler's equation `E - e sin E = M` for the eccentric anomaly.
///
/// Halley iteration with a Newton-Raphson fallback when the Halley
/// denominator degenerates, bounded to [`MAX_SOLVER_ITERATIONS`].
pub fn solve_eccentric_anomaly(mean_anomaly_rad: f64, eccentricity: f64) -> Result<f64> {
    let m = mean_anomaly_rad;
    let e = eccentricity;
    // High-eccentricity orbits converge poorly from E0 = M
    let mut ea = if e < 0.8 { m } else { PI };

    for _ in 0..MAX_SOLVER_ITERATIONS {
        let f = ea - e * ea.sin() - m;
        if f.abs() < SOLVER_TOLERANCE {
            return Ok(ea);
        }
        let fp = 1.0 - e * ea.cos();
        let fpp = e * ea.sin();
        let newton = f / fp;
        let halley_denom = fp - 0.5 * fpp * newton;
        let step = if halley_denom.abs() > f64::EPSILON {
            f / halley_denom
        } else {
            newton
        };
        ea -= step;
    }
    Err(PropagationError::SolverDiverged(MAX_SOLVER_ITERATIONS))
}

/// Keplerian two-body propagation.
#[derive(Debug, Clone)]
pub struct KeplerPropagator {
    elements: KeplerElements,
    /// Perifocal-to-ECI rotation, fixed per element set.
    rotation: Rotation3<f64>,
}

impl KeplerPropagator {
    pub fn new(elements: KeplerElements) -> Result<Self> {
        elements.validate()?;
        let rotation = Rotation3::from_axis_angle(&Vector3::z_axis(), elements.raan_rad)
            * Rotation3::from_axis_angle(&Vector3::x_axis(), elements.inclination_rad)
            * Rotation3::from_axis_angle(&Vector3::z_axis(), elements.arg_periapsis_rad);
        Ok(Self { elements, rotation })
    }

    pub fn elements(&self) -> &KeplerElements {
        &self.elements
    }

    pub(crate) fn compute_state(&self, sim_s: f64) -> Result<StateVector> {
        let el = &self.elements;
        let a = el.semi_major_axis_km;
        let e = el.eccentricity;

        let mean_anomaly =
            el.mean_anomaly_rad + el.mean_motion_rad_s() * (sim_s - el.epoch_s);
        let ea = solve_eccentric_anomaly(mean_anomaly, e)?;
        let (sin_ea, cos_ea) = ea.sin_cos();

        let r = a * (1.0 - e * cos_ea);
        let true_anomaly = 2.0
            * ((1.0 + e).sqrt() * (ea / 2.0).sin())
                .atan2((1.0 - e).sqrt() * (ea / 2.0).cos());

        let position_pf = Vector3::new(r * true_anomaly.cos(), r * true_anomaly.sin(), 0.0);
        let v_scale = (MU_EARTH_KM3_S2 * a).sqrt() / r;
        let velocity_pf = Vector3::new(
            -v_scale * sin_ea,
            v_scale * (1.0 - e * e).sqrt() * cos_ea,
            0.0,
        );

        Ok(StateVector {
            position_km: self.rotation * position_pf,
            velocity_km_s: self.rotation * velocity_pf,
            sim_time_s: sim_s,
        })
    }

    /// Orbital radius at `sim_s` from the solved eccentric anomaly (km).
    pub fn orbital_radius_km(&self, sim_s: f64) -> Result<f64> {
        let el = &self.elements;
        let mean_anomaly =
            el.mean_anomaly_rad + el.mean_motion_rad_s() * (sim_s - el.epoch_s);
        let ea = solve_eccentric_anomaly(mean_anomaly, el.eccentricity)?;
        Ok(el.semi_major_axis_km * (1.0 - el.eccentricity * ea.cos()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn solver_is_identity_for_circular_orbits() {
        for m in [-2.0, 0.0, 0.5, 3.0] {
            let ea = solve_eccentric_anomaly(m, 0.0).unwrap();
            assert!((ea - m).abs() < 1e-12);
        }
    }

    #[test]
    fn solver_satisfies_keplers_equation() {
        for e in [0.1, 0.5, 0.9, 0.99] {
            for m in [0.1, 1.0, 2.5, 5.0] {
                let ea = solve_eccentric_anomaly(m, e).unwrap();
                assert!(
                    (ea - e * ea.sin() - m).abs() < 1e-9,
                    "e={} m={} ea={}",
                    e,
                    m,
                    ea
                );
            }
        }
    }

    #[test]
    fn circular_orbit_keeps_radius_and_speed() {
        let a = 7000.0;
        let prop = KeplerPropagator::new(KeplerElements::circular(a, 0.9)).unwrap();
        let expected_speed = (MU_EARTH_KM3_S2 / a).sqrt();
        for t in [0.0, 500.0, 2000.0, 5000.0] {
            let s = prop.compute_state(t).unwrap();
            assert!((s.radius_km() - a).abs() < 1e-6, "t={}", t);
            assert!((s.speed_km_s() - expected_speed).abs() < 1e-6, "t={}", t);
        }
    }

    #[test]
    fn period_of_leo_orbit() {
        let el = KeplerElements::circular(6771.0, 0.0); // ~400 km altitude
        let period = el.orbital_period_s();
        // ISS-like orbit: ~92.4 minutes
        assert!((period - 5545.0).abs() < 20.0, "period={}", period);
    }

    #[test]
    fn eccentric_orbit_radius_spans_perigee_to_apogee() {
        let el = KeplerElements {
            semi_major_axis_km: 10_000.0,
            eccentricity: 0.3,
            ..KeplerElements::circular(10_000.0, 0.0)
        };
        let prop = KeplerPropagator::new(el).unwrap();
        let period = el.orbital_period_s();
        // epoch at perigee (M = 0)
        assert!((prop.orbital_radius_km(0.0).unwrap() - 7000.0).abs() < 1.0);
        assert!((prop.orbital_radius_km(period / 2.0).unwrap() - 13_000.0).abs() < 1.0);
    }

    #[test]
    fn invalid_elements_rejected() {
        assert!(KeplerPropagator::new(KeplerElements::circular(6000.0, 0.0)).is_err());
        let mut el = KeplerElements::circular(7000.0, 0.0);
        el.eccentricity = 1.2;
        assert!(KeplerPropagator::new(el).is_err());
    }
}
