//! Attitude as a function of the translational state.

use nalgebra::{UnitQuaternion, Vector3};

use crate::StateVector;

/// How a node orients itself. Antenna pointing logic sits above this crate;
/// only the orientation itself is produced here.
#[derive(Debug, Clone, Copy)]
pub enum AttitudeMode {
    /// Body +z toward the Earth center, +x roughly along the velocity.
    NadirPointing,
    /// A fixed inertial orientation.
    InertialFixed(UnitQuaternion<f64>),
}

/// Orientation of a node with the given attitude mode at the given state.
pub fn attitude_at(mode: &AttitudeMode, state: &StateVector) -> UnitQuaternion<f64> {
    match mode {
        AttitudeMode::InertialFixed(q) => *q,
        AttitudeMode::NadirPointing => {
            let down = -state.position_km;
            if down.norm() < f64::EPSILON {
                return UnitQuaternion::identity();
            }
            let along = if state.velocity_km_s.norm() > f64::EPSILON {
                state.velocity_km_s
            } else {
                Vector3::x()
            };
            UnitQuaternion::face_towards(&down, &along)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nadir_z_axis_points_at_earth_center() {
        let state = StateVector {
            position_km: Vector3::new(7000.0, 0.0, 0.0),
            velocity_km_s: Vector3::new(0.0, 7.5, 0.0),
            sim_time_s: 0.0,
        };
        let q = attitude_at(&AttitudeMode::NadirPointing, &state);
        let body_z = q * Vector3::z();
        let expected = -state.position_km.normalize();
        assert!((body_z - expected).norm() < 1e-9);
    }

    #[test]
    fn inertial_fixed_ignores_state() {
        let q0 = UnitQuaternion::from_euler_angles(0.1, 0.2, 0.3);
        let state = StateVector {
            position_km: Vector3::new(1.0, 2.0, 3.0),
            velocity_km_s: Vector3::zeros(),
            sim_time_s: 42.0,
        };
        assert_eq!(attitude_at(&AttitudeMode::InertialFixed(q0), &state), q0);
    }
}
