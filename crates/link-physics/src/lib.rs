//! Link Physics Library
//!
//! Free-space link budgets, maximum-communication-range inversion, and the
//! geometric line-of-sight bound for the Meridian constellation simulator.
//!
//! Units are tracked in the names: `_dbm`/`_dbi`/`_db` are logarithmic,
//! `_mw` is linear milliwatts. Conversion happens only at the boundaries of
//! a computation, never in the middle of one.

use std::f64::consts::PI;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod interference;

pub use interference::{
    check_interfering, further_interference_checks, is_working_contact, received_power_dbm,
    LinkEstimate, Reception,
};

/// Speed of light (km/s)
pub const SPEED_OF_LIGHT_KM_S: f64 = 299_792.458;
/// Mean Earth radius (km)
pub const EARTH_RADIUS_KM: f64 = 6371.0;

#[derive(Error, Debug)]
pub enum LinkError {
    #[error("Invalid radio parameters: {0}")]
    InvalidParams(String),
}

pub type Result<T> = std::result::Result<T, LinkError>;

/// Per-radio RF configuration.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RadioParams {
    /// Transmit power (dBm)
    pub tx_power_dbm: f64,
    /// Transmit antenna gain (dBi)
    pub tx_gain_dbi: f64,
    /// Receive antenna gain (dBi)
    pub rx_gain_dbi: f64,
    /// Carrier frequency (Hz)
    pub frequency_hz: f64,
    /// Receiver sensitivity (dBm)
    pub rx_sensitivity_dbm: f64,
    /// Minimum SNIR for successful reception (dB)
    pub snir_threshold_db: f64,
    /// Background noise power at the receiver (dBm); `None` means no noise
    /// submodule is configured and the geometric-only radius applies.
    #[serde(default)]
    pub noise_floor_dbm: Option<f64>,
    /// Link capacity (bits/s)
    pub bitrate_bps: i64,
    /// Fixed maximum communication range (km); the idealized model. When
    /// set it is used directly as the search radius instead of the link
    /// budget.
    #[serde(default)]
    pub max_range_km: Option<f64>,
}

impl Default for RadioParams {
    fn default() -> Self {
        // UHF cubesat-class transceiver
        Self {
            tx_power_dbm: 30.0,
            tx_gain_dbi: 6.0,
            rx_gain_dbi: 6.0,
            frequency_hz: 437.0e6,
            rx_sensitivity_dbm: -110.0,
            snir_threshold_db: 10.0,
            noise_floor_dbm: Some(-120.0),
            bitrate_bps: 9600,
            max_range_km: None,
        }
    }
}

impl RadioParams {
    pub fn validate(&self) -> Result<()> {
        if self.frequency_hz <= 0.0 || !self.frequency_hz.is_finite() {
            return Err(LinkError::InvalidParams(format!(
                "carrier frequency {} Hz",
                self.frequency_hz
            )));
        }
        if self.bitrate_bps <= 0 {
            return Err(LinkError::InvalidParams(format!(
                "bitrate {} bps",
                self.bitrate_bps
            )));
        }
        if let Some(r) = self.max_range_km {
            if r <= 0.0 {
                return Err(LinkError::InvalidParams(format!("max range {} km", r)));
            }
        }
        Ok(())
    }

    /// Maximum downlink range of this transmitter against receiver `rx`.
    ///
    /// Idealized model: a configured fixed range wins outright. Physical
    /// model: the lesser of the range where SNIR exactly meets the
    /// receiver's threshold and the range where received power meets its
    /// sensitivity. Without a noise floor there is no SNIR bound and the
    /// caller falls back to the geometric-only radius (`None`).
    pub fn max_comm_range_km(&self, rx: &RadioParams) -> Option<f64> {
        match (self.max_range_km, rx.max_range_km) {
            (Some(a), Some(b)) => return Some(a.min(b)),
            (Some(a), None) => return Some(a),
            (None, Some(b)) => return Some(b),
            (None, None) => {}
        }

        let noise_floor_dbm = rx.noise_floor_dbm?;
        let budget_db = self.tx_power_dbm + self.tx_gain_dbi + rx.rx_gain_dbi;
        let snir_range_km = range_for_path_loss_km(
            budget_db - (noise_floor_dbm + rx.snir_threshold_db),
            self.frequency_hz,
        );
        let sensitivity_range_km =
            range_for_path_loss_km(budget_db - rx.rx_sensitivity_dbm, self.frequency_hz);
        Some(snir_range_km.min(sensitivity_range_km))
    }
}

pub fn dbm_to_mw(dbm: f64) -> f64 {
    10f64.powf(dbm / 10.0)
}

pub fn mw_to_dbm(mw: f64) -> f64 {
    10.0 * mw.log10()
}

/// Free-space path loss (dB) at the given distance and carrier frequency.
pub fn free_space_path_loss_db(distance_km: f64, frequency_hz: f64) -> f64 {
    let distance_m = distance_km * 1000.0;
    let c_m_s = SPEED_OF_LIGHT_KM_S * 1000.0;
    20.0 * (4.0 * PI * distance_m * frequency_hz / c_m_s).log10()
}

/// Distance (km) at which free-space path loss equals `loss_db`.
pub fn range_for_path_loss_km(loss_db: f64, frequency_hz: f64) -> f64 {
    let c_m_s = SPEED_OF_LIGHT_KM_S * 1000.0;
    let distance_m = c_m_s / (4.0 * PI * frequency_hz) * 10f64.powf(loss_db / 20.0);
    distance_m / 1000.0
}

/// Geometric line-of-sight bound: the horizon distance from apogee,
/// `sqrt((a(1+e))^2 - Re^2)`. A link is never assumed to reach through the
/// Earth or beyond line-of-sight regardless of the link budget.
///
/// For inter-satellite links the bound is doubled: both ends may be near
/// apogee simultaneously.
pub fn calc_geom_constr_radius(semi_major_axis_km: f64, eccentricity: f64, is_isl: bool) -> f64 {
    let apogee_km = semi_major_axis_km * (1.0 + eccentricity);
    let single = (apogee_km.powi(2) - EARTH_RADIUS_KM.powi(2)).max(0.0).sqrt();
    if is_isl {
        2.0 * single
    } else {
        single
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fspl_known_value_x_band() {
        // Earth-Moon at X-band: ~222.6 dB
        let loss = free_space_path_loss_db(384_400.0, 8.4e9);
        assert!((loss - 222.6).abs() < 1.0, "FSPL {} dB", loss);
    }

    #[test]
    fn fspl_doubling_distance_adds_6db() {
        let a = free_space_path_loss_db(10_000.0, 437.0e6);
        let b = free_space_path_loss_db(20_000.0, 437.0e6);
        assert!((b - a - 6.02).abs() < 0.1);
    }

    #[test]
    fn path_loss_inversion_round_trips() {
        for d in [1.0, 100.0, 2500.0, 40_000.0] {
            let loss = free_space_path_loss_db(d, 2.2e9);
            let back = range_for_path_loss_km(loss, 2.2e9);
            assert!((back - d).abs() / d < 1e-9, "d={} back={}", d, back);
        }
    }

    #[test]
    fn comm_range_grows_with_tx_power() {
        let rx = RadioParams::default();
        let low = RadioParams { tx_power_dbm: 20.0, ..Default::default() };
        let high = RadioParams { tx_power_dbm: 40.0, ..Default::default() };
        assert!(high.max_comm_range_km(&rx).unwrap() > low.max_comm_range_km(&rx).unwrap());
    }

    #[test]
    fn comm_range_takes_the_tighter_bound() {
        // Sensitivity far below what the SNIR threshold allows: SNIR wins
        let tx = RadioParams::default();
        let rx = RadioParams {
            rx_sensitivity_dbm: -200.0,
            ..Default::default()
        };
        let budget = tx.tx_power_dbm + tx.tx_gain_dbi + rx.rx_gain_dbi;
        let expected = range_for_path_loss_km(
            budget - (rx.noise_floor_dbm.unwrap() + rx.snir_threshold_db),
            tx.frequency_hz,
        );
        let got = tx.max_comm_range_km(&rx).unwrap();
        assert!((got - expected).abs() < 1e-9);
    }

    #[test]
    fn idealized_range_overrides_link_budget() {
        let tx = RadioParams { max_range_km: Some(1500.0), ..Default::default() };
        let rx = RadioParams { max_range_km: Some(900.0), ..Default::default() };
        assert_eq!(tx.max_comm_range_km(&rx), Some(900.0));
    }

    #[test]
    fn no_noise_floor_means_no_physical_range() {
        let tx = RadioParams::default();
        let rx = RadioParams { noise_floor_dbm: None, ..Default::default() };
        assert_eq!(tx.max_comm_range_km(&rx), None);
    }

    #[test]
    fn geom_radius_monotonic_in_semi_major_axis() {
        let mut prev = 0.0;
        for a in [6800.0, 7200.0, 8000.0, 12_000.0, 26_000.0, 42_164.0] {
            let r = calc_geom_constr_radius(a, 0.01, false);
            assert!(r > prev, "a={} r={}", a, r);
            prev = r;
        }
    }

    #[test]
    fn geom_radius_isl_is_exactly_double() {
        let single = calc_geom_constr_radius(7000.0, 0.1, false);
        let isl = calc_geom_constr_radius(7000.0, 0.1, true);
        assert_eq!(isl, 2.0 * single);
    }

    #[test]
    fn geom_radius_clamps_below_the_surface() {
        // degenerate input: apogee below Earth radius must not NaN
        assert_eq!(calc_geom_constr_radius(3000.0, 0.0, false), 0.0);
    }
}
