//! Scenario loading and validation.
//!
//! A scenario is a JSON description of the node set and build settings.
//! Validation happens at load: a malformed scenario is a configuration
//! error and fatal, never retried.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use contact_plan::{NodeId, PlanMetadata, SimTime};
use link_physics::RadioParams;
use orbital_dynamics::{
    GroundStationPropagator, KeplerElements, KeplerPropagator, Propagator, PropagatorKind,
    SimEpoch, Sgp4ListPropagator, Sgp4Propagator,
};

use crate::builder::BuilderConfig;
use crate::{BuilderError, RadioNode, Result};

fn default_min_accuracy_km() -> f64 {
    1.0
}

fn default_loopback_bitrate() -> i64 {
    1_000_000_000
}

/// How a satellite's trajectory is described.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OrbitConfig {
    /// A fixed two-line element set.
    Tle { line1: String, line2: String },
    /// An ordered list of TLE sets, switched by epoch bracket.
    TleList { sets: Vec<TlePair> },
    /// Classical orbital elements (angles in degrees).
    Kepler {
        semi_major_axis_km: f64,
        eccentricity: f64,
        inclination_deg: f64,
        raan_deg: f64,
        arg_periapsis_deg: f64,
        mean_anomaly_deg: f64,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TlePair {
    pub line1: String,
    pub line2: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SatelliteConfig {
    pub id: NodeId,
    pub orbit: OrbitConfig,
    /// Overrides the scenario default when present.
    #[serde(default)]
    pub radio: Option<RadioParams>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroundStationConfig {
    pub id: NodeId,
    pub latitude_deg: f64,
    pub longitude_deg: f64,
    #[serde(default)]
    pub altitude_m: f64,
    /// Backhaul-connected stations are mutually reachable without RF.
    #[serde(default)]
    pub internet_backhaul: bool,
    #[serde(default)]
    pub radio: Option<RadioParams>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    pub name: String,
    /// Calendar time of simulation second zero.
    pub epoch: DateTime<Utc>,
    /// Horizon to generate the plan for (s).
    pub max_sim_time: SimTime,
    /// Re-test cadence (s).
    pub check_interval: SimTime,
    #[serde(default)]
    pub assume_bidirectional: bool,
    #[serde(default)]
    pub track_interference: bool,
    /// Propagator cache tolerance (km).
    #[serde(default = "default_min_accuracy_km")]
    pub min_accuracy_km: f64,
    #[serde(default = "default_loopback_bitrate")]
    pub loopback_bitrate_bps: i64,
    /// Radio configuration for nodes without their own.
    #[serde(default)]
    pub default_radio: RadioParams,
    pub satellites: Vec<SatelliteConfig>,
    #[serde(default)]
    pub ground_stations: Vec<GroundStationConfig>,
}

impl Scenario {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("Loading scenario from {:?}", path);
        let file = File::open(path).map_err(|e| BuilderError::ScenarioUnreadable {
            path: path.to_path_buf(),
            source: e,
        })?;
        let scenario: Scenario = serde_json::from_reader(BufReader::new(file))?;
        scenario.validate()?;
        Ok(scenario)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_sim_time <= 0 {
            return Err(BuilderError::InvalidScenario(format!(
                "max_sim_time {} must be positive",
                self.max_sim_time
            )));
        }
        if self.check_interval <= 0 {
            return Err(BuilderError::InvalidScenario(format!(
                "check_interval {} must be positive",
                self.check_interval
            )));
        }
        if self.satellites.is_empty() {
            return Err(BuilderError::InvalidScenario(
                "scenario has no satellites".to_string(),
            ));
        }

        let mut ids: Vec<NodeId> = self
            .satellites
            .iter()
            .map(|s| s.id)
            .chain(self.ground_stations.iter().map(|g| g.id))
            .collect();
        ids.sort_unstable();
        for pair in ids.windows(2) {
            if pair[0] == pair[1] {
                return Err(BuilderError::InvalidScenario(format!(
                    "duplicate node id {}",
                    pair[0]
                )));
            }
        }

        // the plan format derives node kinds from one ID boundary:
        // ground-station IDs must sit above every satellite ID
        let max_sat = self.satellites.iter().map(|s| s.id).max().unwrap_or(0);
        if let Some(bad) = self.ground_stations.iter().find(|g| g.id <= max_sat) {
            return Err(BuilderError::InvalidScenario(format!(
                "ground station id {} is not above the satellite range (max {})",
                bad.id, max_sat
            )));
        }

        self.default_radio.validate()?;
        for radio in self
            .satellites
            .iter()
            .filter_map(|s| s.radio.as_ref())
            .chain(self.ground_stations.iter().filter_map(|g| g.radio.as_ref()))
        {
            radio.validate()?;
        }
        Ok(())
    }

    pub fn sim_epoch(&self) -> SimEpoch {
        SimEpoch::new(self.epoch)
    }

    pub fn builder_config(&self) -> BuilderConfig {
        BuilderConfig {
            max_sim_time: self.max_sim_time,
            check_interval: self.check_interval,
            assume_bidirectional: self.assume_bidirectional,
            track_interference: self.track_interference,
            loopback_bitrate_bps: self.loopback_bitrate_bps,
        }
    }

    /// Plan-file metadata implied by the configured node set.
    pub fn metadata(&self) -> PlanMetadata {
        let max_sat = self.satellites.iter().map(|s| s.id).max().unwrap_or(0);
        let max_node = self
            .ground_stations
            .iter()
            .map(|g| g.id)
            .max()
            .unwrap_or(max_sat);
        PlanMetadata::new(max_sat, max_node, self.max_sim_time)
    }

    /// Instantiate every configured node with its propagator and radio.
    pub fn build_nodes(&self) -> Result<Vec<RadioNode>> {
        let epoch = self.sim_epoch();
        let mut nodes = Vec::with_capacity(self.satellites.len() + self.ground_stations.len());

        for sat in &self.satellites {
            let kind = match &sat.orbit {
                OrbitConfig::Tle { line1, line2 } => {
                    PropagatorKind::Sgp4(Sgp4Propagator::from_tle(line1, line2, epoch)?)
                }
                OrbitConfig::TleList { sets } => {
                    let pairs: Vec<(String, String)> = sets
                        .iter()
                        .map(|p| (p.line1.clone(), p.line2.clone()))
                        .collect();
                    PropagatorKind::Sgp4List(Sgp4ListPropagator::from_tles(&pairs, epoch)?)
                }
                OrbitConfig::Kepler {
                    semi_major_axis_km,
                    eccentricity,
                    inclination_deg,
                    raan_deg,
                    arg_periapsis_deg,
                    mean_anomaly_deg,
                } => {
                    let elements = KeplerElements {
                        semi_major_axis_km: *semi_major_axis_km,
                        eccentricity: *eccentricity,
                        inclination_rad: inclination_deg.to_radians(),
                        raan_rad: raan_deg.to_radians(),
                        arg_periapsis_rad: arg_periapsis_deg.to_radians(),
                        mean_anomaly_rad: mean_anomaly_deg.to_radians(),
                        epoch_s: 0.0,
                    };
                    PropagatorKind::Kepler(KeplerPropagator::new(elements)?)
                }
            };
            nodes.push(RadioNode {
                id: sat.id,
                is_ground_station: false,
                internet_backhaul: false,
                propagator: Propagator::new(kind, self.min_accuracy_km),
                radio: sat.radio.unwrap_or(self.default_radio),
            });
        }

        for gs in &self.ground_stations {
            nodes.push(RadioNode {
                id: gs.id,
                is_ground_station: true,
                internet_backhaul: gs.internet_backhaul,
                propagator: Propagator::new(
                    PropagatorKind::GroundStation(GroundStationPropagator::new(
                        gs.latitude_deg,
                        gs.longitude_deg,
                        gs.altitude_m,
                    )),
                    self.min_accuracy_km,
                ),
                radio: gs.radio.unwrap_or(self.default_radio),
            });
        }

        info!(
            "Scenario {:?}: {} satellites, {} ground stations",
            self.name,
            self.satellites.len(),
            self.ground_stations.len()
        );
        Ok(nodes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn sample_json() -> &'static str {
        r#"{
            "name": "two-sat-demo",
            "epoch": "2026-03-01T00:00:00Z",
            "max_sim_time": 3600,
            "check_interval": 60,
            "assume_bidirectional": true,
            "satellites": [
                {
                    "id": 1,
                    "orbit": {
                        "type": "kepler",
                        "semi_major_axis_km": 7000.0,
                        "eccentricity": 0.001,
                        "inclination_deg": 51.6,
                        "raan_deg": 0.0,
                        "arg_periapsis_deg": 0.0,
                        "mean_anomaly_deg": 0.0
                    }
                },
                {
                    "id": 2,
                    "orbit": {
                        "type": "kepler",
                        "semi_major_axis_km": 7000.0,
                        "eccentricity": 0.001,
                        "inclination_deg": 51.6,
                        "raan_deg": 0.0,
                        "arg_periapsis_deg": 0.0,
                        "mean_anomaly_deg": 1.0
                    }
                }
            ],
            "ground_stations": [
                {
                    "id": 41,
                    "latitude_deg": 48.15,
                    "longitude_deg": 11.58,
                    "altitude_m": 520.0,
                    "internet_backhaul": true
                }
            ]
        }"#
    }

    #[test]
    fn loads_and_instantiates_a_scenario() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(sample_json().as_bytes()).unwrap();

        let scenario = Scenario::from_file(file.path()).unwrap();
        assert_eq!(scenario.name, "two-sat-demo");
        assert!(scenario.assume_bidirectional);

        let nodes = scenario.build_nodes().unwrap();
        assert_eq!(nodes.len(), 3);
        assert!(nodes[2].is_ground_station);
        assert!(nodes[2].internet_backhaul);

        let metadata = scenario.metadata();
        assert_eq!(metadata.max_satellite_id, 2);
        assert_eq!(metadata.max_node_id, 41);
        assert!(metadata.is_ground_station(41));
    }

    #[test]
    fn rejects_duplicate_ids() {
        let mut scenario: Scenario = serde_json::from_str(sample_json()).unwrap();
        scenario.satellites[1].id = 1;
        assert!(matches!(
            scenario.validate(),
            Err(BuilderError::InvalidScenario(_))
        ));
    }

    #[test]
    fn rejects_ground_station_ids_inside_the_satellite_range() {
        let mut scenario: Scenario = serde_json::from_str(sample_json()).unwrap();
        scenario.ground_stations[0].id = 2;
        assert!(scenario.validate().is_err());
    }

    #[test]
    fn rejects_bad_orbit_elements_at_node_construction() {
        let mut scenario: Scenario = serde_json::from_str(sample_json()).unwrap();
        if let OrbitConfig::Kepler { eccentricity, .. } = &mut scenario.satellites[0].orbit {
            *eccentricity = 1.5;
        }
        assert!(scenario.build_nodes().is_err());
    }

    #[test]
    fn rejects_nonpositive_horizon() {
        let mut scenario: Scenario = serde_json::from_str(sample_json()).unwrap();
        scenario.max_sim_time = 0;
        assert!(scenario.validate().is_err());
    }

    #[test]
    fn missing_file_is_fatal() {
        assert!(matches!(
            Scenario::from_file("/no/such/scenario.json"),
            Err(BuilderError::ScenarioUnreadable { .. })
        ));
    }
}
