//! Plan Builder Library
//!
//! Orchestrates position propagation, the spatial index, and the link
//! feasibility engine over a simulated horizon to produce contact and
//! interference plans for the Meridian constellation simulator.

use std::path::PathBuf;

use thiserror::Error;

use contact_plan::NodeId;
use link_physics::RadioParams;
use orbital_dynamics::Propagator;

pub mod builder;
pub mod kdtree;
pub mod merge;
pub mod scenario;

pub use builder::{BuildResult, BuilderConfig, PlanBuilder};
pub use kdtree::{compute_comm_radius, RadioPoint, RadioTree};
pub use merge::merge_intervals;
pub use scenario::Scenario;

#[derive(Error, Debug)]
pub enum BuilderError {
    #[error("Invalid scenario: {0}")]
    InvalidScenario(String),
    #[error("Cannot read scenario {path}: {source}")]
    ScenarioUnreadable {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Scenario parse error: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Propagation(#[from] orbital_dynamics::PropagationError),
    #[error(transparent)]
    Link(#[from] link_physics::LinkError),
    #[error(transparent)]
    Plan(#[from] contact_plan::PlanError),
}

pub type Result<T> = std::result::Result<T, BuilderError>;

/// A node participating in plan construction: identity, trajectory, and
/// radio configuration.
#[derive(Debug)]
pub struct RadioNode {
    pub id: NodeId,
    pub is_ground_station: bool,
    /// Ground stations with backhaul are mutually reachable without an RF
    /// link and get synthetic full-horizon contacts.
    pub internet_backhaul: bool,
    pub propagator: Propagator,
    pub radio: RadioParams,
}
