//! Contact Plan Library
//!
//! The event-driven schedule of communication opportunities in a satellite
//! network: entry data model, the two line-oriented plan file formats, the
//! dual-heap iterator that answers "what changes next", and the manager
//! that replays a plan against the live node set.

use std::path::PathBuf;

use thiserror::Error;

pub mod barrier;
pub mod entry;
pub mod io;
pub mod iterator;
pub mod manager;

pub use barrier::CountdownBarrier;
pub use entry::{
    node_order, time_order, ContactPlanEntry, IndependentSet, InterferencePlanEntry, PlanEvent,
    PlanRecord, DISTANCE_UNSET_KM,
};
pub use io::{ContactPlanFile, InterferencePlanFile, PlanMetadata};
pub use iterator::{PlanIterator, TimestepBounds};
pub use manager::{ContactPlanManager, ManagerConfig, NodeHandle, NodeRegistry};

/// Node identifier. Satellites and ground stations share one integer ID
/// space; ground-station IDs are conventionally greater than the maximum
/// satellite ID.
pub type NodeId = u32;

/// Simulation time in whole seconds since the scenario epoch.
pub type SimTime = i64;

#[derive(Error, Debug)]
pub enum PlanError {
    #[error("Cannot read plan file {path}: {source}")]
    Unreadable {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Cannot write plan file {path}: {source}")]
    Unwritable {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Malformed plan header: {0}")]
    MalformedHeader(String),
    #[error("A contact plan manager is already running")]
    ManagerAlreadyRunning,
}

pub type Result<T> = std::result::Result<T, PlanError>;
