//! Simulation clock to calendar time mapping.

use chrono::{DateTime, Duration, Utc};

/// Julian day number of the Unix epoch.
const UNIX_EPOCH_JD: f64 = 2_440_587.5;
const SECONDS_PER_DAY: f64 = 86_400.0;

/// Maps simulation seconds to and from continuous calendar time.
///
/// Explicitly constructed once per scenario and handed to every consumer;
/// there is deliberately no process-global instance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimEpoch {
    start: DateTime<Utc>,
}

impl SimEpoch {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self { start }
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    /// Calendar time of the simulation instant `sim_s`.
    pub fn datetime(&self, sim_s: f64) -> DateTime<Utc> {
        self.start + Duration::milliseconds((sim_s * 1000.0).round() as i64)
    }

    /// Continuous Julian date of the simulation instant `sim_s`.
    pub fn julian_date(&self, sim_s: f64) -> f64 {
        let unix_s = self.start.timestamp() as f64
            + f64::from(self.start.timestamp_subsec_millis()) / 1000.0
            + sim_s;
        UNIX_EPOCH_JD + unix_s / SECONDS_PER_DAY
    }

    /// Simulation seconds of a calendar instant (negative before the epoch).
    pub fn sim_seconds(&self, t: DateTime<Utc>) -> f64 {
        (t - self.start).num_milliseconds() as f64 / 1000.0
    }
}
