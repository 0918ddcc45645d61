//! Memoization of the last propagated state.

use std::sync::Mutex;

use crate::StateVector;

/// Caches the most recent state vector of a propagator.
///
/// The predicted drift since the cached state is `|dt| * |v|`; the cache
/// answers queries directly until that drift exceeds `min_accuracy_km`.
/// The mutex guards the cached state against concurrent position queries;
/// the primary simulation loop is single-threaded, but propagators are
/// shared read-side and the guard is kept.
#[derive(Debug)]
pub struct StateCache {
    min_accuracy_km: f64,
    last: Mutex<Option<StateVector>>,
}

impl StateCache {
    pub fn new(min_accuracy_km: f64) -> Self {
        Self {
            min_accuracy_km,
            last: Mutex::new(None),
        }
    }

    pub fn min_accuracy_km(&self) -> f64 {
        self.min_accuracy_km
    }

    /// The cached state, if it is still accurate enough for `sim_s`.
    pub fn lookup(&self, sim_s: f64) -> Option<StateVector> {
        let guard = self.last.lock().unwrap_or_else(|e| e.into_inner());
        let last = (*guard)?;
        if self.drift_km(&last, sim_s) <= self.min_accuracy_km {
            Some(last)
        } else {
            None
        }
    }

    /// True when a query at `sim_s` would miss the cache.
    pub fn needs_state_update(&self, sim_s: f64) -> bool {
        let guard = self.last.lock().unwrap_or_else(|e| e.into_inner());
        match *guard {
            Some(last) => self.drift_km(&last, sim_s) > self.min_accuracy_km,
            None => true,
        }
    }

    pub fn store(&self, state: StateVector) {
        let mut guard = self.last.lock().unwrap_or_else(|e| e.into_inner());
        *guard = Some(state);
    }

    fn drift_km(&self, last: &StateVector, sim_s: f64) -> f64 {
        (sim_s - last.sim_time_s).abs() * last.speed_km_s()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Vector3;

    fn state(t: f64) -> StateVector {
        StateVector {
            position_km: Vector3::new(7000.0, 0.0, 0.0),
            velocity_km_s: Vector3::new(0.0, 7.5, 0.0),
            sim_time_s: t,
        }
    }

    #[test]
    fn empty_cache_always_needs_update() {
        let cache = StateCache::new(1.0);
        assert!(cache.needs_state_update(0.0));
        assert!(cache.lookup(0.0).is_none());
    }

    #[test]
    fn drift_threshold_bounds_reuse() {
        let cache = StateCache::new(1.0);
        cache.store(state(100.0));
        // 7.5 km/s: 0.1 s drift = 0.75 km, inside the 1 km budget
        assert!(cache.lookup(100.1).is_some());
        assert!(!cache.needs_state_update(100.1));
        // 1 s drift = 7.5 km, over budget
        assert!(cache.lookup(101.0).is_none());
        assert!(cache.needs_state_update(101.0));
        // queries in the past drift too
        assert!(cache.lookup(99.0).is_none());
    }
}
