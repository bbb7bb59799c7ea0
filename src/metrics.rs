//! Process-wide counters under hierarchical dotted names.
//!
//! Sessions only ever call [`Metrics::increment`]; aggregation and
//! reporting live outside this crate and consume [`Metrics::snapshot`].

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

/// Monotonic counter registry shared by every session.
///
/// A plain std `Mutex` is enough here: increments are short, uncontended
/// writes and the lock is never held across an await point.
#[derive(Default)]
pub struct Metrics {
    counters: Mutex<HashMap<String, u64>>,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `delta` to the named counter, creating it at zero first.
    /// Fire-and-forget; callers never consume a result.
    pub fn increment(&self, name: &str, delta: u64) {
        let mut counters = self.counters.lock().unwrap();
        *counters.entry(name.to_string()).or_insert(0) += delta;
    }

    /// Current value of a counter, zero if it was never incremented.
    pub fn get(&self, name: &str) -> u64 {
        self.counters.lock().unwrap().get(name).copied().unwrap_or(0)
    }

    /// Sorted copy of every counter, for reporters and tests.
    pub fn snapshot(&self) -> BTreeMap<String, u64> {
        self.counters
            .lock()
            .unwrap()
            .iter()
            .map(|(name, value)| (name.clone(), *value))
            .collect()
    }
}
