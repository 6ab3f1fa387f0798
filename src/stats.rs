//! Process-wide counters for completions and service events.

use std::sync::Mutex;

use serde::Serialize;

/// Point-in-time copy of the counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub completed: u64,
    pub total_wait: u64,
    pub max_wait: u64,
    pub cleanings: u64,
    pub repairs: u64,
    pub refuels: u64,
}

impl StatsSnapshot {
    /// Mean wait per completed task, in retry intervals.
    pub fn average_wait(&self) -> f64 {
        if self.completed == 0 {
            0.0
        } else {
            self.total_wait as f64 / self.completed as f64
        }
    }
}

/// Monotonic counters behind their own lock; never reset.
pub struct StatsAggregator {
    state: Mutex<StatsSnapshot>,
}

impl StatsAggregator {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(StatsSnapshot::default()),
        }
    }

    /// Record a departed task and the total time it spent waiting.
    pub fn record_completion(&self, waited: u64) {
        let mut guard = self.state.lock().expect("stats mutex poisoned");
        guard.completed += 1;
        guard.total_wait += waited;
        guard.max_wait = guard.max_wait.max(waited);
    }

    pub fn record_cleaning(&self) {
        self.state.lock().expect("stats mutex poisoned").cleanings += 1;
    }

    pub fn record_repair(&self) {
        self.state.lock().expect("stats mutex poisoned").repairs += 1;
    }

    pub fn record_refuel(&self) {
        self.state.lock().expect("stats mutex poisoned").refuels += 1;
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        *self.state.lock().expect("stats mutex poisoned")
    }
}

impl Default for StatsAggregator {
    fn default() -> Self {
        Self::new()
    }
}
