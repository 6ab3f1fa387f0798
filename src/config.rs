//! Startup configuration: grid shape, capacities, policy thresholds and timing.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarinaConfig {
    pub rows: usize,
    pub cols: usize,
    /// Edge of one grid cell, in meters.
    pub slot_size: u32,
    pub max_queue: usize,
    pub max_active: usize,
    pub worker_count: usize,
    pub quay_base_spacing: usize,
    /// Tasks below this fuel percentage may only use fuel docks.
    pub fuel_threshold_pct: u8,
    /// Wait (in retry intervals) after which a fuel dock may be used as overflow.
    pub wait_overflow_threshold: u32,
    /// Base seed for per-task random delays.
    pub seed: u64,
    pub timing: TimingConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    pub retry_interval_ms: u64,
    pub arrival_delay_min_ms: u64,
    pub arrival_delay_max_ms: u64,
    pub dwell_min_ms: u64,
    pub dwell_max_ms: u64,
    /// Extra dwell per service performed.
    pub service_dwell_ms: u64,
    pub work_episode_ms: u64,
    /// Time to add one percentage point of fuel.
    pub refuel_tick_ms: u64,
    pub report_interval_ms: u64,
    /// Gap between consecutive arrivals generated by the driver.
    pub spawn_interval_ms: u64,
}

impl Default for MarinaConfig {
    fn default() -> Self {
        Self {
            rows: 20,
            cols: 25,
            slot_size: 5,
            max_queue: 10,
            max_active: 20,
            worker_count: 4,
            quay_base_spacing: 3,
            fuel_threshold_pct: 50,
            wait_overflow_threshold: 15,
            seed: 0x5EED,
            timing: TimingConfig::default(),
        }
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            retry_interval_ms: 1000,
            arrival_delay_min_ms: 1000,
            arrival_delay_max_ms: 3000,
            dwell_min_ms: 10_000,
            dwell_max_ms: 20_000,
            service_dwell_ms: 2000,
            work_episode_ms: 3000,
            refuel_tick_ms: 100,
            report_interval_ms: 500,
            spawn_interval_ms: 500,
        }
    }
}

impl TimingConfig {
    /// Millisecond-scale profile for benchmarks and tests.
    pub fn fast() -> Self {
        Self {
            retry_interval_ms: 2,
            arrival_delay_min_ms: 0,
            arrival_delay_max_ms: 5,
            dwell_min_ms: 5,
            dwell_max_ms: 15,
            service_dwell_ms: 2,
            work_episode_ms: 5,
            refuel_tick_ms: 1,
            report_interval_ms: 20,
            spawn_interval_ms: 1,
        }
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }

    pub fn work_episode(&self) -> Duration {
        Duration::from_millis(self.work_episode_ms)
    }

    pub fn refuel_tick(&self) -> Duration {
        Duration::from_millis(self.refuel_tick_ms)
    }

    pub fn report_interval(&self) -> Duration {
        Duration::from_millis(self.report_interval_ms)
    }

    pub fn spawn_interval(&self) -> Duration {
        Duration::from_millis(self.spawn_interval_ms)
    }
}

impl MarinaConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate; absent keys keep their defaults.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: MarinaConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        fn invalid(field: &'static str, reason: &'static str) -> Result<(), ConfigError> {
            Err(ConfigError::Invalid { field, reason })
        }
        if self.rows == 0 {
            return invalid("rows", "must be > 0");
        }
        if self.cols == 0 {
            return invalid("cols", "must be > 0");
        }
        if self.slot_size == 0 {
            return invalid("slot_size", "must be > 0");
        }
        if self.max_queue == 0 {
            return invalid("max_queue", "must be > 0");
        }
        if self.max_active == 0 {
            return invalid("max_active", "must be > 0");
        }
        if self.worker_count < 2 {
            return invalid("worker_count", "needs at least one cleaning and one repair worker");
        }
        if self.quay_base_spacing == 0 {
            return invalid("quay_base_spacing", "must be > 0");
        }
        if self.fuel_threshold_pct > 100 {
            return invalid("fuel_threshold_pct", "must be <= 100");
        }
        let timing = &self.timing;
        if timing.retry_interval_ms == 0 {
            return invalid("timing.retry_interval_ms", "must be > 0");
        }
        if timing.refuel_tick_ms == 0 {
            return invalid("timing.refuel_tick_ms", "must be > 0");
        }
        if timing.report_interval_ms == 0 {
            return invalid("timing.report_interval_ms", "must be > 0");
        }
        if timing.arrival_delay_min_ms > timing.arrival_delay_max_ms {
            return invalid("timing.arrival_delay_min_ms", "exceeds arrival_delay_max_ms");
        }
        if timing.dwell_min_ms > timing.dwell_max_ms {
            return invalid("timing.dwell_min_ms", "exceeds dwell_max_ms");
        }
        Ok(())
    }

    pub fn to_toml_string(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}
