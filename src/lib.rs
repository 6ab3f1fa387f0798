//! Concurrent marina berth-allocation simulator.
//!
//! Every vessel is a task actor on its own thread. Actors queue for
//! admission, claim a rectangular berth on a shared grid, draw on a pool of
//! specialist workers, and release their berth when they leave.

pub mod actor;
pub mod allocator;
pub mod config;
pub mod error;
pub mod grid;
pub mod logging;
pub mod marina;
pub mod registry;
pub mod report;
pub mod sim;
pub mod stats;
pub mod task_queue;
pub mod types;
pub mod workers;
pub mod zones;

pub use actor::{PlacementRecord, TaskReport};
pub use config::{MarinaConfig, TimingConfig};
pub use error::{ConfigError, GridError, InvariantViolation, MarinaError};
pub use marina::{Marina, MarinaSnapshot};
pub use types::{Task, TaskId, TaskState, WorkerId};
pub use zones::{BerthClass, CellState};
