//! Shared identifiers and task model used across the system.

use serde::Serialize;

/// Unique identifier for a task (an arriving vessel).
pub type TaskId = u64;
/// Unique identifier for a specialist worker.
pub type WorkerId = usize;

/// Lifecycle state of a task actor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum TaskState {
    Waiting,
    Docked,
    FuelDocked,
    Leaving,
}

/// A vessel requesting berth space.
///
/// The owning actor holds the authoritative copy; the queue and registry
/// store snapshot copies that the actor refreshes on every visible change.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Task {
    /// Stable task identifier for logging and validation.
    pub id: TaskId,
    /// Length in meters; maps to grid rows.
    pub length: u32,
    /// Width in meters; maps to grid columns.
    pub width: u32,
    pub state: TaskState,
    /// Fuel level in percent, 0..=100.
    pub fuel: u8,
    pub needs_cleaning: bool,
    pub needs_repair: bool,
    /// Retry intervals spent waiting since the last (re-)admission.
    pub wait_time: u32,
}

impl Task {
    /// Construct a waiting task. Fuel above 100 is clamped.
    pub fn new(
        id: TaskId,
        length: u32,
        width: u32,
        fuel: u8,
        needs_cleaning: bool,
        needs_repair: bool,
    ) -> Self {
        Self {
            id,
            length,
            width,
            state: TaskState::Waiting,
            fuel: fuel.min(100),
            needs_cleaning,
            needs_repair,
            wait_time: 0,
        }
    }

    /// Whether any specialist service is still outstanding.
    pub fn has_pending_service(&self) -> bool {
        self.needs_cleaning || self.needs_repair
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_task_starts_waiting_with_clamped_fuel() {
        let task = Task::new(3, 12, 8, 250, true, false);
        assert_eq!(task.state, TaskState::Waiting);
        assert_eq!(task.fuel, 100);
        assert_eq!(task.wait_time, 0);
        assert!(task.has_pending_service());
    }
}
