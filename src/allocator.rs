//! Placement of waiting tasks onto free berths or fuel docks.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::grid::{ResourceGrid, Spot};
use crate::registry::ActiveRegistry;
use crate::task_queue::AdmissionQueue;
use crate::types::{Task, TaskState};
use crate::zones::BerthClass;

/// A successful allocation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct Placement {
    pub class: BerthClass,
    pub spot: Spot,
}

/// Eligibility thresholds applied on every attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AllocationPolicy {
    pub fuel_threshold_pct: u8,
    pub wait_overflow_threshold: u32,
}

impl AllocationPolicy {
    /// Classes `task` may use right now, in the order they are tried.
    pub fn eligible_classes(&self, task: &Task) -> &'static [BerthClass] {
        if task.fuel < self.fuel_threshold_pct {
            &[BerthClass::FuelDock]
        } else if task.wait_time >= self.wait_overflow_threshold {
            &[BerthClass::Free, BerthClass::FuelDock]
        } else {
            &[BerthClass::Free]
        }
    }

    /// The class a task would get on an otherwise empty grid.
    pub fn home_class(&self, task: &Task) -> BerthClass {
        if task.fuel < self.fuel_threshold_pct {
            BerthClass::FuelDock
        } else {
            BerthClass::Free
        }
    }
}

pub struct Allocator {
    grid: Arc<ResourceGrid>,
    queue: Arc<AdmissionQueue>,
    registry: Arc<ActiveRegistry>,
    policy: AllocationPolicy,
}

impl Allocator {
    pub fn new(
        grid: Arc<ResourceGrid>,
        queue: Arc<AdmissionQueue>,
        registry: Arc<ActiveRegistry>,
        policy: AllocationPolicy,
    ) -> Self {
        Self {
            grid,
            queue,
            registry,
            policy,
        }
    }

    pub fn policy(&self) -> &AllocationPolicy {
        &self.policy
    }

    /// One allocation attempt for a queued task.
    ///
    /// Search, registry capacity check, claim, dequeue and register all
    /// happen under Grid -> Queue -> Registry, so a claimed block always
    /// has a registered owner. `None` is a transient miss.
    pub fn try_place(&self, task: &mut Task) -> Option<Placement> {
        let mut grid = self.grid.lock();
        let footprint = grid.footprint(task.length, task.width);
        let (class, spot) = self
            .policy
            .eligible_classes(task)
            .iter()
            .find_map(|&class| grid.find_best_spot(footprint, class).map(|spot| (class, spot)))?;

        let mut queue = self.queue.lock();
        let mut registry = self.registry.lock();
        if !registry.has_room() {
            debug!(task = task.id, "active registry full, placement deferred");
            return None;
        }
        if let Err(err) = grid.claim(spot.region, class, task.id) {
            warn!(task = task.id, %err, "claim failed on a region just found free");
            return None;
        }

        task.state = match class {
            BerthClass::Free => TaskState::Docked,
            BerthClass::FuelDock => TaskState::FuelDocked,
        };
        queue.remove(task.id);
        if let Err(task) = registry.insert(task.clone()) {
            error!(task = task.id, "task already registered while placing");
        }
        info!(
            task = task.id,
            ?class,
            row = spot.region.row,
            col = spot.region.col,
            rows = spot.region.rows,
            cols = spot.region.cols,
            locality = spot.locality,
            fuel = task.fuel,
            wait = task.wait_time,
            "placed"
        );
        Some(Placement { class, spot })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::{Footprint, Grid, Region};
    use crate::types::TaskId;
    use crate::zones::CellState;
    use proptest::prelude::*;

    struct Fixture {
        grid: Arc<ResourceGrid>,
        queue: Arc<AdmissionQueue>,
        registry: Arc<ActiveRegistry>,
        allocator: Allocator,
    }

    fn fixture(max_active: usize) -> Fixture {
        let grid = Arc::new(ResourceGrid::new(Grid::new(20, 25, 5, 3)));
        let queue = Arc::new(AdmissionQueue::new(10));
        let registry = Arc::new(ActiveRegistry::new(max_active));
        let allocator = Allocator::new(
            Arc::clone(&grid),
            Arc::clone(&queue),
            Arc::clone(&registry),
            AllocationPolicy {
                fuel_threshold_pct: 50,
                wait_overflow_threshold: 15,
            },
        );
        Fixture {
            grid,
            queue,
            registry,
            allocator,
        }
    }

    /// Occupy every cell of `class` with placeholder owners.
    fn fill(grid: &ResourceGrid, class: BerthClass) {
        let mut grid = grid.lock();
        let one = Footprint { rows: 1, cols: 1 };
        for row in 0..grid.rows() {
            for col in 0..grid.cols() {
                if grid.cell(row, col) == class.cell_state() {
                    let id = 10_000 + (row * grid.cols() + col) as TaskId;
                    grid.claim(Region::at(row, col, one), class, id).expect("fill");
                }
            }
        }
    }

    fn queued(fx: &Fixture, task: Task) -> Task {
        fx.queue.push(task.clone()).expect("queue room");
        task
    }

    #[test]
    fn places_next_to_quay_and_moves_to_registry() {
        let fx = fixture(20);
        let mut task = queued(&fx, Task::new(1, 12, 8, 80, false, false));
        let placement = fx.allocator.try_place(&mut task).expect("placement");
        assert_eq!(placement.class, BerthClass::Free);
        assert_eq!(placement.spot.region, Region { row: 0, col: 1, rows: 3, cols: 2 });
        assert_eq!(placement.spot.locality, 0);
        assert_eq!(task.state, TaskState::Docked);
        assert!(fx.queue.is_empty());
        assert_eq!(fx.registry.snapshot(), vec![task]);
        assert_eq!(fx.grid.snapshot().cell(2, 2), CellState::Occupied(1));
    }

    #[test]
    fn low_fuel_only_uses_fuel_docks() {
        let fx = fixture(20);
        let mut task = queued(&fx, Task::new(2, 12, 8, 30, false, false));
        let placement = fx.allocator.try_place(&mut task).expect("placement");
        assert_eq!(placement.class, BerthClass::FuelDock);
        assert_eq!(placement.spot.region.col, 19);
        assert_eq!(task.state, TaskState::FuelDocked);
    }

    #[test]
    fn low_fuel_waits_while_fuel_docks_are_full() {
        let fx = fixture(20);
        fill(&fx.grid, BerthClass::FuelDock);
        let mut task = queued(&fx, Task::new(3, 12, 8, 30, false, false));
        for wait in 0..40 {
            task.wait_time = wait;
            assert!(fx.allocator.try_place(&mut task).is_none());
        }
        assert_eq!(task.state, TaskState::Waiting);
        assert_eq!(fx.queue.len(), 1);
        assert!(fx.registry.is_empty());

        fx.grid.lock().release(10_000 + 19);
        fx.grid.lock().release(10_000 + 20);
        fx.grid.lock().release(10_000 + 25 + 19);
        fx.grid.lock().release(10_000 + 25 + 20);
        fx.grid.lock().release(10_000 + 50 + 19);
        fx.grid.lock().release(10_000 + 50 + 20);
        let placement = fx.allocator.try_place(&mut task).expect("fuel dock freed");
        assert_eq!(placement.spot.region, Region { row: 0, col: 19, rows: 3, cols: 2 });
    }

    #[test]
    fn long_wait_overflows_into_fuel_docks() {
        let fx = fixture(20);
        fill(&fx.grid, BerthClass::Free);
        let mut task = queued(&fx, Task::new(4, 12, 8, 90, true, false));
        task.wait_time = 14;
        assert!(fx.allocator.try_place(&mut task).is_none());
        task.wait_time = 15;
        let placement = fx.allocator.try_place(&mut task).expect("overflow placement");
        assert_eq!(placement.class, BerthClass::FuelDock);
        assert_eq!(task.state, TaskState::FuelDocked);
    }

    #[test]
    fn full_registry_leaves_grid_untouched() {
        let fx = fixture(1);
        let mut first = queued(&fx, Task::new(5, 12, 8, 80, false, false));
        fx.allocator.try_place(&mut first).expect("first placement");
        let before = fx.grid.snapshot();
        let mut second = queued(&fx, Task::new(6, 12, 8, 80, false, false));
        assert!(fx.allocator.try_place(&mut second).is_none());
        assert_eq!(fx.grid.snapshot().cells(), before.cells());
        assert_eq!(second.state, TaskState::Waiting);
        assert_eq!(fx.queue.len(), 1);
    }

    proptest! {
        #[test]
        fn placement_class_follows_eligibility(
            fuel in 0u8..=100,
            wait in 0u32..30,
            fill_free in any::<bool>(),
        ) {
            let fx = fixture(20);
            if fill_free {
                fill(&fx.grid, BerthClass::Free);
            }
            let mut task = queued(&fx, Task::new(7, 12, 8, fuel, false, false));
            task.wait_time = wait;
            match fx.allocator.try_place(&mut task) {
                Some(placement) => {
                    if fuel < 50 {
                        prop_assert_eq!(placement.class, BerthClass::FuelDock);
                    }
                    if placement.class == BerthClass::FuelDock {
                        prop_assert!(fuel < 50 || wait >= 15);
                    }
                    if placement.class == BerthClass::Free {
                        prop_assert!(fuel >= 50);
                    }
                }
                None => prop_assert!(fill_free && fuel >= 50 && wait < 15),
            }
        }
    }
}
