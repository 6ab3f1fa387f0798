//! The marina: every shared service wired together, plus snapshots and checks.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};

use serde::Serialize;
use tracing::info;

use crate::actor::{Services, TaskActor, TaskReport};
use crate::allocator::{AllocationPolicy, Allocator};
use crate::config::MarinaConfig;
use crate::error::{InvariantViolation, MarinaError};
use crate::grid::{Footprint, Grid, Region, ResourceGrid};
use crate::registry::ActiveRegistry;
use crate::stats::{StatsAggregator, StatsSnapshot};
use crate::task_queue::AdmissionQueue;
use crate::types::{Task, TaskId};
use crate::workers::{Worker, WorkerPool};
use crate::zones::{BerthClass, CellState, ZonePartitioner};

/// Consistent read-only view for reporting.
#[derive(Clone, Debug, Serialize)]
pub struct MarinaSnapshot {
    pub rows: usize,
    pub cols: usize,
    /// Row-major cell states.
    pub cells: Vec<CellState>,
    pub queue: Vec<Task>,
    pub registry: Vec<Task>,
    pub workers: Vec<Worker>,
    pub stats: StatsSnapshot,
}

impl MarinaSnapshot {
    pub fn cell(&self, row: usize, col: usize) -> CellState {
        self.cells[row * self.cols + col]
    }

    pub fn occupied_cells(&self) -> usize {
        self.cells
            .iter()
            .filter(|c| matches!(c, CellState::Occupied(_)))
            .count()
    }

    /// Check the data-model invariants against `config`.
    pub fn violations(&self, config: &MarinaConfig) -> Vec<InvariantViolation> {
        let zones = ZonePartitioner::new(self.cols, config.quay_base_spacing);
        let mut found = Vec::new();
        let mut blocks: BTreeMap<TaskId, Vec<(usize, usize)>> = BTreeMap::new();

        for (idx, cell) in self.cells.iter().enumerate() {
            let (row, col) = (idx / self.cols, idx % self.cols);
            let expected = zones.classify(col);
            match cell {
                CellState::Occupied(id) => {
                    if expected == CellState::Quay {
                        found.push(InvariantViolation::WrongClass {
                            row,
                            col,
                            found: *cell,
                            expected,
                        });
                    }
                    blocks.entry(*id).or_default().push((row, col));
                }
                other if *other != expected => found.push(InvariantViolation::WrongClass {
                    row,
                    col,
                    found: *other,
                    expected,
                }),
                _ => {}
            }
        }

        for (&id, cells) in &blocks {
            let row0 = cells.iter().map(|c| c.0).min().unwrap_or(0);
            let row1 = cells.iter().map(|c| c.0).max().unwrap_or(0);
            let col0 = cells.iter().map(|c| c.1).min().unwrap_or(0);
            let col1 = cells.iter().map(|c| c.1).max().unwrap_or(0);
            let actual = Region {
                row: row0,
                col: col0,
                rows: row1 - row0 + 1,
                cols: col1 - col0 + 1,
            };
            if actual.rows * actual.cols != cells.len() {
                found.push(InvariantViolation::FragmentedBlock { id });
            }
            match self.registry.iter().find(|t| t.id == id) {
                None => found.push(InvariantViolation::Unregistered { id }),
                Some(task) => {
                    let expected = Footprint::for_vessel(task.length, task.width, config.slot_size);
                    if actual.footprint() != expected {
                        found.push(InvariantViolation::FootprintMismatch {
                            id,
                            actual,
                            expected_rows: expected.rows,
                            expected_cols: expected.cols,
                        });
                    }
                }
            }
        }

        for task in &self.registry {
            if !blocks.contains_key(&task.id) {
                found.push(InvariantViolation::Homeless { id: task.id });
            }
        }
        for task in &self.queue {
            if self.registry.iter().any(|t| t.id == task.id) {
                found.push(InvariantViolation::DoubleListed { id: task.id });
            }
        }
        if self.queue.len() > config.max_queue {
            found.push(InvariantViolation::OverCapacity {
                what: "queue",
                len: self.queue.len(),
                capacity: config.max_queue,
            });
        }
        if self.registry.len() > config.max_active {
            found.push(InvariantViolation::OverCapacity {
                what: "registry",
                len: self.registry.len(),
                capacity: config.max_active,
            });
        }
        found
    }
}

pub struct Marina {
    config: MarinaConfig,
    services: Services,
    /// Ids whose actors have been spawned and not yet returned.
    live: Arc<Mutex<HashSet<TaskId>>>,
}

impl Marina {
    /// Validate `config`, build the grid, and start the worker actors.
    pub fn new(config: MarinaConfig) -> Result<Self, MarinaError> {
        config.validate()?;
        let grid = Arc::new(ResourceGrid::new(Grid::new(
            config.rows,
            config.cols,
            config.slot_size,
            config.quay_base_spacing,
        )));
        let queue = Arc::new(AdmissionQueue::new(config.max_queue));
        let registry = Arc::new(ActiveRegistry::new(config.max_active));
        let allocator = Arc::new(Allocator::new(
            Arc::clone(&grid),
            Arc::clone(&queue),
            Arc::clone(&registry),
            AllocationPolicy {
                fuel_threshold_pct: config.fuel_threshold_pct,
                wait_overflow_threshold: config.wait_overflow_threshold,
            },
        ));
        let workers = Arc::new(WorkerPool::start(
            config.worker_count,
            config.timing.work_episode(),
            config.timing.retry_interval(),
        )?);
        info!(
            rows = config.rows,
            cols = config.cols,
            workers = config.worker_count,
            "marina ready"
        );
        let services = Services {
            grid,
            queue,
            registry,
            allocator,
            workers,
            stats: Arc::new(StatsAggregator::new()),
            timing: config.timing.clone(),
        };
        Ok(Self {
            config,
            services,
            live: Arc::new(Mutex::new(HashSet::new())),
        })
    }

    pub fn config(&self) -> &MarinaConfig {
        &self.config
    }

    pub fn grid(&self) -> &ResourceGrid {
        &self.services.grid
    }

    pub fn queue(&self) -> &AdmissionQueue {
        &self.services.queue
    }

    pub fn registry(&self) -> &ActiveRegistry {
        &self.services.registry
    }

    pub fn workers(&self) -> &WorkerPool {
        &self.services.workers
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.services.stats.snapshot()
    }

    /// Start one actor for `task`.
    ///
    /// Rejects tasks with an empty footprint, tasks that could never be
    /// placed on an empty grid, tasks with a pending service that no free
    /// berth can hold, and ids that are still live.
    pub fn spawn_task(&self, task: Task) -> Result<JoinHandle<TaskReport>, MarinaError> {
        if task.length == 0 || task.width == 0 {
            return Err(MarinaError::InvalidTask {
                id: task.id,
                reason: "length and width must be > 0",
            });
        }
        let footprint = Footprint::for_vessel(task.length, task.width, self.config.slot_size);
        let policy = self.services.allocator.policy();
        let candidates: &[BerthClass] = match policy.home_class(&task) {
            BerthClass::FuelDock => &[BerthClass::FuelDock],
            BerthClass::Free => &[BerthClass::Free, BerthClass::FuelDock],
        };
        let grid = self.services.grid.snapshot();
        if !candidates.iter().any(|&class| grid.could_ever_fit(footprint, class)) {
            return Err(MarinaError::Unplaceable {
                id: task.id,
                rows: footprint.rows,
                cols: footprint.cols,
                class: policy.home_class(&task),
            });
        }
        // Services only run at a free berth.
        if task.has_pending_service() && !grid.could_ever_fit(footprint, BerthClass::Free) {
            return Err(MarinaError::Unplaceable {
                id: task.id,
                rows: footprint.rows,
                cols: footprint.cols,
                class: BerthClass::Free,
            });
        }

        let id = task.id;
        if !self.live_ids().insert(id) {
            return Err(MarinaError::DuplicateTask { id });
        }
        let actor = TaskActor::new(task, self.services.clone(), self.config.seed);
        let live = Arc::clone(&self.live);
        let spawned = thread::Builder::new()
            .name(format!("task-{id}"))
            .spawn(move || {
                let report = actor.run();
                live.lock().expect("live task set poisoned").remove(&id);
                report
            });
        match spawned {
            Ok(handle) => Ok(handle),
            Err(err) => {
                self.live_ids().remove(&id);
                Err(err.into())
            }
        }
    }

    fn live_ids(&self) -> MutexGuard<'_, HashSet<TaskId>> {
        self.live.lock().expect("live task set poisoned")
    }

    /// Number of spawned actors that have not yet left.
    pub fn live_tasks(&self) -> usize {
        self.live_ids().len()
    }

    /// Lock Grid, Queue and Registry in order and copy them; workers and
    /// stats are read afterwards under their own locks.
    pub fn snapshot(&self) -> MarinaSnapshot {
        let grid = self.services.grid.lock();
        let queue = self.services.queue.lock();
        let registry = self.services.registry.lock();
        let rows = grid.rows();
        let cols = grid.cols();
        let cells = grid.cells().to_vec();
        let queued: Vec<Task> = queue.iter().cloned().collect();
        let active: Vec<Task> = registry.iter().cloned().collect();
        drop(registry);
        drop(queue);
        drop(grid);

        MarinaSnapshot {
            rows,
            cols,
            cells,
            queue: queued,
            registry: active,
            workers: self.services.workers.snapshot(),
            stats: self.services.stats.snapshot(),
        }
    }

    pub fn check_invariants(&self) -> Vec<InvariantViolation> {
        self.snapshot().violations(&self.config)
    }

    /// Stop the worker actors. Task actors are never cancelled.
    pub fn shutdown(&self) {
        self.services.workers.shutdown();
        info!("worker pool stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TimingConfig;

    fn config() -> MarinaConfig {
        MarinaConfig {
            timing: TimingConfig::fast(),
            ..MarinaConfig::default()
        }
    }

    #[test]
    fn fresh_marina_has_no_violations() {
        let marina = Marina::new(config()).unwrap();
        let snap = marina.snapshot();
        assert_eq!(snap.cells.len(), 20 * 25);
        assert_eq!(snap.occupied_cells(), 0);
        assert_eq!(snap.workers.len(), 4);
        assert!(snap.violations(marina.config()).is_empty());
        marina.shutdown();
    }

    #[test]
    fn spawn_rejects_empty_and_oversized_tasks() {
        let marina = Marina::new(config()).unwrap();
        let err = marina.spawn_task(Task::new(1, 0, 8, 80, false, false)).unwrap_err();
        assert!(matches!(err, MarinaError::InvalidTask { id: 1, .. }));
        // 7 columns wide: wider than any berth run.
        let err = marina.spawn_task(Task::new(2, 10, 35, 80, false, false)).unwrap_err();
        assert!(matches!(err, MarinaError::Unplaceable { id: 2, cols: 7, .. }));
        // 6 columns only fit the fuel docks; low fuel makes that the home class.
        let err = marina.spawn_task(Task::new(3, 110, 30, 20, false, false)).unwrap_err();
        assert!(matches!(err, MarinaError::Unplaceable { id: 3, rows: 22, .. }));
        marina.shutdown();
    }

    #[test]
    fn spawn_rejects_serviced_tasks_wider_than_free_berths() {
        let marina = Marina::new(config()).unwrap();
        // 6 columns fit only the fuel docks, where no service ever runs.
        let err = marina.spawn_task(Task::new(4, 10, 30, 80, true, false)).unwrap_err();
        assert!(matches!(
            err,
            MarinaError::Unplaceable { id: 4, cols: 6, class: BerthClass::Free, .. }
        ));
        let err = marina.spawn_task(Task::new(5, 10, 30, 20, false, true)).unwrap_err();
        assert!(matches!(
            err,
            MarinaError::Unplaceable { id: 5, cols: 6, class: BerthClass::Free, .. }
        ));

        // Without services the same vessel overflows into a fuel dock and leaves.
        let report = marina
            .spawn_task(Task::new(6, 10, 30, 80, false, false))
            .unwrap()
            .join()
            .unwrap();
        assert_eq!(report.placements.len(), 1);
        assert_eq!(report.placements[0].class, BerthClass::FuelDock);
        assert_eq!(marina.stats().completed, 1);
        marina.shutdown();
    }

    /// Occupy every berth and fuel dock column with one placeholder owner.
    fn block_all(marina: &Marina, owner: TaskId) {
        let mut grid = marina.grid().lock();
        let rows = grid.rows();
        for col in 0..grid.cols() {
            let class = match grid.cell(0, col) {
                CellState::Free => BerthClass::Free,
                CellState::FuelDock => BerthClass::FuelDock,
                _ => continue,
            };
            let region = Region { row: 0, col, rows, cols: 1 };
            grid.claim(region, class, owner).unwrap();
        }
    }

    #[test]
    fn spawn_rejects_ids_that_are_still_live() {
        let marina = Marina::new(config()).unwrap();
        block_all(&marina, 9_999);

        let first = marina.spawn_task(Task::new(7, 10, 10, 90, false, false)).unwrap();
        let err = marina.spawn_task(Task::new(7, 10, 10, 90, false, false)).unwrap_err();
        assert!(matches!(err, MarinaError::DuplicateTask { id: 7 }));
        assert_eq!(marina.live_tasks(), 1);

        marina.grid().lock().release(9_999).unwrap();
        first.join().unwrap();
        assert_eq!(marina.live_tasks(), 0);

        // Once departed, the id may be reused.
        let report = marina
            .spawn_task(Task::new(7, 10, 10, 90, false, false))
            .unwrap()
            .join()
            .unwrap();
        assert_eq!(report.id, 7);
        assert_eq!(marina.stats().completed, 2);
        assert!(marina.check_invariants().is_empty());
        marina.shutdown();
    }

    #[test]
    fn detects_orphaned_and_wrong_class_cells() {
        let marina = Marina::new(config()).unwrap();
        let fp = Footprint { rows: 2, cols: 2 };
        marina
            .grid()
            .lock()
            .claim(Region::at(0, 1, fp), BerthClass::Free, 77)
            .unwrap();
        let mut snap = marina.snapshot();
        snap.cells[19] = CellState::Free;
        snap.registry.push(Task::new(88, 10, 10, 90, false, false));
        let violations = snap.violations(marina.config());
        assert!(violations.contains(&InvariantViolation::Unregistered { id: 77 }));
        assert!(violations.contains(&InvariantViolation::Homeless { id: 88 }));
        assert!(violations.contains(&InvariantViolation::WrongClass {
            row: 0,
            col: 19,
            found: CellState::Free,
            expected: CellState::FuelDock,
        }));
        marina.shutdown();
    }
}
