//! Per-task actor driving a vessel from arrival to departure.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::Serialize;
use tracing::{debug, error, info, info_span};

use crate::allocator::{Allocator, Placement};
use crate::config::TimingConfig;
use crate::grid::{Region, ResourceGrid};
use crate::registry::ActiveRegistry;
use crate::stats::StatsAggregator;
use crate::task_queue::AdmissionQueue;
use crate::types::{Task, TaskId, TaskState};
use crate::workers::{WorkerClass, WorkerPool};
use crate::zones::BerthClass;

/// Shared services handed to every actor at construction.
#[derive(Clone)]
pub struct Services {
    pub grid: Arc<ResourceGrid>,
    pub queue: Arc<AdmissionQueue>,
    pub registry: Arc<ActiveRegistry>,
    pub allocator: Arc<Allocator>,
    pub workers: Arc<WorkerPool>,
    pub stats: Arc<StatsAggregator>,
    pub timing: TimingConfig,
}

/// Where and under which conditions a task was placed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct PlacementRecord {
    pub class: BerthClass,
    pub region: Region,
    pub locality: usize,
    pub fuel: u8,
    pub wait_time: u32,
}

/// Lifecycle summary returned when an actor reaches `Leaving`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct TaskReport {
    pub id: TaskId,
    pub placements: Vec<PlacementRecord>,
    pub cleanings: u32,
    pub repairs: u32,
    pub refuels: u32,
    pub requeues: u32,
    /// Retry intervals spent waiting, summed over every waiting episode.
    pub total_wait: u64,
}

pub struct TaskActor {
    task: Task,
    services: Services,
    rng: ChaCha8Rng,
    report: TaskReport,
}

impl TaskActor {
    /// The actor's random delays are derived from `seed ^ task.id`.
    pub fn new(task: Task, services: Services, seed: u64) -> Self {
        let rng = ChaCha8Rng::seed_from_u64(seed ^ task.id);
        let report = TaskReport {
            id: task.id,
            ..TaskReport::default()
        };
        Self {
            task,
            services,
            rng,
            report,
        }
    }

    /// Run to `Leaving`. Allocation misses are retried, never surfaced.
    pub fn run(mut self) -> TaskReport {
        let span = info_span!("task", id = self.task.id);
        let _entered = span.enter();

        let (min, max) = (
            self.services.timing.arrival_delay_min_ms,
            self.services.timing.arrival_delay_max_ms,
        );
        let arrival = self.random_ms(min, max);
        thread::sleep(arrival);
        info!(
            length = self.task.length,
            width = self.task.width,
            fuel = self.task.fuel,
            cleaning = self.task.needs_cleaning,
            repair = self.task.needs_repair,
            "arrived"
        );

        self.admit();
        let mut state = TaskState::Waiting;
        loop {
            state = match state {
                TaskState::Waiting => self.wait_for_berth(),
                TaskState::Docked => self.serve_and_depart(),
                TaskState::FuelDocked => self.refuel(),
                TaskState::Leaving => break,
            };
        }
        self.report
    }

    fn random_ms(&mut self, min: u64, max: u64) -> Duration {
        Duration::from_millis(self.rng.gen_range(min..=max))
    }

    fn tick_wait(&mut self) {
        self.task.wait_time += 1;
        self.report.total_wait += 1;
        self.services.queue.sync(&self.task);
    }

    /// Join the admission queue, retrying while it is full.
    fn admit(&mut self) {
        let retry = self.services.timing.retry_interval();
        while self.services.queue.push(self.task.clone()).is_err() {
            debug!(wait = self.task.wait_time, "admission queue full");
            thread::sleep(retry);
            self.tick_wait();
        }
        debug!("admitted to queue");
    }

    /// Retry allocation until placed. The task is already queued.
    fn wait_for_berth(&mut self) -> TaskState {
        let retry = self.services.timing.retry_interval();
        loop {
            if let Some(placement) = self.services.allocator.try_place(&mut self.task) {
                self.record_placement(placement);
                return self.task.state;
            }
            thread::sleep(retry);
            self.tick_wait();
        }
    }

    fn record_placement(&mut self, placement: Placement) {
        self.report.placements.push(PlacementRecord {
            class: placement.class,
            region: placement.spot.region,
            locality: placement.spot.locality,
            fuel: self.task.fuel,
            wait_time: self.task.wait_time,
        });
    }

    fn serve_and_depart(&mut self) -> TaskState {
        let mut services = 0u64;
        if self.task.needs_cleaning {
            self.service(WorkerClass::Cleaning);
            self.services.stats.record_cleaning();
            self.report.cleanings += 1;
            self.task.needs_cleaning = false;
            self.services.registry.sync(&self.task);
            services += 1;
        }
        if self.task.needs_repair {
            self.service(WorkerClass::Repair);
            self.services.stats.record_repair();
            self.report.repairs += 1;
            self.task.needs_repair = false;
            self.services.registry.sync(&self.task);
            services += 1;
        }

        let TimingConfig {
            dwell_min_ms,
            dwell_max_ms,
            service_dwell_ms,
            ..
        } = self.services.timing;
        let dwell = self.random_ms(dwell_min_ms, dwell_max_ms)
            + Duration::from_millis(service_dwell_ms * services);
        debug!(dwell_ms = dwell.as_millis() as u64, "occupying berth");
        thread::sleep(dwell);

        self.release();
        self.depart()
    }

    fn service(&mut self, class: WorkerClass) {
        let handle = self.services.workers.acquire(class, self.task.id);
        let worker = handle.worker();
        info!(worker, ?class, "service started");
        handle.work_episode();
        info!(worker, ?class, "service finished");
    }

    fn refuel(&mut self) -> TaskState {
        self.services.stats.record_refuel();
        self.report.refuels += 1;
        let tick = self.services.timing.refuel_tick();
        let start = self.task.fuel;
        while self.task.fuel < 100 {
            thread::sleep(tick);
            self.task.fuel += 1;
            self.services.registry.sync(&self.task);
        }
        info!(from = start, "refueled");

        if self.task.has_pending_service() {
            self.requeue();
            TaskState::Waiting
        } else {
            self.release();
            self.depart()
        }
    }

    /// Swap the fuel dock for a queue slot under Grid -> Queue -> Registry,
    /// so the task is never outside both. With the queue full the dock is
    /// freed anyway and admission is retried.
    fn requeue(&mut self) {
        self.task.wait_time = 0;
        self.task.state = TaskState::Waiting;
        self.report.requeues += 1;
        info!(
            cleaning = self.task.needs_cleaning,
            repair = self.task.needs_repair,
            "re-queueing for service"
        );

        let mut grid = self.services.grid.lock();
        let mut queue = self.services.queue.lock();
        let admitted = queue.push(self.task.clone()).is_ok();
        let region = grid.release(self.task.id);
        self.services.registry.lock().remove(self.task.id);
        drop(queue);
        drop(grid);
        log_release(region);

        if !admitted {
            self.admit();
        }
    }

    /// Free the berth and deregister, holding Grid then Registry.
    fn release(&mut self) {
        let mut grid = self.services.grid.lock();
        let region = grid.release(self.task.id);
        let mut registry = self.services.registry.lock();
        registry.remove(self.task.id);
        drop(registry);
        drop(grid);
        log_release(region);
    }

    fn depart(&mut self) -> TaskState {
        self.task.state = TaskState::Leaving;
        self.services.stats.record_completion(self.report.total_wait);
        info!(total_wait = self.report.total_wait, "departed");
        TaskState::Leaving
    }
}

fn log_release(region: Option<Region>) {
    match region {
        Some(region) => debug!(row = region.row, col = region.col, "berth released"),
        None => error!("release found no block occupied by this task"),
    }
}
