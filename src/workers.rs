//! Specialist worker pool: cleaning and repair crews, each on its own thread.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use serde::Serialize;
use tracing::debug;

use crate::types::{TaskId, WorkerId};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum WorkerClass {
    Cleaning,
    Repair,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum WorkerState {
    Idle,
    Working,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Worker {
    pub id: WorkerId,
    pub class: WorkerClass,
    pub state: WorkerState,
    /// Task being served; `None` while idle.
    pub task: Option<TaskId>,
    /// Completed work episodes.
    pub episodes: u64,
}

struct PoolShared {
    workers: Mutex<Vec<Worker>>,
    changed: Condvar,
    episode: Duration,
    poll: Duration,
    stop: AtomicBool,
}

impl PoolShared {
    fn lock(&self) -> MutexGuard<'_, Vec<Worker>> {
        self.workers.lock().expect("worker pool mutex poisoned")
    }

    fn wait<'a>(&self, guard: MutexGuard<'a, Vec<Worker>>) -> MutexGuard<'a, Vec<Worker>> {
        self.changed
            .wait_timeout(guard, self.poll)
            .expect("worker condvar wait failed")
            .0
    }
}

/// Fixed pool: the first half cleaning crews, the rest repair crews.
pub struct WorkerPool {
    shared: Arc<PoolShared>,
    actors: Mutex<Vec<JoinHandle<()>>>,
}

/// Scan by index for an idle worker of `class` and hand it to `task`.
fn claim_idle(workers: &mut [Worker], class: WorkerClass, task: TaskId) -> Option<(WorkerId, u64)> {
    let worker = workers
        .iter_mut()
        .find(|w| w.class == class && w.state == WorkerState::Idle)?;
    worker.state = WorkerState::Working;
    worker.task = Some(task);
    Some((worker.id, worker.episodes))
}

fn run_worker(shared: Arc<PoolShared>, id: WorkerId) {
    loop {
        let mut guard = shared.lock();
        while guard[id].state == WorkerState::Idle {
            if shared.stop.load(Ordering::SeqCst) {
                return;
            }
            guard = shared.wait(guard);
        }
        let task = guard[id].task;
        drop(guard);

        debug!(worker = id, ?task, "work episode started");
        thread::sleep(shared.episode);

        let mut guard = shared.lock();
        let worker = &mut guard[id];
        worker.state = WorkerState::Idle;
        worker.task = None;
        worker.episodes += 1;
        shared.changed.notify_all();
        debug!(worker = id, ?task, "work episode finished");
    }
}

impl WorkerPool {
    /// Spawn `count` worker actors. `poll` bounds every condition wait.
    pub fn start(count: usize, episode: Duration, poll: Duration) -> io::Result<Self> {
        let workers = (0..count)
            .map(|id| Worker {
                id,
                class: if id < count / 2 {
                    WorkerClass::Cleaning
                } else {
                    WorkerClass::Repair
                },
                state: WorkerState::Idle,
                task: None,
                episodes: 0,
            })
            .collect();
        let shared = Arc::new(PoolShared {
            workers: Mutex::new(workers),
            changed: Condvar::new(),
            episode,
            poll,
            stop: AtomicBool::new(false),
        });

        let mut actors = Vec::with_capacity(count);
        for id in 0..count {
            let shared = Arc::clone(&shared);
            let handle = thread::Builder::new()
                .name(format!("worker-{id}"))
                .spawn(move || run_worker(shared, id))?;
            actors.push(handle);
        }
        Ok(Self {
            shared,
            actors: Mutex::new(actors),
        })
    }

    /// Block until a worker of `class` is idle, then assign it to `task`.
    ///
    /// No FIFO ordering among waiters: whoever re-checks first after a
    /// worker goes idle gets it.
    pub fn acquire(&self, class: WorkerClass, task: TaskId) -> WorkerHandle {
        let mut guard = self.shared.lock();
        loop {
            if let Some((worker, episode)) = claim_idle(&mut guard, class, task) {
                self.shared.changed.notify_all();
                return self.handle(worker, class, episode);
            }
            guard = self.shared.wait(guard);
        }
    }

    pub fn try_acquire(&self, class: WorkerClass, task: TaskId) -> Option<WorkerHandle> {
        let mut guard = self.shared.lock();
        let (worker, episode) = claim_idle(&mut guard, class, task)?;
        self.shared.changed.notify_all();
        Some(self.handle(worker, class, episode))
    }

    fn handle(&self, worker: WorkerId, class: WorkerClass, episode: u64) -> WorkerHandle {
        WorkerHandle {
            shared: Arc::clone(&self.shared),
            worker,
            class,
            episode,
        }
    }

    pub fn snapshot(&self) -> Vec<Worker> {
        self.shared.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.shared.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stop worker actors once their current episode ends and join them.
    pub fn shutdown(&self) {
        self.shared.stop.store(true, Ordering::SeqCst);
        self.shared.changed.notify_all();
        let actors: Vec<_> = self
            .actors
            .lock()
            .expect("worker actor list poisoned")
            .drain(..)
            .collect();
        for actor in actors {
            actor.join().expect("worker thread panicked");
        }
    }
}

/// An assignment of one worker to one task.
pub struct WorkerHandle {
    shared: Arc<PoolShared>,
    worker: WorkerId,
    class: WorkerClass,
    episode: u64,
}

impl WorkerHandle {
    pub fn worker(&self) -> WorkerId {
        self.worker
    }

    pub fn class(&self) -> WorkerClass {
        self.class
    }

    /// Wait for the worker to finish this assignment and go idle.
    pub fn work_episode(self) -> WorkerId {
        let mut guard = self.shared.lock();
        while guard[self.worker].episodes <= self.episode {
            guard = self.shared.wait(guard);
        }
        self.worker
    }
}
