//! Bounded FIFO admission queue of waiting tasks.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

use crate::types::{Task, TaskId};

/// Tasks waiting for berth space, in arrival order.
pub struct AdmissionQueue {
    inner: Mutex<QueueState>,
}

/// Queue contents; reachable only through [`AdmissionQueue::lock`].
pub struct QueueState {
    tasks: VecDeque<Task>,
    capacity: usize,
}

impl QueueState {
    /// Remove the entry for `id`, keeping the order of the rest.
    pub fn remove(&mut self, id: TaskId) -> Option<Task> {
        let pos = self.tasks.iter().position(|t| t.id == id)?;
        self.tasks.remove(pos)
    }

    /// Append a task; returns it back when the queue is full.
    pub fn push(&mut self, task: Task) -> Result<(), Task> {
        if self.tasks.len() >= self.capacity {
            return Err(task);
        }
        self.tasks.push_back(task);
        Ok(())
    }

    pub fn contains(&self, id: TaskId) -> bool {
        self.tasks.iter().any(|t| t.id == id)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Task> {
        self.tasks.iter()
    }
}

impl AdmissionQueue {
    /// Create an empty queue holding at most `capacity` tasks.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(QueueState {
                tasks: VecDeque::with_capacity(capacity),
                capacity,
            }),
        }
    }

    /// Lock the queue. Taken after the grid and before the registry.
    pub fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.inner.lock().expect("queue mutex poisoned")
    }

    pub fn push(&self, task: Task) -> Result<(), Task> {
        self.lock().push(task)
    }

    /// Replace the stored copy of `task`. Returns false if it is not queued.
    pub fn sync(&self, task: &Task) -> bool {
        let mut guard = self.lock();
        match guard.tasks.iter_mut().find(|t| t.id == task.id) {
            Some(slot) => {
                slot.clone_from(task);
                true
            }
            None => false,
        }
    }

    pub fn remove(&self, id: TaskId) -> Option<Task> {
        self.lock().remove(id)
    }

    /// Copy of the queued tasks in FIFO order.
    pub fn snapshot(&self) -> Vec<Task> {
        self.lock().tasks.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.lock().capacity
    }
}
