//! Bounded set of tasks currently holding grid space.

use std::sync::{Mutex, MutexGuard};

use crate::types::{Task, TaskId};

/// Docked and fuel-docked tasks.
pub struct ActiveRegistry {
    inner: Mutex<RegistryState>,
}

pub struct RegistryState {
    tasks: Vec<Task>,
    capacity: usize,
}

impl RegistryState {
    pub fn has_room(&self) -> bool {
        self.tasks.len() < self.capacity
    }

    /// Register a task; returns it back when full or already present.
    pub fn insert(&mut self, task: Task) -> Result<(), Task> {
        if !self.has_room() || self.contains(task.id) {
            return Err(task);
        }
        self.tasks.push(task);
        Ok(())
    }

    pub fn remove(&mut self, id: TaskId) -> Option<Task> {
        let pos = self.tasks.iter().position(|t| t.id == id)?;
        Some(self.tasks.remove(pos))
    }

    pub fn contains(&self, id: TaskId) -> bool {
        self.tasks.iter().any(|t| t.id == id)
    }

    pub fn get(&self, id: TaskId) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
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

impl ActiveRegistry {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(RegistryState {
                tasks: Vec::with_capacity(capacity),
                capacity,
            }),
        }
    }

    /// Lock the registry. Always the last of Grid -> Queue -> Registry.
    pub fn lock(&self) -> MutexGuard<'_, RegistryState> {
        self.inner.lock().expect("registry mutex poisoned")
    }

    /// Replace the stored copy of `task`. Returns false if it is not registered.
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

    pub fn snapshot(&self) -> Vec<Task> {
        self.lock().tasks.clone()
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
