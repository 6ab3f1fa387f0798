//! Error types for configuration, grid claims, task spawning and invariant checks.

use std::io;

use thiserror::Error;

use crate::grid::Region;
use crate::types::TaskId;
use crate::zones::{BerthClass, CellState};

/// Errors raised while loading or validating a configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config value `{field}`: {reason}")]
    Invalid {
        field: &'static str,
        reason: &'static str,
    },
}

/// Errors raised by a direct grid claim.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum GridError {
    #[error("region {region:?} exceeds the {rows}x{cols} grid")]
    OutOfBounds {
        region: Region,
        rows: usize,
        cols: usize,
    },

    #[error("cell ({row}, {col}) is {found:?}, expected {wanted:?}")]
    RegionUnavailable {
        row: usize,
        col: usize,
        found: CellState,
        wanted: BerthClass,
    },
}

/// Errors surfaced by the marina service bundle.
#[derive(Debug, Error)]
pub enum MarinaError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to spawn actor thread: {0}")]
    Spawn(#[from] io::Error),

    #[error("task {id} rejected: {reason}")]
    InvalidTask { id: TaskId, reason: &'static str },

    #[error("task {id} is already live")]
    DuplicateTask { id: TaskId },

    #[error("task {id} needs {rows}x{cols} cells of {class:?}, which never fit the grid")]
    Unplaceable {
        id: TaskId,
        rows: usize,
        cols: usize,
        class: BerthClass,
    },
}

/// A broken data-model invariant found on a consistent snapshot.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InvariantViolation {
    #[error("cell ({row}, {col}) is {found:?}, partition says {expected:?}")]
    WrongClass {
        row: usize,
        col: usize,
        found: CellState,
        expected: CellState,
    },

    #[error("task {id} occupies a non-rectangular block")]
    FragmentedBlock { id: TaskId },

    #[error("task {id} occupies cells but is not registered")]
    Unregistered { id: TaskId },

    #[error("task {id} is registered but owns no cells")]
    Homeless { id: TaskId },

    #[error("task {id} occupies {actual:?}, footprint is {expected_rows}x{expected_cols}")]
    FootprintMismatch {
        id: TaskId,
        actual: Region,
        expected_rows: usize,
        expected_cols: usize,
    },

    #[error("task {id} is both queued and registered")]
    DoubleListed { id: TaskId },

    #[error("{what} holds {len} entries, capacity {capacity}")]
    OverCapacity {
        what: &'static str,
        len: usize,
        capacity: usize,
    },
}
