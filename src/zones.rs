//! Column partitioning of the marina into quays, free berths and fuel docks.

use serde::Serialize;

use crate::types::TaskId;

/// Occupancy code of a single grid cell.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum CellState {
    Free,
    Quay,
    FuelDock,
    Occupied(TaskId),
}

/// Allocatable cell classes a task can request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum BerthClass {
    Free,
    FuelDock,
}

impl BerthClass {
    /// The cell state an unoccupied cell of this class carries.
    pub fn cell_state(self) -> CellState {
        match self {
            BerthClass::Free => CellState::Free,
            BerthClass::FuelDock => CellState::FuelDock,
        }
    }
}

/// Maps a column index to its home class.
///
/// Quays sit at column 0 and then at growing gaps: `base_spacing`,
/// `base_spacing + 1`, and so on. A non-quay column inherits its class from
/// the nearest quay to its left: fuel dock when that quay lies strictly past
/// the middle column, free otherwise.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ZonePartitioner {
    cols: usize,
    base_spacing: usize,
}

impl ZonePartitioner {
    pub fn new(cols: usize, base_spacing: usize) -> Self {
        debug_assert!(base_spacing > 0, "quay spacing must be > 0");
        Self { cols, base_spacing }
    }

    /// Home class of `col`, recomputed from scratch on every call.
    pub fn classify(&self, col: usize) -> CellState {
        let mut quay = 0usize;
        let mut next = 0usize;
        let mut gap = self.base_spacing.max(1);
        while next <= col {
            quay = next;
            next += gap;
            gap += 1;
        }
        if quay == col {
            CellState::Quay
        } else if quay > self.cols / 2 {
            CellState::FuelDock
        } else {
            CellState::Free
        }
    }

    /// Quay columns in ascending order.
    pub fn quay_columns(&self) -> Vec<usize> {
        let mut columns = Vec::new();
        let mut next = 0usize;
        let mut gap = self.base_spacing.max(1);
        while next < self.cols {
            columns.push(next);
            next += gap;
            gap += 1;
        }
        columns
    }

    /// Length of the widest contiguous run of `class` columns.
    pub fn widest_run(&self, class: BerthClass) -> usize {
        let wanted = class.cell_state();
        let mut best = 0;
        let mut run = 0;
        for col in 0..self.cols {
            if self.classify(col) == wanted {
                run += 1;
                best = best.max(run);
            } else {
                run = 0;
            }
        }
        best
    }
}
