//! Berth grid: footprint math, placement search, and claim/release of regions.

use std::sync::{Mutex, MutexGuard};

use serde::Serialize;

use crate::error::GridError;
use crate::types::TaskId;
use crate::zones::{BerthClass, CellState, ZonePartitioner};

/// Cell counts a task needs: rows from its length, columns from its width.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct Footprint {
    pub rows: usize,
    pub cols: usize,
}

impl Footprint {
    /// `(ceil(length / slot), ceil(width / slot))`.
    pub fn for_vessel(length: u32, width: u32, slot_size: u32) -> Self {
        debug_assert!(slot_size > 0, "slot size must be > 0");
        Self {
            rows: length.div_ceil(slot_size) as usize,
            cols: width.div_ceil(slot_size) as usize,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0 || self.cols == 0
    }
}

/// Axis-aligned block of cells, anchored at its top-left corner.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct Region {
    pub row: usize,
    pub col: usize,
    pub rows: usize,
    pub cols: usize,
}

impl Region {
    pub fn at(row: usize, col: usize, footprint: Footprint) -> Self {
        Self {
            row,
            col,
            rows: footprint.rows,
            cols: footprint.cols,
        }
    }

    pub fn footprint(&self) -> Footprint {
        Footprint {
            rows: self.rows,
            cols: self.cols,
        }
    }

    /// Cells of the region in row-major order.
    pub fn cells(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        (self.row..self.row + self.rows)
            .flat_map(move |r| (self.col..self.col + self.cols).map(move |c| (r, c)))
    }
}

/// A placement candidate and its quay-distance score (lower is better).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct Spot {
    pub region: Region,
    pub locality: usize,
}

/// Plain grid state. Callers hold the [`ResourceGrid`] lock while using it.
#[derive(Clone, Debug)]
pub struct Grid {
    rows: usize,
    cols: usize,
    slot_size: u32,
    zones: ZonePartitioner,
    cells: Vec<CellState>,
}

impl Grid {
    /// Build a grid with every cell set to its partitioned home class.
    pub fn new(rows: usize, cols: usize, slot_size: u32, quay_base_spacing: usize) -> Self {
        let zones = ZonePartitioner::new(cols, quay_base_spacing);
        let mut cells = Vec::with_capacity(rows * cols);
        for _ in 0..rows {
            for col in 0..cols {
                cells.push(zones.classify(col));
            }
        }
        Self {
            rows,
            cols,
            slot_size,
            zones,
            cells,
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn zones(&self) -> &ZonePartitioner {
        &self.zones
    }

    /// Row-major cell states.
    pub fn cells(&self) -> &[CellState] {
        &self.cells
    }

    pub fn cell(&self, row: usize, col: usize) -> CellState {
        self.cells[self.index(row, col)]
    }

    fn index(&self, row: usize, col: usize) -> usize {
        row * self.cols + col
    }

    pub fn footprint(&self, length: u32, width: u32) -> Footprint {
        Footprint::for_vessel(length, width, self.slot_size)
    }

    fn in_bounds(&self, region: &Region) -> bool {
        region.rows > 0
            && region.cols > 0
            && region.row + region.rows <= self.rows
            && region.col + region.cols <= self.cols
    }

    /// Every cell of `region` lies in the grid and currently has `class`.
    pub fn fits(&self, region: &Region, class: BerthClass) -> bool {
        let wanted = class.cell_state();
        self.in_bounds(region) && region.cells().all(|(r, c)| self.cell(r, c) == wanted)
    }

    /// Cells between `col` and the nearest quay in `row`, looking both ways.
    fn quay_distance(&self, row: usize, col: usize) -> Option<usize> {
        let left = (0..col)
            .rev()
            .find(|&c| self.cell(row, c) == CellState::Quay)
            .map(|q| col - q - 1);
        let right = (col + 1..self.cols)
            .find(|&c| self.cell(row, c) == CellState::Quay)
            .map(|q| q - col - 1);
        match (left, right) {
            (Some(l), Some(r)) => Some(l.min(r)),
            (l, r) => l.or(r),
        }
    }

    /// Minimum quay distance over the region's columns, measured on its top row.
    pub fn locality(&self, region: &Region) -> usize {
        (region.col..region.col + region.cols)
            .filter_map(|c| self.quay_distance(region.row, c))
            .min()
            .unwrap_or(usize::MAX)
    }

    /// Best-scoring region of `class` for `footprint`; ties go to the first in
    /// row-major scan order.
    pub fn find_best_spot(&self, footprint: Footprint, class: BerthClass) -> Option<Spot> {
        if footprint.is_empty() || footprint.rows > self.rows || footprint.cols > self.cols {
            return None;
        }
        let mut best: Option<Spot> = None;
        for row in 0..=self.rows - footprint.rows {
            for col in 0..=self.cols - footprint.cols {
                let region = Region::at(row, col, footprint);
                if !self.fits(&region, class) {
                    continue;
                }
                let locality = self.locality(&region);
                if best.is_none_or(|b| locality < b.locality) {
                    best = Some(Spot { region, locality });
                }
            }
        }
        best
    }

    /// Whether `footprint` fits some `class` region of an empty grid.
    pub fn could_ever_fit(&self, footprint: Footprint, class: BerthClass) -> bool {
        !footprint.is_empty()
            && footprint.rows <= self.rows
            && footprint.cols <= self.zones.widest_run(class)
    }

    /// Mark every cell of `region` as occupied by `id`. Nothing changes on error.
    pub fn claim(&mut self, region: Region, class: BerthClass, id: TaskId) -> Result<(), GridError> {
        if !self.in_bounds(&region) {
            return Err(GridError::OutOfBounds {
                region,
                rows: self.rows,
                cols: self.cols,
            });
        }
        let wanted = class.cell_state();
        if let Some((row, col)) = region.cells().find(|&(r, c)| self.cell(r, c) != wanted) {
            return Err(GridError::RegionUnavailable {
                row,
                col,
                found: self.cell(row, col),
                wanted: class,
            });
        }
        for (r, c) in region.cells() {
            let idx = self.index(r, c);
            self.cells[idx] = CellState::Occupied(id);
        }
        Ok(())
    }

    /// Bounding box of the cells occupied by `id`.
    pub fn region_of(&self, id: TaskId) -> Option<Region> {
        let mut bounds: Option<(usize, usize, usize, usize)> = None;
        for (idx, cell) in self.cells.iter().enumerate() {
            if *cell != CellState::Occupied(id) {
                continue;
            }
            let (r, c) = (idx / self.cols, idx % self.cols);
            bounds = Some(match bounds {
                None => (r, c, r, c),
                Some((r0, c0, r1, c1)) => (r0.min(r), c0.min(c), r1.max(r), c1.max(c)),
            });
        }
        bounds.map(|(r0, c0, r1, c1)| Region {
            row: r0,
            col: c0,
            rows: r1 - r0 + 1,
            cols: c1 - c0 + 1,
        })
    }

    /// Restore every cell held by `id` to its partitioned class.
    pub fn release(&mut self, id: TaskId) -> Option<Region> {
        let region = self.region_of(id)?;
        for idx in 0..self.cells.len() {
            if self.cells[idx] == CellState::Occupied(id) {
                self.cells[idx] = self.zones.classify(idx % self.cols);
            }
        }
        Some(region)
    }
}

/// The grid behind its single exclusion domain.
pub struct ResourceGrid {
    inner: Mutex<Grid>,
}

impl ResourceGrid {
    pub fn new(grid: Grid) -> Self {
        Self {
            inner: Mutex::new(grid),
        }
    }

    /// Lock the whole grid. First in the Grid -> Queue -> Registry order.
    pub fn lock(&self) -> MutexGuard<'_, Grid> {
        self.inner.lock().expect("grid mutex poisoned")
    }

    /// Copy of the current grid state.
    pub fn snapshot(&self) -> Grid {
        self.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn marina_grid() -> Grid {
        Grid::new(20, 25, 5, 3)
    }

    #[test]
    fn footprint_rounds_up_to_slot() {
        assert_eq!(Footprint::for_vessel(12, 8, 5), Footprint { rows: 3, cols: 2 });
        assert_eq!(Footprint::for_vessel(10, 5, 5), Footprint { rows: 2, cols: 1 });
        assert!(Footprint::for_vessel(0, 5, 5).is_empty());
    }

    #[test]
    fn best_spot_is_next_to_first_quay() {
        let grid = marina_grid();
        let fp = grid.footprint(12, 8);
        let spot = grid.find_best_spot(fp, BerthClass::Free).expect("free spot");
        assert_eq!(spot.region, Region::at(0, 1, fp));
        assert_eq!(spot.locality, 0);
    }

    #[test]
    fn fuel_dock_search_stays_in_fuel_columns() {
        let grid = marina_grid();
        let fp = Footprint { rows: 2, cols: 3 };
        let spot = grid.find_best_spot(fp, BerthClass::FuelDock).expect("fuel spot");
        assert_eq!(spot.region, Region::at(0, 19, fp));
        assert_eq!(spot.locality, 0);
        for (r, c) in spot.region.cells() {
            assert_eq!(grid.cell(r, c), CellState::FuelDock);
        }
    }

    #[test]
    fn search_skips_occupied_cells() {
        let mut grid = marina_grid();
        let fp = Footprint { rows: 20, cols: 1 };
        grid.claim(Region::at(0, 1, fp), BerthClass::Free, 1).expect("claim col 1");
        grid.claim(Region::at(0, 2, fp), BerthClass::Free, 2).expect("claim col 2");
        let spot = grid
            .find_best_spot(Footprint { rows: 1, cols: 1 }, BerthClass::Free)
            .expect("spot");
        // Column 4 is adjacent to the quay at 3.
        assert_eq!(spot.region, Region::at(0, 4, Footprint { rows: 1, cols: 1 }));
    }

    #[test]
    fn oversized_footprint_has_no_spot() {
        let grid = marina_grid();
        assert!(grid.find_best_spot(Footprint { rows: 21, cols: 1 }, BerthClass::Free).is_none());
        assert!(grid.find_best_spot(Footprint { rows: 1, cols: 6 }, BerthClass::Free).is_none());
        assert!(!grid.could_ever_fit(Footprint { rows: 1, cols: 6 }, BerthClass::Free));
        assert!(grid.could_ever_fit(Footprint { rows: 1, cols: 6 }, BerthClass::FuelDock));
    }

    #[test]
    fn claim_rejects_quay_and_mixed_classes() {
        let mut grid = marina_grid();
        let err = grid
            .claim(Region::at(0, 2, Footprint { rows: 1, cols: 2 }), BerthClass::Free, 9)
            .unwrap_err();
        assert!(matches!(err, GridError::RegionUnavailable { col: 3, .. }));
        let err = grid
            .claim(Region::at(19, 24, Footprint { rows: 2, cols: 1 }), BerthClass::FuelDock, 9)
            .unwrap_err();
        assert!(matches!(err, GridError::OutOfBounds { .. }));
        assert!(grid.region_of(9).is_none());
    }

    #[test]
    fn release_restores_fuel_docks() {
        let mut grid = marina_grid();
        let region = Region::at(4, 20, Footprint { rows: 3, cols: 2 });
        grid.claim(region, BerthClass::FuelDock, 5).expect("claim");
        assert_eq!(grid.cell(5, 21), CellState::Occupied(5));
        assert_eq!(grid.release(5), Some(region));
        for (r, c) in region.cells() {
            assert_eq!(grid.cell(r, c), CellState::FuelDock);
        }
        assert_eq!(grid.release(5), None);
    }

    #[test]
    fn resource_grid_snapshot_is_detached() {
        let shared = ResourceGrid::new(marina_grid());
        let before = shared.snapshot();
        shared
            .lock()
            .claim(Region::at(0, 1, Footprint { rows: 1, cols: 1 }), BerthClass::Free, 3)
            .expect("claim");
        assert_eq!(before.cell(0, 1), CellState::Free);
        assert_eq!(shared.snapshot().cell(0, 1), CellState::Occupied(3));
    }

    fn brute_force_best(grid: &Grid, fp: Footprint, class: BerthClass) -> Option<usize> {
        let mut scores = Vec::new();
        for row in 0..grid.rows() {
            for col in 0..grid.cols() {
                let region = Region::at(row, col, fp);
                if grid.fits(&region, class) {
                    let mut score = usize::MAX;
                    for c in col..col + fp.cols {
                        for q in grid.zones().quay_columns() {
                            score = score.min(c.abs_diff(q) - 1);
                        }
                    }
                    scores.push(score);
                }
            }
        }
        scores.into_iter().min()
    }

    proptest! {
        #[test]
        fn footprint_is_ceiling_division(length in 1u32..200, width in 1u32..200, slot in 1u32..20) {
            let fp = Footprint::for_vessel(length, width, slot);
            prop_assert!(fp.rows as u32 * slot >= length);
            prop_assert!((fp.rows as u32 - 1) * slot < length);
            prop_assert!(fp.cols as u32 * slot >= width);
            prop_assert!((fp.cols as u32 - 1) * slot < width);
        }

        #[test]
        fn chosen_spot_has_minimal_score(
            claims in proptest::collection::vec((0usize..20, 0usize..25, 1usize..4, 1usize..3), 0..12),
            fp_rows in 1usize..5,
            fp_cols in 1usize..4,
            fuel in any::<bool>(),
        ) {
            let mut grid = marina_grid();
            for (i, (row, col, rows, cols)) in claims.into_iter().enumerate() {
                let region = Region { row, col, rows, cols };
                let class = if col > 18 { BerthClass::FuelDock } else { BerthClass::Free };
                let _ = grid.claim(region, class, i as TaskId + 100);
            }
            let class = if fuel { BerthClass::FuelDock } else { BerthClass::Free };
            let fp = Footprint { rows: fp_rows, cols: fp_cols };
            let found = grid.find_best_spot(fp, class);
            prop_assert_eq!(found.map(|s| s.locality), brute_force_best(&grid, fp, class));
            if let Some(spot) = found {
                prop_assert!(grid.fits(&spot.region, class));
                prop_assert_eq!(spot.region.footprint(), fp);
                prop_assert_eq!(grid.find_best_spot(fp, class), Some(spot));
            }
        }

        #[test]
        fn release_never_changes_cell_classes(
            requests in proptest::collection::vec((1usize..6, 1usize..4, any::<bool>()), 1..20),
        ) {
            let mut grid = marina_grid();
            let pristine = grid.cells().to_vec();
            let mut held = Vec::new();
            for (i, (rows, cols, fuel)) in requests.into_iter().enumerate() {
                let class = if fuel { BerthClass::FuelDock } else { BerthClass::Free };
                let fp = Footprint { rows, cols };
                if let Some(spot) = grid.find_best_spot(fp, class) {
                    grid.claim(spot.region, class, i as TaskId).expect("claim found spot");
                    held.push((i as TaskId, spot.region));
                }
            }
            held.reverse();
            for (id, region) in held {
                prop_assert_eq!(grid.release(id), Some(region));
                for (idx, cell) in grid.cells().iter().enumerate() {
                    if !matches!(cell, CellState::Occupied(_)) {
                        prop_assert_eq!(*cell, pristine[idx]);
                    }
                }
            }
            prop_assert_eq!(grid.cells(), &pristine[..]);
        }
    }
}
