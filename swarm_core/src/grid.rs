//! Fixed-resolution grids over the square world.
//!
//! The occupancy grid is static and built once from the obstacle list.
//! The explored grid holds a per-cell visit counter that only ever grows.

use crate::world::Obstacle;

use nalgebra::Vector2;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Geometry shared by both grids: a `side x side` lattice centered on the origin.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridLayout {
    pub cell_size: f64,
    pub side: usize,
    origin: f64,
}

impl GridLayout {
    pub fn new(world_size: f64, cell_size: f64) -> Self {
        let side = (world_size / cell_size).ceil().max(1.0) as usize;
        Self {
            cell_size,
            side,
            origin: -world_size / 2.0,
        }
    }

    pub fn cell_count(&self) -> usize {
        self.side * self.side
    }

    /// Flat index of the cell containing `p`, if `p` is on the grid.
    pub fn cell_index(&self, p: Vector2<f64>) -> Option<usize> {
        let col = ((p.x - self.origin) / self.cell_size).floor();
        let row = ((p.y - self.origin) / self.cell_size).floor();
        if col < 0.0 || row < 0.0 || col >= self.side as f64 || row >= self.side as f64 {
            return None;
        }
        Some(row as usize * self.side + col as usize)
    }

    pub fn cell_center(&self, index: usize) -> Vector2<f64> {
        let row = index / self.side;
        let col = index % self.side;
        Vector2::new(
            self.origin + (col as f64 + 0.5) * self.cell_size,
            self.origin + (row as f64 + 0.5) * self.cell_size,
        )
    }
}

/// Static obstacle occupancy. A cell is occupied when its center lies in an obstacle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OccupancyGrid {
    layout: GridLayout,
    cells: Vec<bool>,
}

impl OccupancyGrid {
    pub fn new(world_size: f64, cell_size: f64, obstacles: &[Obstacle]) -> Self {
        let layout = GridLayout::new(world_size, cell_size);
        let cells = (0..layout.cell_count())
            .into_par_iter()
            .map(|i| {
                let center = layout.cell_center(i);
                obstacles.iter().any(|o| o.contains(center))
            })
            .collect();
        Self { layout, cells }
    }

    pub fn layout(&self) -> &GridLayout {
        &self.layout
    }

    pub fn is_occupied(&self, p: Vector2<f64>) -> bool {
        self.layout.cell_index(p).map_or(true, |i| self.cells[i])
    }

    pub fn is_cell_occupied(&self, index: usize) -> bool {
        self.cells.get(index).copied().unwrap_or(true)
    }

    pub fn occupied_count(&self) -> usize {
        self.cells.iter().filter(|c| **c).count()
    }

    pub fn cells(&self) -> &[bool] {
        &self.cells
    }
}

/// Per-cell count of steps during which some agent could sense the cell center.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExploredGrid {
    layout: GridLayout,
    visits: Vec<u32>,
}

impl ExploredGrid {
    pub fn new(world_size: f64, cell_size: f64) -> Self {
        let layout = GridLayout::new(world_size, cell_size);
        Self {
            visits: vec![0; layout.cell_count()],
            layout,
        }
    }

    pub fn layout(&self) -> &GridLayout {
        &self.layout
    }

    /// Adds one visit to every cell whose center is within `radius` of an agent.
    pub fn update(&mut self, positions: &[Vector2<f64>], radius: f64) {
        let layout = self.layout;
        let radius_sq = radius * radius;
        self.visits.par_iter_mut().enumerate().for_each(|(i, visits)| {
            let center = layout.cell_center(i);
            if positions.iter().any(|p| (p - center).norm_squared() <= radius_sq) {
                *visits = visits.saturating_add(1);
            }
        });
    }

    pub fn visits(&self, index: usize) -> u32 {
        self.visits.get(index).copied().unwrap_or(0)
    }

    pub fn is_explored(&self, p: Vector2<f64>) -> bool {
        self.layout.cell_index(p).map_or(false, |i| self.visits[i] > 0)
    }

    /// Fraction of free cells visited at least once.
    pub fn explored_fraction(&self, occupancy: &OccupancyGrid) -> f64 {
        let (free, seen) = self
            .visits
            .iter()
            .enumerate()
            .filter(|(i, _)| !occupancy.is_cell_occupied(*i))
            .fold((0usize, 0usize), |(free, seen), (_, v)| (free + 1, seen + usize::from(*v > 0)));
        if free == 0 {
            0.0
        } else {
            seen as f64 / free as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_layout_round_trips_centers() {
        let layout = GridLayout::new(10.0, 1.0);
        assert_eq!(layout.side, 10);
        for i in [0, 9, 55, 99] {
            assert_eq!(layout.cell_index(layout.cell_center(i)), Some(i));
        }
        assert_eq!(layout.cell_index(Vector2::new(5.5, 0.0)), None);
    }

    #[test]
    fn test_occupancy_from_obstacles() {
        let grid = OccupancyGrid::new(10.0, 1.0, &[Obstacle::new(0.0, 0.0, 2.0, 2.0)]);
        assert_eq!(grid.occupied_count(), 4);
        assert!(grid.is_occupied(Vector2::new(0.5, 1.5)));
        assert!(!grid.is_occupied(Vector2::new(-0.5, 0.5)));
        // Off-grid counts as blocked
        assert!(grid.is_occupied(Vector2::new(50.0, 0.0)));
    }

    #[test]
    fn test_explored_is_monotonic() {
        let mut grid = ExploredGrid::new(10.0, 1.0);
        let here = [Vector2::new(0.5, 0.5)];
        grid.update(&here, 0.1);
        grid.update(&[Vector2::new(-4.5, -4.5)], 0.1);
        grid.update(&here, 0.1);

        let idx = grid.layout().cell_index(here[0]).unwrap();
        assert_eq!(grid.visits(idx), 2);
        assert!(grid.is_explored(Vector2::new(-4.5, -4.5)));
    }

    #[test]
    fn test_explored_fraction_ignores_occupied() {
        let occupancy = OccupancyGrid::new(2.0, 1.0, &[Obstacle::new(-1.0, -1.0, 1.0, 1.0)]);
        let mut grid = ExploredGrid::new(2.0, 1.0);
        grid.update(&[Vector2::new(0.5, 0.5)], 0.1);
        assert_relative_eq!(grid.explored_fraction(&occupancy), 1.0 / 3.0);
    }
}
