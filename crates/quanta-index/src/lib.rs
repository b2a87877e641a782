//! Spatial indexing abstractions for particle neighborhood queries.

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Upper bound on cells per axis; larger requests are clamped.
pub const MAX_CELLS_PER_AXIS: usize = 512;

const EMPTY_CELL: u32 = u32::MAX;

/// Errors emitted by spatial index implementations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum IndexError {
    /// Indicates configuration values that cannot be used (e.g., non-positive cell size).
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),
}

/// Common behaviour exposed by neighborhood indices.
pub trait NeighborhoodIndex {
    /// Rebuild internal structures from particle positions.
    fn rebuild(&mut self, positions: &[(f32, f32)]) -> Result<(), IndexError>;

    /// Visit neighbors of `particle_idx` within the provided squared radius.
    ///
    /// The particle itself is never visited.
    fn neighbors_within(
        &self,
        particle_idx: usize,
        radius_sq: f32,
        visitor: &mut dyn FnMut(usize, OrderedFloat<f32>),
    );

    /// Visit every indexed particle within the squared radius of an arbitrary point.
    fn query_point(
        &self,
        x: f32,
        y: f32,
        radius_sq: f32,
        visitor: &mut dyn FnMut(usize, OrderedFloat<f32>),
    );
}

/// Uniform bucket grid over the square `[-half_extent, half_extent]²`.
///
/// Buckets are stored as a counting-sorted arena (`cell_starts` + `entries`) so a
/// rebuild reuses the same allocations every tick. Points outside the square are
/// clamped into the border cells; non-finite points are left out of every bucket.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UniformGridIndex {
    /// Edge length of each grid cell.
    pub cell_size: f32,
    /// Half of the indexed square's side length.
    pub half_extent: f32,
    #[serde(skip)]
    dims: usize,
    #[serde(skip)]
    cell_starts: Vec<u32>,
    #[serde(skip)]
    cursor: Vec<u32>,
    #[serde(skip)]
    entries: Vec<u32>,
    #[serde(skip)]
    points: Vec<(f32, f32)>,
    #[serde(skip)]
    point_cells: Vec<u32>,
}

impl UniformGridIndex {
    /// Create a new uniform grid with the provided cell size and half extent.
    #[must_use]
    pub fn new(cell_size: f32, half_extent: f32) -> Self {
        Self {
            cell_size,
            half_extent,
            dims: 0,
            cell_starts: Vec::new(),
            cursor: Vec::new(),
            entries: Vec::new(),
            points: Vec::new(),
            point_cells: Vec::new(),
        }
    }

    /// Number of points supplied to the last rebuild.
    #[must_use]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Returns true when the last rebuild received no points.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Cells per axis after the last rebuild.
    #[must_use]
    pub const fn dims(&self) -> usize {
        self.dims
    }

    #[inline]
    fn axis_cell(&self, value: f32) -> usize {
        let scaled = ((value + self.half_extent) / self.cell_size).floor();
        if scaled <= 0.0 {
            0
        } else {
            (scaled as usize).min(self.dims - 1)
        }
    }

    #[inline]
    fn cell_of(&self, x: f32, y: f32) -> Option<usize> {
        if !x.is_finite() || !y.is_finite() {
            return None;
        }
        Some(self.axis_cell(y) * self.dims + self.axis_cell(x))
    }

    fn visit_range(
        &self,
        x: f32,
        y: f32,
        radius_sq: f32,
        exclude: Option<usize>,
        visitor: &mut dyn FnMut(usize, OrderedFloat<f32>),
    ) {
        if self.dims == 0 || !x.is_finite() || !y.is_finite() {
            return;
        }
        if !radius_sq.is_finite() || radius_sq < 0.0 {
            return;
        }
        let radius = radius_sq.sqrt();
        let x0 = self.axis_cell(x - radius);
        let x1 = self.axis_cell(x + radius);
        let y0 = self.axis_cell(y - radius);
        let y1 = self.axis_cell(y + radius);
        for cy in y0..=y1 {
            for cx in x0..=x1 {
                let cell = cy * self.dims + cx;
                let start = self.cell_starts[cell] as usize;
                let end = self.cell_starts[cell + 1] as usize;
                for &entry in &self.entries[start..end] {
                    let other = entry as usize;
                    if Some(other) == exclude {
                        continue;
                    }
                    let (ox, oy) = self.points[other];
                    let dx = ox - x;
                    let dy = oy - y;
                    let dist_sq = dx * dx + dy * dy;
                    if dist_sq <= radius_sq {
                        visitor(other, OrderedFloat(dist_sq));
                    }
                }
            }
        }
    }
}

impl Default for UniformGridIndex {
    fn default() -> Self {
        Self::new(0.1, 1.0)
    }
}

impl NeighborhoodIndex for UniformGridIndex {
    fn rebuild(&mut self, positions: &[(f32, f32)]) -> Result<(), IndexError> {
        if !(self.cell_size.is_finite() && self.cell_size > 0.0) {
            return Err(IndexError::InvalidConfig("cell_size must be positive"));
        }
        if !(self.half_extent.is_finite() && self.half_extent > 0.0) {
            return Err(IndexError::InvalidConfig("half_extent must be positive"));
        }
        if positions.len() >= EMPTY_CELL as usize {
            return Err(IndexError::InvalidConfig("too many points for u32 buckets"));
        }

        self.dims = ((2.0 * self.half_extent / self.cell_size).ceil() as usize)
            .clamp(1, MAX_CELLS_PER_AXIS);
        let cells = self.dims * self.dims;

        self.points.clear();
        self.points.extend_from_slice(positions);
        self.cell_starts.clear();
        self.cell_starts.resize(cells + 1, 0);
        self.point_cells.clear();

        for idx in 0..self.points.len() {
            let (x, y) = self.points[idx];
            match self.cell_of(x, y) {
                Some(cell) => {
                    self.point_cells.push(cell as u32);
                    self.cell_starts[cell + 1] += 1;
                }
                None => self.point_cells.push(EMPTY_CELL),
            }
        }
        for cell in 0..cells {
            self.cell_starts[cell + 1] += self.cell_starts[cell];
        }

        let total = self.cell_starts[cells] as usize;
        self.entries.clear();
        self.entries.resize(total, 0);
        self.cursor.clear();
        self.cursor.extend_from_slice(&self.cell_starts[..cells]);
        for (idx, &cell) in self.point_cells.iter().enumerate() {
            if cell == EMPTY_CELL {
                continue;
            }
            let slot = &mut self.cursor[cell as usize];
            self.entries[*slot as usize] = idx as u32;
            *slot += 1;
        }
        Ok(())
    }

    fn neighbors_within(
        &self,
        particle_idx: usize,
        radius_sq: f32,
        visitor: &mut dyn FnMut(usize, OrderedFloat<f32>),
    ) {
        if particle_idx >= self.points.len() || self.point_cells[particle_idx] == EMPTY_CELL {
            return;
        }
        let (x, y) = self.points[particle_idx];
        self.visit_range(x, y, radius_sq, Some(particle_idx), visitor);
    }

    fn query_point(
        &self,
        x: f32,
        y: f32,
        radius_sq: f32,
        visitor: &mut dyn FnMut(usize, OrderedFloat<f32>),
    ) {
        self.visit_range(x, y, radius_sq, None, visitor);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect(index: &UniformGridIndex, idx: usize, radius: f32) -> Vec<usize> {
        let mut found = Vec::new();
        index.neighbors_within(idx, radius * radius, &mut |other, _| found.push(other));
        found.sort_unstable();
        found
    }

    #[test]
    fn rejects_non_positive_cell_size() {
        let mut index = UniformGridIndex::new(0.0, 1.0);
        assert_eq!(
            index.rebuild(&[(0.0, 0.0)]),
            Err(IndexError::InvalidConfig("cell_size must be positive"))
        );
    }

    #[test]
    fn finds_neighbors_across_cell_borders() {
        let mut index = UniformGridIndex::new(0.1, 1.0);
        let points = [(0.0, 0.0), (0.05, 0.0), (0.12, 0.0), (0.5, 0.5)];
        index.rebuild(&points).expect("rebuild");
        assert_eq!(collect(&index, 0, 0.13), vec![1, 2]);
        assert_eq!(collect(&index, 3, 0.2), Vec::<usize>::new());
    }

    #[test]
    fn reports_squared_distances() {
        let mut index = UniformGridIndex::new(0.25, 1.0);
        index.rebuild(&[(0.0, 0.0), (0.3, 0.4)]).expect("rebuild");
        let mut seen = Vec::new();
        index.neighbors_within(0, 1.0, &mut |other, dist_sq| {
            seen.push((other, dist_sq.into_inner()));
        });
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0, 1);
        assert!((seen[0].1 - 0.25).abs() < 1e-6);
    }

    #[test]
    fn non_finite_points_are_not_bucketed() {
        let mut index = UniformGridIndex::new(0.1, 1.0);
        index
            .rebuild(&[(0.0, 0.0), (f32::NAN, 0.0), (0.01, 0.0)])
            .expect("rebuild");
        assert_eq!(collect(&index, 0, 0.5), vec![2]);
        assert!(collect(&index, 1, 0.5).is_empty());
    }

    #[test]
    fn out_of_range_points_clamp_to_border_cells() {
        let mut index = UniformGridIndex::new(0.1, 1.0);
        index.rebuild(&[(1.5, 1.5), (0.98, 0.98)]).expect("rebuild");
        let mut hits = Vec::new();
        index.query_point(1.0, 1.0, 1.0, &mut |other, _| hits.push(other));
        hits.sort_unstable();
        assert_eq!(hits, vec![0, 1]);
    }

    #[test]
    fn rebuild_reuses_buffers_between_ticks() {
        let mut index = UniformGridIndex::new(0.2, 1.0);
        index.rebuild(&[(0.0, 0.0), (0.1, 0.1)]).expect("first");
        index.rebuild(&[(0.9, 0.9)]).expect("second");
        assert_eq!(index.len(), 1);
        assert!(collect(&index, 0, 2.0).is_empty());
        assert_eq!(index.dims(), 10);
    }
}
