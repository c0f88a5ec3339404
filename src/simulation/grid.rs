//! Row-major 2D container addressed by grid coordinate.

use std::ops::{Index, IndexMut};

/// A node coordinate on the cloth lattice. `i` is the row, `j` the column.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct GridCoord {
    pub i: usize,
    pub j: usize,
}

impl GridCoord {
    pub const fn new(i: usize, j: usize) -> Self {
        Self { i, j }
    }

    /// Coordinate shifted by a signed offset, or `None` if it would go negative.
    /// Upper bounds are checked by the container.
    pub fn offset(self, di: i32, dj: i32) -> Option<Self> {
        let i = self.i as i64 + di as i64;
        let j = self.j as i64 + dj as i64;
        if i < 0 || j < 0 {
            return None;
        }
        Some(Self::new(i as usize, j as usize))
    }
}

/// Square `n × n` grid stored row-major.
#[derive(Clone, Debug, PartialEq)]
pub struct Grid2<T> {
    size: usize,
    cells: Vec<T>,
}

impl<T: Clone> Grid2<T> {
    /// Grid of side `size` with every cell set to `value`.
    pub fn filled(size: usize, value: T) -> Self {
        Self {
            size,
            cells: vec![value; size * size],
        }
    }

    /// Overwrite every cell with `value`, keeping the allocation.
    pub fn fill(&mut self, value: T) {
        self.cells.fill(value);
    }
}

impl<T> Grid2<T> {
    /// Build a grid by evaluating `f` at every coordinate, row by row.
    pub fn from_fn(size: usize, mut f: impl FnMut(GridCoord) -> T) -> Self {
        let mut cells = Vec::with_capacity(size * size);
        for i in 0..size {
            for j in 0..size {
                cells.push(f(GridCoord::new(i, j)));
            }
        }
        Self { size, cells }
    }

    /// Side length.
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn contains(&self, at: GridCoord) -> bool {
        at.i < self.size && at.j < self.size
    }

    /// Bounds-checked access.
    pub fn get(&self, at: GridCoord) -> Option<&T> {
        if self.contains(at) {
            self.cells.get(at.i * self.size + at.j)
        } else {
            None
        }
    }

    /// Neighbor of `at` shifted by `(di, dj)`, if it lies on the grid.
    pub fn neighbor(&self, at: GridCoord, di: i32, dj: i32) -> Option<&T> {
        at.offset(di, dj).and_then(|c| self.get(c))
    }

    /// Iterate over all coordinates in storage order.
    pub fn coords(&self) -> impl Iterator<Item = GridCoord> {
        let size = self.size;
        (0..size * size).map(move |k| GridCoord::new(k / size, k % size))
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.cells.iter()
    }

    pub fn as_slice(&self) -> &[T] {
        &self.cells
    }
}

impl<T> Index<GridCoord> for Grid2<T> {
    type Output = T;

    fn index(&self, at: GridCoord) -> &T {
        assert!(
            self.contains(at),
            "grid coordinate ({}, {}) out of bounds for size {}",
            at.i,
            at.j,
            self.size
        );
        &self.cells[at.i * self.size + at.j]
    }
}

impl<T> IndexMut<GridCoord> for Grid2<T> {
    fn index_mut(&mut self, at: GridCoord) -> &mut T {
        assert!(
            self.contains(at),
            "grid coordinate ({}, {}) out of bounds for size {}",
            at.i,
            at.j,
            self.size
        );
        &mut self.cells[at.i * self.size + at.j]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_major_layout() {
        let grid = Grid2::from_fn(3, |c| c.i * 10 + c.j);
        assert_eq!(grid.as_slice(), &[0, 1, 2, 10, 11, 12, 20, 21, 22]);
        assert_eq!(grid[GridCoord::new(2, 1)], 21);
    }

    #[test]
    fn out_of_bounds_is_none() {
        let grid = Grid2::filled(4, 0u8);
        assert!(grid.get(GridCoord::new(4, 0)).is_none());
        assert!(grid.get(GridCoord::new(0, 4)).is_none());
        assert!(grid.neighbor(GridCoord::new(0, 0), -1, 0).is_none());
        assert!(grid.neighbor(GridCoord::new(3, 3), 0, 2).is_none());
        assert!(grid.neighbor(GridCoord::new(1, 1), 2, 2).is_some());
    }

    #[test]
    fn coords_follow_storage_order() {
        let grid = Grid2::filled(2, ());
        let coords: Vec<_> = grid.coords().collect();
        assert_eq!(
            coords,
            vec![
                GridCoord::new(0, 0),
                GridCoord::new(0, 1),
                GridCoord::new(1, 0),
                GridCoord::new(1, 1)
            ]
        );
    }

    #[test]
    #[should_panic]
    fn index_panics_outside_grid() {
        let grid = Grid2::filled(2, 0.0f32);
        let _ = grid[GridCoord::new(2, 0)];
    }
}
