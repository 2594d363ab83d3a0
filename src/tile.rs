//! Per-rank tile buffers.
//!
//! A [`Tile`] stores an owned `rows × cols` block inside a
//! `(rows + 2) × (cols + 2)` buffer. Extended coordinates run over the whole
//! buffer; row 0, row `rows + 1`, col 0 and col `cols + 1` are the ghost ring
//! and the owned cell `(i, j)` sits at extended `(i + 1, j + 1)`.

use crate::topology::{Corner, Direction};
use std::ops::{Index, IndexMut};

/// Value every cell holds before scatter or a halo exchange writes it.
pub const GHOST_FILL: u8 = 0;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tile {
    rows: usize,
    cols: usize,
    cells: Vec<u8>,
}

impl Tile {
    /// A tile owning `rows × cols` cells, everything set to [`GHOST_FILL`].
    pub fn new(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            cells: vec![GHOST_FILL; (rows + 2) * (cols + 2)],
        }
    }

    /// Owned rows.
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Owned columns.
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Distance between consecutive extended rows in the flat buffer.
    pub fn stride(&self) -> usize {
        self.cols + 2
    }

    fn offset(&self, row: usize, col: usize) -> usize {
        assert!(
            row < self.rows + 2 && col < self.cols + 2,
            "extended cell ({row}, {col}) outside {}x{} tile",
            self.rows + 2,
            self.cols + 2
        );
        row * self.stride() + col
    }

    pub fn get(&self, row: usize, col: usize) -> Option<u8> {
        (row < self.rows + 2 && col < self.cols + 2).then(|| self.cells[row * self.stride() + col])
    }

    /// The owned part of extended row `row`.
    pub fn owned_row(&self, row: usize) -> &[u8] {
        assert!(
            (1..=self.rows).contains(&row),
            "row {row} is not an owned row of a {}-row tile",
            self.rows
        );
        let start = self.offset(row, 1);
        &self.cells[start..start + self.cols]
    }

    pub fn owned_row_mut(&mut self, row: usize) -> &mut [u8] {
        assert!(
            (1..=self.rows).contains(&row),
            "row {row} is not an owned row of a {}-row tile",
            self.rows
        );
        let start = self.offset(row, 1);
        let cols = self.cols;
        &mut self.cells[start..start + cols]
    }

    /// 3×3 neighborhood centred on extended `(row, col)`.
    pub fn window(&self, row: usize, col: usize) -> [[u8; 3]; 3] {
        assert!(
            row >= 1 && col >= 1 && row <= self.rows && col <= self.cols,
            "window centre ({row}, {col}) is not an owned cell"
        );
        let mut window = [[0u8; 3]; 3];
        for (dr, line) in window.iter_mut().enumerate() {
            let start = self.offset(row + dr - 1, col - 1);
            line.copy_from_slice(&self.cells[start..start + 3]);
        }
        window
    }

    /// Copy out the owned boundary that faces `direction`.
    ///
    /// Rows are contiguous; columns are gathered from strided positions.
    pub fn pack_edge(&self, direction: Direction) -> Vec<u8> {
        match direction {
            Direction::Up => self.owned_row(1).to_vec(),
            Direction::Down => self.owned_row(self.rows).to_vec(),
            Direction::Left => (1..=self.rows).map(|r| self[(r, 1)]).collect(),
            Direction::Right => (1..=self.rows).map(|r| self[(r, self.cols)]).collect(),
        }
    }

    /// Owned cell at the corner facing `corner`.
    pub fn pack_corner(&self, corner: Corner) -> u8 {
        match corner {
            Corner::UpLeft => self[(1, 1)],
            Corner::UpRight => self[(1, self.cols)],
            Corner::DownLeft => self[(self.rows, 1)],
            Corner::DownRight => self[(self.rows, self.cols)],
        }
    }

    /// Length of the edge vector exchanged toward `direction`.
    pub fn edge_len(&self, direction: Direction) -> usize {
        match direction {
            Direction::Up | Direction::Down => self.cols,
            Direction::Left | Direction::Right => self.rows,
        }
    }

    /// Write a received edge into the ghost cells on the `direction` side.
    pub fn unpack_ghost_edge(&mut self, direction: Direction, values: &[u8]) {
        assert_eq!(
            values.len(),
            self.edge_len(direction),
            "{direction:?} ghost edge length"
        );
        match direction {
            Direction::Up => {
                let start = self.offset(0, 1);
                self.cells[start..start + values.len()].copy_from_slice(values);
            }
            Direction::Down => {
                let start = self.offset(self.rows + 1, 1);
                self.cells[start..start + values.len()].copy_from_slice(values);
            }
            Direction::Left => {
                for (i, &v) in values.iter().enumerate() {
                    self[(i + 1, 0)] = v;
                }
            }
            Direction::Right => {
                let col = self.cols + 1;
                for (i, &v) in values.iter().enumerate() {
                    self[(i + 1, col)] = v;
                }
            }
        }
    }

    /// Write a received corner value into the diagonal ghost cell.
    pub fn unpack_ghost_corner(&mut self, corner: Corner, value: u8) {
        let (row, col) = match corner {
            Corner::UpLeft => (0, 0),
            Corner::UpRight => (0, self.cols + 1),
            Corner::DownLeft => (self.rows + 1, 0),
            Corner::DownRight => (self.rows + 1, self.cols + 1),
        };
        self[(row, col)] = value;
    }
}

impl Index<(usize, usize)> for Tile {
    type Output = u8;

    fn index(&self, (row, col): (usize, usize)) -> &u8 {
        &self.cells[self.offset(row, col)]
    }
}

impl IndexMut<(usize, usize)> for Tile {
    fn index_mut(&mut self, (row, col): (usize, usize)) -> &mut u8 {
        let offset = self.offset(row, col);
        &mut self.cells[offset]
    }
}

/// Filter output for the owned cells of one tile; no ghost ring.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputTile {
    rows: usize,
    cols: usize,
    values: Vec<u8>,
}

impl OutputTile {
    pub fn new(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            values: vec![GHOST_FILL; rows * cols],
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn row(&self, row: usize) -> &[u8] {
        assert!(row < self.rows, "output row {row} out of bounds");
        &self.values[row * self.cols..(row + 1) * self.cols]
    }

    /// Row-major contents.
    pub fn as_slice(&self) -> &[u8] {
        &self.values
    }
}

impl Index<(usize, usize)> for OutputTile {
    type Output = u8;

    fn index(&self, (row, col): (usize, usize)) -> &u8 {
        assert!(
            row < self.rows && col < self.cols,
            "output cell ({row}, {col}) outside {}x{} tile",
            self.rows,
            self.cols
        );
        &self.values[row * self.cols + col]
    }
}

impl IndexMut<(usize, usize)> for OutputTile {
    fn index_mut(&mut self, (row, col): (usize, usize)) -> &mut u8 {
        assert!(
            row < self.rows && col < self.cols,
            "output cell ({row}, {col}) outside {}x{} tile",
            self.rows,
            self.cols
        );
        &mut self.values[row * self.cols + col]
    }
}
