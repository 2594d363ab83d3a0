//! 2D Cartesian process topology.
//!
//! Ranks are laid out row-major on a `rows × cols` mesh:
//! `rank = row * cols + col`. The mesh is not periodic, so ranks on the
//! outer edge have fewer than four neighbors.

use crate::comm::Tag;
use crate::error::{Result, SobelError};

/// Position of a rank on the process mesh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Coord {
    pub row: usize,
    pub col: usize,
}

/// Face neighbors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

impl Direction {
    pub const ALL: [Direction; 4] = [
        Direction::Up,
        Direction::Down,
        Direction::Left,
        Direction::Right,
    ];

    pub fn opposite(self) -> Direction {
        match self {
            Direction::Up => Direction::Down,
            Direction::Down => Direction::Up,
            Direction::Left => Direction::Right,
            Direction::Right => Direction::Left,
        }
    }

    /// (row, col) step on the mesh.
    pub fn offset(self) -> (isize, isize) {
        match self {
            Direction::Up => (-1, 0),
            Direction::Down => (1, 0),
            Direction::Left => (0, -1),
            Direction::Right => (0, 1),
        }
    }

    /// Tag of the ghost slot on this side of a tile.
    ///
    /// A message travelling toward `d` lands in the receiver's
    /// `d.opposite()` slot, so it is sent with `d.opposite().slot_tag()`.
    pub fn slot_tag(self) -> Tag {
        match self {
            Direction::Up => 10,
            Direction::Down => 11,
            Direction::Left => 12,
            Direction::Right => 13,
        }
    }
}

/// Diagonal neighbors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Corner {
    UpLeft,
    UpRight,
    DownLeft,
    DownRight,
}

impl Corner {
    pub const ALL: [Corner; 4] = [
        Corner::UpLeft,
        Corner::UpRight,
        Corner::DownLeft,
        Corner::DownRight,
    ];

    pub fn opposite(self) -> Corner {
        match self {
            Corner::UpLeft => Corner::DownRight,
            Corner::UpRight => Corner::DownLeft,
            Corner::DownLeft => Corner::UpRight,
            Corner::DownRight => Corner::UpLeft,
        }
    }

    pub fn offset(self) -> (isize, isize) {
        match self {
            Corner::UpLeft => (-1, -1),
            Corner::UpRight => (-1, 1),
            Corner::DownLeft => (1, -1),
            Corner::DownRight => (1, 1),
        }
    }

    /// Same convention as [`Direction::slot_tag`], disjoint tag range.
    pub fn slot_tag(self) -> Tag {
        match self {
            Corner::UpLeft => 14,
            Corner::UpRight => 15,
            Corner::DownLeft => 16,
            Corner::DownRight => 17,
        }
    }
}

/// The neighbors of one rank; `None` on the global domain edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Neighbors {
    pub up: Option<usize>,
    pub down: Option<usize>,
    pub left: Option<usize>,
    pub right: Option<usize>,
    pub up_left: Option<usize>,
    pub up_right: Option<usize>,
    pub down_left: Option<usize>,
    pub down_right: Option<usize>,
}

impl Neighbors {
    pub fn face(&self, direction: Direction) -> Option<usize> {
        match direction {
            Direction::Up => self.up,
            Direction::Down => self.down,
            Direction::Left => self.left,
            Direction::Right => self.right,
        }
    }

    pub fn corner(&self, corner: Corner) -> Option<usize> {
        match corner {
            Corner::UpLeft => self.up_left,
            Corner::UpRight => self.up_right,
            Corner::DownLeft => self.down_left,
            Corner::DownRight => self.down_right,
        }
    }

    /// Number of face neighbors that exist.
    pub fn face_count(&self) -> usize {
        Direction::ALL
            .iter()
            .filter(|&&d| self.face(d).is_some())
            .count()
    }
}

/// A `rows × cols` process mesh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessGrid {
    rows: usize,
    cols: usize,
}

impl ProcessGrid {
    pub fn new(rows: usize, cols: usize) -> Result<Self> {
        if rows == 0 || cols == 0 {
            return Err(SobelError::Configuration(format!(
                "process grid {rows}x{cols} has no ranks"
            )));
        }
        Ok(Self { rows, cols })
    }

    /// Derive `cols = participants / rows`; fails unless `rows * cols == participants`.
    pub fn from_participants(participants: usize, rows: usize) -> Result<Self> {
        if rows == 0 || participants == 0 {
            return Err(SobelError::Configuration(format!(
                "cannot lay out {participants} ranks with {rows} grid rows"
            )));
        }
        let cols = participants / rows;
        if rows * cols != participants {
            return Err(SobelError::Configuration(format!(
                "Pr*Pc != P: {rows} grid rows do not divide {participants} ranks"
            )));
        }
        Self::new(rows, cols)
    }

    /// The 1D strip layout: one column of `participants` ranks.
    pub fn rows_only(participants: usize) -> Result<Self> {
        Self::new(participants, 1)
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn size(&self) -> usize {
        self.rows * self.cols
    }

    pub fn coordinate_of(&self, rank: usize) -> Coord {
        assert!(rank < self.size(), "rank {rank} outside {}x{} grid", self.rows, self.cols);
        Coord {
            row: rank / self.cols,
            col: rank % self.cols,
        }
    }

    pub fn rank_of(&self, coord: Coord) -> usize {
        assert!(
            coord.row < self.rows && coord.col < self.cols,
            "{coord:?} outside {}x{} grid",
            self.rows,
            self.cols
        );
        coord.row * self.cols + coord.col
    }

    fn step(&self, coord: Coord, (dr, dc): (isize, isize)) -> Option<usize> {
        let row = coord.row.checked_add_signed(dr)?;
        let col = coord.col.checked_add_signed(dc)?;
        (row < self.rows && col < self.cols).then(|| row * self.cols + col)
    }

    pub fn neighbor_of(&self, coord: Coord, direction: Direction) -> Option<usize> {
        self.step(coord, direction.offset())
    }

    pub fn diagonal_of(&self, coord: Coord, corner: Corner) -> Option<usize> {
        self.step(coord, corner.offset())
    }

    pub fn neighbors(&self, rank: usize) -> Neighbors {
        let coord = self.coordinate_of(rank);
        Neighbors {
            up: self.neighbor_of(coord, Direction::Up),
            down: self.neighbor_of(coord, Direction::Down),
            left: self.neighbor_of(coord, Direction::Left),
            right: self.neighbor_of(coord, Direction::Right),
            up_left: self.diagonal_of(coord, Corner::UpLeft),
            up_right: self.diagonal_of(coord, Corner::UpRight),
            down_left: self.diagonal_of(coord, Corner::DownLeft),
            down_right: self.diagonal_of(coord, Corner::DownRight),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coordinates_are_row_major() {
        let grid = ProcessGrid::new(2, 3).unwrap();
        assert_eq!(grid.coordinate_of(0), Coord { row: 0, col: 0 });
        assert_eq!(grid.coordinate_of(4), Coord { row: 1, col: 1 });
        assert_eq!(grid.coordinate_of(5), Coord { row: 1, col: 2 });
        for rank in 0..grid.size() {
            assert_eq!(grid.rank_of(grid.coordinate_of(rank)), rank);
        }
    }

    #[test]
    fn columns_are_derived_from_participants() {
        let grid = ProcessGrid::from_participants(6, 2).unwrap();
        assert_eq!((grid.rows(), grid.cols()), (2, 3));
    }

    #[test]
    fn non_dividing_rows_are_rejected() {
        for (p, pr) in [(5, 2), (3, 4), (0, 1), (4, 0)] {
            assert!(
                matches!(
                    ProcessGrid::from_participants(p, pr),
                    Err(SobelError::Configuration(_))
                ),
                "P={p} Pr={pr}"
            );
        }
    }

    #[test]
    fn corner_rank_has_two_face_neighbors() {
        let grid = ProcessGrid::new(2, 2).unwrap();
        let n = grid.neighbors(0);
        assert_eq!(n.up, None);
        assert_eq!(n.left, None);
        assert_eq!(n.down, Some(2));
        assert_eq!(n.right, Some(1));
        assert_eq!(n.down_right, Some(3));
        assert_eq!(n.up_right, None);
        assert_eq!(n.face_count(), 2);
    }

    #[test]
    fn centre_rank_sees_all_eight() {
        let grid = ProcessGrid::new(3, 3).unwrap();
        let n = grid.neighbors(4);
        assert_eq!(
            (n.up, n.down, n.left, n.right),
            (Some(1), Some(7), Some(3), Some(5))
        );
        assert_eq!(
            (n.up_left, n.up_right, n.down_left, n.down_right),
            (Some(0), Some(2), Some(6), Some(8))
        );
    }

    #[test]
    fn strip_layout_has_no_side_neighbors() {
        let grid = ProcessGrid::rows_only(4).unwrap();
        let n = grid.neighbors(2);
        assert_eq!((n.up, n.down), (Some(1), Some(3)));
        assert_eq!((n.left, n.right), (None, None));
    }

    #[test]
    fn tags_pair_each_send_with_the_opposite_slot() {
        for d in Direction::ALL {
            assert_ne!(d.slot_tag(), d.opposite().slot_tag());
            assert_eq!(d.opposite().opposite(), d);
        }
        for c in Corner::ALL {
            assert!(Direction::ALL.iter().all(|d| d.slot_tag() != c.slot_tag()));
            assert_eq!(c.opposite().opposite(), c);
        }
    }
}
