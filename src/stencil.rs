//! Sobel gradient-magnitude stencil.
//!
//! The kernel itself is a pure function of a 3×3 neighborhood. The sweeps
//! split a tile's owned cells into two classes: interior cells, whose
//! neighborhood is entirely owned, and the one-cell-deep boundary ring,
//! which reads ghost cells and must wait for the halo exchange.
//!
//! Cells on the global image border have an incomplete neighborhood and are
//! never written; they keep the output fill value.

use crate::decomp::BlockDescriptor;
use crate::tile::{OutputTile, Tile};

const SOBEL_X: [[i32; 3]; 3] = [[-1, 0, 1], [-2, 0, 2], [-1, 0, 1]];
const SOBEL_Y: [[i32; 3]; 3] = [[-1, -2, -1], [0, 0, 0], [1, 2, 1]];

/// `clamp(round(sqrt(gx² + gy²)), 0, 255)`.
#[inline]
pub fn magnitude(gx: i32, gy: i32) -> u8 {
    let m = ((gx * gx + gy * gy) as f64).sqrt().round();
    m.clamp(0.0, 255.0) as u8
}

/// Gradient magnitude of the centre of a 3×3 window.
#[inline]
pub fn sobel(window: &[[u8; 3]; 3]) -> u8 {
    let mut gx = 0i32;
    let mut gy = 0i32;
    for r in 0..3 {
        for c in 0..3 {
            let v = window[r][c] as i32;
            gx += SOBEL_X[r][c] * v;
            gy += SOBEL_Y[r][c] * v;
        }
    }
    magnitude(gx, gy)
}

/// Gradient at extended `(row, col)` of `tile`.
pub fn gradient(tile: &Tile, row: usize, col: usize) -> u8 {
    sobel(&tile.window(row, col))
}

/// Whether owned cell `(i, j)` of `block` lies off the global border.
fn is_computable(block: &BlockDescriptor, n: usize, i: usize, j: usize) -> bool {
    let (row, col) = block.global_position(i, j);
    row >= 1 && col >= 1 && row + 1 < n && col + 1 < n
}

/// Owned cells whose whole neighborhood is owned, as zero-based `(i, j)`.
pub fn interior_cells(rows: usize, cols: usize) -> impl Iterator<Item = (usize, usize)> {
    (1..rows.saturating_sub(1)).flat_map(move |i| (1..cols.saturating_sub(1)).map(move |j| (i, j)))
}

/// Owned cells touching the ghost ring, each exactly once.
pub fn boundary_cells(rows: usize, cols: usize) -> Vec<(usize, usize)> {
    let mut cells = Vec::new();
    if rows == 0 || cols == 0 {
        return cells;
    }
    cells.extend((0..cols).map(|j| (0, j)));
    if rows > 1 {
        cells.extend((0..cols).map(|j| (rows - 1, j)));
    }
    for i in 1..rows - 1 {
        cells.push((i, 0));
        if cols > 1 {
            cells.push((i, cols - 1));
        }
    }
    cells
}

fn apply(
    tile: &Tile,
    out: &mut OutputTile,
    block: &BlockDescriptor,
    n: usize,
    cells: impl Iterator<Item = (usize, usize)>,
) -> usize {
    let mut computed = 0;
    for (i, j) in cells {
        if is_computable(block, n, i, j) {
            out[(i, j)] = gradient(tile, i + 1, j + 1);
            computed += 1;
        }
    }
    computed
}

/// Fill the interior cells of `out`. Reads no ghost cell.
///
/// Returns the number of cells written.
pub fn sweep_interior(tile: &Tile, out: &mut OutputTile, block: &BlockDescriptor, n: usize) -> usize {
    apply(tile, out, block, n, interior_cells(tile.rows(), tile.cols()))
}

/// Fill the boundary ring of `out`. Ghost cells must be current.
///
/// Returns the number of cells written.
pub fn sweep_boundary(tile: &Tile, out: &mut OutputTile, block: &BlockDescriptor, n: usize) -> usize {
    apply(
        tile,
        out,
        block,
        n,
        boundary_cells(tile.rows(), tile.cols()).into_iter(),
    )
}
