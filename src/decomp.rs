//! Block decomposition of the global image and the scatter/gather that
//! move blocks between the coordinator and the ranks.
//!
//! A rank's block is not contiguous in the row-major global image: it is
//! `rows` runs of `cols` pixels, `n` apart. [`BlockDescriptor`] names those
//! runs explicitly (origin, extent, source stride) so both directions of
//! the transfer are driven by the same description.

use crate::assemble::ResultAssembler;
use crate::comm::{check_len, CommunicationBackend, ROOT_RANK, TAG_GATHER, TAG_SCATTER};
use crate::coordinator::{check_placement, Coordinator};
use crate::error::{Result, SobelError};
use crate::image::GlobalImage;
use crate::tile::{OutputTile, Tile};
use crate::topology::ProcessGrid;

/// Where one rank's block lives in the global image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockDescriptor {
    rank: usize,
    origin: (usize, usize),
    extent: (usize, usize),
    source_stride: usize,
}

impl BlockDescriptor {
    pub fn new(
        rank: usize,
        origin: (usize, usize),
        extent: (usize, usize),
        source_stride: usize,
    ) -> Self {
        Self {
            rank,
            origin,
            extent,
            source_stride,
        }
    }

    pub fn rank(&self) -> usize {
        self.rank
    }

    /// Global `(row, col)` of the block's first cell.
    pub fn origin(&self) -> (usize, usize) {
        self.origin
    }

    /// `(rows, cols)`.
    pub fn extent(&self) -> (usize, usize) {
        self.extent
    }

    pub fn rows(&self) -> usize {
        self.extent.0
    }

    pub fn cols(&self) -> usize {
        self.extent.1
    }

    /// Row stride of the global image.
    pub fn source_stride(&self) -> usize {
        self.source_stride
    }

    /// Row stride of the destination tile buffer (owned columns plus the ghost ring).
    pub fn tile_stride(&self) -> usize {
        self.cols() + 2
    }

    /// Number of cells in the block.
    pub fn len(&self) -> usize {
        self.rows() * self.cols()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Global position of owned cell `(i, j)`.
    pub fn global_position(&self, i: usize, j: usize) -> (usize, usize) {
        (self.origin.0 + i, self.origin.1 + j)
    }

    /// Copy the block out of `image` as `rows` contiguous row runs.
    pub fn pack_from(&self, image: &GlobalImage) -> Vec<u8> {
        let (r0, c0) = self.origin;
        let mut payload = Vec::with_capacity(self.len());
        for r in r0..r0 + self.rows() {
            payload.extend_from_slice(&image.row(r)[c0..c0 + self.cols()]);
        }
        payload
    }

    /// Place a packed block into the owned interior of `tile`.
    pub fn unpack_into_tile(&self, payload: &[u8], tile: &mut Tile) {
        assert_eq!(payload.len(), self.len(), "block payload length");
        for (i, run) in payload.chunks_exact(self.cols()).enumerate() {
            tile.owned_row_mut(i + 1).copy_from_slice(run);
        }
    }

    /// Place a packed block back at its origin in `image`.
    pub fn unpack_into_image(&self, payload: &[u8], image: &mut GlobalImage) {
        assert_eq!(payload.len(), self.len(), "block payload length");
        let (r0, c0) = self.origin;
        let cols = self.cols();
        for (i, run) in payload.chunks_exact(cols).enumerate() {
            image.row_mut(r0 + i)[c0..c0 + cols].copy_from_slice(run);
        }
    }
}

/// The full set of blocks for an `n × n` image over a process grid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decomposition {
    n: usize,
    grid: ProcessGrid,
    blocks: Vec<BlockDescriptor>,
}

impl Decomposition {
    /// Requires `n` to be divisible by both grid dimensions.
    pub fn new(n: usize, grid: ProcessGrid) -> Result<Self> {
        if n == 0 {
            return Err(SobelError::Configuration("image size N must be positive".into()));
        }
        // A single tile's extended buffer is (N + 2)^2 cells.
        if n.checked_add(2).and_then(|e| e.checked_mul(e)).is_none() {
            return Err(SobelError::Configuration(format!(
                "image size N={n} does not fit in memory"
            )));
        }
        if n % grid.rows() != 0 || n % grid.cols() != 0 {
            return Err(SobelError::Configuration(format!(
                "N={n} is not divisible by the {}x{} process grid",
                grid.rows(),
                grid.cols()
            )));
        }
        let tile_rows = n / grid.rows();
        let tile_cols = n / grid.cols();
        let blocks = (0..grid.size())
            .map(|rank| {
                let coord = grid.coordinate_of(rank);
                BlockDescriptor::new(
                    rank,
                    (coord.row * tile_rows, coord.col * tile_cols),
                    (tile_rows, tile_cols),
                    n,
                )
            })
            .collect();
        Ok(Self { n, grid, blocks })
    }

    pub fn n(&self) -> usize {
        self.n
    }

    pub fn grid(&self) -> ProcessGrid {
        self.grid
    }

    pub fn blocks(&self) -> &[BlockDescriptor] {
        &self.blocks
    }

    pub fn block(&self, rank: usize) -> Result<&BlockDescriptor> {
        self.blocks.get(rank).ok_or_else(|| {
            SobelError::Configuration(format!(
                "rank {rank} has no block in a {}-rank decomposition",
                self.blocks.len()
            ))
        })
    }
}

/// Deliver every rank its block of the coordinator's image.
///
/// Collective: every rank must call it. Returns this rank's tile with the
/// block in its owned interior and the ghost ring at the fill value.
pub fn scatter(
    comm: &dyn CommunicationBackend,
    coordinator: Option<&Coordinator>,
    decomp: &Decomposition,
) -> Result<Tile> {
    check_placement(comm, coordinator)?;
    let rank = comm.rank();
    let block = decomp.block(rank)?;
    let mut tile = Tile::new(block.rows(), block.cols());

    if let Some(coordinator) = coordinator {
        let image = coordinator.input();
        if image.n() != decomp.n() {
            return Err(SobelError::Configuration(format!(
                "coordinator image is {}x{}, decomposition expects N={}",
                image.n(),
                image.n(),
                decomp.n()
            )));
        }
        for other in decomp.blocks() {
            let payload = other.pack_from(image);
            if other.rank() == rank {
                other.unpack_into_tile(&payload, &mut tile);
            } else {
                comm.send(other.rank(), TAG_SCATTER, &payload)?;
            }
        }
    } else {
        let payload = comm.receive(ROOT_RANK, TAG_SCATTER)?;
        check_len(&payload, block.len(), ROOT_RANK, TAG_SCATTER)?;
        block.unpack_into_tile(&payload, &mut tile);
    }
    tracing::debug!(rank, rows = block.rows(), cols = block.cols(), "scatter complete");
    Ok(tile)
}

/// Collect every rank's output at the coordinator.
///
/// Collective: every rank must call it. Returns the assembled image at the
/// coordinator and `None` elsewhere.
pub fn gather(
    comm: &dyn CommunicationBackend,
    coordinator: Option<&Coordinator>,
    output: &OutputTile,
    decomp: &Decomposition,
) -> Result<Option<GlobalImage>> {
    check_placement(comm, coordinator)?;
    let rank = comm.rank();
    let block = decomp.block(rank)?;
    if (output.rows(), output.cols()) != block.extent() {
        return Err(SobelError::Configuration(format!(
            "output tile is {}x{}, block is {}x{}",
            output.rows(),
            output.cols(),
            block.rows(),
            block.cols()
        )));
    }

    if coordinator.is_none() {
        comm.send(ROOT_RANK, TAG_GATHER, output.as_slice())?;
        return Ok(None);
    }

    let mut assembler = ResultAssembler::new(decomp);
    for other in decomp.blocks() {
        if other.rank() == rank {
            assembler.place(rank, output.as_slice())?;
        } else {
            let payload = comm.receive(other.rank(), TAG_GATHER)?;
            check_len(&payload, other.len(), other.rank(), TAG_GATHER)?;
            assembler.place(other.rank(), &payload)?;
        }
    }
    tracing::debug!(ranks = decomp.blocks().len(), "gather complete");
    assembler.finish().map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm::thread::LocalCluster;
    use crate::comm::SingleProcessComm;

    #[test]
    fn descriptors_tile_the_image() {
        let grid = ProcessGrid::new(2, 4).unwrap();
        let decomp = Decomposition::new(8, grid).unwrap();
        assert_eq!(decomp.blocks().len(), 8);
        let b = decomp.block(6).unwrap();
        assert_eq!(b.origin(), (4, 4));
        assert_eq!(b.extent(), (4, 2));
        assert_eq!(b.source_stride(), 8);
        assert_eq!(b.tile_stride(), 4);
        let covered: usize = decomp.blocks().iter().map(BlockDescriptor::len).sum();
        assert_eq!(covered, 64);
    }

    #[test]
    fn non_divisible_n_is_rejected() {
        let grid = ProcessGrid::new(3, 1).unwrap();
        assert!(matches!(
            Decomposition::new(8, grid),
            Err(SobelError::Configuration(_))
        ));
        let grid = ProcessGrid::new(1, 1).unwrap();
        assert!(Decomposition::new(0, grid).is_err());
    }

    #[test]
    fn image_area_overflow_is_rejected() {
        let grid = ProcessGrid::new(1, 1).unwrap();
        let n = 1usize << (usize::BITS / 2);
        assert!(matches!(
            Decomposition::new(n, grid),
            Err(SobelError::Configuration(_))
        ));
    }

    #[test]
    fn pack_reads_strided_rows() {
        let image = GlobalImage::from_fn(4, |r, c| (r * 10 + c) as u8);
        let block = BlockDescriptor::new(3, (2, 2), (2, 2), 4);
        assert_eq!(block.pack_from(&image), vec![22, 23, 32, 33]);
    }

    #[test]
    fn unpack_into_image_inverts_pack() {
        let image = GlobalImage::from_fn(6, |r, c| (r * 6 + c) as u8);
        let decomp = Decomposition::new(6, ProcessGrid::new(3, 2).unwrap()).unwrap();
        let mut rebuilt = GlobalImage::zeroed(6);
        for block in decomp.blocks() {
            block.unpack_into_image(&block.pack_from(&image), &mut rebuilt);
        }
        assert_eq!(rebuilt, image);
    }

    #[test]
    fn scatter_on_one_rank_fills_the_interior() {
        let comm = SingleProcessComm::new();
        let decomp = Decomposition::new(4, ProcessGrid::new(1, 1).unwrap()).unwrap();
        let coordinator = Coordinator::new(GlobalImage::synthetic(4));
        let tile = scatter(&comm, Some(&coordinator), &decomp).unwrap();
        assert_eq!(tile.owned_row(2), coordinator.input().row(1));
        assert_eq!(tile[(0, 0)], 0);
    }

    #[test]
    fn scatter_delivers_each_rank_its_block() {
        let n = 6;
        let decomp = Decomposition::new(n, ProcessGrid::new(2, 3).unwrap()).unwrap();
        let image = GlobalImage::synthetic(n);
        let cluster = LocalCluster::new(6).unwrap();
        let tiles = cluster
            .run(|comm| {
                let coordinator = Coordinator::elect(comm, || GlobalImage::synthetic(n));
                scatter(comm, coordinator.as_ref(), &decomp)
            })
            .unwrap();
        for (rank, tile) in tiles.iter().enumerate() {
            let block = decomp.block(rank).unwrap();
            for i in 0..block.rows() {
                for j in 0..block.cols() {
                    let (r, c) = block.global_position(i, j);
                    assert_eq!(tile[(i + 1, j + 1)], image[(r, c)], "rank {rank} ({i},{j})");
                }
            }
        }
    }

    #[test]
    fn gather_reassembles_at_the_coordinator_only() {
        let n = 8;
        let decomp = Decomposition::new(n, ProcessGrid::new(2, 2).unwrap()).unwrap();
        let cluster = LocalCluster::new(4).unwrap();
        let results = cluster
            .run(|comm| {
                let coordinator = Coordinator::elect(comm, || GlobalImage::synthetic(n));
                let block = decomp.block(comm.rank())?;
                let mut out = OutputTile::new(block.rows(), block.cols());
                for i in 0..block.rows() {
                    for j in 0..block.cols() {
                        out[(i, j)] = comm.rank() as u8 + 1;
                    }
                }
                gather(comm, coordinator.as_ref(), &out, &decomp)
            })
            .unwrap();
        let image = results[0].as_ref().expect("coordinator result");
        assert_eq!(image[(0, 0)], 1);
        assert_eq!(image[(0, 7)], 2);
        assert_eq!(image[(7, 0)], 3);
        assert_eq!(image[(4, 4)], 4);
        assert!(results[1..].iter().all(Option::is_none));
    }
}
