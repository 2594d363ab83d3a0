//! Per-rank driver for the distributed Sobel filter.
//!
//! Every rank runs [`run_rank`] with its own backend. Phases, in order:
//! derive the process grid, build the decomposition, scatter, post the halo
//! exchange, sweep the interior, wait, sweep the boundary ring, reduce the
//! timing, gather. Configuration is validated on every rank before any
//! message is sent, so a bad shape fails everywhere without communication.

use crate::comm::thread::LocalCluster;
use crate::comm::CommunicationBackend;
use crate::coordinator::Coordinator;
use crate::decomp::{gather, scatter, Decomposition};
use crate::error::{Result, SobelError};
use crate::halo::HaloExchanger;
use crate::image::GlobalImage;
use crate::stats::Stats;
use crate::stencil::{sweep_boundary, sweep_interior};
use crate::tile::OutputTile;
use crate::topology::ProcessGrid;
use std::time::{Duration, Instant};

/// Problem size and grid shape. `Pc` follows from the participant count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SobelConfig {
    pub n: usize,
    pub grid_rows: usize,
}

impl SobelConfig {
    pub fn new(n: usize, grid_rows: usize) -> Self {
        Self { n, grid_rows }
    }

    /// One row strip per participant.
    pub fn strips(n: usize, participants: usize) -> Self {
        Self::new(n, participants)
    }

    /// Validate against `participants` and derive the grid and decomposition.
    pub fn resolve(&self, participants: usize) -> Result<(ProcessGrid, Decomposition)> {
        let grid = ProcessGrid::from_participants(participants, self.grid_rows)?;
        let decomp = Decomposition::new(self.n, grid)?;
        Ok((grid, decomp))
    }
}

/// The assembled result, available at the coordinator only.
#[derive(Debug, Clone)]
pub struct SobelOutput {
    pub image: GlobalImage,
    pub grid: ProcessGrid,
    /// Slowest rank's post-to-boundary window.
    pub time_ms: f64,
}

/// Run this rank's share of the filter.
///
/// Collective: every rank of `comm` must call it with the same `config`.
/// Returns `Some` at the coordinator and `None` elsewhere.
pub fn run_rank(
    comm: &dyn CommunicationBackend,
    config: &SobelConfig,
    coordinator: Option<&Coordinator>,
    mut stats: Option<&mut Stats>,
) -> Result<Option<SobelOutput>> {
    let rank = comm.rank();
    let _span = tracing::info_span!("sobel_rank", rank).entered();

    let (grid, decomp) = config.resolve(comm.num_ranks())?;
    let block = *decomp.block(rank)?;
    let exchanger = HaloExchanger::new(grid.neighbors(rank));
    tracing::debug!(
        grid_rows = grid.rows(),
        grid_cols = grid.cols(),
        origin = ?block.origin(),
        extent = ?block.extent(),
        "decomposition ready"
    );

    let t = Instant::now();
    let mut tile = scatter(comm, coordinator, &decomp)?;
    if let Some(ref mut s) = stats {
        s.add_phase("scatter", t.elapsed());
    }

    let window = Instant::now();
    let mut out = OutputTile::new(block.rows(), block.cols());

    let t = Instant::now();
    let pending = exchanger.begin(comm, &tile)?;
    if let Some(ref mut s) = stats {
        s.add_phase("post", t.elapsed());
        s.halo_receives += pending.incoming();
        s.halo_sends += pending.outgoing();
    }

    // The interior sweep reads no ghost cell, so it runs while the halo is in flight.
    let t = Instant::now();
    let mut interior_time = Duration::ZERO;
    let interior = exchanger.wait_overlapped(comm, pending, &mut tile, |tile| {
        let t = Instant::now();
        let computed = sweep_interior(tile, &mut out, &block, decomp.n());
        interior_time = t.elapsed();
        computed
    })?;
    if let Some(ref mut s) = stats {
        s.add_phase("interior", interior_time);
        s.add_phase("wait", t.elapsed().saturating_sub(interior_time));
        s.interior_cells += interior;
    }

    let t = Instant::now();
    let boundary = sweep_boundary(&tile, &mut out, &block, decomp.n());
    if let Some(ref mut s) = stats {
        s.add_phase("boundary", t.elapsed());
        s.boundary_cells += boundary;
    }
    let local_ms = window.elapsed().as_secs_f64() * 1e3;
    tracing::debug!(interior, boundary, local_ms, "stencil complete");

    let time_ms = comm.all_reduce_max(local_ms)?;

    let t = Instant::now();
    let image = gather(comm, coordinator, &out, &decomp)?;
    if let Some(ref mut s) = stats {
        s.add_phase("gather", t.elapsed());
    }

    Ok(image.map(|image| SobelOutput {
        image,
        grid,
        time_ms,
    }))
}

/// Run the filter on `ranks` in-process participants.
///
/// The configuration is checked against `ranks` before `make_input` runs,
/// so a bad shape fails without building the image. Returns the
/// coordinator's output and, when `collect_stats` is set, the coordinator's
/// stats.
pub fn run_local(
    ranks: usize,
    config: &SobelConfig,
    make_input: impl FnOnce() -> GlobalImage,
    collect_stats: bool,
) -> Result<(SobelOutput, Option<Stats>)> {
    let cluster = LocalCluster::new(ranks)?;
    config.resolve(ranks)?;
    let input = make_input();
    let mut results = cluster.run(|comm| {
        let coordinator = Coordinator::elect(comm, || input.clone());
        let mut stats = collect_stats.then(Stats::new);
        let output = run_rank(comm, config, coordinator.as_ref(), stats.as_mut())?;
        Ok((output, stats))
    })?;
    let (output, stats) = results.swap_remove(0);
    let output = output.ok_or_else(|| {
        SobelError::Communication("coordinator finished without an assembled image".into())
    })?;
    Ok((output, stats))
}
