//! Performance statistics collection for `--stats` output.

use std::time::{Duration, Instant};

/// Collects per-rank phase timings and counters.
///
/// Created when `--stats` is passed, threaded as `Option<&mut Stats>`.
/// Zero cost when `None`: no timing calls, no counter increments.
#[derive(Debug)]
pub struct Stats {
    total_start: Instant,
    phases: Vec<(&'static str, Duration)>,
    // Stencil
    pub interior_cells: usize,
    pub boundary_cells: usize,
    // Halo exchange
    pub halo_receives: usize,
    pub halo_sends: usize,
}

impl Default for Stats {
    fn default() -> Self {
        Self::new()
    }
}

impl Stats {
    pub fn new() -> Self {
        Self {
            total_start: Instant::now(),
            phases: Vec::new(),
            interior_cells: 0,
            boundary_cells: 0,
            halo_receives: 0,
            halo_sends: 0,
        }
    }

    /// Record a completed phase with its duration.
    pub fn add_phase(&mut self, name: &'static str, duration: Duration) {
        self.phases.push((name, duration));
    }

    pub fn phases(&self) -> &[(&'static str, Duration)] {
        &self.phases
    }

    /// Duration of the first phase called `name`.
    pub fn phase(&self, name: &str) -> Option<Duration> {
        self.phases.iter().find(|(n, _)| *n == name).map(|(_, d)| *d)
    }

    /// Print the stats table to stderr.
    pub fn display(&self) {
        let total = self.total_start.elapsed();
        eprintln!();
        eprintln!("=== halosobel Performance Stats ===");

        for (name, dur) in &self.phases {
            eprintln!("  {:<24} {:>8.3}ms", name, dur.as_secs_f64() * 1e3);
        }

        if self.interior_cells > 0 || self.boundary_cells > 0 {
            eprintln!(
                "  Cells computed:         interior={}  boundary={}",
                self.interior_cells, self.boundary_cells
            );
        }
        if self.halo_receives > 0 || self.halo_sends > 0 {
            eprintln!(
                "  Halo transfers:         recv={}  send={}",
                self.halo_receives, self.halo_sends
            );
        }

        eprintln!("  ─────────────────────────────────");
        eprintln!("  Total:                  {:>8.3}ms", total.as_secs_f64() * 1e3);
    }
}
