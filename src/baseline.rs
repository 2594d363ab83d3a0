//! Whole-image reference kernels: sequential and rayon-parallel.
//!
//! Both compute the same cells as the distributed pipeline (everything off
//! the global border) and leave the border at zero, so their output is
//! directly comparable with a gathered result.

use crate::error::{Result, SobelError};
use crate::image::GlobalImage;
use crate::stencil::sobel;
use rayon::prelude::*;
use std::time::{Duration, Instant};

fn filter_row(input: &GlobalImage, row: usize, out: &mut [u8]) {
    let n = input.n();
    if row == 0 || row + 1 >= n {
        return;
    }
    for col in 1..n - 1 {
        out[col] = sobel(&input.window(row, col));
    }
}

/// Filter `input` on the calling thread.
pub fn run_sequential(input: &GlobalImage) -> (GlobalImage, Duration) {
    let start = Instant::now();
    let mut output = GlobalImage::zeroed(input.n());
    for row in 0..input.n() {
        filter_row(input, row, output.row_mut(row));
    }
    (output, start.elapsed())
}

/// Filter `input` with rows spread over a dedicated pool of `threads` workers.
///
/// `threads == 0` lets rayon pick the worker count.
pub fn run_parallel(input: &GlobalImage, threads: usize) -> Result<(GlobalImage, Duration)> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build()
        .map_err(|e| SobelError::Configuration(format!("cannot build thread pool: {e}")))?;
    let n = input.n();
    let mut output = GlobalImage::zeroed(n);
    let start = Instant::now();
    if n > 0 {
        pool.install(|| {
            output
                .as_mut_slice()
                .par_chunks_mut(n)
                .enumerate()
                .for_each(|(row, out)| filter_row(input, row, out));
        });
    }
    tracing::debug!(threads = pool.current_num_threads(), n, "parallel baseline complete");
    Ok((output, start.elapsed()))
}
