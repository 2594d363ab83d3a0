//! End-to-end tests of the distributed filter on in-process ranks.

use halosobel::baseline::{run_parallel, run_sequential};
use halosobel::comm::thread::LocalCluster;
use halosobel::comm::CommunicationBackend;
use halosobel::coordinator::Coordinator;
use halosobel::error::SobelError;
use halosobel::image::GlobalImage;
use halosobel::pipeline::{run_local, run_rank, SobelConfig};

/// Helper: run on `ranks` threads with `grid_rows` grid rows, return the assembled image.
fn distributed(input: &GlobalImage, ranks: usize, grid_rows: usize) -> GlobalImage {
    let config = SobelConfig::new(input.n(), grid_rows);
    let (output, _) =
        run_local(ranks, &config, || input.clone(), false).expect("distributed run failed");
    output.image
}

/// Pseudo-random pixels, so that no two neighborhoods look alike.
fn noisy(n: usize) -> GlobalImage {
    let mut state: u32 = 0x2545_f491;
    GlobalImage::from_fn(n, |_, _| {
        state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
        (state >> 24) as u8
    })
}

#[test]
fn two_by_two_matches_sequential() {
    let input = GlobalImage::synthetic(16);
    let (expected, _) = run_sequential(&input);
    assert_eq!(distributed(&input, 4, 2), expected);
}

#[test]
fn every_grid_shape_matches_sequential() {
    // (N, P, Pr)
    let cases = [
        (16, 4, 1),
        (16, 4, 4),
        (16, 8, 2),
        (16, 8, 4),
        (16, 16, 4),
        (24, 6, 2),
        (24, 6, 3),
        (12, 9, 3),
        (8, 8, 8),
    ];
    for (n, p, pr) in cases {
        let input = noisy(n);
        let (expected, _) = run_sequential(&input);
        assert_eq!(distributed(&input, p, pr), expected, "N={n} P={p} Pr={pr}");
    }
}

#[test]
fn single_cell_tiles_need_every_ghost() {
    // 8x8 grid of 1x1 tiles: each output cell is computed entirely from ghosts.
    let input = noisy(8);
    let (expected, _) = run_sequential(&input);
    assert_eq!(distributed(&input, 64, 8), expected);
}

#[test]
fn tile_edges_match_the_all_local_result() {
    let n = 18;
    let input = noisy(n);
    let (expected, _) = run_sequential(&input);
    let got = distributed(&input, 9, 3);
    // Tiles are 6x6: rows/cols 5, 6, 11, 12 straddle a tile boundary.
    for edge in [5, 6, 11, 12] {
        for k in 1..n - 1 {
            assert_eq!(got[(edge, k)], expected[(edge, k)], "row {edge} col {k}");
            assert_eq!(got[(k, edge)], expected[(k, edge)], "row {k} col {edge}");
        }
    }
}

#[test]
fn repeated_runs_are_identical() {
    let input = noisy(24);
    let first = distributed(&input, 6, 3);
    for _ in 0..3 {
        assert_eq!(distributed(&input, 6, 3), first);
    }
}

#[test]
fn global_border_keeps_the_fill_value() {
    let n = 16;
    let input = noisy(n);
    for (p, pr) in [(1, 1), (4, 2), (4, 4), (16, 4)] {
        let out = distributed(&input, p, pr);
        for k in 0..n {
            assert_eq!(out[(0, k)], 0, "P={p} Pr={pr}");
            assert_eq!(out[(n - 1, k)], 0, "P={p} Pr={pr}");
            assert_eq!(out[(k, 0)], 0, "P={p} Pr={pr}");
            assert_eq!(out[(k, n - 1)], 0, "P={p} Pr={pr}");
        }
        assert!(out.as_slice().iter().any(|&v| v > 0));
    }
}

#[test]
fn eight_by_eight_on_one_rank() {
    let input = GlobalImage::synthetic(8);
    let (expected, _) = run_sequential(&input);
    let out = distributed(&input, 1, 1);
    assert_eq!(out, expected);
    // gx = 4 * 34, gy = 4 * 62, |g| = sqrt(80000) > 255
    assert_eq!(out[(1, 1)], 255);
}

#[test]
fn sixteen_on_two_by_two_matches_one_by_one() {
    let input = GlobalImage::synthetic(16);
    let whole = distributed(&input, 1, 1);
    let split = distributed(&input, 4, 2);
    for r in 1..15 {
        assert_eq!(&split.row(r)[1..15], &whole.row(r)[1..15], "row {r}");
    }
}

#[test]
fn parallel_baseline_agrees_with_distributed() {
    let input = noisy(20);
    let (parallel, _) = run_parallel(&input, 4).unwrap();
    assert_eq!(distributed(&input, 4, 2), parallel);
}

#[test]
fn rows_without_a_matching_grid_are_rejected() {
    let err = run_local(3, &SobelConfig::new(8, 2), || GlobalImage::synthetic(8), false)
        .unwrap_err();
    assert!(matches!(err, SobelError::Configuration(_)), "{err}");
}

#[test]
fn configuration_errors_happen_before_any_computation() {
    let cluster = LocalCluster::new(3).unwrap();
    let config = SobelConfig::new(8, 2);
    let err = cluster
        .run(|comm| {
            let coordinator = Coordinator::elect(comm, || GlobalImage::synthetic(8));
            let mut stats = halosobel::stats::Stats::new();
            let result = run_rank(comm, &config, coordinator.as_ref(), Some(&mut stats));
            // No phase was reached on any rank.
            assert!(stats.phases().is_empty());
            result
        })
        .unwrap_err();
    assert!(matches!(err, SobelError::Configuration(_)), "{err}");
}

#[test]
fn non_divisible_image_is_rejected() {
    for (n, p, pr) in [(10, 4, 4), (10, 4, 2), (9, 2, 1)] {
        let mut built = false;
        let make_input = || {
            built = true;
            GlobalImage::synthetic(n)
        };
        let err = run_local(p, &SobelConfig::new(n, pr), make_input, false).unwrap_err();
        assert!(matches!(err, SobelError::Configuration(_)), "N={n} P={p} Pr={pr}");
        assert!(!built, "input generated for N={n} P={p} Pr={pr}");
    }
}

#[test]
fn coordinator_image_of_the_wrong_size_fails_every_rank() {
    let cluster = LocalCluster::new(4).unwrap();
    let config = SobelConfig::new(8, 2);
    let err = cluster
        .run(|comm| {
            let coordinator = Coordinator::elect(comm, || GlobalImage::synthetic(12));
            run_rank(comm, &config, coordinator.as_ref(), None).map(|out| out.is_some())
        })
        .unwrap_err();
    assert!(matches!(err, SobelError::Configuration(_)), "{err}");
}

#[test]
fn only_the_coordinator_gets_the_image() {
    let cluster = LocalCluster::new(4).unwrap();
    let config = SobelConfig::new(8, 4);
    let held = cluster
        .run(|comm| {
            let coordinator = Coordinator::elect(comm, || GlobalImage::synthetic(8));
            let out = run_rank(comm, &config, coordinator.as_ref(), None)?;
            Ok((comm.rank(), out.is_some()))
        })
        .unwrap();
    assert_eq!(held, vec![(0, true), (1, false), (2, false), (3, false)]);
}
