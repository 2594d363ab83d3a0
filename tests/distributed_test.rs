//! Multi-process tests over MPI.
//!
//! These tests require MPI and the `distributed` feature flag.
//! Run with: mpirun -n 4 cargo test --features distributed --test distributed_test
//!
//! Without MPI installed, these tests are excluded from the default build.

#![cfg(feature = "distributed")]

use halosobel::baseline::run_sequential;
use halosobel::comm::comm_mpi::MpiComm;
use halosobel::comm::CommunicationBackend;
use halosobel::coordinator::Coordinator;
use halosobel::error::SobelError;
use halosobel::image::GlobalImage;
use halosobel::pipeline::{run_rank, SobelConfig};
use halosobel::probe::ping_pong;

// MPI can be initialized once per process, so every check runs inside one test.
#[test]
fn mpi_world_end_to_end() {
    let _universe = mpi::initialize().expect("MPI init failed");
    let comm = MpiComm::new();
    let size = comm.num_ranks();

    assert_eq!(comm.all_reduce_max(comm.rank() as f64).unwrap(), (size - 1) as f64);
    comm.barrier().unwrap();

    // Strips: one grid row per rank.
    let n = 8 * size;
    let input = GlobalImage::synthetic(n);
    let coordinator = Coordinator::elect(&comm, || input.clone());
    let output = run_rank(&comm, &SobelConfig::strips(n, size), coordinator.as_ref(), None)
        .expect("strip run failed");
    if let Some(output) = output {
        let (expected, _) = run_sequential(&input);
        assert_eq!(output.image, expected);
    }

    // Square-ish grid when the world size allows one.
    if size % 2 == 0 {
        let config = SobelConfig::new(n, 2);
        let output = run_rank(&comm, &config, coordinator.as_ref(), None).expect("grid run failed");
        if let Some(output) = output {
            let (expected, _) = run_sequential(&input);
            assert_eq!(output.image, expected);
            assert_eq!(output.grid.rows(), 2);
        }
    }

    // A grid that cannot match the world fails on every rank and leaves MPI usable.
    let err = run_rank(&comm, &SobelConfig::new(n, size + 1), coordinator.as_ref(), None)
        .unwrap_err();
    assert!(matches!(err, SobelError::Configuration(_)), "{err}");
    comm.barrier().unwrap();

    if size >= 2 {
        let report = ping_pong(&comm, 256, 50).expect("ping-pong failed");
        assert_eq!(report.is_some(), comm.rank() == 0);
    }
}
