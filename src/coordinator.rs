//! The coordinator capability.
//!
//! Exactly one rank, [`ROOT_RANK`], holds a [`Coordinator`]. It owns the
//! global input image and is the only rank that can receive the assembled
//! result. Every other rank passes `None` where a coordinator is expected.

use crate::comm::{CommunicationBackend, ROOT_RANK};
use crate::error::{Result, SobelError};
use crate::image::GlobalImage;

#[derive(Debug)]
pub struct Coordinator {
    input: GlobalImage,
}

impl Coordinator {
    pub fn new(input: GlobalImage) -> Self {
        Self { input }
    }

    /// Hand the capability to the root rank only; `make_input` runs there alone.
    pub fn elect(
        comm: &dyn CommunicationBackend,
        make_input: impl FnOnce() -> GlobalImage,
    ) -> Option<Coordinator> {
        (comm.rank() == ROOT_RANK).then(|| Coordinator::new(make_input()))
    }

    pub fn input(&self) -> &GlobalImage {
        &self.input
    }
}

/// Check that the capability sits on the root rank and nowhere else.
pub fn check_placement(
    comm: &dyn CommunicationBackend,
    coordinator: Option<&Coordinator>,
) -> Result<()> {
    match (comm.rank() == ROOT_RANK, coordinator.is_some()) {
        (true, false) => Err(SobelError::Configuration(format!(
            "rank {ROOT_RANK} must hold the coordinator"
        ))),
        (false, true) => Err(SobelError::Configuration(format!(
            "rank {} holds a coordinator but only rank {ROOT_RANK} may",
            comm.rank()
        ))),
        _ => Ok(()),
    }
}
