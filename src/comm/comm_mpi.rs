//! MPI communication backend.
//!
//! Requires the `distributed` feature flag and an MPI installation.
//! Implements `CommunicationBackend` using `mpi::traits::*`.
//!
//! # Usage
//!
//! The caller must initialize MPI before constructing `MpiComm`:
//!
//! ```ignore
//! let universe = mpi::initialize().expect("MPI init failed");
//! let comm = MpiComm::new();
//! ```
//!
//! # Non-blocking transfers
//!
//! rsmpi binds immediate requests to a request scope, so a request cannot
//! outlive the call that created it. `post_send`/`post_receive` therefore
//! only record the operation. `wait_all_overlapped` opens one scope, issues
//! every recorded operation as an immediate send/receive, runs the caller's
//! overlapped computation while they are on the wire, and then waits on all
//! of them. With every operation of an exchange in flight at once, the
//! symmetric neighbor pattern stays deadlock-free without buffered sends.

use super::{check_peer, CommunicationBackend, Request, RequestKind, Tag};
use crate::error::Result;
use mpi::collective::SystemOperation;
use mpi::topology::SimpleCommunicator;
use mpi::traits::*;

/// MPI-based communication backend over the world communicator.
pub struct MpiComm;

impl MpiComm {
    /// Create a new MPI communication backend.
    ///
    /// Panics if MPI has not been initialized via `mpi::initialize()`.
    pub fn new() -> Self {
        Self
    }
}

impl Default for MpiComm {
    fn default() -> Self {
        Self::new()
    }
}

impl CommunicationBackend for MpiComm {
    fn rank(&self) -> usize {
        let world = SimpleCommunicator::world();
        world.rank() as usize
    }

    fn num_ranks(&self) -> usize {
        let world = SimpleCommunicator::world();
        world.size() as usize
    }

    fn send(&self, dest: usize, tag: Tag, payload: &[u8]) -> Result<()> {
        check_peer(self, dest)?;
        let world = SimpleCommunicator::world();
        world.process_at_rank(dest as i32).send_with_tag(payload, tag);
        Ok(())
    }

    fn receive(&self, source: usize, tag: Tag) -> Result<Vec<u8>> {
        check_peer(self, source)?;
        let world = SimpleCommunicator::world();
        let (payload, _status) = world
            .process_at_rank(source as i32)
            .receive_vec_with_tag::<u8>(tag);
        Ok(payload)
    }

    fn post_send(&self, dest: usize, tag: Tag, payload: Vec<u8>) -> Result<Request> {
        check_peer(self, dest)?;
        Ok(Request::send(dest, tag, Some(payload)))
    }

    fn post_receive(&self, source: usize, tag: Tag, len: usize) -> Result<Request> {
        check_peer(self, source)?;
        Ok(Request::receive(source, tag, len))
    }

    fn wait_all(&self, requests: Vec<Request>) -> Result<Vec<Option<Vec<u8>>>> {
        self.wait_all_overlapped(requests, &mut || {})
    }

    fn wait_all_overlapped(
        &self,
        requests: Vec<Request>,
        overlap: &mut dyn FnMut(),
    ) -> Result<Vec<Option<Vec<u8>>>> {
        let world = SimpleCommunicator::world();
        let mut received: Vec<Option<Vec<u8>>> = requests
            .iter()
            .map(|request| match request.kind {
                RequestKind::Receive { len } => Some(vec![0u8; len]),
                RequestKind::Send { .. } => None,
            })
            .collect();

        mpi::request::scope(|scope| {
            let mut in_flight = Vec::with_capacity(requests.len());
            for (request, slot) in requests.iter().zip(received.iter_mut()) {
                let process = world.process_at_rank(request.peer as i32);
                match (&request.kind, slot) {
                    (RequestKind::Receive { .. }, Some(buffer)) => in_flight.push(
                        process.immediate_receive_into_with_tag(scope, &mut buffer[..], request.tag),
                    ),
                    (RequestKind::Send { deferred: Some(payload) }, _) => in_flight
                        .push(process.immediate_send_with_tag(scope, &payload[..], request.tag)),
                    _ => {}
                }
            }
            tracing::trace!(requests = in_flight.len(), "immediate requests issued");
            overlap();
            for request in in_flight {
                request.wait_without_status();
            }
        });

        // A longer message than posted is an MPI truncation error and aborts.
        Ok(received)
    }

    fn abort(&self, reason: &str) {
        tracing::error!(reason, "aborting MPI world");
        let world = SimpleCommunicator::world();
        world.abort(1);
    }

    fn barrier(&self) -> Result<()> {
        let world = SimpleCommunicator::world();
        world.barrier();
        Ok(())
    }

    fn all_reduce_max(&self, local: f64) -> Result<f64> {
        let world = SimpleCommunicator::world();
        let mut global = 0.0f64;
        world.all_reduce_into(&local, &mut global, SystemOperation::max());
        Ok(global)
    }
}
