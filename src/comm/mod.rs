//! Communication backend abstraction for the distributed stencil pipeline.
//!
//! Every rank talks to its peers only through [`CommunicationBackend`]:
//! tagged byte messages, non-blocking posts completed by `wait_all`, and a
//! handful of collectives. Implementations: `SingleProcessComm` (one rank,
//! loopback), `ThreadComm` (ranks as threads joined by channels) and
//! `MpiComm` (via the mpi crate, `distributed` feature).

pub mod thread;

#[cfg(feature = "distributed")]
pub mod comm_mpi;

use crate::error::{Result, SobelError};
use std::cell::RefCell;
use std::collections::VecDeque;

/// Message tag. Matches the MPI tag type so backends can pass it through.
pub type Tag = i32;

/// Root of the collective operations.
pub const ROOT_RANK: usize = 0;

// Tags below 100 belong to the halo exchanger.
pub const TAG_SCATTER: Tag = 100;
pub const TAG_GATHER: Tag = 101;
pub const TAG_BARRIER: Tag = 102;
pub const TAG_REDUCE: Tag = 103;
pub const TAG_PROBE: Tag = 104;

#[derive(Debug)]
pub(crate) enum RequestKind {
    /// `deferred` holds the payload for backends that issue the transfer when
    /// the request is completed rather than when it is posted.
    #[cfg_attr(not(feature = "distributed"), allow(dead_code))]
    Send { deferred: Option<Vec<u8>> },
    Receive { len: usize },
}

/// A posted, not yet completed, point-to-point operation.
///
/// Only meaningful to the backend that created it; complete it with
/// [`CommunicationBackend::wait_all`].
#[derive(Debug)]
pub struct Request {
    pub(crate) peer: usize,
    pub(crate) tag: Tag,
    pub(crate) kind: RequestKind,
}

impl Request {
    pub(crate) fn send(peer: usize, tag: Tag, deferred: Option<Vec<u8>>) -> Self {
        Self {
            peer,
            tag,
            kind: RequestKind::Send { deferred },
        }
    }

    pub(crate) fn receive(peer: usize, tag: Tag, len: usize) -> Self {
        Self {
            peer,
            tag,
            kind: RequestKind::Receive { len },
        }
    }

    pub fn peer(&self) -> usize {
        self.peer
    }

    pub fn tag(&self) -> Tag {
        self.tag
    }

    pub fn is_receive(&self) -> bool {
        matches!(self.kind, RequestKind::Receive { .. })
    }
}

/// Abstraction over inter-process communication for the distributed stencil.
pub trait CommunicationBackend {
    /// This process's rank.
    fn rank(&self) -> usize;

    /// Total number of participating ranks.
    fn num_ranks(&self) -> usize;

    /// Send `payload` to `dest`. May return before the peer has received it.
    fn send(&self, dest: usize, tag: Tag, payload: &[u8]) -> Result<()>;

    /// Block until a message with `tag` from `source` arrives.
    fn receive(&self, source: usize, tag: Tag) -> Result<Vec<u8>>;

    /// Post a non-blocking send. Never waits for the peer.
    fn post_send(&self, dest: usize, tag: Tag, payload: Vec<u8>) -> Result<Request>;

    /// Post a non-blocking receive of exactly `len` bytes.
    fn post_receive(&self, source: usize, tag: Tag, len: usize) -> Result<Request>;

    /// Block until every request completes.
    ///
    /// The result is index-aligned with `requests`: received payloads for
    /// receives, `None` for sends.
    fn wait_all(&self, requests: Vec<Request>) -> Result<Vec<Option<Vec<u8>>>>;

    /// Like [`wait_all`](Self::wait_all), running `overlap` exactly once
    /// while the transfers are in flight.
    ///
    /// Backends that deliver at post time only need the default. Backends
    /// whose requests are bound to a scope issue every request first, call
    /// `overlap` inside that scope, then wait.
    fn wait_all_overlapped(
        &self,
        requests: Vec<Request>,
        overlap: &mut dyn FnMut(),
    ) -> Result<Vec<Option<Vec<u8>>>> {
        overlap();
        self.wait_all(requests)
    }

    /// Tear down the whole run after a fatal error on this rank.
    fn abort(&self, reason: &str);

    /// Synchronization barrier.
    fn barrier(&self) -> Result<()> {
        if self.rank() == ROOT_RANK {
            for peer in (0..self.num_ranks()).filter(|&r| r != ROOT_RANK) {
                self.receive(peer, TAG_BARRIER)?;
            }
            for peer in (0..self.num_ranks()).filter(|&r| r != ROOT_RANK) {
                self.send(peer, TAG_BARRIER, &[])?;
            }
        } else {
            self.send(ROOT_RANK, TAG_BARRIER, &[])?;
            self.receive(ROOT_RANK, TAG_BARRIER)?;
        }
        Ok(())
    }

    /// Max of a local scalar across all ranks.
    fn all_reduce_max(&self, local: f64) -> Result<f64> {
        if self.rank() == ROOT_RANK {
            let mut global = local;
            for peer in (0..self.num_ranks()).filter(|&r| r != ROOT_RANK) {
                global = global.max(decode_f64(&self.receive(peer, TAG_REDUCE)?)?);
            }
            for peer in (0..self.num_ranks()).filter(|&r| r != ROOT_RANK) {
                self.send(peer, TAG_REDUCE, &global.to_le_bytes())?;
            }
            Ok(global)
        } else {
            self.send(ROOT_RANK, TAG_REDUCE, &local.to_le_bytes())?;
            decode_f64(&self.receive(ROOT_RANK, TAG_REDUCE)?)
        }
    }
}

fn decode_f64(bytes: &[u8]) -> Result<f64> {
    let raw: [u8; 8] = bytes.try_into().map_err(|_| {
        SobelError::Communication(format!(
            "reduction payload has {} bytes, expected 8",
            bytes.len()
        ))
    })?;
    Ok(f64::from_le_bytes(raw))
}

/// Reject ranks outside `0..num_ranks`.
pub fn check_peer(comm: &dyn CommunicationBackend, peer: usize) -> Result<()> {
    if peer >= comm.num_ranks() {
        return Err(SobelError::Communication(format!(
            "rank {peer} does not exist (world size {})",
            comm.num_ranks()
        )));
    }
    Ok(())
}

/// Reject a received payload whose length differs from the posted receive.
pub fn check_len(payload: &[u8], expected: usize, source: usize, tag: Tag) -> Result<()> {
    if payload.len() != expected {
        return Err(SobelError::Communication(format!(
            "message from rank {source} tag {tag} has {} bytes, expected {expected}",
            payload.len()
        )));
    }
    Ok(())
}

/// Communication backend for a single participant.
///
/// Messages addressed to rank 0 loop back into a local queue. A receive
/// with nothing queued can never complete, so it fails instead of hanging.
#[derive(Default)]
pub struct SingleProcessComm {
    loopback: RefCell<VecDeque<(Tag, Vec<u8>)>>,
}

impl SingleProcessComm {
    pub fn new() -> Self {
        Self::default()
    }

    fn take(&self, tag: Tag) -> Result<Vec<u8>> {
        let mut queue = self.loopback.borrow_mut();
        let pos = queue.iter().position(|(t, _)| *t == tag).ok_or_else(|| {
            SobelError::Communication(format!(
                "receive with tag {tag} has no matching send in a single-process run"
            ))
        })?;
        Ok(queue.remove(pos).map(|(_, payload)| payload).unwrap_or_default())
    }
}

impl CommunicationBackend for SingleProcessComm {
    fn rank(&self) -> usize {
        0
    }

    fn num_ranks(&self) -> usize {
        1
    }

    fn send(&self, dest: usize, tag: Tag, payload: &[u8]) -> Result<()> {
        check_peer(self, dest)?;
        self.loopback.borrow_mut().push_back((tag, payload.to_vec()));
        Ok(())
    }

    fn receive(&self, source: usize, tag: Tag) -> Result<Vec<u8>> {
        check_peer(self, source)?;
        self.take(tag)
    }

    fn post_send(&self, dest: usize, tag: Tag, payload: Vec<u8>) -> Result<Request> {
        check_peer(self, dest)?;
        self.loopback.borrow_mut().push_back((tag, payload));
        Ok(Request::send(dest, tag, None))
    }

    fn post_receive(&self, source: usize, tag: Tag, len: usize) -> Result<Request> {
        check_peer(self, source)?;
        Ok(Request::receive(source, tag, len))
    }

    fn wait_all(&self, requests: Vec<Request>) -> Result<Vec<Option<Vec<u8>>>> {
        requests
            .into_iter()
            .map(|request| match request.kind {
                RequestKind::Send { .. } => Ok(None),
                RequestKind::Receive { len } => {
                    let payload = self.take(request.tag)?;
                    check_len(&payload, len, request.peer, request.tag)?;
                    Ok(Some(payload))
                }
            })
            .collect()
    }

    fn abort(&self, reason: &str) {
        tracing::error!(reason, "single-process run aborted");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_process_rank_and_size() {
        let comm = SingleProcessComm::new();
        assert_eq!(comm.rank(), 0);
        assert_eq!(comm.num_ranks(), 1);
    }

    #[test]
    fn single_process_collectives_are_local() {
        let comm = SingleProcessComm::new();
        comm.barrier().unwrap();
        assert_eq!(comm.all_reduce_max(42.0).unwrap(), 42.0);
        assert_eq!(comm.all_reduce_max(-1.5).unwrap(), -1.5);
    }

    #[test]
    fn single_process_loopback_matches_tags() {
        let comm = SingleProcessComm::new();
        comm.send(0, 7, &[1, 2]).unwrap();
        comm.send(0, 8, &[3]).unwrap();
        assert_eq!(comm.receive(0, 8).unwrap(), vec![3]);
        assert_eq!(comm.receive(0, 7).unwrap(), vec![1, 2]);
    }

    #[test]
    fn single_process_posted_pair_completes() {
        let comm = SingleProcessComm::new();
        let recv = comm.post_receive(0, 11, 3).unwrap();
        let send = comm.post_send(0, 11, vec![9, 8, 7]).unwrap();
        let done = comm.wait_all(vec![recv, send]).unwrap();
        assert_eq!(done, vec![Some(vec![9, 8, 7]), None]);
    }

    #[test]
    fn single_process_unmatched_receive_fails() {
        let comm = SingleProcessComm::new();
        let err = comm.receive(0, 5).unwrap_err();
        assert!(matches!(err, SobelError::Communication(_)));
    }

    #[test]
    fn single_process_rejects_other_ranks() {
        let comm = SingleProcessComm::new();
        assert!(comm.send(1, 0, &[]).is_err());
        assert!(comm.post_receive(3, 0, 1).is_err());
    }

    #[test]
    fn overlapped_wait_runs_the_computation_once() {
        let comm = SingleProcessComm::new();
        let recv = comm.post_receive(0, 13, 2).unwrap();
        let send = comm.post_send(0, 13, vec![4, 2]).unwrap();
        let mut calls = 0;
        let done = comm
            .wait_all_overlapped(vec![recv, send], &mut || calls += 1)
            .unwrap();
        assert_eq!(calls, 1);
        assert_eq!(done, vec![Some(vec![4, 2]), None]);
    }

    #[test]
    fn posted_length_mismatch_is_a_communication_error() {
        let comm = SingleProcessComm::new();
        let recv = comm.post_receive(0, 12, 4).unwrap();
        comm.send(0, 12, &[1, 2]).unwrap();
        assert!(matches!(
            comm.wait_all(vec![recv]),
            Err(SobelError::Communication(_))
        ));
    }
}
