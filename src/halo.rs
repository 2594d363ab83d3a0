//! Non-blocking ghost-cell exchange between neighboring tiles.
//!
//! [`HaloExchanger::begin`] posts every transfer for one exchange and
//! returns immediately with a [`PendingExchange`]; the caller computes
//! whatever does not read ghost cells and then calls
//! [`HaloExchanger::wait`], which completes the transfers and writes the
//! received values into the ghost ring. [`HaloExchanger::wait_overlapped`]
//! takes that computation as a closure and runs it while the transfers are
//! in flight, which scope-bound backends need for any overlap at all.
//!
//! A message travelling toward `d` is tagged with the receiver's
//! `d.opposite()` slot, so with every rank posting all its receives and
//! sends before waiting no rank can block another.

use crate::comm::{CommunicationBackend, Request};
use crate::error::{Result, SobelError};
use crate::tile::Tile;
use crate::topology::{Corner, Direction, Neighbors};

/// Ghost slot a received payload is written to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Edge(Direction),
    Corner(Corner),
}

/// Lifecycle of one exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeState {
    /// Transfers described, not yet handed to the backend.
    Posted,
    /// Every transfer handed to the backend; ghost cells not yet valid.
    InFlight,
    /// Ghost cells written.
    Completed,
}

/// Handle for an exchange started by [`HaloExchanger::begin`].
#[derive(Debug)]
#[must_use = "an exchange must be completed with HaloExchanger::wait"]
pub struct PendingExchange {
    requests: Vec<Request>,
    /// Index-aligned with `requests`; `None` for sends.
    slots: Vec<Option<Slot>>,
    state: ExchangeState,
}

impl PendingExchange {
    pub fn state(&self) -> ExchangeState {
        self.state
    }

    /// Number of posted receives.
    pub fn incoming(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    /// Number of posted sends.
    pub fn outgoing(&self) -> usize {
        self.slots.len() - self.incoming()
    }

    fn push(&mut self, request: Request, slot: Option<Slot>) {
        self.requests.push(request);
        self.slots.push(slot);
    }

    fn into_in_flight(self) -> Result<(Vec<Request>, Vec<Option<Slot>>)> {
        if self.state != ExchangeState::InFlight {
            return Err(SobelError::Communication(format!(
                "halo exchange waited on in state {:?}",
                self.state
            )));
        }
        Ok((self.requests, self.slots))
    }
}

/// Halo exchange for one rank, bound to its neighbors.
#[derive(Debug, Clone, Copy)]
pub struct HaloExchanger {
    neighbors: Neighbors,
}

impl HaloExchanger {
    pub fn new(neighbors: Neighbors) -> Self {
        Self { neighbors }
    }

    pub fn neighbors(&self) -> &Neighbors {
        &self.neighbors
    }

    /// Post receives and sends for every existing neighbor.
    ///
    /// Face neighbors exchange a whole edge, diagonal neighbors a single
    /// corner cell. Missing neighbors are skipped and their ghost cells keep
    /// the fill value.
    pub fn begin(&self, comm: &dyn CommunicationBackend, tile: &Tile) -> Result<PendingExchange> {
        let mut pending = PendingExchange {
            requests: Vec::with_capacity(16),
            slots: Vec::with_capacity(16),
            state: ExchangeState::Posted,
        };

        for direction in Direction::ALL {
            let Some(peer) = self.neighbors.face(direction) else {
                continue;
            };
            let len = tile.edge_len(direction);
            let recv = comm.post_receive(peer, direction.slot_tag(), len)?;
            pending.push(recv, Some(Slot::Edge(direction)));
            let send = comm.post_send(
                peer,
                direction.opposite().slot_tag(),
                tile.pack_edge(direction),
            )?;
            pending.push(send, None);
        }

        for corner in Corner::ALL {
            let Some(peer) = self.neighbors.corner(corner) else {
                continue;
            };
            let recv = comm.post_receive(peer, corner.slot_tag(), 1)?;
            pending.push(recv, Some(Slot::Corner(corner)));
            let send = comm.post_send(
                peer,
                corner.opposite().slot_tag(),
                vec![tile.pack_corner(corner)],
            )?;
            pending.push(send, None);
        }

        pending.state = ExchangeState::InFlight;
        tracing::debug!(
            rank = comm.rank(),
            incoming = pending.incoming(),
            outgoing = pending.outgoing(),
            "halo exchange posted"
        );
        Ok(pending)
    }

    /// Complete `pending` and write the received ghost cells into `tile`.
    pub fn wait(
        &self,
        comm: &dyn CommunicationBackend,
        pending: PendingExchange,
        tile: &mut Tile,
    ) -> Result<ExchangeState> {
        let (requests, slots) = pending.into_in_flight()?;
        let completed = comm.wait_all(requests)?;
        self.unpack(comm, slots, completed, tile)?;
        Ok(ExchangeState::Completed)
    }

    /// Complete `pending` while `overlap` computes on the tile.
    ///
    /// `overlap` sees the tile before any ghost cell is written, so it must
    /// only read owned cells that need no neighbor data. It runs while the
    /// transfers are on the wire, including on backends that can only keep
    /// requests alive inside a scope.
    pub fn wait_overlapped<R>(
        &self,
        comm: &dyn CommunicationBackend,
        pending: PendingExchange,
        tile: &mut Tile,
        overlap: impl FnOnce(&Tile) -> R,
    ) -> Result<R> {
        let (requests, slots) = pending.into_in_flight()?;
        let mut overlap = Some(overlap);
        let mut outcome = None;
        let completed = {
            let view: &Tile = tile;
            comm.wait_all_overlapped(requests, &mut || {
                if let Some(f) = overlap.take() {
                    outcome = Some(f(view));
                }
            })?
        };
        self.unpack(comm, slots, completed, tile)?;
        outcome.ok_or_else(|| {
            SobelError::Communication(
                "backend completed an exchange without running the overlapped work".into(),
            )
        })
    }

    fn unpack(
        &self,
        comm: &dyn CommunicationBackend,
        slots: Vec<Option<Slot>>,
        completed: Vec<Option<Vec<u8>>>,
        tile: &mut Tile,
    ) -> Result<()> {
        for (slot, payload) in slots.into_iter().zip(completed) {
            match (slot, payload) {
                (Some(Slot::Edge(direction)), Some(values)) => {
                    tile.unpack_ghost_edge(direction, &values);
                }
                (Some(Slot::Corner(corner)), Some(values)) => {
                    tile.unpack_ghost_corner(corner, values[0]);
                }
                (None, _) => {}
                (Some(slot), None) => {
                    return Err(SobelError::Communication(format!(
                        "receive for ghost slot {slot:?} completed without a payload"
                    )));
                }
            }
        }
        tracing::debug!(rank = comm.rank(), "halo exchange completed");
        Ok(())
    }
}
