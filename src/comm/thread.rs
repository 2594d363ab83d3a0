//! In-process message-passing backend: one OS thread per rank.
//!
//! Ranks share no data. Each owns a mailbox (`std::sync::mpsc`) and holds a
//! sender to every other mailbox; all coordination is tagged messages, the
//! same shape as an MPI world. Sends are eager and never block, receives
//! match on (source, tag) and park unrelated arrivals until asked for.

use super::{check_len, check_peer, CommunicationBackend, Request, RequestKind, Tag};
use crate::error::{Result, SobelError};
use std::cell::{Cell, RefCell};
use std::sync::mpsc::{self, Receiver, Sender};

enum Envelope {
    Message {
        source: usize,
        tag: Tag,
        payload: Vec<u8>,
    },
    Abort {
        origin: usize,
    },
}

/// Communication endpoint of one rank in a [`LocalCluster`].
pub struct ThreadComm {
    rank: usize,
    outboxes: Vec<Sender<Envelope>>,
    inbox: Receiver<Envelope>,
    /// Arrived messages nobody has asked for yet, in arrival order.
    unexpected: RefCell<Vec<(usize, Tag, Vec<u8>)>>,
    aborted: Cell<Option<usize>>,
}

impl ThreadComm {
    /// Build a fully connected set of endpoints, index = rank.
    pub fn world(ranks: usize) -> Vec<ThreadComm> {
        let (senders, receivers): (Vec<_>, Vec<_>) = (0..ranks).map(|_| mpsc::channel()).unzip();
        receivers
            .into_iter()
            .enumerate()
            .map(|(rank, inbox)| ThreadComm {
                rank,
                outboxes: senders.clone(),
                inbox,
                unexpected: RefCell::new(Vec::new()),
                aborted: Cell::new(None),
            })
            .collect()
    }

    fn deliver(&self, dest: usize, tag: Tag, payload: Vec<u8>) -> Result<()> {
        check_peer(self, dest)?;
        self.outboxes[dest]
            .send(Envelope::Message {
                source: self.rank,
                tag,
                payload,
            })
            .map_err(|_| SobelError::Communication(format!("rank {dest} mailbox is closed")))
    }

    fn take_matching(&self, source: usize, tag: Tag) -> Result<Vec<u8>> {
        if let Some(origin) = self.aborted.get() {
            return Err(SobelError::Aborted { origin });
        }
        {
            let mut unexpected = self.unexpected.borrow_mut();
            if let Some(pos) = unexpected
                .iter()
                .position(|(s, t, _)| *s == source && *t == tag)
            {
                return Ok(unexpected.remove(pos).2);
            }
        }
        loop {
            match self.inbox.recv() {
                Ok(Envelope::Message {
                    source: from,
                    tag: got,
                    payload,
                }) => {
                    if from == source && got == tag {
                        return Ok(payload);
                    }
                    self.unexpected.borrow_mut().push((from, got, payload));
                }
                Ok(Envelope::Abort { origin }) => {
                    self.aborted.set(Some(origin));
                    return Err(SobelError::Aborted { origin });
                }
                Err(_) => {
                    return Err(SobelError::Communication(format!(
                        "rank {} mailbox disconnected while waiting on rank {source} tag {tag}",
                        self.rank
                    )))
                }
            }
        }
    }
}

impl CommunicationBackend for ThreadComm {
    fn rank(&self) -> usize {
        self.rank
    }

    fn num_ranks(&self) -> usize {
        self.outboxes.len()
    }

    fn send(&self, dest: usize, tag: Tag, payload: &[u8]) -> Result<()> {
        self.deliver(dest, tag, payload.to_vec())
    }

    fn receive(&self, source: usize, tag: Tag) -> Result<Vec<u8>> {
        check_peer(self, source)?;
        self.take_matching(source, tag)
    }

    fn post_send(&self, dest: usize, tag: Tag, payload: Vec<u8>) -> Result<Request> {
        self.deliver(dest, tag, payload)?;
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
                // Eager delivery: the payload left at post time.
                RequestKind::Send { .. } => Ok(None),
                RequestKind::Receive { len } => {
                    let payload = self.take_matching(request.peer, request.tag)?;
                    check_len(&payload, len, request.peer, request.tag)?;
                    Ok(Some(payload))
                }
            })
            .collect()
    }

    fn abort(&self, reason: &str) {
        tracing::error!(rank = self.rank, reason, "aborting run");
        self.signal_abort();
    }
}

impl ThreadComm {
    /// Unblock every peer with an abort envelope, without logging.
    fn signal_abort(&self) {
        self.aborted.set(Some(self.rank));
        for (dest, outbox) in self.outboxes.iter().enumerate() {
            if dest != self.rank {
                // A peer that already finished has dropped its mailbox.
                let _ = outbox.send(Envelope::Abort { origin: self.rank });
            }
        }
    }
}

/// Aborts the run if the rank's task unwinds, so peers never wait on a dead rank.
struct AbortOnPanic<'a>(&'a ThreadComm);

impl Drop for AbortOnPanic<'_> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            self.0.abort("rank task panicked");
        }
    }
}

/// Runs a task on `ranks` threads, each with its own [`ThreadComm`].
#[derive(Debug, Clone, Copy)]
pub struct LocalCluster {
    ranks: usize,
}

impl LocalCluster {
    pub fn new(ranks: usize) -> Result<Self> {
        if ranks == 0 {
            return Err(SobelError::Configuration(
                "a cluster needs at least one rank".into(),
            ));
        }
        Ok(Self { ranks })
    }

    pub fn ranks(&self) -> usize {
        self.ranks
    }

    /// Run `task` on every rank and collect the per-rank results in rank order.
    ///
    /// A rank whose task fails aborts the others. The returned error is the
    /// first one in rank order that is not a consequence of that abort.
    pub fn run<T, F>(&self, task: F) -> Result<Vec<T>>
    where
        T: Send,
        F: Fn(&ThreadComm) -> Result<T> + Sync,
    {
        let task = &task;
        let results: Vec<Result<T>> = std::thread::scope(|scope| {
            let handles: Vec<_> = ThreadComm::world(self.ranks)
                .into_iter()
                .map(|comm| {
                    scope.spawn(move || {
                        let _guard = AbortOnPanic(&comm);
                        let _span = tracing::info_span!("rank", rank = comm.rank).entered();
                        let result = task(&comm);
                        match &result {
                            Ok(_) | Err(SobelError::Aborted { .. }) => {}
                            // The caller reports a rejected configuration once.
                            Err(e @ SobelError::Configuration(_)) => {
                                tracing::debug!(error = %e, "stopping peers");
                                comm.signal_abort();
                            }
                            Err(e) => comm.abort(&e.to_string()),
                        }
                        result
                    })
                })
                .collect();
            handles
                .into_iter()
                .enumerate()
                .map(|(rank, handle)| {
                    handle.join().unwrap_or_else(|_| {
                        Err(SobelError::Communication(format!("rank {rank} panicked")))
                    })
                })
                .collect()
        });

        if results.iter().all(Result::is_ok) {
            return Ok(results.into_iter().filter_map(Result::ok).collect());
        }
        let mut errors: Vec<SobelError> = results.into_iter().filter_map(Result::err).collect();
        let root = errors
            .iter()
            .position(|e| !matches!(e, SobelError::Aborted { .. }))
            .unwrap_or(0);
        Err(errors.swap_remove(root))
    }
}
