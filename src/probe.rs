//! Point-to-point latency and bandwidth probe between ranks 0 and 1.

use crate::comm::{check_len, CommunicationBackend, TAG_PROBE};
use crate::error::{Result, SobelError};
use std::fmt;
use std::time::Instant;

pub const DEFAULT_ITERATIONS: usize = 1000;

/// Timing of one ping-pong run, as seen by rank 0.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProbeReport {
    pub msg_size: usize,
    pub rtt_ms: f64,
    pub one_way_ms: f64,
    pub bandwidth_bytes_per_s: f64,
}

impl ProbeReport {
    /// Derive the report from the total time of `iterations` round trips.
    pub fn from_total(msg_size: usize, iterations: usize, total_ms: f64) -> Self {
        let rtt_ms = total_ms / iterations as f64;
        let one_way_ms = rtt_ms / 2.0;
        Self {
            msg_size,
            rtt_ms,
            one_way_ms,
            bandwidth_bytes_per_s: msg_size as f64 / (one_way_ms / 1e3),
        }
    }
}

impl fmt::Display for ProbeReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "MSG={} RTT_ms={} one_way_ms={} BW_bytes_per_s={}",
            self.msg_size, self.rtt_ms, self.one_way_ms, self.bandwidth_bytes_per_s
        )
    }
}

/// Bounce a `msg_size`-byte buffer between ranks 0 and 1 `iterations` times.
///
/// Collective over the whole world (it starts with a barrier); ranks above
/// 1 only take part in the barrier. Returns the report on rank 0.
pub fn ping_pong(
    comm: &dyn CommunicationBackend,
    msg_size: usize,
    iterations: usize,
) -> Result<Option<ProbeReport>> {
    if comm.num_ranks() < 2 {
        return Err(SobelError::Configuration(format!(
            "ping-pong needs at least 2 ranks, got {}",
            comm.num_ranks()
        )));
    }
    if iterations == 0 {
        return Err(SobelError::Configuration(
            "ping-pong needs at least one iteration".into(),
        ));
    }

    let mut buf = vec![0u8; msg_size];
    comm.barrier()?;
    match comm.rank() {
        0 => {
            let start = Instant::now();
            for _ in 0..iterations {
                comm.send(1, TAG_PROBE, &buf)?;
                buf = comm.receive(1, TAG_PROBE)?;
                check_len(&buf, msg_size, 1, TAG_PROBE)?;
            }
            let total_ms = start.elapsed().as_secs_f64() * 1e3;
            let report = ProbeReport::from_total(msg_size, iterations, total_ms);
            tracing::debug!(?report, "ping-pong complete");
            Ok(Some(report))
        }
        1 => {
            for _ in 0..iterations {
                buf = comm.receive(0, TAG_PROBE)?;
                check_len(&buf, msg_size, 0, TAG_PROBE)?;
                comm.send(0, TAG_PROBE, &buf)?;
            }
            Ok(None)
        }
        _ => Ok(None),
    }
}
