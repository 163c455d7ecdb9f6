//! Send/dispatch loop
//!
//! Owns the write half of the port. Each pass drains the outbound queue
//! onto the wire in batches, then swap-drains the receive ring and forwards
//! lines to the consumer. Locks are held only for queue exchanges, never
//! across an I/O call, so enqueueing is never blocked behind the wire.

use std::collections::VecDeque;
use std::io::Write;
use std::sync::Arc;

use parking_lot::Mutex;
use serialport::SerialPort;
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

use super::{DisconnectLatch, LineRing, TransportConfig};
use crate::types::{LinkEvent, LinkStatus};

pub(super) async fn run(
    mut port: Box<dyn SerialPort>,
    ring: Arc<LineRing>,
    outbound: Arc<Mutex<VecDeque<String>>>,
    events: mpsc::Sender<LinkEvent>,
    latch: Arc<DisconnectLatch>,
    config: TransportConfig,
) {
    let mut scratch: VecDeque<String> = VecDeque::new();

    loop {
        if latch.is_fired() {
            break;
        }

        let wrote = flush_outbound(port.as_mut(), &outbound, &events, &latch, &config);

        ring.swap_into(&mut scratch);
        let forwarded = !scratch.is_empty();
        if forwarded && !forward_lines(&mut scratch, &events, &config).await {
            // Consumer hung up; the link has nobody left to feed.
            latch.fire("consumer dropped the event stream");
            break;
        }

        // Immediate retry while work exists; sleep only when fully idle.
        if !wrote && !forwarded {
            tokio::time::sleep(config.idle_sleep).await;
        }
    }

    // Exactly one status transition, from whichever task won the latch.
    let reason = latch
        .reason()
        .unwrap_or_else(|| "link closed".to_string());
    info!(%reason, "serial link disconnected");
    let _ = events
        .send(LinkEvent::Status(LinkStatus::Disconnected { reason }))
        .await;
    debug!("coordinator stopped");
}

/// Drain queued commands onto the wire. Returns true when anything was
/// dequeued. The queue lock is released before the write; a timed-out
/// write discards the batch rather than stalling the loop.
fn flush_outbound(
    port: &mut dyn SerialPort,
    outbound: &Mutex<VecDeque<String>>,
    events: &mpsc::Sender<LinkEvent>,
    latch: &DisconnectLatch,
    config: &TransportConfig,
) -> bool {
    let mut trimmed = 0usize;
    let batch = {
        let mut queue = outbound.lock();
        // Backlog past the high-water mark sheds oldest commands first.
        if queue.len() > config.outbound_high_water {
            trimmed = queue.len() - config.outbound_drain_to;
            queue.drain(..trimmed);
        }
        let mut batch: Vec<String> = Vec::new();
        let mut total = 0usize;
        while batch.len() < config.max_batch_commands && total < config.max_batch_bytes {
            let Some(cmd) = queue.pop_front() else { break };
            total += cmd.len();
            batch.push(cmd);
        }
        batch
    };
    if trimmed > 0 {
        warn!(dropped = trimmed, "outbound backlog trimmed");
    }

    if batch.is_empty() {
        return false;
    }

    let payload = batch.concat();
    match port.write_all(payload.as_bytes()) {
        Ok(()) => {
            for cmd in &batch {
                trace!(command = cmd.trim_end(), "sent");
            }
        }
        Err(e) if e.kind() == std::io::ErrorKind::TimedOut => {
            warn!(commands = batch.len(), "write timed out, batch discarded");
            let _ = events.try_send(LinkEvent::Status(LinkStatus::Error {
                message: format!("write timed out, {} commands discarded", batch.len()),
            }));
        }
        Err(e) => {
            latch.fire(format!("serial write failed: {e}"));
        }
    }
    true
}

/// Forward drained lines to the consumer in bounded bursts so one large
/// swap cannot monopolize the event channel. Returns false once the
/// consumer is gone.
async fn forward_lines(
    scratch: &mut VecDeque<String>,
    events: &mpsc::Sender<LinkEvent>,
    config: &TransportConfig,
) -> bool {
    let mut sent = 0usize;
    while let Some(line) = scratch.pop_front() {
        if events.send(LinkEvent::Line(line)).await.is_err() {
            scratch.clear();
            return false;
        }
        sent += 1;
        if sent % config.forward_chunk == 0 {
            tokio::task::yield_now().await;
        }
    }
    true
}
