//! Connection liveness monitor
//!
//! A removed USB device does not always fail passive reads, so the monitor
//! actively exercises the handle (input-buffer reset, queue-depth query,
//! attribute read) purely to provoke the underlying I/O fault. Detection
//! here is deliberately redundant with the receiver's own error paths:
//! whichever task observes the fault first wins the latch.

use std::sync::Arc;

use serialport::{ClearBuffer, SerialPort};
use tracing::debug;

use super::{DisconnectLatch, TransportConfig};

pub(super) async fn run(
    mut port: Box<dyn SerialPort>,
    latch: Arc<DisconnectLatch>,
    config: TransportConfig,
) {
    let mut ticker = tokio::time::interval(config.monitor_period);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    // The first tick completes immediately.
    ticker.tick().await;

    loop {
        ticker.tick().await;
        if latch.is_fired() {
            break;
        }
        if let Err(e) = probe(port.as_mut()) {
            latch.fire(format!("device removed: {e}"));
            break;
        }
    }

    debug!("monitor stopped");
}

/// Exercise the handle through several driver calls; returns the first
/// fault. None of these mutate link state beyond discarding unread input.
fn probe(port: &mut dyn SerialPort) -> serialport::Result<()> {
    port.clear(ClearBuffer::Input)?;
    let _ = port.bytes_to_read()?;
    let _ = port.name();
    Ok(())
}
