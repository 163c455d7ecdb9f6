//! Serial transport: double-buffered receive path, liveness monitor, and
//! send/dispatch coordinator
//!
//! Three tasks share one physical port through cloned handles:
//! - receiver: drains the OS buffer into complete lines (ring buffer)
//! - monitor: probes the handle so device removal surfaces promptly
//! - coordinator: owns writes, drains the ring to the consumer, and winds
//!   the link down when the disconnect latch fires
//!
//! The tasks communicate only through the ring buffer, the outbound queue,
//! and the latch; none of them mutates another's state directly.

mod coordinator;
mod latch;
mod monitor;
mod receiver;
mod ring;

pub use latch::DisconnectLatch;
pub use receiver::LineAssembler;
pub use ring::LineRing;

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::error::Result;
use crate::types::{DeviceCommand, LinkEvent, LinkStatus};

/// Tuning knobs for the transport loops
///
/// Defaults match the rates the firmware was tuned against; construction
/// sites can override individual fields.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Receive ring capacity, in lines
    pub ring_capacity: usize,
    /// Outbound queue capacity, in commands
    pub outbound_capacity: usize,
    /// Outbound depth that triggers drop-oldest truncation
    pub outbound_high_water: usize,
    /// Depth the truncation drops down to
    pub outbound_drain_to: usize,
    /// Commands per wire write
    pub max_batch_commands: usize,
    /// Bytes per wire write
    pub max_batch_bytes: usize,
    /// Lines forwarded to the consumer per burst
    pub forward_chunk: usize,
    /// Liveness probe period
    pub monitor_period: Duration,
    /// Sleep applied when a loop has nothing to do
    pub idle_sleep: Duration,
    /// Port timeout. Reads are gated on `bytes_to_read`, so this bounds
    /// writes only.
    pub write_timeout: Duration,
    /// Event channel depth
    pub event_capacity: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            ring_capacity: 5000,
            outbound_capacity: 100,
            outbound_high_water: 90,
            outbound_drain_to: 60,
            max_batch_commands: 32,
            max_batch_bytes: 1024,
            forward_chunk: 500,
            monitor_period: Duration::from_millis(200),
            idle_sleep: Duration::from_millis(1),
            write_timeout: Duration::from_millis(200),
            event_capacity: 2048,
        }
    }
}

/// A serial device visible on this machine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortInfo {
    pub device: String,
    pub description: Option<String>,
}

impl PortInfo {
    /// Human-readable label: `device - description` when a description is
    /// known, bare device name otherwise.
    pub fn display_name(&self) -> String {
        match &self.description {
            Some(desc) => format!("{} - {}", self.device, desc),
            None => self.device.clone(),
        }
    }
}

/// Enumerate serial ports with their USB product descriptions when known.
pub fn available_ports() -> Result<Vec<PortInfo>> {
    let ports = serialport::available_ports()?;
    Ok(ports
        .into_iter()
        .map(|p| {
            let description = match p.port_type {
                serialport::SerialPortType::UsbPort(usb) => usb.product,
                _ => None,
            };
            PortInfo {
                device: p.port_name,
                description,
            }
        })
        .collect())
}

/// Handle to an open serial link
///
/// Owns the outbound queue and the task handles. Consumers read decoded
/// lines and status transitions from the event receiver returned by
/// [`SerialLink::connect`]; the sequence is infinite and non-restartable,
/// ending with a single `Disconnected` status.
pub struct SerialLink {
    outbound: Arc<Mutex<VecDeque<String>>>,
    latch: Arc<DisconnectLatch>,
    tasks: Vec<JoinHandle<()>>,
    port_label: String,
    config: TransportConfig,
}

impl SerialLink {
    /// Open `port` at `baud` (8N1, no flow control) and start the
    /// receiver, monitor, and coordinator tasks.
    pub fn connect(
        port: &str,
        baud: u32,
        config: TransportConfig,
    ) -> Result<(Self, mpsc::Receiver<LinkEvent>)> {
        let handle = serialport::new(port, baud)
            .data_bits(serialport::DataBits::Eight)
            .parity(serialport::Parity::None)
            .stop_bits(serialport::StopBits::One)
            .flow_control(serialport::FlowControl::None)
            .timeout(config.write_timeout)
            .open()?;

        let reader = handle.try_clone()?;
        let probe = handle.try_clone()?;

        let port_label = available_ports()
            .ok()
            .and_then(|ports| ports.into_iter().find(|p| p.device == port))
            .map(|p| p.display_name())
            .unwrap_or_else(|| port.to_string());

        let ring = Arc::new(LineRing::new(config.ring_capacity));
        let latch = Arc::new(DisconnectLatch::new());
        let outbound: Arc<Mutex<VecDeque<String>>> = Arc::new(Mutex::new(VecDeque::new()));
        let (event_tx, event_rx) = mpsc::channel(config.event_capacity);

        if event_tx
            .try_send(LinkEvent::Status(LinkStatus::Connected {
                port: port_label.clone(),
            }))
            .is_err()
        {
            warn!("event channel rejected the connect notification");
        }
        info!(port = %port_label, baud, "serial link connected");

        let tasks = vec![
            tokio::spawn(receiver::run(
                reader,
                ring.clone(),
                latch.clone(),
                config.clone(),
            )),
            tokio::spawn(monitor::run(probe, latch.clone(), config.clone())),
            tokio::spawn(coordinator::run(
                handle,
                ring,
                outbound.clone(),
                event_tx,
                latch.clone(),
                config.clone(),
            )),
        ];

        Ok((
            Self {
                outbound,
                latch,
                tasks,
                port_label,
                config,
            },
            event_rx,
        ))
    }

    /// Queue a command for transmission, CRLF-terminated on the wire.
    /// Returns false when the link is down or the queue is at capacity.
    pub fn send(&self, command: &DeviceCommand) -> bool {
        if self.latch.is_fired() {
            return false;
        }
        let mut wire = command.to_wire();
        if wire.is_empty() {
            return false;
        }
        wire.push_str("\r\n");

        let mut queue = self.outbound.lock();
        if queue.len() >= self.config.outbound_capacity {
            return false;
        }
        queue.push_back(wire);
        true
    }

    /// Queue free-text for transmission.
    pub fn send_raw(&self, text: &str) -> bool {
        self.send(&DeviceCommand::Raw(text.to_string()))
    }

    /// Liveness as last observed by the transport tasks.
    pub fn is_connected(&self) -> bool {
        !self.latch.is_fired()
    }

    /// Port label used in status messages.
    pub fn port_label(&self) -> &str {
        &self.port_label
    }

    /// Stop all transport tasks and release the port. Close-time errors
    /// are swallowed; the handle may already be invalid when the device
    /// is gone.
    pub async fn disconnect(mut self) {
        self.latch.fire("disconnected by request");
        for task in self.tasks.drain(..) {
            if tokio::time::timeout(Duration::from_secs(1), task)
                .await
                .is_err()
            {
                warn!("transport task did not stop in time");
            }
        }
        info!(port = %self.port_label, "serial link closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = TransportConfig::default();
        assert_eq!(config.ring_capacity, 5000);
        assert_eq!(config.outbound_capacity, 100);
        assert_eq!(config.outbound_high_water, 90);
        assert_eq!(config.outbound_drain_to, 60);
        assert_eq!(config.max_batch_commands, 32);
        assert_eq!(config.max_batch_bytes, 1024);
        assert_eq!(config.forward_chunk, 500);
        assert_eq!(config.monitor_period, Duration::from_millis(200));
    }

    #[test]
    fn test_port_display_name() {
        let with_desc = PortInfo {
            device: "/dev/ttyACM0".to_string(),
            description: Some("Sensor Board".to_string()),
        };
        assert_eq!(with_desc.display_name(), "/dev/ttyACM0 - Sensor Board");

        let bare = PortInfo {
            device: "/dev/ttyS1".to_string(),
            description: None,
        };
        assert_eq!(bare.display_name(), "/dev/ttyS1");
    }
}
