//! Receive loop: OS buffer -> complete lines -> ring buffer
//!
//! Reads are non-blocking: the loop only calls `read` after
//! `bytes_to_read` reports pending data, so the port's shared timeout
//! never applies here. Any I/O fault is treated as disconnection.

use std::io::Read;
use std::sync::Arc;

use serialport::SerialPort;
use tracing::{debug, trace};

use super::{DisconnectLatch, LineRing, TransportConfig};

/// Reassembles newline-delimited text from arbitrarily chunked reads
///
/// The partial trailing fragment is kept until its newline arrives, so a
/// line split across reads decodes identically to one delivered whole.
#[derive(Debug, Default)]
pub struct LineAssembler {
    carry: String,
}

impl LineAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one raw chunk (lossy UTF-8) and return the lines it
    /// completed, trailing whitespace stripped, empties skipped.
    pub fn push_bytes(&mut self, bytes: &[u8]) -> Vec<String> {
        self.carry.push_str(&String::from_utf8_lossy(bytes));
        let mut lines = Vec::new();
        while let Some(idx) = self.carry.find('\n') {
            let line = self.carry[..idx].trim_end().to_string();
            self.carry.drain(..=idx);
            if !line.is_empty() {
                lines.push(line);
            }
        }
        lines
    }

    /// Partial fragment still waiting for its newline.
    pub fn pending(&self) -> &str {
        &self.carry
    }
}

pub(super) async fn run(
    mut port: Box<dyn SerialPort>,
    ring: Arc<LineRing>,
    latch: Arc<DisconnectLatch>,
    config: TransportConfig,
) {
    let mut assembler = LineAssembler::new();
    let mut read_buf = vec![0u8; 4096];

    loop {
        if latch.is_fired() {
            break;
        }

        let waiting = match port.bytes_to_read() {
            Ok(n) => n as usize,
            Err(e) => {
                latch.fire(format!("serial port lost: {e}"));
                break;
            }
        };

        if waiting == 0 {
            tokio::time::sleep(config.idle_sleep).await;
            continue;
        }

        if waiting > read_buf.len() {
            read_buf.resize(waiting, 0);
        }

        let n = match port.read(&mut read_buf[..waiting]) {
            Ok(n) => n,
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => 0,
            Err(e) => {
                latch.fire(format!("serial read failed: {e}"));
                break;
            }
        };
        if n == 0 {
            continue;
        }

        let lines = assembler.push_bytes(&read_buf[..n]);
        if !lines.is_empty() {
            trace!(count = lines.len(), "lines queued");
            ring.push_lines(lines);
        }
    }

    debug!("receiver stopped");
}
