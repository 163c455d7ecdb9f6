//! Bounded drop-oldest ring buffer for decoded lines
//!
//! Single producer (receiver task), single consumer (coordinator task).
//! The lock is held only for queue exchanges, never while either side does
//! I/O or processing.

use std::collections::VecDeque;

use parking_lot::Mutex;
use tracing::warn;

/// Line queue between the receiver and the coordinator
pub struct LineRing {
    inner: Mutex<VecDeque<String>>,
    capacity: usize,
    /// Depth that triggers proactive trimming (90% of capacity)
    high_water: usize,
    /// Depth trimming drops down to (60% of capacity)
    drain_to: usize,
}

impl LineRing {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
            capacity,
            high_water: capacity * 9 / 10,
            drain_to: capacity * 6 / 10,
        }
    }

    /// Append a batch of lines. Past the high-water mark the oldest entries
    /// are discarded first so a stalled consumer cannot grow the buffer
    /// unbounded; at hard capacity each push evicts the oldest line.
    pub fn push_lines<I>(&self, lines: I)
    where
        I: IntoIterator<Item = String>,
    {
        let mut trimmed = 0usize;
        {
            let mut buf = self.inner.lock();
            if buf.len() > self.high_water {
                trimmed = buf.len() - self.drain_to;
                buf.drain(..trimmed);
            }
            for line in lines {
                if buf.len() == self.capacity {
                    buf.pop_front();
                    trimmed += 1;
                }
                buf.push_back(line);
            }
        }
        if trimmed > 0 {
            warn!(dropped = trimmed, "receive ring past high water, dropped oldest lines");
        }
    }

    /// Exchange the ring contents with `scratch`, which must be empty.
    /// This is the double-buffer swap: the receive side keeps filling a
    /// fresh buffer while the caller works through the swapped-out lines.
    pub fn swap_into(&self, scratch: &mut VecDeque<String>) {
        debug_assert!(scratch.is_empty());
        let mut buf = self.inner.lock();
        std::mem::swap(&mut *buf, scratch);
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}
