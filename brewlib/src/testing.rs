//! In-memory port and clock for exercising the link.

use std::cell::Cell;
use std::collections::VecDeque;

use crate::time::{Clock, Instant};

/// A byte port backed by queues.
///
/// Every `flush()` moves the next scripted reply into the receive
/// queue, so a test can answer each frame the host sends.
#[derive(Debug, Default)]
pub struct MockPort {
    pub rx: VecDeque<u8>,
    pub tx: Vec<u8>,
    pub replies: VecDeque<Vec<u8>>,
    /// Total bytes `write()` will still accept, if limited.
    pub write_budget: Option<usize>,
    pub flushes: usize,
}

impl MockPort {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rx(bytes: &[u8]) -> Self {
        let mut port = Self::new();
        port.rx.extend(bytes);
        port
    }

    pub fn push_rx(&mut self, bytes: &[u8]) {
        self.rx.extend(bytes);
    }

    pub fn reply_with(&mut self, bytes: &[u8]) {
        self.replies.push_back(bytes.to_vec());
    }

    pub fn take_tx(&mut self) -> Vec<u8> {
        core::mem::take(&mut self.tx)
    }
}

impl embedded_io::ErrorType for MockPort {
    type Error = embedded_io::ErrorKind;
}

impl embedded_io::Read for MockPort {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        let n = buf.len().min(self.rx.len());
        for (slot, b) in buf.iter_mut().zip(self.rx.drain(..n)) {
            *slot = b;
        }
        Ok(n)
    }
}

impl embedded_io::ReadReady for MockPort {
    fn read_ready(&mut self) -> Result<bool, Self::Error> {
        Ok(!self.rx.is_empty())
    }
}

impl embedded_io::Write for MockPort {
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        let n = match self.write_budget.as_mut() {
            Some(budget) => {
                let n = buf.len().min(*budget);
                *budget -= n;
                n
            }
            None => buf.len(),
        };
        self.tx.extend_from_slice(&buf[..n]);
        Ok(n)
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        self.flushes += 1;
        if let Some(reply) = self.replies.pop_front() {
            self.rx.extend(reply);
        }
        Ok(())
    }
}

/// A clock that only moves when told to, or when something delays on
/// it.
#[derive(Debug, Default)]
pub struct ManualClock {
    nanos: Cell<u64>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn at(ms: u64) -> Self {
        let clock = Self::new();
        clock.set(ms);
        clock
    }

    pub fn set(&self, ms: u64) {
        self.nanos.set(ms * 1_000_000);
    }

    pub fn advance(&self, ms: u64) {
        self.nanos.set(self.nanos.get() + ms * 1_000_000);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        Instant::from_ticks(self.nanos.get() / 1_000_000)
    }
}

impl embedded_hal::delay::DelayNs for &ManualClock {
    fn delay_ns(&mut self, ns: u32) {
        self.nanos.set(self.nanos.get() + u64::from(ns));
    }
}

/// A [crate::event::Handler] that keeps everything it is given.
#[derive(Debug, Default)]
pub struct Recorder {
    pub packets: Vec<crate::protocol::Packet>,
    pub events: Vec<crate::event::Event>,
}

impl crate::event::Handler for Recorder {
    fn packet(&mut self, packet: &crate::protocol::Packet) {
        self.packets.push(packet.clone());
    }

    fn event(&mut self, event: crate::event::Event) {
        self.events.push(event);
    }
}
