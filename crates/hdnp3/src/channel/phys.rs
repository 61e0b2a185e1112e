// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Physical transport abstraction.
//!
//! A channel owns exactly one physical transport: a serial line, a TCP
//! stream, or the in-memory [`LoopbackTransport`] pair used by tests and
//! demos. The trait is octet-oriented; framing is entirely the channel's
//! concern.
//!
//! Concrete socket transports live outside this crate. Implementations must
//! honor the shutdown token from every blocking call.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use super::{ChannelError, Shutdown};

/// Transport-level octet counters.
#[derive(Debug, Default, Clone)]
pub struct PhysStats {
    /// Octets received.
    pub rx_bytes: u64,
    /// Octets transmitted.
    pub tx_bytes: u64,
    /// Read operations that returned data.
    pub rx_frames: u64,
    /// Write operations completed.
    pub tx_frames: u64,
    /// Read/write errors.
    pub errors: u64,
}

/// One physical octet pipe.
pub trait PhysicalTransport: Send + Sync {
    /// Block until octets arrive, the transport closes, or `shutdown` fires.
    fn read(&self, shutdown: &Shutdown) -> Result<Vec<u8>, ChannelError>;

    /// Write all octets.
    fn write(&self, shutdown: &Shutdown, data: &[u8]) -> Result<(), ChannelError>;

    /// Close the transport; pending and future reads fail with
    /// [`ChannelError::Closed`].
    fn close(&self);

    /// Snapshot of the octet counters.
    fn stats(&self) -> PhysStats;
}

/// How long a blocked loopback read sleeps between shutdown checks.
const READ_POLL: Duration = Duration::from_millis(20);

struct Pipe {
    queue: Mutex<VecDeque<Vec<u8>>>,
    available: Condvar,
    closed: AtomicBool,
}

impl Pipe {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            queue: Mutex::new(VecDeque::new()),
            available: Condvar::new(),
            closed: AtomicBool::new(false),
        })
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.available.notify_all();
    }
}

struct LoopbackStats {
    rx_bytes: AtomicU64,
    tx_bytes: AtomicU64,
    rx_frames: AtomicU64,
    tx_frames: AtomicU64,
}

/// In-memory paired transport: what one end writes, the other reads.
pub struct LoopbackTransport {
    rx: Arc<Pipe>,
    tx: Arc<Pipe>,
    stats: LoopbackStats,
}

impl LoopbackTransport {
    /// Create a connected pair.
    #[must_use]
    pub fn pair() -> (Self, Self) {
        let a_to_b = Pipe::new();
        let b_to_a = Pipe::new();

        let a = Self {
            rx: b_to_a.clone(),
            tx: a_to_b.clone(),
            stats: LoopbackStats {
                rx_bytes: AtomicU64::new(0),
                tx_bytes: AtomicU64::new(0),
                rx_frames: AtomicU64::new(0),
                tx_frames: AtomicU64::new(0),
            },
        };
        let b = Self {
            rx: a_to_b,
            tx: b_to_a,
            stats: LoopbackStats {
                rx_bytes: AtomicU64::new(0),
                tx_bytes: AtomicU64::new(0),
                rx_frames: AtomicU64::new(0),
                tx_frames: AtomicU64::new(0),
            },
        };
        (a, b)
    }
}

impl PhysicalTransport for LoopbackTransport {
    fn read(&self, shutdown: &Shutdown) -> Result<Vec<u8>, ChannelError> {
        let mut queue = self.rx.queue.lock();
        loop {
            if let Some(data) = queue.pop_front() {
                self.stats
                    .rx_bytes
                    .fetch_add(data.len() as u64, Ordering::Relaxed);
                self.stats.rx_frames.fetch_add(1, Ordering::Relaxed);
                return Ok(data);
            }
            if self.rx.closed.load(Ordering::Acquire) || shutdown.is_triggered() {
                return Err(ChannelError::Closed);
            }
            self.rx.available.wait_for(&mut queue, READ_POLL);
        }
    }

    fn write(&self, shutdown: &Shutdown, data: &[u8]) -> Result<(), ChannelError> {
        if self.tx.closed.load(Ordering::Acquire) || shutdown.is_triggered() {
            return Err(ChannelError::Closed);
        }
        self.tx.queue.lock().push_back(data.to_vec());
        self.tx.available.notify_one();
        self.stats
            .tx_bytes
            .fetch_add(data.len() as u64, Ordering::Relaxed);
        self.stats.tx_frames.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn close(&self) {
        self.rx.close();
        self.tx.close();
    }

    fn stats(&self) -> PhysStats {
        PhysStats {
            rx_bytes: self.stats.rx_bytes.load(Ordering::Relaxed),
            tx_bytes: self.stats.tx_bytes.load(Ordering::Relaxed),
            rx_frames: self.stats.rx_frames.load(Ordering::Relaxed),
            tx_frames: self.stats.tx_frames.load(Ordering::Relaxed),
            errors: 0,
        }
    }
}
