// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Channel: the pumps between one physical transport and the link sessions.
//!
//! # Architecture
//!
//! ```text
//! +--------------------------------------------------------------+
//! |                          Channel                             |
//! |                                                              |
//! |  read pump thread              write pump thread             |
//! |  phys.read()                   write queue (FIFO)            |
//! |    -> accumulate octets          -> phys.write()             |
//! |    -> parse link frames          -> complete waiters         |
//! |    -> route by destination                                   |
//! |                                                              |
//! |  SessionRouter: u16 address -> Session                       |
//! +--------------------------------------------------------------+
//! ```
//!
//! Writes from every session funnel through one bounded FIFO queue, so
//! frames from concurrent operations never interleave on the wire. Both
//! pumps poll the shutdown token; `close()` drains queued writes with
//! [`ChannelError::Closed`] so blocked callers unblock.
//!
//! # Modules
//!
//! - `phys` - physical transport trait + loopback implementation
//! - `router` - address-based session routing

pub mod phys;
pub mod router;

pub use phys::{LoopbackTransport, PhysStats, PhysicalTransport};
pub use router::{Session, SessionRouter};

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam::channel::{bounded, Receiver, RecvTimeoutError, Sender};

use crate::link::frame::{find_start, FrameError, LinkFrame};

/// How often the pumps re-check the shutdown token while blocked.
const PUMP_POLL: Duration = Duration::from_millis(100);

/// Cooperative cancellation token shared by every worker of a stack.
#[derive(Debug, Default, Clone)]
pub struct Shutdown {
    flag: Arc<AtomicBool>,
}

impl Shutdown {
    /// A fresh, untriggered token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fire the token; all polling workers wind down.
    pub fn trigger(&self) {
        self.flag.store(true, Ordering::Release);
    }

    /// Whether the token fired.
    #[inline]
    #[must_use]
    pub fn is_triggered(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}

/// Errors surfaced by channel operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelError {
    /// The channel or its transport is closed.
    Closed,
    /// A session is already registered under this address.
    DuplicateAddress(u16),
    /// The physical transport failed.
    Transport(String),
}

impl std::fmt::Display for ChannelError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Closed => write!(f, "channel closed"),
            Self::DuplicateAddress(addr) => {
                write!(f, "session already registered for address {}", addr)
            }
            Self::Transport(msg) => write!(f, "transport error: {}", msg),
        }
    }
}

impl std::error::Error for ChannelError {}

/// Channel configuration.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Name used in log lines.
    pub id: String,
    /// Bound of the write queue; producers block when it is full.
    pub write_queue_depth: usize,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            id: "channel".to_string(),
            write_queue_depth: 64,
        }
    }
}

/// Frame-level counters, updated lock-free by the pumps.
#[derive(Debug, Default)]
pub struct ChannelMetrics {
    rx_frames: AtomicU64,
    tx_frames: AtomicU64,
    bad_link_frames: AtomicU64,
    unrouted_frames: AtomicU64,
}

/// Point-in-time copy of [`ChannelMetrics`].
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ChannelMetricsSnapshot {
    /// Link frames parsed and routed.
    pub rx_frames: u64,
    /// Serialized frames written to the transport.
    pub tx_frames: u64,
    /// Octet runs discarded for framing or CRC errors.
    pub bad_link_frames: u64,
    /// Parsed frames no session claimed.
    pub unrouted_frames: u64,
}

impl ChannelMetrics {
    /// Snapshot the counters.
    #[must_use]
    pub fn snapshot(&self) -> ChannelMetricsSnapshot {
        ChannelMetricsSnapshot {
            rx_frames: self.rx_frames.load(Ordering::Relaxed),
            tx_frames: self.tx_frames.load(Ordering::Relaxed),
            bad_link_frames: self.bad_link_frames.load(Ordering::Relaxed),
            unrouted_frames: self.unrouted_frames.load(Ordering::Relaxed),
        }
    }
}

struct WriteRequest {
    data: Vec<u8>,
    done: Sender<Result<(), ChannelError>>,
}

/// Cloneable handle for enqueueing serialized frames.
#[derive(Clone)]
pub struct ChannelWriter {
    queue: Sender<WriteRequest>,
    shutdown: Shutdown,
}

impl ChannelWriter {
    /// Enqueue `data` and block until the write pump delivered it.
    ///
    /// # Errors
    ///
    /// `Closed` when the channel shut down before or during the write.
    pub fn write(&self, data: Vec<u8>) -> Result<(), ChannelError> {
        if self.shutdown.is_triggered() {
            return Err(ChannelError::Closed);
        }
        let (done_tx, done_rx) = bounded(1);
        self.queue
            .send(WriteRequest {
                data,
                done: done_tx,
            })
            .map_err(|_| ChannelError::Closed)?;
        done_rx.recv().map_err(|_| ChannelError::Closed)?
    }
}

/// One physical link and its pumps.
pub struct Channel {
    config: ChannelConfig,
    phys: Arc<dyn PhysicalTransport>,
    router: Arc<SessionRouter>,
    shutdown: Shutdown,
    metrics: Arc<ChannelMetrics>,
    write_tx: Sender<WriteRequest>,
    pumps: Vec<JoinHandle<()>>,
}

impl Channel {
    /// Open the channel: start the read and write pumps and tell every
    /// registered session the connection is up.
    pub fn open(
        config: ChannelConfig,
        phys: Arc<dyn PhysicalTransport>,
        router: Arc<SessionRouter>,
    ) -> Self {
        let shutdown = Shutdown::new();
        let metrics = Arc::new(ChannelMetrics::default());
        let (write_tx, write_rx) = bounded(config.write_queue_depth);

        router.connection_established();

        let read_pump = {
            let id = config.id.clone();
            let phys = phys.clone();
            let router = router.clone();
            let shutdown = shutdown.clone();
            let metrics = metrics.clone();
            std::thread::spawn(move || read_pump(&id, &*phys, &router, &shutdown, &metrics))
        };
        let write_pump = {
            let id = config.id.clone();
            let phys = phys.clone();
            let shutdown = shutdown.clone();
            let metrics = metrics.clone();
            std::thread::spawn(move || write_pump(&id, &*phys, &write_rx, &shutdown, &metrics))
        };

        Self {
            config,
            phys,
            router,
            shutdown,
            metrics,
            write_tx,
            pumps: vec![read_pump, write_pump],
        }
    }

    /// Handle for enqueueing writes.
    #[must_use]
    pub fn writer(&self) -> ChannelWriter {
        ChannelWriter {
            queue: self.write_tx.clone(),
            shutdown: self.shutdown.clone(),
        }
    }

    /// The session router of this channel.
    #[must_use]
    pub fn router(&self) -> &Arc<SessionRouter> {
        &self.router
    }

    /// Frame counters.
    #[must_use]
    pub fn metrics(&self) -> ChannelMetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Octet counters of the underlying transport.
    #[must_use]
    pub fn phys_stats(&self) -> PhysStats {
        self.phys.stats()
    }

    /// Stop the pumps, close the transport, and drain pending writes.
    pub fn close(mut self) {
        log::info!("[CHANNEL] {} closing", self.config.id);
        self.shutdown.trigger();
        self.phys.close();
        for pump in self.pumps.drain(..) {
            let _ = pump.join();
        }
        self.router.connection_lost();
    }
}

fn read_pump(
    id: &str,
    phys: &dyn PhysicalTransport,
    router: &SessionRouter,
    shutdown: &Shutdown,
    metrics: &ChannelMetrics,
) {
    let mut buf: Vec<u8> = Vec::new();
    while !shutdown.is_triggered() {
        let octets = match phys.read(shutdown) {
            Ok(octets) => octets,
            Err(ChannelError::Closed) => break,
            Err(e) => {
                log::warn!("[CHANNEL] {} read error: {}", id, e);
                break;
            }
        };
        buf.extend_from_slice(&octets);

        loop {
            match LinkFrame::parse(&buf) {
                Ok((frame, consumed)) => {
                    buf.drain(..consumed);
                    metrics.rx_frames.fetch_add(1, Ordering::Relaxed);
                    if !router.route(frame) {
                        metrics.unrouted_frames.fetch_add(1, Ordering::Relaxed);
                    }
                }
                Err(FrameError::TooShort) => break,
                Err(e) => {
                    metrics.bad_link_frames.fetch_add(1, Ordering::Relaxed);
                    log::warn!("[CHANNEL] {} dropping bad frame: {}", id, e);
                    // Resync at the next start sequence.
                    match find_start(&buf[1..]) {
                        Some(pos) => {
                            buf.drain(..=pos);
                        }
                        None => buf.clear(),
                    }
                }
            }
        }
    }
    log::debug!("[CHANNEL] {} read pump stopped", id);
}

fn write_pump(
    id: &str,
    phys: &dyn PhysicalTransport,
    queue: &Receiver<WriteRequest>,
    shutdown: &Shutdown,
    metrics: &ChannelMetrics,
) {
    loop {
        match queue.recv_timeout(PUMP_POLL) {
            Ok(request) => {
                let result = phys.write(shutdown, &request.data);
                if result.is_ok() {
                    metrics.tx_frames.fetch_add(1, Ordering::Relaxed);
                }
                let _ = request.done.send(result);
            }
            Err(RecvTimeoutError::Timeout) => {
                if shutdown.is_triggered() {
                    break;
                }
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    // Unblock every caller still queued.
    while let Ok(request) = queue.try_recv() {
        let _ = request.done.send(Err(ChannelError::Closed));
    }
    log::debug!("[CHANNEL] {} write pump stopped", id);
}
