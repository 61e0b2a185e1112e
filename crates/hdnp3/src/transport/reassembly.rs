// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Receive-side reassembly of transport segments.
//!
//! The reassembler enforces the message framing rules:
//!
//! - A segment with FIR=1 always restarts reassembly, even mid-message.
//! - A non-FIR segment while nothing is in progress is silently dropped
//!   (resynchronization boundary).
//! - An out-of-sequence segment discards the whole message; the reassembler
//!   waits for the next FIR.
//! - A message that outgrows `max_reassembly` is discarded and the overflow
//!   is reported upward so it can be logged.
//! - A message that takes longer than `reassembly_timeout` is discarded.
//!
//! Expiry is checked lazily on segment arrival rather than by a timer
//! thread; [`Reassembler::tick`] is available for idle sweeps.

use std::time::{Duration, Instant};

use super::{SegmentHeader, MAX_SEGMENT_DATA, SEQ_MODULUS};

/// Reassembly configuration.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Maximum reassembled fragment size.
    pub max_reassembly: usize,
    /// How long a partial message may sit before being discarded.
    pub reassembly_timeout: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            max_reassembly: 2048,
            reassembly_timeout: Duration::from_secs(120),
        }
    }
}

/// Reassembly counters.
#[derive(Debug, Default, Clone)]
pub struct TransportStats {
    /// Segments accepted into a message.
    pub segments_rx: u64,
    /// Complete messages delivered.
    pub messages_rx: u64,
    /// Out-of-sequence segments (message discarded).
    pub sequence_errors: u64,
    /// Non-FIR segments with no message in progress.
    pub orphans: u64,
    /// Messages discarded because they outgrew the buffer.
    pub overflows: u64,
    /// Messages discarded by the reassembly timeout.
    pub timeouts: u64,
}

/// Errors propagated from the reassembler.
///
/// Sequence errors and orphans are deliberately *not* errors; they are
/// recoverable at this layer and only counted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportError {
    /// The in-progress message exceeded `max_reassembly` and was discarded.
    BufferOverflow,
}

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BufferOverflow => write!(f, "reassembly buffer overflow"),
        }
    }
}

impl std::error::Error for TransportError {}

/// Segment reassembler for one remote station.
#[derive(Debug)]
pub struct Reassembler {
    config: TransportConfig,
    buffer: Vec<u8>,
    expected_seq: u8,
    in_progress: bool,
    started_at: Option<Instant>,
    stats: TransportStats,
}

impl Reassembler {
    /// Create an empty reassembler.
    #[must_use]
    pub fn new(config: TransportConfig) -> Self {
        Self {
            config,
            buffer: Vec::new(),
            expected_seq: 0,
            in_progress: false,
            started_at: None,
            stats: TransportStats::default(),
        }
    }

    /// Snapshot of the counters.
    #[must_use]
    pub fn stats(&self) -> TransportStats {
        self.stats.clone()
    }

    /// Drop any in-progress message (physical reconnect, shutdown).
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.in_progress = false;
        self.started_at = None;
    }

    /// Discard the in-progress message if it has sat past the timeout.
    pub fn tick(&mut self) {
        if !self.in_progress {
            return;
        }
        let expired = self
            .started_at
            .is_some_and(|t| t.elapsed() >= self.config.reassembly_timeout);
        if expired {
            log::debug!(
                "[TRANSPORT] reassembly timeout, dropping {} buffered octets",
                self.buffer.len()
            );
            self.stats.timeouts += 1;
            self.reset();
        }
    }

    /// Process one received transport segment.
    ///
    /// # Returns
    ///
    /// `Ok(Some(fragment))` when the segment completed a message.
    ///
    /// # Errors
    ///
    /// `BufferOverflow` when the message outgrew the buffer and was
    /// discarded; the next FIR resumes normal operation.
    pub fn on_segment(&mut self, tpdu: &[u8]) -> Result<Option<Vec<u8>>, TransportError> {
        let Some((&header_byte, data)) = tpdu.split_first() else {
            self.stats.orphans += 1;
            return Ok(None);
        };
        if data.len() > MAX_SEGMENT_DATA {
            log::debug!("[TRANSPORT] oversized segment ({} octets), dropped", data.len());
            self.stats.orphans += 1;
            return Ok(None);
        }
        let header = SegmentHeader::decode(header_byte);

        // Lazy expiry of a stale partial message.
        self.tick();

        if header.fir {
            // A FIR mid-message is not an error: it starts a new message.
            self.buffer.clear();
            self.expected_seq = header.seq;
            self.in_progress = true;
            self.started_at = Some(Instant::now());
        } else if !self.in_progress {
            self.stats.orphans += 1;
            return Ok(None);
        }

        if header.seq != self.expected_seq {
            log::debug!(
                "[TRANSPORT] sequence error: got {} expected {}, message discarded",
                header.seq,
                self.expected_seq
            );
            self.stats.sequence_errors += 1;
            self.reset();
            return Ok(None);
        }

        if self.buffer.len() + data.len() > self.config.max_reassembly {
            self.stats.overflows += 1;
            self.reset();
            return Err(TransportError::BufferOverflow);
        }

        self.buffer.extend_from_slice(data);
        self.stats.segments_rx += 1;
        self.expected_seq = (self.expected_seq + 1) % SEQ_MODULUS;

        if header.fin {
            let fragment = std::mem::take(&mut self.buffer);
            self.in_progress = false;
            self.started_at = None;
            self.stats.messages_rx += 1;
            return Ok(Some(fragment));
        }
        Ok(None)
    }
}
