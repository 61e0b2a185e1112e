// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Link layer: CRC-protected framing and the primary/secondary state machines.
//!
//! The link layer frames octets between one master and one outstation over a
//! shared or point-to-point physical channel:
//!
//! ```text
//! +--------------------------------------------------------------+
//! |                       Transport Layer                        |
//! +--------------------------------------------------------------+
//! |  PrimaryLink (initiator)        SecondaryLink (responder)    |
//! |  reset / test / user data  -->  ACK / NACK / status          |
//! |  FCB toggling, retries          FCB duplicate detection      |
//! +--------------------------------------------------------------+
//! |        LinkFrame codec (05 64 header, block CRCs)            |
//! +--------------------------------------------------------------+
//! ```
//!
//! Both stations carry both roles: a master is primary for its requests and
//! secondary for unsolicited traffic from the outstation, and vice versa.
//!
//! # Modules
//!
//! - `crc` - CRC-16/DNP3 checksums and block helpers
//! - `frame` - frame header and control-byte codec
//! - `primary` - initiator state machine (confirmed sends, retries)
//! - `secondary` - responder state machine (FCB validation, dispatch)

pub mod crc;
pub mod frame;
pub mod primary;
pub mod secondary;

pub use frame::{
    ControlField, FrameError, LinkFrame, PrimaryFunction, SecondaryFunction, BROADCAST_ADDR,
    MAX_FRAME_SIZE, MAX_USER_DATA,
};
pub use primary::PrimaryLink;
pub use secondary::{FcbValidator, FrameDisposition, SecondaryLink};

use std::time::Duration;

/// Link state, shared by both roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    /// No operation in flight.
    Idle,
    /// Primary: confirmed user data sent, waiting for ACK/NACK.
    WaitAck,
    /// Primary: RESET_LINK sent, waiting for ACK.
    ResetPending,
    /// Primary: TEST_LINK sent, waiting for ACK.
    TestPending,
    /// Secondary: delivering user data to the upper layer.
    Processing,
    /// Terminal failure; cleared by an explicit RESET_LINK.
    Error,
}

/// Errors surfaced by the link state machines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkError {
    /// An operation was issued while another is in flight (or after Error).
    InvalidState,
    /// All retries exhausted without an accepting response.
    MaxRetriesExceeded,
    /// Frame source or destination does not match the session addresses.
    InvalidAddress,
    /// DIR bit inconsistent with the session roles.
    InvalidDirection,
    /// A secondary station received a frame with PRM=0.
    NonPrimary,
    /// The channel was shut down while an operation was blocked.
    ChannelClosed,
}

impl std::fmt::Display for LinkError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidState => write!(f, "link operation while not idle"),
            Self::MaxRetriesExceeded => write!(f, "link retries exhausted"),
            Self::InvalidAddress => write!(f, "frame address mismatch"),
            Self::InvalidDirection => write!(f, "frame direction mismatch"),
            Self::NonPrimary => write!(f, "secondary frame on primary-only path"),
            Self::ChannelClosed => write!(f, "channel closed"),
        }
    }
}

impl std::error::Error for LinkError {}

/// Link session configuration.
#[derive(Debug, Clone)]
pub struct LinkConfig {
    /// Local link address.
    pub local_addr: u16,
    /// Expected remote link address.
    pub remote_addr: u16,
    /// Local station is the master (sets the DIR bit on transmit).
    pub is_master: bool,
    /// How long the primary waits for each ACK/NACK.
    pub response_timeout: Duration,
    /// Retries after the first attempt of a confirmed operation.
    pub max_retries: u32,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            local_addr: 1,
            remote_addr: 1024,
            is_master: true,
            response_timeout: Duration::from_secs(2),
            max_retries: 3,
        }
    }
}

impl LinkConfig {
    /// Config tuned for a 9600-baud serial line (long timeouts, one retry).
    #[must_use]
    pub fn serial_9600(local_addr: u16, remote_addr: u16, is_master: bool) -> Self {
        Self {
            local_addr,
            remote_addr,
            is_master,
            response_timeout: Duration::from_secs(5),
            max_retries: 1,
        }
    }
}

/// Per-link counters.
#[derive(Debug, Default, Clone)]
pub struct LinkStats {
    /// Frames transmitted (including retransmissions).
    pub frames_tx: u64,
    /// Primary frames accepted by the secondary role.
    pub frames_rx: u64,
    /// ACKs received by the primary role.
    pub acks_rx: u64,
    /// NACKs received by the primary role.
    pub nacks_rx: u64,
    /// Response waits that expired.
    pub timeouts: u64,
    /// Retransmission attempts.
    pub retries: u64,
    /// Duplicate confirmed frames suppressed by the FCB validator.
    pub duplicates: u64,
    /// Frames rejected for address, direction, or PRM violations.
    pub rejected: u64,
}
