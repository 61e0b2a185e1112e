// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # HDNP3 - DNP3 (IEEE 1815) protocol stack
//!
//! A pure Rust implementation of the DNP3 SCADA protocol for masters
//! (control centers) and outstations (field devices), designed for
//! industrial control systems over serial and TCP links.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use hdnp3::channel::{Channel, ChannelConfig, LoopbackTransport, SessionRouter};
//! use hdnp3::master::{Master, MasterConfig, NullReadHandler, TaskKind, ClassMask};
//!
//! let (phys, _peer) = LoopbackTransport::pair();
//! let router = Arc::new(SessionRouter::new());
//! let channel = Channel::open(ChannelConfig::default(), Arc::new(phys), router);
//!
//! let (master, session) = Master::new(
//!     MasterConfig::default(),
//!     Arc::new(NullReadHandler),
//!     channel.writer(),
//! );
//! channel.router().register(session)?;
//!
//! master.startup();
//! master.scan(TaskKind::ClassScan(ClassMask::events()))?;
//! # Ok::<(), hdnp3::Error>(())
//! ```
//!
//! ## Architecture
//!
//! ```text
//! +---------------------------------------------------------------------+
//! |                        Application Layer                            |
//! |   Master (scans, commands) | Outstation (database, events, unsol)   |
//! +---------------------------------------------------------------------+
//! |                        Application Codec                            |
//! |   APDU | function codes | IIN | object headers | measurements       |
//! +---------------------------------------------------------------------+
//! |                        Transport Layer                              |
//! |   249-octet segmentation | SEQ/FIR/FIN reassembly | 120 s timeout   |
//! +---------------------------------------------------------------------+
//! |                           Link Layer                                |
//! |   05 64 framing | CRC-16/DNP3 blocks | FCB dedup | retries          |
//! +---------------------------------------------------------------------+
//! |                       Channel + Router                              |
//! |   read/write pumps | address routing | physical transport trait     |
//! +---------------------------------------------------------------------+
//! ```
//!
//! ## Key Types
//!
//! | Type | Description |
//! |------|-------------|
//! | [`master::Master`] | Polls and commands one outstation |
//! | [`outstation::Outstation`] | Serves data and executes commands |
//! | [`channel::Channel`] | Pumps between a physical link and sessions |
//! | [`link::LinkFrame`] | CRC-protected link frame codec |
//! | [`app::Apdu`] | Application fragment codec |
//!
//! ## Modules Overview
//!
//! - [`link`] - framing, CRC, primary/secondary state machines
//! - [`transport`] - segmentation and reassembly
//! - [`app`] - APDU, object headers, measurement objects
//! - [`channel`] - physical transport pumps and session routing
//! - [`master`] - task scheduling, scans, SELECT/OPERATE
//! - [`outstation`] - point database, event buffers, unsolicited
//!
//! ## See Also
//!
//! - IEEE 1815 (DNP3) specification
//! - [DNP Users Group](https://www.dnp.org/)

/// Application layer: APDU codec, object headers, measurements.
pub mod app;
/// Channel pumps, session router, physical transport abstraction.
pub mod channel;
/// Link layer: framing, CRC, primary/secondary state machines.
pub mod link;
/// Master station: task queue, scans, commands.
pub mod master;
/// Outstation station: database, events, command handling.
pub mod outstation;
/// Transport layer: segmentation and reassembly.
pub mod transport;

pub use app::{Apdu, FunctionCode, Iin};
pub use channel::{Channel, ChannelConfig, ChannelError, LoopbackTransport, SessionRouter, Shutdown};
pub use link::{LinkConfig, LinkError, LinkFrame};
pub use master::{Master, MasterConfig, ReadHandler, TaskError};
pub use outstation::{ControlHandler, Outstation, OutstationConfig};

/// HDNP3 version string.
pub const VERSION: &str = "0.4.2";

/// Result alias for stack operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by HDNP3 operations.
///
/// Each layer has its own error enum; this type aggregates them at the
/// public API boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    // ========================================================================
    // Link layer
    // ========================================================================
    /// Frame codec failure (start octets, length, CRC).
    Frame(link::FrameError),
    /// Link state machine failure (state, addresses, retries).
    Link(link::LinkError),

    // ========================================================================
    // Transport and application
    // ========================================================================
    /// Reassembly failure.
    Transport(transport::TransportError),
    /// Application object codec failure.
    Object(app::ObjectError),

    // ========================================================================
    // Channel and requests
    // ========================================================================
    /// Channel failure (closed, duplicate session).
    Channel(ChannelError),
    /// Master request failure (timeout, bad response).
    Task(TaskError),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Frame(e) => write!(f, "link frame: {}", e),
            Error::Link(e) => write!(f, "link: {}", e),
            Error::Transport(e) => write!(f, "transport: {}", e),
            Error::Object(e) => write!(f, "application object: {}", e),
            Error::Channel(e) => write!(f, "channel: {}", e),
            Error::Task(e) => write!(f, "task: {}", e),
        }
    }
}

impl std::error::Error for Error {}

impl From<link::FrameError> for Error {
    fn from(e: link::FrameError) -> Self {
        Self::Frame(e)
    }
}

impl From<link::LinkError> for Error {
    fn from(e: link::LinkError) -> Self {
        Self::Link(e)
    }
}

impl From<transport::TransportError> for Error {
    fn from(e: transport::TransportError) -> Self {
        Self::Transport(e)
    }
}

impl From<app::ObjectError> for Error {
    fn from(e: app::ObjectError) -> Self {
        Self::Object(e)
    }
}

impl From<ChannelError> for Error {
    fn from(e: ChannelError) -> Self {
        Self::Channel(e)
    }
}

impl From<TaskError> for Error {
    fn from(e: TaskError) -> Self {
        Self::Task(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_conversions() {
        let err: Error = link::FrameError::InvalidCrc.into();
        assert_eq!(err, Error::Frame(link::FrameError::InvalidCrc));

        let err: Error = ChannelError::Closed.into();
        assert!(matches!(err, Error::Channel(ChannelError::Closed)));

        let err: Error = TaskError::Timeout.into();
        assert_eq!(err.to_string(), "task: request timed out");
    }
}
