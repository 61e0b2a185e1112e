// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Secondary (responder) link state machine.
//!
//! The secondary station polices addresses and direction, deduplicates
//! confirmed user data via the frame count bit, and answers every primary
//! service with the appropriate secondary frame:
//!
//! | Primary function | Action | Response |
//! |---|---|---|
//! | RESET_LINK | reset FCB validator | ACK |
//! | RESET_USER_PROCESS | signal application reset | ACK |
//! | TEST_LINK | none | ACK |
//! | CONFIRMED_USER_DATA | FCB check, deliver if new | ACK (NACK if delivery failed) |
//! | UNCONFIRMED_USER_DATA | deliver | none |
//! | REQUEST_LINK_STATUS | none | LINK_STATUS |
//! | anything else | none | NOT_SUPPORTED |
//!
//! Frames addressed to the broadcast address are delivered but never
//! answered; the application layer reports them via IIN instead.

use super::frame::{ControlField, LinkFrame, PrimaryFunction, SecondaryFunction};
use super::{LinkConfig, LinkError, LinkState, LinkStats};

/// Frame-count-bit duplicate detector.
///
/// Tracks the last accepted FCB of the peer primary. Frames with FCV=0 are
/// never validated. Duplicates are acknowledged but not re-delivered.
#[derive(Debug, Default, Clone, Copy)]
pub struct FcbValidator {
    initialized: bool,
    last_fcb: bool,
}

impl FcbValidator {
    /// Check a confirmed frame's FCB.
    ///
    /// # Returns
    ///
    /// `true` if the frame is a duplicate of the last accepted one.
    pub fn is_duplicate(&mut self, fcb: bool, fcv: bool) -> bool {
        if !fcv {
            return false;
        }
        if self.initialized && fcb == self.last_fcb {
            return true;
        }
        self.initialized = true;
        self.last_fcb = fcb;
        false
    }

    /// Forget the FCB history (RESET_LINK).
    pub fn reset(&mut self) {
        self.initialized = false;
        self.last_fcb = false;
    }
}

/// Outcome of processing one primary frame.
#[derive(Debug, Default, PartialEq)]
pub struct FrameDisposition {
    /// Frame to transmit back, if the service calls for one.
    pub response: Option<LinkFrame>,
    /// The primary requested a user-process reset.
    pub user_process_reset: bool,
}

/// Secondary-role link state machine.
pub struct SecondaryLink {
    config: LinkConfig,
    state: LinkState,
    validator: FcbValidator,
    stats: LinkStats,
    broadcast_seen: bool,
}

impl SecondaryLink {
    /// Create an idle secondary link.
    #[must_use]
    pub fn new(config: LinkConfig) -> Self {
        Self {
            config,
            state: LinkState::Idle,
            validator: FcbValidator::default(),
            stats: LinkStats::default(),
            broadcast_seen: false,
        }
    }

    /// Current state.
    #[inline]
    #[must_use]
    pub fn state(&self) -> LinkState {
        self.state
    }

    /// Snapshot of the counters.
    #[must_use]
    pub fn stats(&self) -> LinkStats {
        self.stats.clone()
    }

    /// Consume the broadcast flag (set when a broadcast frame was accepted).
    pub fn take_broadcast(&mut self) -> bool {
        std::mem::take(&mut self.broadcast_seen)
    }

    /// Process one received primary frame.
    ///
    /// `deliver` is invoked with the user data of new confirmed and
    /// unconfirmed frames; its return value decides ACK vs NACK for
    /// confirmed data.
    ///
    /// # Errors
    ///
    /// - `InvalidAddress` on source/destination mismatch
    /// - `InvalidDirection` when the DIR bit contradicts the session roles
    /// - `NonPrimary` when PRM=0
    pub fn on_frame(
        &mut self,
        frame: &LinkFrame,
        deliver: &mut dyn FnMut(&[u8]) -> bool,
    ) -> Result<FrameDisposition, LinkError> {
        self.validate(frame).inspect_err(|_| {
            self.stats.rejected += 1;
        })?;

        let broadcast = frame.is_broadcast();
        if broadcast {
            self.broadcast_seen = true;
        }
        self.stats.frames_rx += 1;

        let mut out = FrameDisposition::default();
        match frame.control.primary_function() {
            Some(PrimaryFunction::ResetLink) => {
                self.validator.reset();
                out.response = self.respond(SecondaryFunction::Ack, broadcast);
            }
            Some(PrimaryFunction::ResetUserProcess) => {
                // The FCB validator survives a user-process reset.
                out.user_process_reset = true;
                out.response = self.respond(SecondaryFunction::Ack, broadcast);
            }
            Some(PrimaryFunction::TestLink) => {
                out.response = self.respond(SecondaryFunction::Ack, broadcast);
            }
            Some(PrimaryFunction::ConfirmedUserData) => {
                if self
                    .validator
                    .is_duplicate(frame.control.fcb, frame.control.fcv)
                {
                    self.stats.duplicates += 1;
                    log::debug!(
                        "[LINK] duplicate confirmed frame from {}, ack without delivery",
                        frame.source
                    );
                    out.response = self.respond(SecondaryFunction::Ack, broadcast);
                } else {
                    self.state = LinkState::Processing;
                    let accepted = deliver(&frame.user_data);
                    self.state = LinkState::Idle;
                    let func = if accepted {
                        SecondaryFunction::Ack
                    } else {
                        SecondaryFunction::Nack
                    };
                    out.response = self.respond(func, broadcast);
                }
            }
            Some(PrimaryFunction::UnconfirmedUserData) => {
                self.state = LinkState::Processing;
                let _ = deliver(&frame.user_data);
                self.state = LinkState::Idle;
            }
            Some(PrimaryFunction::RequestLinkStatus) => {
                out.response = self.respond(SecondaryFunction::LinkStatus, broadcast);
            }
            None => {
                log::debug!(
                    "[LINK] unsupported link function {:#x} from {}",
                    frame.control.function,
                    frame.source
                );
                out.response = self.respond(SecondaryFunction::NotSupported, broadcast);
            }
        }
        Ok(out)
    }

    fn validate(&self, frame: &LinkFrame) -> Result<(), LinkError> {
        if !frame.control.prm {
            return Err(LinkError::NonPrimary);
        }
        // The DIR bit is set on frames travelling master -> outstation, so a
        // station must see the opposite of its own role.
        if frame.control.dir == self.config.is_master {
            return Err(LinkError::InvalidDirection);
        }
        if frame.source != self.config.remote_addr {
            return Err(LinkError::InvalidAddress);
        }
        if frame.destination != self.config.local_addr && !frame.is_broadcast() {
            return Err(LinkError::InvalidAddress);
        }
        Ok(())
    }

    fn respond(&self, function: SecondaryFunction, broadcast: bool) -> Option<LinkFrame> {
        if broadcast {
            return None;
        }
        Some(LinkFrame::header_only(
            ControlField::secondary(function, self.config.is_master),
            self.config.remote_addr,
            self.config.local_addr,
        ))
    }
}
