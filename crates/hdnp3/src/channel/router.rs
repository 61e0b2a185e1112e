// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Address-based session routing.
//!
//! Several link sessions (one per remote station) can share one physical
//! channel; the router delivers each parsed link frame to the session
//! registered under the frame's destination address. Registration changes
//! are rare, so the map sits behind a read-write lock.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::link::frame::{LinkFrame, BROADCAST_ADDR};

use super::ChannelError;

/// A station endpoint attached to a channel.
pub trait Session: Send + Sync {
    /// The local link address this session answers to.
    fn local_address(&self) -> u16;

    /// A link frame addressed to this session arrived.
    fn on_frame(&self, frame: LinkFrame);

    /// The physical transport came up.
    fn on_connection_established(&self) {}

    /// The physical transport went away; transport reassembly must resync.
    fn on_connection_lost(&self) {}
}

/// u16 address -> session map.
#[derive(Default)]
pub struct SessionRouter {
    sessions: RwLock<HashMap<u16, Arc<dyn Session>>>,
}

impl SessionRouter {
    /// Empty router.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a session under its local address.
    ///
    /// # Errors
    ///
    /// `DuplicateAddress` if the address is already taken.
    pub fn register(&self, session: Arc<dyn Session>) -> Result<(), ChannelError> {
        let addr = session.local_address();
        let mut sessions = self.sessions.write();
        if sessions.contains_key(&addr) {
            return Err(ChannelError::DuplicateAddress(addr));
        }
        sessions.insert(addr, session);
        Ok(())
    }

    /// Remove the session registered under `addr`.
    pub fn unregister(&self, addr: u16) -> Option<Arc<dyn Session>> {
        self.sessions.write().remove(&addr)
    }

    /// Number of registered sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    /// Whether no session is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }

    /// Deliver a frame by destination address.
    ///
    /// Broadcast frames go to every session. Returns `false` when no
    /// session claimed the frame.
    pub fn route(&self, frame: LinkFrame) -> bool {
        if frame.destination == BROADCAST_ADDR {
            let sessions = self.sessions.read();
            for session in sessions.values() {
                session.on_frame(frame.clone());
            }
            return !sessions.is_empty();
        }

        let session = self.sessions.read().get(&frame.destination).cloned();
        match session {
            Some(session) => {
                session.on_frame(frame);
                true
            }
            None => {
                log::debug!("[ROUTER] no session for address {}", frame.destination);
                false
            }
        }
    }

    /// Notify every session that the transport came up.
    pub fn connection_established(&self) {
        for session in self.sessions.read().values() {
            session.on_connection_established();
        }
    }

    /// Notify every session that the transport went away.
    pub fn connection_lost(&self) {
        for session in self.sessions.read().values() {
            session.on_connection_lost();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::frame::{ControlField, PrimaryFunction};
    use parking_lot::Mutex;

    struct RecordingSession {
        addr: u16,
        frames: Mutex<Vec<LinkFrame>>,
        connections: Mutex<(u32, u32)>,
    }

    impl RecordingSession {
        fn new(addr: u16) -> Arc<Self> {
            Arc::new(Self {
                addr,
                frames: Mutex::new(Vec::new()),
                connections: Mutex::new((0, 0)),
            })
        }
    }

    impl Session for RecordingSession {
        fn local_address(&self) -> u16 {
            self.addr
        }

        fn on_frame(&self, frame: LinkFrame) {
            self.frames.lock().push(frame);
        }

        fn on_connection_established(&self) {
            self.connections.lock().0 += 1;
        }

        fn on_connection_lost(&self) {
            self.connections.lock().1 += 1;
        }
    }

    fn frame_to(destination: u16) -> LinkFrame {
        LinkFrame::header_only(
            ControlField::primary(PrimaryFunction::TestLink, true, false, false),
            destination,
            1,
        )
    }

    #[test]
    fn test_route_by_destination() {
        let router = SessionRouter::new();
        let a = RecordingSession::new(10);
        let b = RecordingSession::new(20);
        router.register(a.clone()).expect("register a");
        router.register(b.clone()).expect("register b");

        assert!(router.route(frame_to(10)));
        assert!(router.route(frame_to(20)));
        assert!(router.route(frame_to(20)));

        assert_eq!(a.frames.lock().len(), 1);
        assert_eq!(b.frames.lock().len(), 2);
    }

    #[test]
    fn test_unknown_destination_unclaimed() {
        let router = SessionRouter::new();
        router.register(RecordingSession::new(10)).expect("register");
        assert!(!router.route(frame_to(99)));
    }

    #[test]
    fn test_duplicate_registration_fails() {
        let router = SessionRouter::new();
        router.register(RecordingSession::new(10)).expect("first");
        assert_eq!(
            router.register(RecordingSession::new(10)).err(),
            Some(ChannelError::DuplicateAddress(10))
        );
        assert_eq!(router.len(), 1);
    }

    #[test]
    fn test_unregister_frees_address() {
        let router = SessionRouter::new();
        router.register(RecordingSession::new(10)).expect("register");
        assert!(router.unregister(10).is_some());
        assert!(router.unregister(10).is_none());
        router.register(RecordingSession::new(10)).expect("re-register");
    }

    #[test]
    fn test_broadcast_reaches_all_sessions() {
        let router = SessionRouter::new();
        let a = RecordingSession::new(10);
        let b = RecordingSession::new(20);
        router.register(a.clone()).expect("register a");
        router.register(b.clone()).expect("register b");

        assert!(router.route(frame_to(BROADCAST_ADDR)));
        assert_eq!(a.frames.lock().len(), 1);
        assert_eq!(b.frames.lock().len(), 1);
    }

    #[test]
    fn test_connection_notifications() {
        let router = SessionRouter::new();
        let a = RecordingSession::new(10);
        router.register(a.clone()).expect("register");

        router.connection_established();
        router.connection_lost();
        router.connection_lost();

        assert_eq!(*a.connections.lock(), (1, 2));
    }
}
