//! The websocket primitive.
//!
//! Websocket endpoints bind through the same signature pipeline as HTTP
//! endpoints; the handle below is what a handler receives. Wire framing
//! is delegated to the transport, so the handle only tracks the accept
//! handshake.

use std::sync::atomic::{AtomicBool, Ordering};

/// The handle injected into websocket handlers.
#[derive(Debug, Default)]
pub struct WebSocketHandle {
    accepted: AtomicBool,
}

impl WebSocketHandle {
    /// Creates an unaccepted handle.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Accepts the upgrade handshake.
    pub fn accept(&self) {
        self.accepted.store(true, Ordering::Release);
    }

    /// Returns `true` once the handshake was accepted.
    #[must_use]
    pub fn is_accepted(&self) -> bool {
        self.accepted.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accept_handshake() {
        let handle = WebSocketHandle::new();
        assert!(!handle.is_accepted());
        handle.accept();
        assert!(handle.is_accepted());
    }
}
