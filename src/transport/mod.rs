//! Binary transport the streaming scheduler writes frames to.
//!
//! The audio core needs exactly two things from the socket: is it open, and
//! "send these bytes".  Anything else (protocol framing, JSON control
//! messages) belongs to the pipeline collaborator.

pub mod websocket;

pub use websocket::{TransportError, WebSocketTransport};

/// Binary-capable socket.
pub trait Transport: Send + Sync {
    /// `true` while frames can be written.
    fn is_open(&self) -> bool;

    /// Queue one binary message.  Callers check [`is_open`](Self::is_open)
    /// first; a frame sent to a closed transport is lost.
    fn send(&self, frame: Vec<u8>);
}

// Compile-time assertion: Arc<dyn Transport> must be constructible.
const _: fn() = || {
    fn _assert_object_safe(_: std::sync::Arc<dyn Transport>) {}
};

// ---------------------------------------------------------------------------
// RecordingTransport  (test-only)
// ---------------------------------------------------------------------------

#[cfg(test)]
pub use recording::RecordingTransport;
