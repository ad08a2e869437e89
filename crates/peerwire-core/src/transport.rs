//! The [`Transport`] trait a Peer drives, and the events it produces.
//!
//! A transport owns one underlying duplex connection (a WebSocket, in the
//! reference implementation) and exposes it as an async send/receive pair.
//! The peer engine never inspects connection internals — reconnection,
//! framing, and liveness below the text-frame level are the transport's
//! problem, not the peer's.

use async_trait::async_trait;
use thiserror::Error;

/// Failure reported by a [`Transport`] operation.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("send failed: {0}")]
    Send(String),

    #[error("transport already closed")]
    Closed,
}

/// One thing a transport can hand back from [`Transport::recv`].
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// A text frame arrived. Binary frames are not part of this protocol and
    /// are dropped by the transport with a warning before they reach here.
    Message(String),
    /// A liveness pong was observed. Carries no payload; the peer only cares
    /// that the transport is still alive.
    Pong,
    /// The underlying connection closed, with the code and reason it gave
    /// (or a synthesized abnormal-closure code if none was given).
    Closed { code: u16, reason: String },
}

/// A duplex, text-frame transport a [`crate::Peer`] can be attached to.
///
/// Implementations are not required to be `Clone` or shareable — a Peer owns
/// exactly one `Transport` at a time, swapping it out wholesale via
/// [`crate::Peer::set_new_transport`] rather than mutating it in place.
#[async_trait]
pub trait Transport: Send {
    /// Send one text frame. Must not be called again until the previous
    /// call's future has resolved.
    async fn send(&mut self, text: String) -> Result<(), TransportError>;

    /// Wait for the next event. Returns `None` once the transport is
    /// exhausted and will never produce another event (after a `Closed`
    /// event has already been returned, or the stream ended without one).
    async fn recv(&mut self) -> Option<Result<TransportEvent, TransportError>>;

    /// Actively close the connection with the given code and reason.
    async fn close(&mut self, code: u16, reason: String) -> Result<(), TransportError>;

    /// Soft-close the connection ahead of a transport swap: code 4001,
    /// reason "reconnecting". Unlike [`Transport::close`] this must not be
    /// observable by the peer as a hard close.
    async fn drop(&mut self) -> Result<(), TransportError>;

    /// Whether this transport has already closed. Checked at attach time —
    /// attaching an already-closed transport is a distinct case from one
    /// that closes later (see `spec.md` §4.4 item 1).
    fn is_closed(&self) -> bool;
}

/// Type-erased transport, owned exclusively by a Peer's reactor task.
pub type BoxTransport = Box<dyn Transport>;

#[cfg(any(test, feature = "test-util"))]
pub mod mock {
    use super::*;
    use tokio::sync::mpsc;

    /// In-memory transport for tests: `inbound` feeds [`Transport::recv`],
    /// `outbound` records everything sent to it.
    pub struct MockTransport {
        pub inbound: mpsc::UnboundedReceiver<Result<TransportEvent, TransportError>>,
        pub outbound: mpsc::UnboundedSender<String>,
        pub closed: bool,
    }

    #[async_trait]
    impl Transport for MockTransport {
        async fn send(&mut self, text: String) -> Result<(), TransportError> {
            if self.closed {
                return Err(TransportError::Closed);
            }
            self.outbound
                .send(text)
                .map_err(|e| TransportError::Send(e.to_string()))
        }

        async fn recv(&mut self) -> Option<Result<TransportEvent, TransportError>> {
            self.inbound.recv().await
        }

        async fn close(&mut self, _code: u16, _reason: String) -> Result<(), TransportError> {
            self.closed = true;
            Ok(())
        }

        async fn drop(&mut self) -> Result<(), TransportError> {
            self.closed = true;
            Ok(())
        }

        fn is_closed(&self) -> bool {
            self.closed
        }
    }

    pub fn mock_pair() -> (
        MockTransport,
        mpsc::UnboundedSender<Result<TransportEvent, TransportError>>,
        mpsc::UnboundedReceiver<String>,
    ) {
        let (in_tx, in_rx) = mpsc::unbounded_channel();
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        (
            MockTransport {
                inbound: in_rx,
                outbound: out_tx,
                closed: false,
            },
            in_tx,
            out_rx,
        )
    }
}
