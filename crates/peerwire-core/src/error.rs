use thiserror::Error;

use crate::transport::TransportError;

/// Outcome of a [`crate::Peer::request`] call.
///
/// Malformed inbound frames and orphan responses never become a
/// `PeerError` — they are absorbed and logged inside the reactor, since
/// they aren't about any particular caller's request.
#[derive(Debug, Error, Clone)]
pub enum PeerError {
    /// The transport rejected the send outright; no pending entry was ever
    /// created for this request.
    #[error("send failed: {0}")]
    Send(String),

    /// The remote end replied with an error response.
    #[error("remote error {code}: {reason}")]
    Remote { code: i32, reason: String },

    /// No response arrived before the per-request deadline.
    #[error("request timed out")]
    Timeout,

    /// The peer (or its transport) closed, or the transport was swapped,
    /// while this request was still outstanding.
    #[error("peer closed while request was outstanding")]
    Closed,
}

impl From<TransportError> for PeerError {
    fn from(e: TransportError) -> Self {
        PeerError::Send(e.to_string())
    }
}
