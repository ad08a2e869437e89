//! Bidirectional RPC peer engine.
//!
//! A [`Peer`] multiplexes requests, responses and notifications over one
//! attached [`Transport`] at a time. Requests are correlated by id and
//! settle exactly once — by response, timeout, or close, whichever comes
//! first. See the crate-level docs on [`peer`] for the reactor-task
//! architecture that makes that guarantee cheap.

mod error;
mod handler;
mod pending;
mod peer;
mod transport;

pub use error::PeerError;
pub use handler::PeerHandler;
pub use peer::Peer;
pub use transport::{BoxTransport, Transport, TransportError, TransportEvent};

#[cfg(any(test, feature = "test-util"))]
pub use handler::mock as test_handler;
#[cfg(any(test, feature = "test-util"))]
pub use transport::mock as test_transport;
