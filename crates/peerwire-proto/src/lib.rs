//! Wire message types and codec for the peerwire RPC protocol.
//!
//! A peerwire message is one of three kinds — [`Request`], [`Response`] and
//! [`Notification`] — carried as a single JSON object per text frame, tagged
//! by which of `request`/`response`/`notification` is set `true`. See
//! [`Message::parse`] for the classification rules.

mod error;
mod id;
mod message;

pub use error::ProtoError;
pub use id::RequestIdGenerator;
pub use message::{Message, Notification, Request, Response};
