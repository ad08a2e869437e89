//! Application-supplied callbacks for inbound requests and notifications.

use async_trait::async_trait;
use serde_json::Value;

/// Implemented by the application embedding a [`crate::Peer`].
///
/// All three methods run on a detached task spawned per inbound message, not
/// on the reactor task itself — a slow handler delays only its own reply,
/// never the peer's other traffic.
#[async_trait]
pub trait PeerHandler: Send + Sync + 'static {
    /// Handle an inbound request, returning the data for a success response
    /// or `(code, reason)` for an error response.
    async fn on_request(&self, method: &str, data: Value) -> Result<Value, (i32, String)>;

    /// Handle an inbound notification. No reply is possible or expected.
    async fn on_notification(&self, method: &str, data: Value);

    /// Called when a liveness pong is observed on the current transport.
    async fn on_pong(&self) {}

    /// Called once when the peer transitions to closed (either via an
    /// explicit [`crate::Peer::close`] or the transport closing with a
    /// normal/abnormal code rather than a soft-disconnect), carrying the
    /// close code and reason.
    async fn on_close(&self, code: u16, reason: &str) {
        let _ = (code, reason);
    }
}

#[cfg(any(test, feature = "test-util"))]
pub mod mock {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct EchoHandler {
        pub notifications_seen: AtomicUsize,
        pub pongs_seen: AtomicUsize,
        pub closed: AtomicUsize,
        pub last_close: Mutex<Option<(u16, String)>>,
    }

    #[async_trait]
    impl PeerHandler for EchoHandler {
        async fn on_request(&self, method: &str, data: Value) -> Result<Value, (i32, String)> {
            if method == "fail" {
                return Err((400, "requested failure".into()));
            }
            if method == "panic" {
                panic!("handler deliberately panicked");
            }
            Ok(data)
        }

        async fn on_notification(&self, _method: &str, _data: Value) {
            self.notifications_seen.fetch_add(1, Ordering::SeqCst);
        }

        async fn on_pong(&self) {
            self.pongs_seen.fetch_add(1, Ordering::SeqCst);
        }

        async fn on_close(&self, code: u16, reason: &str) {
            self.closed.fetch_add(1, Ordering::SeqCst);
            *self.last_close.lock().unwrap() = Some((code, reason.to_string()));
        }
    }
}
