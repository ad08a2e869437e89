//! The pending-request table: tracks outstanding requests and guarantees
//! each settles exactly once, whichever of response/timeout/close wins the
//! race.
//!
//! Owned exclusively by the reactor task in [`crate::peer`] — there is no
//! lock here, only single-threaded ownership, which is what makes
//! settle-once free: whichever code path removes an entry from the table is
//! the only one that will ever send on its `oneshot::Sender`.

use std::collections::HashMap;
use std::time::Instant;

use tokio::sync::oneshot;

use crate::error::PeerError;

pub(crate) struct PendingEntry {
    pub method: String,
    pub deadline: Instant,
    respond_to: oneshot::Sender<Result<serde_json::Value, PeerError>>,
}

#[derive(Default)]
pub(crate) struct PendingTable {
    entries: HashMap<u32, PendingEntry>,
}

impl PendingTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn insert(
        &mut self,
        id: u32,
        method: String,
        deadline: Instant,
        respond_to: oneshot::Sender<Result<serde_json::Value, PeerError>>,
    ) {
        self.entries.insert(
            id,
            PendingEntry {
                method,
                deadline,
                respond_to,
            },
        );
    }

    /// Remove and settle one entry with success data. No-op if `id` isn't
    /// outstanding (an orphan response — logged by the caller, not here).
    pub fn settle_success(&mut self, id: u32, data: serde_json::Value) -> bool {
        if let Some(entry) = self.entries.remove(&id) {
            let _ = entry.respond_to.send(Ok(data));
            true
        } else {
            false
        }
    }

    pub fn settle_error(&mut self, id: u32, code: i32, reason: String) -> bool {
        if let Some(entry) = self.entries.remove(&id) {
            let _ = entry.respond_to.send(Err(PeerError::Remote { code, reason }));
            true
        } else {
            false
        }
    }

    /// Remove and settle every entry whose deadline has passed, returning
    /// their ids for logging.
    pub fn sweep_expired(&mut self, now: Instant) -> Vec<u32> {
        let expired: Vec<u32> = self
            .entries
            .iter()
            .filter(|(_, e)| now >= e.deadline)
            .map(|(id, _)| *id)
            .collect();

        for id in &expired {
            if let Some(entry) = self.entries.remove(id) {
                let _ = entry.respond_to.send(Err(PeerError::Timeout));
            }
        }

        expired
    }

    /// Drain every entry, settling each as closed. Used on transport swap
    /// and on peer close — in-flight requests never survive either.
    pub fn drain_as_closed(&mut self) {
        for (_, entry) in self.entries.drain() {
            let _ = entry.respond_to.send(Err(PeerError::Closed));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn settle_success_resolves_the_waiter_once() {
        let mut table = PendingTable::new();
        let (tx, rx) = oneshot::channel();
        table.insert(1, "echo".into(), Instant::now() + Duration::from_secs(5), tx);

        assert!(table.settle_success(1, serde_json::json!({"a": 1})));
        assert_eq!(table.len(), 0);
        let result = rx.await.unwrap();
        assert_eq!(result.unwrap(), serde_json::json!({"a": 1}));
    }

    #[tokio::test]
    async fn settling_an_unknown_id_is_a_harmless_no_op() {
        let mut table = PendingTable::new();
        assert!(!table.settle_success(99, serde_json::json!(null)));
    }

    #[tokio::test]
    async fn sweep_expired_times_out_only_overdue_entries() {
        let mut table = PendingTable::new();
        let (tx1, rx1) = oneshot::channel();
        let (tx2, rx2) = oneshot::channel();
        let now = Instant::now();
        table.insert(1, "a".into(), now - Duration::from_millis(1), tx1);
        table.insert(2, "b".into(), now + Duration::from_secs(60), tx2);

        let expired = table.sweep_expired(now);
        assert_eq!(expired, vec![1]);
        assert_eq!(table.len(), 1);

        assert!(matches!(rx1.await.unwrap(), Err(PeerError::Timeout)));
        drop(rx2); // still pending, dropping is fine
    }

    #[tokio::test]
    async fn drain_as_closed_settles_every_outstanding_entry() {
        let mut table = PendingTable::new();
        let (tx1, rx1) = oneshot::channel();
        let (tx2, rx2) = oneshot::channel();
        table.insert(1, "a".into(), Instant::now() + Duration::from_secs(5), tx1);
        table.insert(2, "b".into(), Instant::now() + Duration::from_secs(5), tx2);

        table.drain_as_closed();
        assert_eq!(table.len(), 0);
        assert!(matches!(rx1.await.unwrap(), Err(PeerError::Closed)));
        assert!(matches!(rx2.await.unwrap(), Err(PeerError::Closed)));
    }
}
