//! The Peer engine: multiplexes requests, responses and notifications over
//! one attached [`Transport`] at a time, behind a reactor task that owns the
//! transport and the pending-request table exclusively.
//!
//! Architecture mirrors a dedicated-reactor RPC client: the transport is
//! never touched from more than one place, callers talk to it over an
//! `mpsc` command channel, and every outstanding request settles exactly
//! once via a `oneshot` channel keyed by request id.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use peerwire_config::PeerConfig;
use peerwire_proto::{Message, Notification, Request, RequestIdGenerator, Response};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, trace, warn};

use crate::error::PeerError;
use crate::handler::PeerHandler;
use crate::pending::PendingTable;
use crate::transport::{BoxTransport, Transport, TransportEvent};

/// Commands the public [`Peer`] handle sends into the reactor task.
enum ReactorCommand {
    Request {
        method: String,
        data: Value,
        respond_to: oneshot::Sender<Result<Value, PeerError>>,
    },
    Notify {
        method: String,
        data: Value,
    },
    SetNewTransport {
        transport: BoxTransport,
        respond_to: oneshot::Sender<()>,
    },
    Close {
        code: u16,
        reason: String,
        respond_to: oneshot::Sender<()>,
    },
    /// A reply or notification generated by a handler task, routed back
    /// through the reactor so the transport only ever has one writer.
    SendText {
        text: String,
    },
}

/// A bidirectional RPC peer.
///
/// Cheap to clone: every clone shares the same reactor task and transport.
#[derive(Clone)]
pub struct Peer {
    id: String,
    data: Value,
    cmd_tx: mpsc::Sender<ReactorCommand>,
    closed: Arc<AtomicBool>,
    reconnecting: Arc<AtomicBool>,
}

impl Peer {
    /// Create a peer already attached to `transport`, driven by `handler`.
    pub fn new(
        id: impl Into<String>,
        data: Value,
        transport: BoxTransport,
        handler: Arc<dyn PeerHandler>,
        config: PeerConfig,
    ) -> Self {
        let id = id.into();
        let (cmd_tx, cmd_rx) = mpsc::channel(256);
        let closed = Arc::new(AtomicBool::new(false));
        let reconnecting = Arc::new(AtomicBool::new(false));

        let reactor_id = id.clone();
        let reactor_closed = closed.clone();
        let reactor_reconnecting = reconnecting.clone();
        let reactor_cmd_tx = cmd_tx.clone();
        tokio::spawn(async move {
            reactor_task(
                reactor_id,
                Some(transport),
                cmd_rx,
                reactor_cmd_tx,
                handler,
                config,
                reactor_closed,
                reactor_reconnecting,
            )
            .await;
        });

        Self {
            id,
            data,
            cmd_tx,
            closed,
            reconnecting,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn data(&self) -> &Value {
        &self.data
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn is_reconnecting(&self) -> bool {
        self.reconnecting.load(Ordering::Acquire)
    }

    /// Send a request and wait for its response.
    ///
    /// Returns `Ok(None)` without sending anything if the peer is currently
    /// reconnecting (no transport attached) — the documented silent-void
    /// behavior for requests issued in that window, rather than an error,
    /// since the caller may simply retry once reconnected.
    pub async fn request(
        &self,
        method: impl Into<String>,
        data: Value,
    ) -> Result<Option<Value>, PeerError> {
        if self.is_reconnecting() {
            return Ok(None);
        }
        let (respond_to, response_rx) = oneshot::channel();
        self.cmd_tx
            .send(ReactorCommand::Request {
                method: method.into(),
                data,
                respond_to,
            })
            .await
            .map_err(|_| PeerError::Closed)?;

        match response_rx.await {
            Ok(Ok(value)) => Ok(Some(value)),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(PeerError::Closed),
        }
    }

    /// Send a notification. Like `request`, a no-op while reconnecting.
    pub async fn notify(&self, method: impl Into<String>, data: Value) -> Result<(), PeerError> {
        if self.is_reconnecting() {
            return Ok(());
        }
        self.cmd_tx
            .send(ReactorCommand::Notify {
                method: method.into(),
                data,
            })
            .await
            .map_err(|_| PeerError::Closed)
    }

    /// Attach a new transport, discarding any requests left outstanding on
    /// the old one. Clears the reconnecting flag on success.
    pub async fn set_new_transport(&self, transport: BoxTransport) -> Result<(), PeerError> {
        let (respond_to, rx) = oneshot::channel();
        self.cmd_tx
            .send(ReactorCommand::SetNewTransport {
                transport,
                respond_to,
            })
            .await
            .map_err(|_| PeerError::Closed)?;
        rx.await.map_err(|_| PeerError::Closed)
    }

    /// Close the peer permanently. All outstanding requests settle with
    /// [`PeerError::Closed`]; future calls to `request`/`notify` return
    /// `PeerError::Closed`.
    pub async fn close(&self, code: u16, reason: impl Into<String>) {
        let (respond_to, rx) = oneshot::channel();
        if self
            .cmd_tx
            .send(ReactorCommand::Close {
                code,
                reason: reason.into(),
                respond_to,
            })
            .await
            .is_ok()
        {
            let _ = rx.await;
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn reactor_task(
    name: String,
    mut transport: Option<BoxTransport>,
    mut cmd_rx: mpsc::Receiver<ReactorCommand>,
    self_tx: mpsc::Sender<ReactorCommand>,
    handler: Arc<dyn PeerHandler>,
    config: PeerConfig,
    closed: Arc<AtomicBool>,
    reconnecting: Arc<AtomicBool>,
) {
    let mut pending = PendingTable::new();
    let ids = RequestIdGenerator::new();
    let mut last_msg_time = Instant::now();

    let mut sweep_interval = tokio::time::interval(Duration::from_millis(500));
    sweep_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    let mut idle_check = tokio::time::interval(Duration::from_secs(1));
    idle_check.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    debug!("{name}: reactor started");

    // An already-closed transport handed to us at attach time (construction
    // or a prior setNewTransport) never gets a chance to produce its own
    // `Closed` event, so the reactor declares the peer closed itself rather
    // than falling through to the generic "stream ended" branch below.
    if transport.as_deref().is_some_and(|t| t.is_closed()) {
        debug!("{name}: attached transport was already closed");
        closed.store(true, Ordering::Release);
        handler
            .on_close(config.close_codes.abnormal, "transport already closed")
            .await;
        return;
    }

    loop {
        if closed.load(Ordering::Acquire) {
            break;
        }

        tokio::select! {
            biased;

            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(ReactorCommand::Request { method, data, respond_to }) => {
                        let Some(t) = transport.as_mut() else {
                            // Reconnecting is checked by the handle before
                            // sending, but the state could have changed in
                            // the meantime; settle harmlessly rather than
                            // register a request with no transport to serve it.
                            let _ = respond_to.send(Err(PeerError::Closed));
                            continue;
                        };
                        let id = ids.next_id();
                        let timeout = Duration::from_millis(config.request_timeout_ms(pending.len()));
                        let msg = Message::Request(Request::new(id, &method, data));
                        match msg.to_wire_text() {
                            Ok(text) => {
                                trace!("{name}: sending request {id} ({method})");
                                if let Err(e) = t.send(text).await {
                                    let _ = respond_to.send(Err(PeerError::Send(e.to_string())));
                                } else {
                                    pending.insert(id, method, Instant::now() + timeout, respond_to);
                                }
                            }
                            Err(e) => {
                                let _ = respond_to.send(Err(PeerError::Send(e.to_string())));
                            }
                        }
                    }
                    Some(ReactorCommand::Notify { method, data }) => {
                        let Some(t) = transport.as_mut() else { continue };
                        let msg = Message::Notification(Notification::new(&method, data));
                        if let Ok(text) = msg.to_wire_text() {
                            if let Err(e) = t.send(text).await {
                                warn!("{name}: notify {method} failed: {e}");
                            }
                        }
                    }
                    Some(ReactorCommand::SendText { text }) => {
                        if let Some(t) = transport.as_mut() {
                            if let Err(e) = t.send(text).await {
                                warn!("{name}: failed to send reply: {e}");
                            }
                        }
                    }
                    Some(ReactorCommand::SetNewTransport { mut transport: new_transport, respond_to }) => {
                        debug!("{name}: transport swapped, discarding in-flight requests");
                        if let Some(old) = transport.as_mut() {
                            let _ = old.drop().await;
                        }
                        pending.drain_as_closed();
                        if new_transport.is_closed() {
                            debug!("{name}: newly attached transport was already closed");
                            transport = Some(new_transport);
                            reconnecting.store(false, Ordering::Release);
                            closed.store(true, Ordering::Release);
                            handler
                                .on_close(config.close_codes.abnormal, "transport already closed")
                                .await;
                            let _ = respond_to.send(());
                            break;
                        }
                        transport = Some(new_transport);
                        reconnecting.store(false, Ordering::Release);
                        let _ = respond_to.send(());
                    }
                    Some(ReactorCommand::Close { code, reason, respond_to }) => {
                        debug!("{name}: closing ({code}: {reason})");
                        if let Some(t) = transport.as_mut() {
                            let _ = t.close(code, reason.clone()).await;
                        }
                        pending.drain_as_closed();
                        closed.store(true, Ordering::Release);
                        handler.on_close(code, &reason).await;
                        let _ = respond_to.send(());
                        break;
                    }
                    None => {
                        debug!("{name}: command channel closed, reactor exiting");
                        break;
                    }
                }
            }

            event = recv_or_pending(&mut transport) => {
                match event {
                    Some(Ok(TransportEvent::Message(text))) => {
                        last_msg_time = Instant::now();
                        handle_inbound_text(&name, &text, &mut pending, &handler, &self_tx);
                    }
                    Some(Ok(TransportEvent::Pong)) => {
                        last_msg_time = Instant::now();
                        trace!("{name}: pong received");
                        let handler = handler.clone();
                        tokio::spawn(async move {
                            handler.on_pong().await;
                        });
                    }
                    Some(Ok(TransportEvent::Closed { code, reason })) => {
                        if code == config.close_codes.soft_disconnect {
                            debug!("{name}: transport soft-disconnected, reconnecting");
                            reconnecting.store(true, Ordering::Release);
                            transport = None;
                            pending.drain_as_closed();
                        } else {
                            debug!("{name}: transport closed ({code}: {reason}), peer closing");
                            pending.drain_as_closed();
                            closed.store(true, Ordering::Release);
                            handler.on_close(code, &reason).await;
                            break;
                        }
                    }
                    Some(Err(e)) => {
                        warn!("{name}: transport receive error: {e}");
                    }
                    None => {
                        debug!("{name}: transport stream ended, peer closing");
                        pending.drain_as_closed();
                        closed.store(true, Ordering::Release);
                        handler
                            .on_close(config.close_codes.abnormal, "transport stream ended")
                            .await;
                        break;
                    }
                }
            }

            _ = sweep_interval.tick() => {
                let expired = pending.sweep_expired(Instant::now());
                if !expired.is_empty() {
                    debug!("{name}: {} request(s) timed out", expired.len());
                }
            }

            _ = idle_check.tick() => {
                if let Some(idle_timeout_ms) = config.idle_timeout_ms {
                    if last_msg_time.elapsed() >= Duration::from_millis(idle_timeout_ms) {
                        debug!("{name}: idle timeout exceeded, closing");
                        if let Some(t) = transport.as_mut() {
                            let _ = t.drop().await;
                        }
                        pending.drain_as_closed();
                        closed.store(true, Ordering::Release);
                        handler.on_close(config.close_codes.abnormal, "Timed out").await;
                        break;
                    }
                }
            }
        }
    }

    debug!("{name}: reactor exiting");
}

async fn recv_or_pending(
    transport: &mut Option<BoxTransport>,
) -> Option<Result<TransportEvent, crate::transport::TransportError>> {
    match transport {
        Some(t) => t.recv().await,
        None => std::future::pending().await,
    }
}

fn handle_inbound_text(
    name: &str,
    text: &str,
    pending: &mut PendingTable,
    handler: &Arc<dyn PeerHandler>,
    self_tx: &mpsc::Sender<ReactorCommand>,
) {
    let message = match Message::parse(text) {
        Ok(m) => m,
        Err(e) => {
            warn!("{name}: dropping malformed inbound frame: {e}");
            return;
        }
    };

    match message {
        Message::Response(resp) => {
            let id = resp.id();
            let settled = match resp.into_result() {
                Ok(data) => pending.settle_success(id, data),
                Err((code, reason)) => pending.settle_error(id, code, reason),
            };
            if !settled {
                debug!("{name}: discarding orphan response for id {id}");
            }
        }
        Message::Request(req) => {
            let handler = handler.clone();
            let self_tx = self_tx.clone();
            let id = req.id;
            let method = req.method;
            let data = req.data;
            tokio::spawn(async move {
                // Spawned a second time so a panic inside the handler is
                // caught as a `JoinError` here rather than taking down this
                // reply task (and silently starving the caller of any
                // response at all).
                let call_handler = handler.clone();
                let call = tokio::spawn(async move { call_handler.on_request(&method, data).await });
                let reply = match call.await {
                    Ok(Ok(data)) => Response::success(id, data),
                    Ok(Err((code, reason))) => Response::error(id, code, reason),
                    Err(join_err) => {
                        warn!("request handler panicked: {join_err}");
                        Response::error(id, 500, join_err.to_string())
                    }
                };
                if let Ok(text) = Message::Response(reply).to_wire_text() {
                    let _ = self_tx.send(ReactorCommand::SendText { text }).await;
                }
            });
        }
        Message::Notification(note) => {
            let handler = handler.clone();
            tokio::spawn(async move {
                handler.on_notification(&note.method, note.data).await;
            });
        }
    }
}
