//! Reference [`Transport`](peerwire_core::Transport) over a WebSocket,
//! following the text-frame ping/pong liveness scheme: `"ping"` and
//! `"pong"` are reserved application-level literals, intercepted here and
//! never surfaced to the [`Peer`](peerwire_core::Peer) they're attached to.
//!
//! Built on `tokio-tungstenite`, generic over any duplex byte stream so the
//! same transport works over a plain TCP socket or a TLS-wrapped one.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use peerwire_config::PeerConfig;
use peerwire_core::{Transport, TransportError, TransportEvent};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, trace, warn};

/// A [`Transport`] backed by one WebSocket connection.
///
/// Owns a background task that sends `"ping"` text frames on
/// [`PeerConfig::ping_interval_ms`] and synthesizes a `Closed` event if no
/// `"pong"` arrives within `ping_interval_ms + ping_timeout_ms`.
pub struct WsTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    sink: Arc<Mutex<SplitSink<WebSocketStream<S>, WsMessage>>>,
    stream: SplitStream<WebSocketStream<S>>,
    last_pong: Arc<Mutex<Instant>>,
    dead_rx: mpsc::Receiver<()>,
    _ping_task: JoinHandle<()>,
    closed: Arc<AtomicBool>,
}

impl<S> WsTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    /// Wrap an already-established WebSocket stream and start its liveness
    /// ping task.
    pub fn new(ws: WebSocketStream<S>, config: &PeerConfig) -> Self {
        let (sink, stream) = ws.split();
        let sink = Arc::new(Mutex::new(sink));
        let last_pong = Arc::new(Mutex::new(Instant::now()));
        let (dead_tx, dead_rx) = mpsc::channel(1);
        let closed = Arc::new(AtomicBool::new(false));

        let ping_interval = Duration::from_millis(config.ping_interval_ms);
        let ping_timeout = Duration::from_millis(config.ping_timeout_ms);
        let task_sink = sink.clone();
        let task_last_pong = last_pong.clone();
        let task_closed = closed.clone();

        let ping_task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(ping_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                if task_closed.load(Ordering::Acquire) {
                    break;
                }
                let send_failed = {
                    let mut sink = task_sink.lock().await;
                    sink.send(WsMessage::Text("ping".into())).await.is_err()
                };
                if send_failed {
                    debug!("ws transport: ping send failed, stopping liveness task");
                    task_closed.store(true, Ordering::Release);
                    let _ = dead_tx.send(()).await;
                    break;
                }
                let silence = task_last_pong.lock().await.elapsed();
                if silence > ping_interval + ping_timeout {
                    warn!("ws transport: no pong within {:?}, marking dead", ping_interval + ping_timeout);
                    task_closed.store(true, Ordering::Release);
                    let _ = dead_tx.send(()).await;
                    break;
                }
            }
        });

        Self {
            sink,
            stream,
            last_pong,
            dead_rx,
            _ping_task: ping_task,
            closed,
        }
    }
}

#[async_trait]
impl<S> Transport for WsTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    async fn send(&mut self, text: String) -> Result<(), TransportError> {
        self.sink
            .lock()
            .await
            .send(WsMessage::Text(text))
            .await
            .map_err(|e| TransportError::Send(e.to_string()))
    }

    async fn recv(&mut self) -> Option<Result<TransportEvent, TransportError>> {
        loop {
            tokio::select! {
                biased;

                _ = self.dead_rx.recv() => {
                    self.closed.store(true, Ordering::Release);
                    return Some(Ok(TransportEvent::Closed {
                        code: 1006,
                        reason: "ping liveness timeout".to_string(),
                    }));
                }

                msg = self.stream.next() => {
                    match msg {
                        Some(Ok(WsMessage::Text(text))) => {
                            if text == "pong" {
                                *self.last_pong.lock().await = Instant::now();
                                trace!("ws transport: pong received");
                                return Some(Ok(TransportEvent::Pong));
                            }
                            if text == "ping" {
                                trace!("ws transport: ping received, replying pong");
                                let mut sink = self.sink.lock().await;
                                let _ = sink.send(WsMessage::Text("pong".into())).await;
                                continue;
                            }
                            return Some(Ok(TransportEvent::Message(text)));
                        }
                        Some(Ok(WsMessage::Binary(_))) => {
                            warn!("ws transport: dropping unsupported binary frame");
                            continue;
                        }
                        Some(Ok(WsMessage::Close(frame))) => {
                            self.closed.store(true, Ordering::Release);
                            let (code, reason) = close_frame_parts(frame);
                            return Some(Ok(TransportEvent::Closed { code, reason }));
                        }
                        // Protocol-level ping/pong/frame control is handled by
                        // tungstenite itself before reaching this stream.
                        Some(Ok(_)) => continue,
                        Some(Err(e)) => return Some(Err(TransportError::Send(e.to_string()))),
                        None => {
                            self.closed.store(true, Ordering::Release);
                            return None;
                        }
                    }
                }
            }
        }
    }

    async fn close(&mut self, code: u16, reason: String) -> Result<(), TransportError> {
        self.closed.store(true, Ordering::Release);
        let frame = CloseFrame {
            code: CloseCode::from(code),
            reason: reason.into(),
        };
        self.sink
            .lock()
            .await
            .send(WsMessage::Close(Some(frame)))
            .await
            .map_err(|e| TransportError::Send(e.to_string()))
    }

    async fn drop(&mut self) -> Result<(), TransportError> {
        self.closed.store(true, Ordering::Release);
        let frame = CloseFrame {
            code: CloseCode::from(4001),
            reason: "reconnecting".into(),
        };
        self.sink
            .lock()
            .await
            .send(WsMessage::Close(Some(frame)))
            .await
            .map_err(|e| TransportError::Send(e.to_string()))
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

fn close_frame_parts(frame: Option<CloseFrame<'static>>) -> (u16, String) {
    match frame {
        Some(f) => (f.code.into(), f.reason.to_string()),
        None => (1006, String::new()),
    }
}

/// Connect to a WebSocket URL and wrap it as a [`Transport`].
pub async fn connect(
    url: &str,
    config: &PeerConfig,
) -> Result<WsTransport<MaybeTlsStream<TcpStream>>, TransportError> {
    let (ws, _response) = tokio_tungstenite::connect_async(url)
        .await
        .map_err(|e| TransportError::Send(e.to_string()))?;
    Ok(WsTransport::new(ws, config))
}
