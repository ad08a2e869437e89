//! End-to-end scenarios for the Peer engine: happy request, error reply,
//! timeout, close-during-request, reconnect, and idle timeout.

use std::sync::Arc;
use std::time::Duration;

use peerwire_config::PeerConfig;
use peerwire_core::test_handler::EchoHandler;
use peerwire_core::test_transport::mock_pair;
use peerwire_core::{Peer, PeerError, TransportEvent};
use peerwire_proto::{Message, Response};
use serde_json::json;

fn config_with(
    base_timeout_ms: u64,
    idle_timeout_ms: Option<u64>,
) -> PeerConfig {
    let mut config = PeerConfig::default();
    config.base_timeout_ms = base_timeout_ms;
    config.idle_timeout_ms = idle_timeout_ms;
    config
}

#[tokio::test]
async fn happy_request_scenario() {
    let (transport, inbound_tx, mut outbound_rx) = mock_pair();
    let handler = Arc::new(EchoHandler::default());
    let peer = Peer::new(
        "e2e-happy",
        json!({"role": "client"}),
        Box::new(transport),
        handler,
        config_with(200, None),
    );

    let call = tokio::spawn({
        let peer = peer.clone();
        async move { peer.request("ping", json!({})).await }
    });

    let sent = outbound_rx.recv().await.unwrap();
    let Message::Request(req) = Message::parse(&sent).unwrap() else { panic!() };
    assert_eq!(req.method, "ping");

    let reply = Message::Response(Response::success(req.id, json!({"pong": true})))
        .to_wire_text()
        .unwrap();
    inbound_tx.send(Ok(TransportEvent::Message(reply))).unwrap();

    assert_eq!(call.await.unwrap().unwrap(), Some(json!({"pong": true})));
}

#[tokio::test]
async fn error_reply_scenario() {
    let (transport, inbound_tx, mut outbound_rx) = mock_pair();
    let handler = Arc::new(EchoHandler::default());
    let peer = Peer::new("e2e-error", json!({}), Box::new(transport), handler, config_with(200, None));

    let call = tokio::spawn({
        let peer = peer.clone();
        async move { peer.request("delete", json!({"id": 1})).await }
    });

    let sent = outbound_rx.recv().await.unwrap();
    let Message::Request(req) = Message::parse(&sent).unwrap() else { panic!() };

    let reply = Message::Response(Response::error(req.id, 403, "forbidden"))
        .to_wire_text()
        .unwrap();
    inbound_tx.send(Ok(TransportEvent::Message(reply))).unwrap();

    let result = call.await.unwrap();
    match result {
        Err(PeerError::Remote { code, reason }) => {
            assert_eq!(code, 403);
            assert_eq!(reason, "forbidden");
        }
        other => panic!("expected a remote error, got {other:?}"),
    }
}

#[tokio::test]
async fn timeout_scenario() {
    let (transport, _inbound_tx, mut outbound_rx) = mock_pair();
    let handler = Arc::new(EchoHandler::default());
    // base 10ms * 15 = 150ms deadline; well under the outer test timeout.
    let peer = Peer::new("e2e-timeout", json!({}), Box::new(transport), handler, config_with(10, None));

    let result = tokio::time::timeout(Duration::from_secs(2), peer.request("slow", json!({})))
        .await
        .expect("peer should settle the request itself, well within 2s");

    assert!(matches!(result, Err(PeerError::Timeout)));
    outbound_rx.recv().await.unwrap();
}

#[tokio::test]
async fn close_during_request_scenario() {
    let (transport, _inbound_tx, mut outbound_rx) = mock_pair();
    let handler = Arc::new(EchoHandler::default());
    let peer = Peer::new("e2e-close", json!({}), Box::new(transport), handler, config_with(5000, None));

    let call = tokio::spawn({
        let peer = peer.clone();
        async move { peer.request("long-running", json!({})).await }
    });
    outbound_rx.recv().await.unwrap();

    peer.close(4000, "shutting down").await;

    assert!(matches!(call.await.unwrap(), Err(PeerError::Closed)));
    assert!(peer.is_closed());

    // Further calls on a closed peer fail fast rather than hang.
    let result = peer.request("after-close", json!({})).await;
    assert!(matches!(result, Err(PeerError::Closed)));
}

#[tokio::test]
async fn reconnect_scenario() {
    let (transport, inbound_tx, mut outbound_rx) = mock_pair();
    let handler = Arc::new(EchoHandler::default());
    let mut config = config_with(200, None);
    config.close_codes.soft_disconnect = 4001;
    let peer = Peer::new("e2e-reconnect", json!({}), Box::new(transport), handler, config);

    let call = tokio::spawn({
        let peer = peer.clone();
        async move { peer.request("in-flight", json!({})).await }
    });
    outbound_rx.recv().await.unwrap();

    inbound_tx
        .send(Ok(TransportEvent::Closed {
            code: 4001,
            reason: "server restarting".into(),
        }))
        .unwrap();

    assert!(matches!(call.await.unwrap(), Err(PeerError::Closed)));

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(peer.is_reconnecting());
    assert!(!peer.is_closed());

    // Requests issued while reconnecting are silently voided, not errored.
    assert_eq!(peer.request("during-gap", json!({})).await.unwrap(), None);

    let (new_transport, new_inbound_tx, mut new_outbound_rx) = mock_pair();
    peer.set_new_transport(Box::new(new_transport)).await.unwrap();
    assert!(!peer.is_reconnecting());

    let call = tokio::spawn({
        let peer = peer.clone();
        async move { peer.request("after-reconnect", json!({"ok": true})).await }
    });
    let sent = new_outbound_rx.recv().await.unwrap();
    let Message::Request(req) = Message::parse(&sent).unwrap() else { panic!() };
    let reply = Message::Response(Response::success(req.id, json!({"ok": true})))
        .to_wire_text()
        .unwrap();
    new_inbound_tx.send(Ok(TransportEvent::Message(reply))).unwrap();

    assert_eq!(call.await.unwrap().unwrap(), Some(json!({"ok": true})));
}

#[tokio::test]
async fn idle_timeout_scenario() {
    let (transport, _inbound_tx, _outbound_rx) = mock_pair();
    let handler = Arc::new(EchoHandler::default());
    let config = config_with(200, Some(150));
    let peer = Peer::new("e2e-idle", json!({}), Box::new(transport), handler.clone(), config);

    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            if peer.is_closed() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("peer should close itself once the idle watchdog fires");

    // The idle watchdog must close with the abnormal code and "Timed out",
    // not the normal-close code/reason used by an explicit `Peer::close`.
    assert_eq!(
        *handler.last_close.lock().unwrap(),
        Some((1006, "Timed out".to_string()))
    );

    assert!(peer.is_closed());
}
