//! Concurrency tests for [`peerwire_core::Peer`].
//!
//! Uses an in-memory mock transport (no real socket) to verify:
//! - Concurrent requests don't block each other at the reactor level
//! - Responses correlate correctly even when answered out of order

use std::sync::Arc;
use std::time::{Duration, Instant};

use peerwire_config::PeerConfig;
use peerwire_core::test_handler::EchoHandler;
use peerwire_core::test_transport::mock_pair;
use peerwire_core::{Peer, TransportEvent};
use peerwire_proto::{Message, Response};
use serde_json::json;
use tokio::sync::Barrier;

fn fast_config() -> PeerConfig {
    let mut config = PeerConfig::default();
    config.base_timeout_ms = 200;
    config.idle_timeout_ms = None;
    config
}

/// Drains one outbound request and replies to it immediately, echoing the
/// request's data back as the success payload.
async fn echo_once(
    outbound: &mut tokio::sync::mpsc::UnboundedReceiver<String>,
    inbound: &tokio::sync::mpsc::UnboundedSender<Result<TransportEvent, peerwire_core::TransportError>>,
) {
    let sent = outbound.recv().await.expect("request was sent");
    let Message::Request(req) = Message::parse(&sent).unwrap() else {
        panic!("expected a request frame")
    };
    let reply = Message::Response(Response::success(req.id, req.data))
        .to_wire_text()
        .unwrap();
    inbound.send(Ok(TransportEvent::Message(reply))).unwrap();
}

#[tokio::test]
async fn concurrent_requests_complete_without_blocking_each_other() {
    let (transport, inbound_tx, mut outbound_rx) = mock_pair();
    let handler = Arc::new(EchoHandler::default());
    let peer = Peer::new("concurrency-1", json!({}), Box::new(transport), handler, fast_config());

    let request_count = 5;
    let barrier = Arc::new(Barrier::new(request_count));
    let mut handles = Vec::new();

    for i in 0..request_count {
        let peer = peer.clone();
        let barrier = barrier.clone();
        handles.push(tokio::spawn(async move {
            barrier.wait().await;
            let start = Instant::now();
            let result = peer.request("echo", json!({"i": i})).await;
            (i, result, start.elapsed())
        }));
    }

    // Respond to all five, in the order the reactor happened to send them.
    for _ in 0..request_count {
        echo_once(&mut outbound_rx, &inbound_tx).await;
    }

    for handle in handles {
        let (i, result, _elapsed) = handle.await.unwrap();
        let value = result.expect("request should not error").expect("not reconnecting");
        assert_eq!(value, json!({"i": i}), "request {i} got the wrong reply");
    }
}

#[tokio::test]
async fn responses_correlate_correctly_when_answered_out_of_order() {
    let (transport, inbound_tx, mut outbound_rx) = mock_pair();
    let handler = Arc::new(EchoHandler::default());
    let peer = Peer::new("concurrency-2", json!({}), Box::new(transport), handler, fast_config());

    let mut handles = Vec::new();
    for i in 0..3 {
        let peer = peer.clone();
        handles.push(tokio::spawn(
            async move { (i, peer.request("echo", json!({"i": i})).await) },
        ));
    }

    // Collect all three outbound requests before replying, then answer in
    // reverse order.
    let mut requests = Vec::new();
    for _ in 0..3 {
        let sent = outbound_rx.recv().await.unwrap();
        let Message::Request(req) = Message::parse(&sent).unwrap() else {
            panic!("expected a request")
        };
        requests.push(req);
    }

    for req in requests.into_iter().rev() {
        let reply = Message::Response(Response::success(req.id, req.data))
            .to_wire_text()
            .unwrap();
        inbound_tx.send(Ok(TransportEvent::Message(reply))).unwrap();
    }

    for handle in handles {
        let (i, result) = handle.await.unwrap();
        let value = result.unwrap().unwrap();
        assert_eq!(value, json!({"i": i}));
    }
}

#[tokio::test]
async fn a_slow_reply_does_not_delay_other_in_flight_requests() {
    let (transport, inbound_tx, mut outbound_rx) = mock_pair();
    let handler = Arc::new(EchoHandler::default());
    let peer = Peer::new("concurrency-3", json!({}), Box::new(transport), handler, fast_config());

    let peer_a = peer.clone();
    let fast = tokio::spawn(async move { peer_a.request("fast", json!(null)).await });
    let peer_b = peer.clone();
    let slow = tokio::spawn(async move { peer_b.request("slow", json!(null)).await });

    let sent_a = outbound_rx.recv().await.unwrap();
    let _sent_b = outbound_rx.recv().await.unwrap();

    let Message::Request(req_a) = Message::parse(&sent_a).unwrap() else { panic!() };
    let reply_a = Message::Response(Response::success(req_a.id, json!("done")))
        .to_wire_text()
        .unwrap();
    inbound_tx.send(Ok(TransportEvent::Message(reply_a))).unwrap();

    let fast_result = tokio::time::timeout(Duration::from_millis(500), fast)
        .await
        .expect("fast request should not be blocked by the still-outstanding slow one")
        .unwrap();
    assert_eq!(fast_result.unwrap(), Some(json!("done")));

    drop(slow); // let it time out in the background; not under test here
}
