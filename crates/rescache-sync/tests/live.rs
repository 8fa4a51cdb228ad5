//! Live channel behaviour against an in-process WebSocket server.

mod common;

use common::{
    engine, engine_with, eventually, ledger_config, options, unreachable_ws, wait_for,
    ws_listener as listener, MockLedger,
};
use futures::{SinkExt, StreamExt};
use rescache_storage::{BlockStore, MemoryBlockStore};
use rescache_sync::{ErrorKind, LedgerConfig, LiveState, SyncEvent, SyncOptions};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;

#[tokio::test]
async fn update_message_triggers_a_pass() {
    let (listener, url) = listener().await;
    let ledger = Arc::new(MockLedger::with_blocks(10));
    let store = Arc::new(MemoryBlockStore::new());
    let engine = engine(&url, options(100, 2), store.clone(), ledger.clone());
    let mut events = engine.subscribe();

    let (notify_tx, notify_rx) = oneshot::channel::<()>();
    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        notify_rx.await.unwrap();
        ws.send(Message::Text("hello".into())).await.unwrap();
        ws.send(Message::Text(r#"{"type":"Update blocks"}"#.into()))
            .await
            .unwrap();
        // Keep the connection open until the client goes away.
        while let Some(Ok(_)) = ws.next().await {}
    });

    engine.initialize().await.unwrap();
    assert_eq!(engine.cursor(), 10);

    wait_for(&mut events, |e| *e == SyncEvent::Connected).await;
    assert_eq!(engine.live_state(), LiveState::Connected);

    ledger.append(11..=25);
    notify_tx.send(()).unwrap();

    eventually(|| engine.cursor() == 25).await;
    assert_eq!(store.len().unwrap(), 25);

    engine.close().await.unwrap();
    server.await.unwrap();
}

#[tokio::test]
async fn reconnects_after_server_closes() {
    let (listener, url) = listener().await;
    let ledger = Arc::new(MockLedger::with_blocks(1));
    let engine = engine(&url, options(100, 1), Arc::new(MemoryBlockStore::new()), ledger);
    let mut events = engine.subscribe();

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        ws.close(Some(CloseFrame {
            code: CloseCode::Away,
            reason: "restarting".into(),
        }))
        .await
        .unwrap();
        // The client answers the close handshake before dropping the socket.
        let reply = ws.next().await;
        assert!(
            matches!(reply, Some(Ok(Message::Close(_)))),
            "expected a close reply, got {reply:?}"
        );
        while let Some(Ok(_)) = ws.next().await {}

        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        while let Some(Ok(_)) = ws.next().await {}
    });

    engine.initialize().await.unwrap();

    wait_for(&mut events, |e| *e == SyncEvent::Connected).await;
    let event = wait_for(&mut events, |e| matches!(e, SyncEvent::Disconnected { .. })).await;
    assert_eq!(
        event,
        SyncEvent::Disconnected {
            code: 1001,
            reason: "restarting".to_string()
        }
    );
    wait_for(&mut events, |e| *e == SyncEvent::Connected).await;
    assert_eq!(engine.stats().reconnect_attempts, 1);

    engine.close().await.unwrap();
    server.await.unwrap();
}

#[tokio::test]
async fn connect_failure_emits_error_then_disconnected() {
    let url = unreachable_ws().await;
    let ledger = Arc::new(MockLedger::with_blocks(1));
    let engine = engine(&url, options(100, 1), Arc::new(MemoryBlockStore::new()), ledger);
    let mut events = engine.subscribe();

    engine.initialize().await.unwrap();

    let error = wait_for(&mut events, |e| matches!(e, SyncEvent::Error { .. })).await;
    let SyncEvent::Error { kind, message } = error else {
        unreachable!()
    };
    assert_eq!(kind, ErrorKind::Channel);
    assert!(message.starts_with("websocket error"), "{message}");
    let disconnected = wait_for(&mut events, |e| matches!(e, SyncEvent::Disconnected { .. })).await;
    assert!(matches!(
        disconnected,
        SyncEvent::Disconnected { code: 1006, .. }
    ));

    // Backoff keeps retrying: 50ms, 100ms, ...
    eventually(|| engine.stats().reconnect_attempts >= 3).await;

    engine.close().await.unwrap();
}

#[tokio::test]
async fn close_waits_for_in_flight_connect() {
    let (listener, url) = listener().await;
    let ledger = Arc::new(MockLedger::with_blocks(1));
    let store = Arc::new(MemoryBlockStore::new());
    let engine = engine(&url, options(100, 1), store.clone(), ledger);
    let mut events = engine.subscribe();

    let (accepted_tx, accepted_rx) = oneshot::channel::<()>();
    let (closed_tx, closed_rx) = oneshot::channel::<bool>();
    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        accepted_tx.send(()).unwrap();
        // Hold the handshake so the client is still connecting when closed.
        tokio::time::sleep(Duration::from_millis(200)).await;
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        let saw_close = matches!(ws.next().await, Some(Ok(Message::Close(_))) | None);
        closed_tx.send(saw_close).unwrap();
    });

    engine.initialize().await.unwrap();
    accepted_rx.await.unwrap();
    assert_eq!(engine.live_state(), LiveState::Connecting);

    engine.close().await.unwrap();
    engine.close().await.unwrap();

    assert!(closed_rx.await.unwrap(), "socket was left open");
    assert_eq!(engine.live_state(), LiveState::Disconnected);
    assert!(!store.is_connected());

    let mut closed = 0;
    let mut connected = 0;
    while let Ok(event) = events.try_recv() {
        match event {
            SyncEvent::Closed => closed += 1,
            SyncEvent::Connected => connected += 1,
            _ => {}
        }
    }
    assert_eq!(closed, 1);
    assert_eq!(connected, 0);

    server.await.unwrap();
}

#[tokio::test]
async fn reconnect_delay_resets_after_a_successful_connect() {
    let (listener, url) = listener().await;
    let ledger = Arc::new(MockLedger::with_blocks(1));
    let config = LedgerConfig {
        reconnect_interval_ms: 100,
        ..ledger_config(&url)
    };
    let options = SyncOptions {
        max_reconnect_delay_ms: 5_000,
        ..options(100, 1)
    };
    let engine = engine_with(config, options, Arc::new(MemoryBlockStore::new()), ledger);
    let mut events = engine.subscribe();

    let (gap_tx, gap_rx) = oneshot::channel::<Duration>();
    let server = tokio::spawn(async move {
        // Three failed handshakes grow the delay to 100, 200 and 400ms.
        for _ in 0..3 {
            let (stream, _) = listener.accept().await.unwrap();
            drop(stream);
        }

        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        ws.close(Some(CloseFrame {
            code: CloseCode::Away,
            reason: "restarting".into(),
        }))
        .await
        .unwrap();
        while let Some(Ok(_)) = ws.next().await {}
        let closed_at = Instant::now();

        let (stream, _) = listener.accept().await.unwrap();
        gap_tx.send(closed_at.elapsed()).unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        while let Some(Ok(_)) = ws.next().await {}
    });

    engine.initialize().await.unwrap();
    wait_for(&mut events, |e| *e == SyncEvent::Connected).await;

    let gap = tokio::time::timeout(Duration::from_secs(5), gap_rx)
        .await
        .unwrap()
        .unwrap();
    // Back at the base delay; without the reset the fourth attempt waits 800ms.
    assert!(gap >= Duration::from_millis(90), "{gap:?}");
    assert!(gap < Duration::from_millis(500), "{gap:?}");
    assert_eq!(engine.stats().reconnect_attempts, 4);

    engine.close().await.unwrap();
    server.await.unwrap();
}
