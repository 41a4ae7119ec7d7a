//! WebSocket round trips against an in-process server

use std::time::{Duration, Instant};

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::timeout;
use tokio_tungstenite::{accept_async, tungstenite::Message, WebSocketStream};

use runscope_core::config::ConnectionConfig;
use runscope_core::{dispatch, ConnectionEvent, ConnectionManager, Error, ViewerState};

const STEP: Duration = Duration::from_secs(5);

fn fast_config(url: String) -> ConnectionConfig {
    ConnectionConfig {
        url,
        initial_backoff_ms: 10,
        max_backoff_ms: 50,
        jitter_ratio: 0.0,
        max_retries: None,
    }
}

async fn next_event(events: &mut UnboundedReceiver<ConnectionEvent>) -> ConnectionEvent {
    timeout(STEP, events.recv())
        .await
        .expect("timed out waiting for connection event")
        .expect("connection task ended")
}

async fn next_connected(events: &mut UnboundedReceiver<ConnectionEvent>) {
    loop {
        match next_event(events).await {
            ConnectionEvent::Connected => return,
            ConnectionEvent::Reconnecting { .. } => continue,
            other => panic!("expected Connected, got {other:?}"),
        }
    }
}

async fn next_frame(events: &mut UnboundedReceiver<ConnectionEvent>) -> String {
    match next_event(events).await {
        ConnectionEvent::Frame(text) => text,
        other => panic!("expected Frame, got {other:?}"),
    }
}

async fn recv_json<S>(ws: &mut WebSocketStream<S>) -> Value
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
{
    loop {
        let msg = timeout(STEP, ws.next())
            .await
            .expect("timed out waiting for client frame")
            .expect("client went away")
            .expect("websocket error");
        if let Message::Text(text) = msg {
            return serde_json::from_str(&text).expect("client sent invalid JSON");
        }
    }
}

fn run_frame(id: i64) -> String {
    serde_json::json!({
        "type": "Run",
        "data": {
            "id": id,
            "model": "gpt-4o-mini",
            "tag": "",
            "started_at": "2024-05-01 10:00:00",
            "stopped_at": null,
            "state": "in progress",
            "configuration": "{}"
        }
    })
    .to_string()
}

#[tokio::test]
async fn test_subscribe_receive_and_resubscribe_after_drop() {
    runscope_core::logging::init_test();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();
        ws.send(Message::Text(run_frame(7))).await.unwrap();

        let request = recv_json(&mut ws).await;
        assert_eq!(request["type"], "MessageRequest");
        assert_eq!(request["data"]["follow_run"], 7);
        let epoch = request["data"]["epoch"].as_u64().unwrap();

        let message = serde_json::json!({
            "type": "Message",
            "epoch": epoch,
            "data": {"id": 1, "run_id": 7, "role": "assistant", "content": "hello"}
        });
        ws.send(Message::Text(message.to_string())).await.unwrap();
        ws.close(None).await.unwrap();

        // The client comes back and must subscribe again.
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();
        recv_json(&mut ws).await
    });

    let config = fast_config(format!("ws://{addr}/client#7"));
    let manager = ConnectionManager::new(&config).unwrap();
    let (handle, mut events) = manager.spawn(&tokio::runtime::Handle::current());
    let mut state = ViewerState::new(Duration::from_millis(100));

    next_connected(&mut events).await;
    assert!(handle.is_connected());
    assert_eq!(state.on_connected(), None);

    let run = next_frame(&mut events).await;
    assert!(dispatch(&mut state, &run, Instant::now()).is_applied());
    let selection = state.select_now(7).unwrap();
    handle.send(&selection.request()).unwrap();

    let message = next_frame(&mut events).await;
    assert!(dispatch(&mut state, &message, Instant::now()).is_applied());
    assert_eq!(
        state.session().unwrap().trace.get(1).unwrap().content,
        "hello"
    );

    assert!(matches!(
        next_event(&mut events).await,
        ConnectionEvent::Disconnected { .. }
    ));
    assert!(matches!(
        handle.send(&selection.request()),
        Err(Error::NotConnected)
    ));

    next_connected(&mut events).await;
    let again = state.on_connected().unwrap();
    assert_eq!(again.run_id, 7);
    assert_eq!(again.epoch, selection.epoch + 1);
    assert!(state.session().unwrap().trace.is_empty());
    handle.send(&again.request()).unwrap();

    let request = timeout(STEP, server).await.unwrap().unwrap();
    assert_eq!(request["data"]["follow_run"], 7);
    assert_eq!(request["data"]["epoch"].as_u64(), Some(again.epoch));

    handle.shutdown();
    assert!(!handle.is_connected());
}

#[tokio::test]
async fn test_gives_up_after_retry_cap() {
    // Grab a free port and release it so nothing is listening there.
    let addr = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap()
    };

    let config = ConnectionConfig {
        max_retries: Some(1),
        ..fast_config(format!("ws://{addr}/client"))
    };
    let (handle, mut events) = ConnectionManager::new(&config)
        .unwrap()
        .spawn(&tokio::runtime::Handle::current());

    assert!(matches!(
        next_event(&mut events).await,
        ConnectionEvent::Reconnecting { attempt: 2, .. }
    ));
    assert_eq!(
        next_event(&mut events).await,
        ConnectionEvent::GaveUp { attempts: 2 }
    );
    assert!(timeout(STEP, events.recv()).await.unwrap().is_none());

    let request = runscope_core::OutboundRequest::follow_run(1, 1);
    assert!(matches!(handle.send(&request), Err(Error::NotConnected)));
}
