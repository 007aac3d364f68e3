mod common;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use common::*;
use rust_trade_sync::socket::{ConnectionState, WebsocketChannel};

#[tokio::test]
async fn test_reconnects_with_increasing_attempts() {
    let (connector, mut sessions) =
        MockConnector::new(vec![Outcome::Accept, Outcome::Refuse, Outcome::Accept], Outcome::Refuse);
    let channel = WebsocketChannel::new(connector.clone(), fast_reconnect(None));
    let mut states = channel.subscribe_state();

    channel.connect(ENDPOINT);
    expect_states(&mut states, &[ConnectionState::Connecting, ConnectionState::Connected]).await;

    // 网关断开
    let session = next_session(&mut sessions).await;
    drop(session);

    expect_states(
        &mut states,
        &[
            ConnectionState::Reconnecting { attempt: 1 },
            ConnectionState::Reconnecting { attempt: 2 },
            ConnectionState::Connected,
        ],
    )
    .await;
    assert_eq!(connector.attempts(), 3);
    assert!(channel.state().is_connected());
    let _session = next_session(&mut sessions).await;
}

#[tokio::test]
async fn test_failed_after_max_attempts() {
    let (connector, mut sessions) = MockConnector::new(vec![Outcome::Accept], Outcome::Refuse);
    let channel = WebsocketChannel::new(connector.clone(), fast_reconnect(Some(2)));
    let mut states = channel.subscribe_state();

    channel.connect(ENDPOINT);
    expect_states(&mut states, &[ConnectionState::Connecting, ConnectionState::Connected]).await;
    drop(next_session(&mut sessions).await);

    expect_states(
        &mut states,
        &[
            ConnectionState::Reconnecting { attempt: 1 },
            ConnectionState::Reconnecting { attempt: 2 },
        ],
    )
    .await;
    match next_state(&mut states).await {
        ConnectionState::Failed { reason } => assert!(reason.contains("exhausted")),
        other => panic!("expected Failed, got {:?}", other),
    }

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(states.try_recv().is_err());
    assert_eq!(connector.attempts(), 3);
}

#[tokio::test]
async fn test_initial_connect_failure_retries() {
    let (connector, mut sessions) =
        MockConnector::new(vec![Outcome::Refuse, Outcome::Accept], Outcome::Refuse);
    let channel = WebsocketChannel::new(connector, fast_reconnect(None));
    let mut states = channel.subscribe_state();

    channel.connect(ENDPOINT);
    expect_states(
        &mut states,
        &[
            ConnectionState::Connecting,
            ConnectionState::Reconnecting { attempt: 1 },
            ConnectionState::Connected,
        ],
    )
    .await;
    let _session = next_session(&mut sessions).await;
}

#[tokio::test]
async fn test_disconnect_during_reconnecting_cancels_retries() {
    let (connector, mut sessions) = MockConnector::new(vec![Outcome::Accept], Outcome::Refuse);
    let channel = WebsocketChannel::new(connector.clone(), fast_reconnect(None));
    let mut states = channel.subscribe_state();

    channel.connect(ENDPOINT);
    expect_states(&mut states, &[ConnectionState::Connecting, ConnectionState::Connected]).await;
    drop(next_session(&mut sessions).await);
    expect_states(&mut states, &[ConnectionState::Reconnecting { attempt: 1 }]).await;

    channel.disconnect().await;

    // 断开前可能还排着几次重连状态，之后只能是 Disconnecting → Disconnected
    let mut observed = Vec::new();
    while let Ok(state) = states.try_recv() {
        observed.push(state);
    }
    let tail = &observed[observed.len() - 2..];
    assert_eq!(
        tail,
        &[ConnectionState::Disconnecting, ConnectionState::Disconnected]
    );

    let attempts = connector.attempts();
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(states.try_recv().is_err(), "no state change after disconnect");
    assert_eq!(connector.attempts(), attempts);
    assert_eq!(channel.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_connect_is_idempotent() {
    let (connector, mut sessions) = MockConnector::new(vec![Outcome::Accept], Outcome::Refuse);
    let channel = WebsocketChannel::new(connector.clone(), fast_reconnect(None));
    let mut states = channel.subscribe_state();

    channel.connect(ENDPOINT);
    channel.connect(ENDPOINT);
    expect_states(&mut states, &[ConnectionState::Connecting, ConnectionState::Connected]).await;
    channel.connect(ENDPOINT);

    let _session = next_session(&mut sessions).await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(states.try_recv().is_err());
    assert_eq!(connector.attempts(), 1);
}

#[tokio::test]
async fn test_disconnect_without_connection() {
    let (connector, _sessions) = MockConnector::new(vec![], Outcome::Refuse);
    let channel = WebsocketChannel::new(connector, fast_reconnect(None));
    let mut states = channel.subscribe_state();

    channel.disconnect().await;
    expect_states(
        &mut states,
        &[ConnectionState::Disconnecting, ConnectionState::Disconnected],
    )
    .await;
}

#[tokio::test]
async fn test_send_while_disconnected_is_noop() {
    let (connector, _sessions) = MockConnector::new(vec![], Outcome::Accept);
    let channel = WebsocketChannel::new(connector.clone(), fast_reconnect(None));
    let mut states = channel.subscribe_state();

    channel.send(&json!({"type": "subscribe", "accountId": ACCOUNT_ID}));

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(states.try_recv().is_err());
    assert_eq!(channel.state(), ConnectionState::Disconnected);
    assert_eq!(connector.attempts(), 0);
}

#[tokio::test]
async fn test_encode_failure_reports_failed() {
    let (connector, mut sessions) = MockConnector::new(vec![Outcome::Accept], Outcome::Refuse);
    let channel = WebsocketChannel::new(connector, fast_reconnect(None));
    let mut states = channel.subscribe_state();

    channel.connect(ENDPOINT);
    expect_states(&mut states, &[ConnectionState::Connecting, ConnectionState::Connected]).await;
    let mut session = next_session(&mut sessions).await;

    // JSON 对象的 key 只能是字符串
    let mut unencodable: HashMap<Vec<u8>, u8> = HashMap::new();
    unencodable.insert(vec![1, 2], 3);
    channel.send(&unencodable);

    match next_state(&mut states).await {
        ConnectionState::Failed { reason } => assert!(!reason.is_empty()),
        other => panic!("expected Failed, got {:?}", other),
    }
    expect_states(&mut states, &[ConnectionState::Connected]).await;

    // 会话仍然可用
    channel.send(&json!({"type": "ping"}));
    let frame = session.next_frame().await.expect("frame after encode failure");
    assert_eq!(frame["type"], "ping");
}

#[tokio::test]
async fn test_incoming_frames_are_published() {
    let (connector, mut sessions) = MockConnector::new(vec![Outcome::Accept], Outcome::Refuse);
    let channel = WebsocketChannel::new(connector, fast_reconnect(None));
    let mut messages = channel.subscribe_messages();

    channel.connect(ENDPOINT);
    let session = next_session(&mut sessions).await;
    session.send_text("first");
    session.send_text("second");

    let first = tokio::time::timeout(WAIT, messages.recv()).await.unwrap();
    let second = tokio::time::timeout(WAIT, messages.recv()).await.unwrap();
    assert_eq!(first.as_deref(), Some("first"));
    assert_eq!(second.as_deref(), Some("second"));
}

#[tokio::test]
async fn test_dropping_channel_stops_session() {
    let (connector, mut sessions) = MockConnector::new(vec![Outcome::Accept], Outcome::Refuse);
    let channel = WebsocketChannel::new(connector.clone(), fast_reconnect(None));
    channel.connect(ENDPOINT);
    let session = next_session(&mut sessions).await;

    drop(channel);
    drop(session);
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(connector.attempts(), 1);
    assert_eq!(Arc::strong_count(&connector), 1);
}

#[tokio::test]
async fn test_connect_during_disconnect_keeps_new_session() {
    let (connector, mut sessions) = MockConnector::new(vec![], Outcome::Accept);
    let channel = WebsocketChannel::new(connector.clone(), fast_reconnect(None));
    let mut states = channel.subscribe_state();

    channel.connect(ENDPOINT);
    expect_states(&mut states, &[ConnectionState::Connecting, ConnectionState::Connected]).await;
    let _first = next_session(&mut sessions).await;

    // 一看到 Disconnecting 就重新连接
    let mut watched = channel.subscribe_state();
    let reconnecting = channel.clone();
    let watcher = tokio::spawn(async move {
        while let Some(state) = watched.recv().await {
            if state == ConnectionState::Disconnecting {
                reconnecting.connect(ENDPOINT);
                return;
            }
        }
    });

    channel.disconnect().await;
    watcher.await.unwrap();
    let mut second = next_session(&mut sessions).await;

    let mut last = None;
    while let Ok(Some(state)) =
        tokio::time::timeout(Duration::from_millis(100), states.recv()).await
    {
        last = Some(state);
    }
    assert_eq!(last, Some(ConnectionState::Connected));
    assert_eq!(channel.state(), ConnectionState::Connected);
    assert_eq!(connector.attempts(), 2);

    channel.send(&json!({"type": "ping"}));
    let frame = second.next_frame().await.expect("frame on the new session");
    assert_eq!(frame["type"], "ping");
}
