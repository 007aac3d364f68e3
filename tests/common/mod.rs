#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio::time::timeout;

use rust_trade_sync::app_config::SyncConfig;
use rust_trade_sync::error::TransportError;
use rust_trade_sync::socket::{ConnectionState, Connector, ReconnectConfig, Transport};
use rust_trade_sync::trading::TradingCore;

pub const ACCOUNT_ID: &str = "acct-1";
pub const ENDPOINT: &str = "ws://mock.gateway/ws";
pub const WAIT: Duration = Duration::from_secs(2);

/// 每次 connect 的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Accept,
    Refuse,
}

/// 按脚本返回连接结果的内存连接器
pub struct MockConnector {
    script: Mutex<VecDeque<Outcome>>,
    fallback: Outcome,
    attempts: AtomicUsize,
    sessions: mpsc::UnboundedSender<MockSession>,
}

impl MockConnector {
    pub fn new(
        script: Vec<Outcome>,
        fallback: Outcome,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<MockSession>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let connector = Arc::new(Self {
            script: Mutex::new(script.into_iter().collect()),
            fallback,
            attempts: AtomicUsize::new(0),
            sessions: tx,
        });
        (connector, rx)
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self, _endpoint: &str) -> Result<Transport, TransportError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let outcome = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(self.fallback);
        match outcome {
            Outcome::Refuse => Err(TransportError::Connect("connection refused".to_string())),
            Outcome::Accept => {
                let (client_tx, server_rx) = futures_channel::mpsc::unbounded::<String>();
                let (server_tx, client_rx) =
                    futures_channel::mpsc::unbounded::<Result<String, TransportError>>();
                let _ = self.sessions.send(MockSession {
                    outgoing: server_rx,
                    incoming: server_tx,
                });
                let sink = client_tx.sink_map_err(|e| TransportError::Io(e.to_string()));
                Ok(Transport::new(Box::pin(sink), Box::pin(client_rx)))
            }
        }
    }
}

/// 网关一侧的连接；drop 即模拟连接断开
pub struct MockSession {
    outgoing: futures_channel::mpsc::UnboundedReceiver<String>,
    incoming: futures_channel::mpsc::UnboundedSender<Result<String, TransportError>>,
}

impl MockSession {
    pub fn send_json(&self, value: Value) {
        self.send_text(&value.to_string());
    }

    pub fn send_text(&self, text: &str) {
        self.incoming
            .unbounded_send(Ok(text.to_string()))
            .expect("client side closed");
    }

    /// 客户端发出的下一帧
    pub async fn next_frame(&mut self) -> Option<Value> {
        let text = timeout(WAIT, self.outgoing.next()).await.ok()??;
        serde_json::from_str(&text).ok()
    }

    /// 跳过其他类型，直到收到指定类型的帧
    pub async fn expect_type(&mut self, kind: &str) -> Value {
        loop {
            let frame = self
                .next_frame()
                .await
                .unwrap_or_else(|| panic!("no `{}` frame received", kind));
            if frame["type"] == kind {
                return frame;
            }
        }
    }

    /// 短时间内没有新帧
    pub async fn assert_silent(&mut self, wait: Duration) {
        if let Ok(Some(text)) = timeout(wait, self.outgoing.next()).await {
            panic!("unexpected frame: {}", text);
        }
    }
}

pub fn fast_reconnect(max_attempts: Option<u32>) -> ReconnectConfig {
    ReconnectConfig {
        base_delay: Duration::from_millis(20),
        max_delay: Duration::from_millis(80),
        max_attempts,
    }
}

pub fn test_config() -> SyncConfig {
    let mut config = SyncConfig::new(ENDPOINT, ACCOUNT_ID, "token");
    config.reconnect = fast_reconnect(None);
    config.execution.confirmation_timeout = Duration::from_secs(2);
    config
}

pub async fn next_state(rx: &mut mpsc::UnboundedReceiver<ConnectionState>) -> ConnectionState {
    timeout(WAIT, rx.recv())
        .await
        .expect("timed out waiting for connection state")
        .expect("state stream closed")
}

pub async fn expect_states(
    rx: &mut mpsc::UnboundedReceiver<ConnectionState>,
    expected: &[ConnectionState],
) {
    for state in expected {
        assert_eq!(&next_state(rx).await, state);
    }
}

pub async fn next_session(rx: &mut mpsc::UnboundedReceiver<MockSession>) -> MockSession {
    timeout(WAIT, rx.recv())
        .await
        .expect("timed out waiting for session")
        .expect("connector dropped")
}

pub fn position_json(id: &str, side: &str, symbol: &str, volume: f64, open_price: f64) -> Value {
    json!({
        "id": id,
        "type": side,
        "symbol": symbol,
        "volume": volume,
        "openPrice": open_price,
        "currentPrice": open_price,
        "profit": 0,
        "swap": 0,
        "commission": 0,
        "time": chrono::Utc::now().to_rfc3339(),
    })
}

/// 完成 subscribe/synchronize 握手并推送一份全量数据，返回 synchronizationId
pub async fn synchronize(core: &TradingCore, session: &mut MockSession, positions: Vec<Value>) -> String {
    let subscribe = session.expect_type("subscribe").await;
    assert_eq!(subscribe["accountId"], ACCOUNT_ID);
    let synchronize = session.expect_type("synchronize").await;
    let sync_id = synchronize["synchronizationId"]
        .as_str()
        .expect("synchronizationId")
        .to_string();

    session.send_json(json!({
        "type": "synchronizationStarted",
        "accountId": ACCOUNT_ID,
        "synchronizationId": sync_id,
    }));
    session.send_json(json!({
        "type": "accountInformation",
        "accountId": ACCOUNT_ID,
        "accountInformation": {
            "broker": "Demo Broker",
            "currency": "USD",
            "balance": 10000,
            "equity": 10000,
            "margin": 0,
            "freeMargin": 10000,
            "leverage": 100,
            "tradeAllowed": true
        }
    }));
    session.send_json(json!({
        "type": "positions",
        "accountId": ACCOUNT_ID,
        "synchronizationId": sync_id,
        "positions": positions,
    }));
    session.send_json(json!({
        "type": "orders",
        "accountId": ACCOUNT_ID,
        "synchronizationId": sync_id,
        "orders": [],
    }));
    session.send_json(json!({
        "type": "synchronized",
        "accountId": ACCOUNT_ID,
        "synchronizationId": sync_id,
    }));

    let mut synchronized = core.handler().subscribe_synchronized();
    timeout(WAIT, synchronized.wait_for(|s| *s))
        .await
        .expect("timed out waiting for synchronization")
        .expect("handler dropped");
    sync_id
}

/// 建立连接并完成同步
pub async fn connected_core(
    config: SyncConfig,
    positions: Vec<Value>,
) -> (Arc<TradingCore>, MockSession, mpsc::UnboundedReceiver<MockSession>, Arc<MockConnector>) {
    let (connector, mut sessions) = MockConnector::new(vec![], Outcome::Accept);
    let core = Arc::new(TradingCore::with_connector(config, connector.clone()));
    core.connect();
    let mut session = next_session(&mut sessions).await;
    synchronize(&core, &mut session, positions).await;
    (core, session, sessions, connector)
}
