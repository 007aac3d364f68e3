use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::error::TransportError;
use crate::observers::Observers;
use crate::socket::backoff::ReconnectConfig;
use crate::socket::connection_state::ConnectionState;
use crate::socket::transport::{Connector, Transport, WsConnector};

// disconnect 时等待会话任务优雅退出的最长时间，超时直接 abort
const GRACEFUL_CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

/// 自动重连的双工消息通道
///
/// - `connect` 在连接中/已连接时是幂等的，并发调用会被合并
/// - 连接断开后自动进入 `Reconnecting{attempt}`，按指数退避重试
/// - `disconnect` 总是经过 `Disconnecting → Disconnected`，并永久取消本次会话的重连；
///   断开过程中再次 `connect` 时以新会话的状态为准
/// - `send` 不向调用方返回错误，编码失败体现为 `Failed{reason}` 状态
///
/// 通道可以廉价 clone，所有 clone 共享同一个连接；最后一个 clone 被释放时会话任务随之终止。
#[derive(Clone)]
pub struct WebsocketChannel {
    inner: Arc<ChannelInner>,
}

struct ChannelInner {
    shared: Arc<ChannelShared>,
    session: Mutex<Option<Session>>,
}

struct ChannelShared {
    connector: Arc<dyn Connector>,
    config: ReconnectConfig,
    cell: Mutex<StateCell>,
    state_observers: Observers<ConnectionState>,
    message_observers: Observers<String>,
}

struct StateCell {
    state: ConnectionState,
    // 每次 connect/disconnect 递增，旧会话任务的状态变化会被丢弃
    generation: u64,
}

struct Session {
    outbound: mpsc::UnboundedSender<String>,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

enum SessionEnd {
    Shutdown,
    Lost(TransportError),
}

impl WebsocketChannel {
    pub fn new(connector: Arc<dyn Connector>, config: ReconnectConfig) -> Self {
        Self {
            inner: Arc::new(ChannelInner {
                shared: Arc::new(ChannelShared {
                    connector,
                    config,
                    cell: Mutex::new(StateCell {
                        state: ConnectionState::Disconnected,
                        generation: 0,
                    }),
                    state_observers: Observers::new(),
                    message_observers: Observers::new(),
                }),
                session: Mutex::new(None),
            }),
        }
    }

    /// 使用 tokio-tungstenite 作为底层传输
    pub fn websocket(config: ReconnectConfig) -> Self {
        Self::new(Arc::new(WsConnector), config)
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.shared.lock_cell().state.clone()
    }

    /// 订阅连接状态变化
    pub fn subscribe_state(&self) -> mpsc::UnboundedReceiver<ConnectionState> {
        self.inner.shared.state_observers.subscribe()
    }

    /// 订阅收到的原始文本消息
    pub fn subscribe_messages(&self) -> mpsc::UnboundedReceiver<String> {
        self.inner.shared.message_observers.subscribe()
    }

    /// 建立连接，需要在 tokio runtime 内调用
    pub fn connect(&self, endpoint: &str) {
        let mut session_slot = self.inner.lock_session();
        let shared = &self.inner.shared;

        let generation = {
            let mut cell = shared.lock_cell();
            if cell.state.is_active() {
                debug!("连接已在进行中({})，忽略重复的connect", cell.state);
                return;
            }
            cell.generation += 1;
            shared.publish_locked(&mut cell, ConnectionState::Connecting);
            cell.generation
        };

        // Failed 之后的残留会话
        if let Some(old) = session_slot.take() {
            old.stop();
        }

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(run_session(
            Arc::clone(shared),
            generation,
            endpoint.to_string(),
            outbound_rx,
            shutdown_rx,
        ));

        *session_slot = Some(Session {
            outbound: outbound_tx,
            shutdown: shutdown_tx,
            task,
        });
    }

    /// 断开连接并取消所有待执行的重连
    pub async fn disconnect(&self) {
        let session = self.inner.lock_session().take();
        let shared = &self.inner.shared;
        let generation = {
            let mut cell = shared.lock_cell();
            cell.generation += 1;
            shared.publish_locked(&mut cell, ConnectionState::Disconnecting);
            cell.generation
        };

        if let Some(session) = session {
            let _ = session.shutdown.send(true);
            let mut task = session.task;
            if tokio::time::timeout(GRACEFUL_CLOSE_TIMEOUT, &mut task)
                .await
                .is_err()
            {
                warn!("会话任务未能在{:?}内退出，强制终止", GRACEFUL_CLOSE_TIMEOUT);
                task.abort();
            }
        }

        let mut cell = shared.lock_cell();
        // 等待期间已经发起了新的 connect，状态归新会话所有
        if cell.generation != generation {
            debug!("断开期间有新的连接，保留当前状态: {}", cell.state);
            return;
        }
        shared.publish_locked(&mut cell, ConnectionState::Disconnected);
        info!("websocket通道已断开");
    }

    /// 发送一条消息；未连接时静默丢弃
    pub fn send<T: Serialize>(&self, message: &T) {
        let shared = &self.inner.shared;
        let generation = {
            let cell = shared.lock_cell();
            if !cell.state.is_connected() {
                debug!("通道当前状态为{}，丢弃待发送消息", cell.state);
                return;
            }
            cell.generation
        };

        match serde_json::to_string(message) {
            Ok(text) => {
                let session = self.inner.lock_session();
                if let Some(session) = session.as_ref() {
                    if session.outbound.send(text).is_err() {
                        debug!("会话任务已退出，丢弃待发送消息");
                    }
                }
            }
            Err(e) => {
                let reason = TransportError::Encode(e.to_string()).to_string();
                error!("消息编码失败: {}", reason);
                shared.report_encode_failure(generation, reason);
            }
        }
    }
}

impl ChannelInner {
    fn lock_session(&self) -> MutexGuard<'_, Option<Session>> {
        self.session
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Drop for ChannelInner {
    fn drop(&mut self) {
        if let Some(session) = self.lock_session().take() {
            session.stop();
        }
    }
}

impl Session {
    fn stop(self) {
        let _ = self.shutdown.send(true);
        self.task.abort();
    }
}

impl ChannelShared {
    fn lock_cell(&self) -> MutexGuard<'_, StateCell> {
        self.cell
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // 持锁发布，保证所有监听者看到同一个顺序
    fn publish_locked(&self, cell: &mut StateCell, next: ConnectionState) {
        debug!("连接状态: {} -> {}", cell.state, next);
        cell.state = next;
        self.state_observers.publish(&cell.state);
    }

    /// 仅当会话仍是当前会话时才切换状态
    fn transition_for(&self, generation: u64, next: ConnectionState) -> bool {
        let mut cell = self.lock_cell();
        if cell.generation != generation {
            return false;
        }
        self.publish_locked(&mut cell, next);
        true
    }

    fn is_current(&self, generation: u64) -> bool {
        self.lock_cell().generation == generation
    }

    // 编码失败不影响底层会话：报告 Failed 后恢复为 Connected
    fn report_encode_failure(&self, generation: u64, reason: String) {
        let mut cell = self.lock_cell();
        if cell.generation != generation || !cell.state.is_connected() {
            return;
        }
        self.publish_locked(&mut cell, ConnectionState::Failed { reason });
        self.publish_locked(&mut cell, ConnectionState::Connected);
    }
}

async fn run_session(
    shared: Arc<ChannelShared>,
    generation: u64,
    endpoint: String,
    mut outbound: mpsc::UnboundedReceiver<String>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut attempt: u32 = 0;
    loop {
        let connected = tokio::select! {
            _ = shutdown.changed() => return,
            result = shared.connector.connect(&endpoint) => result,
        };

        match connected {
            Ok(transport) => {
                // 断线期间积压的消息已经过期
                while outbound.try_recv().is_ok() {}
                if !shared.transition_for(generation, ConnectionState::Connected) {
                    return;
                }
                attempt = 0;
                info!("✅ websocket连接成功");

                match pump(&shared, transport, &mut outbound, &mut shutdown).await {
                    SessionEnd::Shutdown => return,
                    SessionEnd::Lost(err) => warn!("websocket连接断开: {}", err),
                }
            }
            Err(err) => warn!("websocket连接失败: {}", err),
        }

        if !shared.is_current(generation) {
            return;
        }

        attempt += 1;
        if shared.config.is_exhausted(attempt) {
            error!("❌ 重连{}次仍失败，停止重连", attempt - 1);
            shared.transition_for(
                generation,
                ConnectionState::Failed {
                    reason: format!("reconnection attempts exhausted after {}", attempt - 1),
                },
            );
            return;
        }

        if !shared.transition_for(generation, ConnectionState::Reconnecting { attempt }) {
            return;
        }
        let delay = shared.config.delay_for(attempt);
        info!("🔄 {:?}后进行第{}次重连", delay, attempt);
        tokio::select! {
            _ = shutdown.changed() => return,
            _ = tokio::time::sleep(delay) => {}
        }
    }
}

async fn pump(
    shared: &ChannelShared,
    transport: Transport,
    outbound: &mut mpsc::UnboundedReceiver<String>,
    shutdown: &mut watch::Receiver<bool>,
) -> SessionEnd {
    let Transport {
        mut sink,
        mut stream,
    } = transport;

    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                if let Err(e) = sink.close().await {
                    debug!("关闭websocket失败: {}", e);
                }
                return SessionEnd::Shutdown;
            }
            frame = outbound.recv() => match frame {
                Some(text) => {
                    if let Err(e) = sink.send(text).await {
                        return SessionEnd::Lost(e);
                    }
                }
                None => return SessionEnd::Shutdown,
            },
            incoming = stream.next() => match incoming {
                Some(Ok(text)) => shared.message_observers.publish(&text),
                Some(Err(e)) => return SessionEnd::Lost(e),
                None => return SessionEnd::Lost(TransportError::Closed),
            },
        }
    }
}
