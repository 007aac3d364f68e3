use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::app_config::SyncConfig;
use crate::error::ExecutionError;
use crate::observers::Observers;
use crate::socket::{ConnectionState, WebsocketChannel};
use crate::trading::model::PriceQuote;
use crate::trading::store::{AccountStore, AccountUpdate};
use crate::trading::sync::claims::OpenClaims;
use crate::trading::sync::events::SyncEvent;
use crate::trading::sync::protocol::{
    IncomingMessage, MarketDataSubscription, OutgoingMessage, SubscribeRequest,
    SynchronizeRequest, TradeAction, TradeCommand, TradeRequest, TradeResult,
};
use crate::trading::sync::tracker::SyncTracker;

/// 交易指令的网关回报；连接断开时发送端被丢弃
pub type TradeReply = Result<TradeResult, ExecutionError>;

/// 已发出、等待回报的交易指令
#[derive(Debug)]
pub struct PendingTrade {
    pub request_id: String,
    pub reply: oneshot::Receiver<TradeReply>,
}

/// 同步协议处理器
///
/// 负责网关消息与领域事件之间的转换，是账户状态的唯一写入方。
/// 消息按到达顺序在一个任务里处理，订阅者通过各自的通道异步消费，不会阻塞接收。
#[derive(Clone)]
pub struct SynchronizationHandler {
    inner: Arc<HandlerInner>,
}

struct HandlerInner {
    channel: WebsocketChannel,
    store: Arc<AccountStore>,
    account_id: String,
    application: String,
    instance_index: u32,
    host: String,
    session: Mutex<SessionState>,
    symbols: Mutex<BTreeSet<String>>,
    pending_trades: Mutex<HashMap<String, oneshot::Sender<TradeReply>>>,
    claims: Mutex<OpenClaims>,
    events: Observers<SyncEvent>,
    synchronized: watch::Sender<bool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

#[derive(Default)]
struct SessionState {
    tracker: SyncTracker,
    // 当前连接是否已经发出过 subscribe/synchronize
    live: bool,
}

impl SynchronizationHandler {
    pub fn new(channel: WebsocketChannel, store: Arc<AccountStore>, config: &SyncConfig) -> Self {
        let (synchronized, _) = watch::channel(false);
        Self {
            inner: Arc::new(HandlerInner {
                channel,
                store,
                account_id: config.account_id.clone(),
                application: config.application.clone(),
                instance_index: config.instance_index,
                host: config.host.clone(),
                session: Mutex::new(SessionState::default()),
                symbols: Mutex::new(config.symbols.iter().cloned().collect()),
                pending_trades: Mutex::new(HashMap::new()),
                claims: Mutex::new(OpenClaims::default()),
                events: Observers::new(),
                synchronized,
                task: Mutex::new(None),
            }),
        }
    }

    /// 启动消息处理任务，重复调用无副作用
    pub fn start(&self) {
        let mut slot = lock(&self.inner.task);
        if slot.as_ref().map(|t| !t.is_finished()).unwrap_or(false) {
            return;
        }

        let mut states = self.inner.channel.subscribe_state();
        let mut messages = self.inner.channel.subscribe_messages();
        // 订阅之前通道可能已经连上
        if self.inner.channel.state().is_connected() {
            self.inner.on_state(&ConnectionState::Connected);
        }

        let inner = Arc::clone(&self.inner);
        *slot = Some(tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    state = states.recv() => match state {
                        Some(state) => inner.on_state(&state),
                        None => break,
                    },
                    text = messages.recv() => match text {
                        Some(text) => inner.on_frame(&text),
                        None => break,
                    },
                }
            }
            debug!("同步处理任务退出");
        }));
    }

    /// 停止消息处理任务
    pub fn stop(&self) {
        if let Some(task) = lock(&self.inner.task).take() {
            task.abort();
        }
        self.inner.on_connection_lost();
    }

    pub fn account_id(&self) -> &str {
        &self.inner.account_id
    }

    pub fn store(&self) -> &Arc<AccountStore> {
        &self.inner.store
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.inner.channel.state()
    }

    pub fn is_connected(&self) -> bool {
        self.inner.channel.state().is_connected()
    }

    /// 收到与最近一次 synchronize 匹配的 synchronized 后为 true
    pub fn is_synchronized(&self) -> bool {
        self.inner.lock_session().tracker.is_synchronized()
    }

    pub fn subscribe_synchronized(&self) -> watch::Receiver<bool> {
        self.inner.synchronized.subscribe()
    }

    pub fn subscribe_events(&self) -> mpsc::UnboundedReceiver<SyncEvent> {
        self.inner.events.subscribe()
    }

    /// 本次连接收到过报价才返回
    pub fn price(&self, symbol: &str) -> Option<PriceQuote> {
        self.inner.store.price(symbol)
    }

    /// 订阅行情，重连后自动重新订阅
    pub fn subscribe_symbols(&self, symbols: &[String]) {
        let added: Vec<String> = {
            let mut subscribed = lock(&self.inner.symbols);
            symbols
                .iter()
                .map(|s| s.trim())
                .filter(|s| !s.is_empty())
                .filter(|s| subscribed.insert(s.to_string()))
                .map(|s| s.to_string())
                .collect()
        };
        if added.is_empty() || !self.inner.lock_session().live {
            return;
        }
        for symbol in &added {
            self.inner.send_market_data_subscription(symbol);
        }
    }

    pub fn subscribed_symbols(&self) -> Vec<String> {
        lock(&self.inner.symbols).iter().cloned().collect()
    }

    /// 发送交易指令，返回的接收端在收到对应 requestId 的回报时完成
    ///
    /// 开仓指令在 `release_trade` 之前认领带有其 clientId 或回报 id 的新持仓/订单。
    pub fn send_trade(&self, trade: TradeCommand) -> Result<PendingTrade, ExecutionError> {
        if !self.is_connected() {
            return Err(ExecutionError::NotConnected);
        }
        let request_id = Uuid::new_v4().to_string();
        let (tx, rx) = oneshot::channel();
        lock(&self.inner.pending_trades).insert(request_id.clone(), tx);
        if let (TradeAction::Buy | TradeAction::Sell, Some(tag)) =
            (&trade.action_type, trade.client_id.as_deref())
        {
            lock(&self.inner.claims).register(&request_id, tag);
        }

        debug!("发送交易指令: request_id={}, {:?}", request_id, trade.action_type);
        self.inner.channel.send(&OutgoingMessage::Trade(TradeRequest {
            account_id: self.inner.account_id.clone(),
            request_id: request_id.clone(),
            application: self.inner.application.clone(),
            trade,
        }));
        Ok(PendingTrade {
            request_id,
            reply: rx,
        })
    }

    /// 结束对某个交易指令的跟踪
    pub fn release_trade(&self, request_id: &str) {
        lock(&self.inner.pending_trades).remove(request_id);
        lock(&self.inner.claims).release(request_id);
    }
}

impl HandlerInner {
    fn lock_session(&self) -> MutexGuard<'_, SessionState> {
        lock(&self.session)
    }

    fn on_state(&self, state: &ConnectionState) {
        match state {
            ConnectionState::Connected => self.on_connected(),
            // 编码失败会紧接着恢复为 Connected；重连耗尽之前已经经过 Reconnecting
            ConnectionState::Failed { reason } => debug!("连接通道报告失败: {}", reason),
            _ => self.on_connection_lost(),
        }
    }

    fn on_connected(&self) {
        let synchronization_id = Uuid::new_v4().to_string();
        {
            let mut session = self.lock_session();
            if session.live {
                return;
            }
            session.live = true;
            session.tracker.begin(&synchronization_id, &self.account_id);
        }
        self.store.reset_prices();

        info!(
            "连接已建立，开始同步账户: account_id={}, synchronization_id={}",
            self.account_id, synchronization_id
        );
        self.channel.send(&OutgoingMessage::Subscribe(SubscribeRequest {
            account_id: self.account_id.clone(),
            application: self.application.clone(),
            instance_index: self.instance_index,
        }));
        self.channel
            .send(&OutgoingMessage::Synchronize(SynchronizeRequest {
                account_id: self.account_id.clone(),
                synchronization_id,
                host: self.host.clone(),
                keep_alive: true,
            }));

        let symbols: Vec<String> = lock(&self.symbols).iter().cloned().collect();
        for symbol in &symbols {
            self.send_market_data_subscription(symbol);
        }
    }

    fn on_connection_lost(&self) {
        {
            let mut session = self.lock_session();
            if !session.live && !session.tracker.is_synchronized() {
                return;
            }
            session.live = false;
            session.tracker.reset();
        }
        self.synchronized.send_replace(false);
        // 没有连接时报价一律视为未知
        self.store.reset_prices();
        lock(&self.claims).clear();

        let dropped = {
            let mut pending = lock(&self.pending_trades);
            let count = pending.len();
            pending.clear();
            count
        };
        if dropped > 0 {
            warn!("连接断开，{}个交易指令未收到回报", dropped);
        }
    }

    fn send_market_data_subscription(&self, symbol: &str) {
        debug!("订阅行情: {}", symbol);
        self.channel
            .send(&OutgoingMessage::SubscribeToMarketData(MarketDataSubscription {
                account_id: self.account_id.clone(),
                symbol: symbol.to_string(),
                request_id: Uuid::new_v4().to_string(),
            }));
    }

    fn on_frame(&self, text: &str) {
        let message = match IncomingMessage::decode(text) {
            Ok(message) => message,
            Err(e) => {
                warn!("丢弃无法解析的消息: {}", e);
                return;
            }
        };
        if let Some(account_id) = message.account_id() {
            if account_id != self.account_id {
                debug!("忽略其他账户的消息: {} ({})", account_id, message.kind());
                return;
            }
        }
        self.dispatch(message);
    }

    fn dispatch(&self, message: IncomingMessage) {
        match message {
            IncomingMessage::AccountInformation(event) => {
                self.store.replace_account(event.account_information);
            }
            IncomingMessage::Positions(event) => {
                if !self.accepts(event.synchronization_id.as_deref()) {
                    debug!("忽略过期同步的持仓数据");
                    return;
                }
                debug!("全量持仓: {}条", event.positions.len());
                self.store.replace_positions(event.positions);
            }
            IncomingMessage::Orders(event) => {
                if !self.accepts(event.synchronization_id.as_deref()) {
                    debug!("忽略过期同步的挂单数据");
                    return;
                }
                self.store.replace_orders(event.orders);
            }
            IncomingMessage::Prices(event) => {
                let delta = event.account_delta();
                self.store.apply_prices(event.prices, Some(delta));
            }
            IncomingMessage::Update(event) => {
                let claims = lock(&self.claims);
                let outcome = self.store.apply_update(
                    AccountUpdate {
                        account: event.account_information,
                        updated_positions: event.updated_positions,
                        removed_position_ids: event.removed_position_ids,
                        updated_orders: event.updated_orders,
                        completed_order_ids: event.completed_order_ids,
                    },
                    |id, tag| claims.claims(id, tag),
                );
                drop(claims);
                if !outcome.ignored_position_ids.is_empty() {
                    debug!("等待下一次全量同步: {:?}", outcome.ignored_position_ids);
                }
            }
            IncomingMessage::SynchronizationStarted(event) => {
                let accepted = self
                    .lock_session()
                    .tracker
                    .on_started(&event.synchronization_id, &event.account_id);
                if accepted {
                    self.events.publish(&SyncEvent::SynchronizationStarted {
                        synchronization_id: event.synchronization_id,
                    });
                }
            }
            IncomingMessage::Synchronized(event) => {
                let completed = self
                    .lock_session()
                    .tracker
                    .on_synchronized(&event.synchronization_id, &event.account_id);
                if completed {
                    info!("✅ 账户同步完成: {}", event.account_id);
                    self.synchronized.send_replace(true);
                    self.events.publish(&SyncEvent::Synchronized {
                        synchronization_id: event.synchronization_id,
                    });
                }
            }
            IncomingMessage::Deals(event) => {
                if !event.deals.is_empty() {
                    self.events.publish(&SyncEvent::Deals(event.deals));
                }
            }
            IncomingMessage::HistoryOrders(event) => {
                if !event.history_orders.is_empty() {
                    self.events
                        .publish(&SyncEvent::HistoryOrders(event.history_orders));
                }
            }
            IncomingMessage::Response(event) => {
                if event.response.is_success() {
                    lock(&self.claims).record_echo(&event.request_id, &event.response);
                }
                self.resolve_trade(&event.request_id, Ok(event.response));
            }
            IncomingMessage::ProcessingError(event) => {
                warn!(
                    "网关处理失败: request_id={}, {} {}",
                    event.request_id, event.error, event.message
                );
                self.resolve_trade(
                    &event.request_id,
                    Err(ExecutionError::Gateway {
                        code: event.error,
                        message: event.message,
                    }),
                );
            }
            IncomingMessage::Unknown => debug!("忽略未知类型的消息"),
        }
    }

    fn accepts(&self, synchronization_id: Option<&str>) -> bool {
        self.lock_session().tracker.accepts(synchronization_id)
    }

    fn resolve_trade(&self, request_id: &str, reply: TradeReply) {
        let sender = lock(&self.pending_trades).remove(request_id);
        match sender {
            Some(sender) => {
                if sender.send(reply).is_err() {
                    debug!("交易回报无人等待: {}", request_id);
                }
            }
            None => debug!("收到未知请求的交易回报: {}", request_id),
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
