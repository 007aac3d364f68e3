use std::sync::Arc;

use rust_decimal::Decimal;
use tokio::sync::mpsc;
use tracing::info;

use crate::app_config::SyncConfig;
use crate::error::ExecutionError;
use crate::socket::{ConnectionState, Connector, WebsocketChannel, WsConnector};
use crate::trading::execution::{ExecutionConfirmation, ExecutionState, TradeExecutionCoordinator};
use crate::trading::model::{AccountSnapshot, ExecutionRequest, PriceQuote};
use crate::trading::store::{AccountStore, PositionSet};
use crate::trading::sync::{SyncEvent, SynchronizationHandler};

/// 交易同步核心
///
/// 启动时构造一次，持有连接通道、同步处理器、账户状态与交易执行器，
/// 以依赖注入的方式交给上层使用，退出时调用 `shutdown`。
pub struct TradingCore {
    config: SyncConfig,
    channel: WebsocketChannel,
    store: Arc<AccountStore>,
    handler: SynchronizationHandler,
    coordinator: Arc<TradeExecutionCoordinator>,
}

impl TradingCore {
    pub fn new(config: SyncConfig) -> Self {
        Self::with_connector(config, Arc::new(WsConnector))
    }

    pub fn with_connector(config: SyncConfig, connector: Arc<dyn Connector>) -> Self {
        let channel = WebsocketChannel::new(connector, config.reconnect.clone());
        let store = Arc::new(AccountStore::new());
        let handler = SynchronizationHandler::new(channel.clone(), Arc::clone(&store), &config);
        let coordinator = Arc::new(TradeExecutionCoordinator::new(
            handler.clone(),
            Arc::clone(&store),
            config.execution.clone(),
        ));
        Self {
            config,
            channel,
            store,
            handler,
            coordinator,
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn channel(&self) -> &WebsocketChannel {
        &self.channel
    }

    pub fn store(&self) -> &Arc<AccountStore> {
        &self.store
    }

    pub fn handler(&self) -> &SynchronizationHandler {
        &self.handler
    }

    pub fn coordinator(&self) -> &Arc<TradeExecutionCoordinator> {
        &self.coordinator
    }

    /// 连接网关并开始同步
    pub fn connect(&self) {
        self.handler.start();
        info!(
            "连接交易网关: endpoint={}, account_id={}",
            self.config.endpoint, self.config.account_id
        );
        self.channel.connect(&self.config.connect_url());
    }

    pub async fn disconnect(&self) {
        self.channel.disconnect().await;
    }

    pub fn subscribe_symbols(&self, symbols: &[String]) {
        self.handler.subscribe_symbols(symbols);
    }

    pub async fn submit_execution(
        &self,
        request: ExecutionRequest,
    ) -> Result<ExecutionConfirmation, ExecutionError> {
        self.coordinator.submit_execution(request).await
    }

    pub async fn close_position(
        &self,
        position_id: &str,
    ) -> Result<ExecutionConfirmation, ExecutionError> {
        self.coordinator.close_position(position_id).await
    }

    pub async fn modify_position(
        &self,
        position_id: &str,
        stop_loss: Option<Decimal>,
        take_profit: Option<Decimal>,
    ) -> Result<ExecutionConfirmation, ExecutionError> {
        self.coordinator
            .modify_position(position_id, stop_loss, take_profit)
            .await
    }

    pub fn subscribe_connection_state(&self) -> mpsc::UnboundedReceiver<ConnectionState> {
        self.channel.subscribe_state()
    }

    pub fn subscribe_prices(&self, symbol: &str) -> mpsc::UnboundedReceiver<PriceQuote> {
        self.store.subscribe_price(symbol)
    }

    pub fn subscribe_positions(&self) -> mpsc::UnboundedReceiver<PositionSet> {
        self.store.subscribe_positions()
    }

    pub fn subscribe_account(&self) -> mpsc::UnboundedReceiver<AccountSnapshot> {
        self.store.subscribe_account()
    }

    pub fn subscribe_execution_state(&self) -> mpsc::UnboundedReceiver<ExecutionState> {
        self.coordinator.subscribe_state()
    }

    pub fn subscribe_sync_events(&self) -> mpsc::UnboundedReceiver<SyncEvent> {
        self.handler.subscribe_events()
    }

    /// 断开连接并停止同步任务
    pub async fn shutdown(&self) {
        self.channel.disconnect().await;
        self.handler.stop();
        info!("交易同步核心已关闭");
    }
}
