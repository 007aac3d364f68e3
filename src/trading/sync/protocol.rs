//! 网关消息格式
//!
//! 所有消息都是带 `type` 字段的 JSON 对象，字段使用 camelCase。

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;
use crate::trading::model::{
    AccountDelta, AccountSnapshot, DealRecord, HistoryOrderRecord, OrderDelta, OrderRecord,
    PositionDelta, PositionRecord, PriceQuote,
};

/// 网关推送的消息
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum IncomingMessage {
    AccountInformation(AccountInformationEvent),
    Positions(PositionsEvent),
    Orders(OrdersEvent),
    Prices(PricesEvent),
    Update(UpdateEvent),
    SynchronizationStarted(SynchronizationStartedEvent),
    Synchronized(SynchronizedEvent),
    Deals(DealsEvent),
    HistoryOrders(HistoryOrdersEvent),
    Response(TradeResponseEvent),
    ProcessingError(ProcessingErrorEvent),
    #[serde(other)]
    Unknown,
}

impl IncomingMessage {
    /// 解码一条文本帧
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        let value: serde_json::Value = serde_json::from_str(text)?;
        if value.get("type").and_then(|t| t.as_str()).is_none() {
            return Err(ProtocolError::MissingType);
        }
        Ok(serde_json::from_value(value)?)
    }

    pub fn account_id(&self) -> Option<&str> {
        match self {
            IncomingMessage::AccountInformation(e) => Some(&e.account_id),
            IncomingMessage::Positions(e) => Some(&e.account_id),
            IncomingMessage::Orders(e) => Some(&e.account_id),
            IncomingMessage::Prices(e) => Some(&e.account_id),
            IncomingMessage::Update(e) => Some(&e.account_id),
            IncomingMessage::SynchronizationStarted(e) => Some(&e.account_id),
            IncomingMessage::Synchronized(e) => Some(&e.account_id),
            IncomingMessage::Deals(e) => Some(&e.account_id),
            IncomingMessage::HistoryOrders(e) => Some(&e.account_id),
            IncomingMessage::Response(e) => e.account_id.as_deref(),
            IncomingMessage::ProcessingError(e) => e.account_id.as_deref(),
            IncomingMessage::Unknown => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            IncomingMessage::AccountInformation(_) => "accountInformation",
            IncomingMessage::Positions(_) => "positions",
            IncomingMessage::Orders(_) => "orders",
            IncomingMessage::Prices(_) => "prices",
            IncomingMessage::Update(_) => "update",
            IncomingMessage::SynchronizationStarted(_) => "synchronizationStarted",
            IncomingMessage::Synchronized(_) => "synchronized",
            IncomingMessage::Deals(_) => "deals",
            IncomingMessage::HistoryOrders(_) => "historyOrders",
            IncomingMessage::Response(_) => "response",
            IncomingMessage::ProcessingError(_) => "processingError",
            IncomingMessage::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountInformationEvent {
    pub account_id: String,
    pub account_information: AccountSnapshot,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionsEvent {
    pub account_id: String,
    #[serde(default)]
    pub synchronization_id: Option<String>,
    #[serde(default)]
    pub positions: Vec<PositionRecord>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrdersEvent {
    pub account_id: String,
    #[serde(default)]
    pub synchronization_id: Option<String>,
    #[serde(default)]
    pub orders: Vec<OrderRecord>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PricesEvent {
    pub account_id: String,
    #[serde(default)]
    pub prices: Vec<PriceQuote>,
    #[serde(default)]
    pub equity: Option<Decimal>,
    #[serde(default)]
    pub margin: Option<Decimal>,
    #[serde(default)]
    pub free_margin: Option<Decimal>,
    #[serde(default)]
    pub margin_level: Option<Decimal>,
}

impl PricesEvent {
    /// 报价消息附带的账户字段
    pub fn account_delta(&self) -> AccountDelta {
        AccountDelta {
            equity: self.equity,
            margin: self.margin,
            free_margin: self.free_margin,
            margin_level: self.margin_level,
            ..AccountDelta::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateEvent {
    pub account_id: String,
    #[serde(default)]
    pub account_information: Option<AccountDelta>,
    #[serde(default)]
    pub updated_positions: Vec<PositionDelta>,
    #[serde(default)]
    pub removed_position_ids: Vec<String>,
    #[serde(default)]
    pub updated_orders: Vec<OrderDelta>,
    #[serde(default)]
    pub completed_order_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SynchronizationStartedEvent {
    pub account_id: String,
    pub synchronization_id: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SynchronizedEvent {
    pub account_id: String,
    pub synchronization_id: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DealsEvent {
    pub account_id: String,
    #[serde(default)]
    pub synchronization_id: Option<String>,
    #[serde(default)]
    pub deals: Vec<DealRecord>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryOrdersEvent {
    pub account_id: String,
    #[serde(default)]
    pub synchronization_id: Option<String>,
    #[serde(default)]
    pub history_orders: Vec<HistoryOrderRecord>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeResponseEvent {
    #[serde(default)]
    pub account_id: Option<String>,
    pub request_id: String,
    pub response: TradeResult,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingErrorEvent {
    #[serde(default)]
    pub account_id: Option<String>,
    pub request_id: String,
    #[serde(default)]
    pub error: String,
    #[serde(default)]
    pub message: String,
}

/// 交易指令的网关回报
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeResult {
    #[serde(default)]
    pub numeric_code: Option<i64>,
    #[serde(default)]
    pub string_code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub order_id: Option<String>,
    #[serde(default)]
    pub position_id: Option<String>,
}

const SUCCESS_STRING_CODES: [&str; 3] = [
    "TRADE_RETCODE_PLACED",
    "TRADE_RETCODE_DONE",
    "TRADE_RETCODE_DONE_PARTIAL",
];
const SUCCESS_NUMERIC_CODES: [i64; 3] = [10008, 10009, 10010];

impl TradeResult {
    pub fn is_success(&self) -> bool {
        if let Some(code) = &self.string_code {
            return SUCCESS_STRING_CODES.contains(&code.as_str());
        }
        self.numeric_code
            .map(|code| SUCCESS_NUMERIC_CODES.contains(&code))
            .unwrap_or(false)
    }

    pub fn code(&self) -> String {
        match (&self.string_code, self.numeric_code) {
            (Some(code), _) => code.clone(),
            (None, Some(code)) => code.to_string(),
            (None, None) => "UNKNOWN".to_string(),
        }
    }
}

/// 发往网关的消息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum OutgoingMessage {
    Subscribe(SubscribeRequest),
    Synchronize(SynchronizeRequest),
    SubscribeToMarketData(MarketDataSubscription),
    Trade(TradeRequest),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscribeRequest {
    pub account_id: String,
    pub application: String,
    pub instance_index: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SynchronizeRequest {
    pub account_id: String,
    pub synchronization_id: String,
    pub host: String,
    pub keep_alive: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketDataSubscription {
    pub account_id: String,
    pub symbol: String,
    pub request_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeRequest {
    pub account_id: String,
    pub request_id: String,
    pub application: String,
    pub trade: TradeCommand,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeAction {
    #[serde(rename = "ORDER_TYPE_BUY")]
    Buy,
    #[serde(rename = "ORDER_TYPE_SELL")]
    Sell,
    #[serde(rename = "POSITION_CLOSE_ID")]
    ClosePosition,
    #[serde(rename = "POSITION_MODIFY")]
    ModifyPosition,
}

/// 交易指令内容
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeCommand {
    pub action_type: TradeAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_loss: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub take_profit: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
}

impl TradeCommand {
    fn empty(action_type: TradeAction) -> Self {
        Self {
            action_type,
            symbol: None,
            volume: None,
            stop_loss: None,
            take_profit: None,
            position_id: None,
            comment: None,
            client_id: None,
        }
    }

    pub fn close_position(position_id: &str) -> Self {
        Self {
            position_id: Some(position_id.to_string()),
            ..Self::empty(TradeAction::ClosePosition)
        }
    }

    pub fn modify_position(
        position_id: &str,
        stop_loss: Option<Decimal>,
        take_profit: Option<Decimal>,
    ) -> Self {
        Self {
            position_id: Some(position_id.to_string()),
            stop_loss,
            take_profit,
            ..Self::empty(TradeAction::ModifyPosition)
        }
    }
}
