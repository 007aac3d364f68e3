use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::side::TradeSide;

/// 挂单状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OrderState {
    #[serde(alias = "ORDER_STATE_STARTED")]
    Started,
    #[serde(alias = "ORDER_STATE_PLACED")]
    Placed,
    #[serde(alias = "ORDER_STATE_PARTIAL")]
    Partial,
    #[serde(alias = "ORDER_STATE_FILLED")]
    Filled,
    #[serde(alias = "ORDER_STATE_CANCELED", alias = "canceled")]
    Cancelled,
    #[serde(alias = "ORDER_STATE_REJECTED")]
    Rejected,
    #[serde(alias = "ORDER_STATE_EXPIRED")]
    Expired,
    #[serde(other)]
    Unknown,
}

impl OrderState {
    /// 终态订单不再属于挂单集合
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderState::Filled | OrderState::Cancelled | OrderState::Rejected | OrderState::Expired
        )
    }
}

/// 网关推送的完整订单记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderRecord {
    pub id: String,
    #[serde(rename = "type")]
    pub order_type: String,
    pub state: OrderState,
    pub symbol: String,
    pub open_price: Decimal,
    #[serde(alias = "currentVolume")]
    pub volume: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_loss: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub take_profit: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<DateTime<Utc>>,
}

/// `update` 事件中的订单增量
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderDelta {
    pub id: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub order_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<OrderState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub open_price: Option<Decimal>,
    #[serde(default, alias = "currentVolume", skip_serializing_if = "Option::is_none")]
    pub volume: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_loss: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub take_profit: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<DateTime<Utc>>,
}

impl OrderDelta {
    pub fn as_record(&self) -> Option<OrderRecord> {
        Some(OrderRecord {
            id: self.id.clone(),
            order_type: self.order_type.clone()?,
            state: self.state?,
            symbol: self.symbol.clone()?,
            open_price: self.open_price?,
            volume: self.volume?,
            stop_loss: self.stop_loss,
            take_profit: self.take_profit,
            comment: self.comment.clone(),
            client_id: self.client_id.clone(),
            time: self.time,
        })
    }

    pub fn merge_into(&self, order: &mut TrackedOrder) {
        if let Some(v) = &self.order_type {
            order.order_type = v.clone();
        }
        if let Some(v) = self.state {
            order.state = v;
        }
        if let Some(v) = self.open_price {
            order.open_price = v;
        }
        if let Some(v) = self.volume {
            order.volume = v;
        }
        if let Some(v) = self.stop_loss {
            order.stop_loss = Some(v);
        }
        if let Some(v) = self.take_profit {
            order.take_profit = Some(v);
        }
        if let Some(v) = &self.comment {
            order.comment = Some(v.clone());
        }
        if let Some(v) = &self.client_id {
            order.client_id = Some(v.clone());
        }
        if let Some(v) = self.time {
            order.time = Some(v);
        }
    }
}

/// 账户状态中维护的挂单
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackedOrder {
    pub id: String,
    pub order_type: String,
    pub state: OrderState,
    pub symbol: String,
    pub open_price: Decimal,
    pub volume: Decimal,
    pub stop_loss: Option<Decimal>,
    pub take_profit: Option<Decimal>,
    pub comment: Option<String>,
    pub client_id: Option<String>,
    pub time: Option<DateTime<Utc>>,
}

impl TrackedOrder {
    pub fn side(&self) -> Option<TradeSide> {
        TradeSide::from_order_type(&self.order_type)
    }

    pub fn correlation_tag(&self) -> Option<&str> {
        self.client_id.as_deref().or(self.comment.as_deref())
    }
}

impl From<OrderRecord> for TrackedOrder {
    fn from(record: OrderRecord) -> Self {
        Self {
            id: record.id,
            order_type: record.order_type,
            state: record.state,
            symbol: record.symbol,
            open_price: record.open_price,
            volume: record.volume,
            stop_loss: record.stop_loss,
            take_profit: record.take_profit,
            comment: record.comment,
            client_id: record.client_id,
            time: record.time,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_gateway_order_state() {
        let json = r#"{"id":"46871284","type":"ORDER_TYPE_BUY_LIMIT","state":"ORDER_STATE_PLACED",
            "symbol":"AUDNZD","openPrice":1.03,"currentVolume":0.01}"#;
        let record: OrderRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.state, OrderState::Placed);
        let order = TrackedOrder::from(record);
        assert_eq!(order.side(), Some(TradeSide::Buy));
        assert!(!order.state.is_terminal());

        let state: OrderState = serde_json::from_str("\"ORDER_STATE_REQUEST_ADD\"").unwrap();
        assert_eq!(state, OrderState::Unknown);
    }
}
