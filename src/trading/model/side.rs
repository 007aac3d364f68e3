use serde::{Deserialize, Serialize};
use std::fmt;

/// 交易方向
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TradeSide {
    /// 买入 / 做多
    #[serde(
        rename = "buy",
        alias = "POSITION_TYPE_BUY",
        alias = "ORDER_TYPE_BUY",
        alias = "BUY"
    )]
    Buy,
    /// 卖出 / 做空
    #[serde(
        rename = "sell",
        alias = "POSITION_TYPE_SELL",
        alias = "ORDER_TYPE_SELL",
        alias = "SELL"
    )]
    Sell,
}

impl TradeSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeSide::Buy => "buy",
            TradeSide::Sell => "sell",
        }
    }

    /// 从网关的订单类型推断方向，如 `ORDER_TYPE_BUY_LIMIT`
    pub fn from_order_type(order_type: &str) -> Option<Self> {
        let upper = order_type.to_uppercase();
        if upper.contains("BUY") {
            Some(TradeSide::Buy)
        } else if upper.contains("SELL") {
            Some(TradeSide::Sell)
        } else {
            None
        }
    }
}

impl fmt::Display for TradeSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
