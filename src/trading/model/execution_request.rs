use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::side::TradeSide;

/// 开仓请求，提交后不可修改
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionRequest {
    pub symbol: String,
    pub side: TradeSide,
    pub volume: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_loss: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub take_profit: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    /// 客户端标识，会作为 clientId 随交易指令发送，用于回报对账
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
}

impl ExecutionRequest {
    /// 市价单
    pub fn market(symbol: &str, side: TradeSide, volume: Decimal) -> Self {
        Self {
            symbol: symbol.to_string(),
            side,
            volume,
            stop_loss: None,
            take_profit: None,
            comment: None,
            tag: None,
        }
    }

    pub fn with_stop_loss(mut self, stop_loss: Decimal) -> Self {
        self.stop_loss = Some(stop_loss);
        self
    }

    pub fn with_take_profit(mut self, take_profit: Decimal) -> Self {
        self.take_profit = Some(take_profit);
        self
    }

    pub fn with_comment(mut self, comment: &str) -> Self {
        self.comment = Some(comment.to_string());
        self
    }

    pub fn with_tag(mut self, tag: &str) -> Self {
        self.tag = Some(tag.to_string());
        self
    }
}
