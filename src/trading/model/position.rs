use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::side::TradeSide;

/// 网关推送的完整持仓记录（`positions` 全量同步）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionRecord {
    pub id: String,
    #[serde(rename = "type")]
    pub side: TradeSide,
    pub symbol: String,
    pub volume: Decimal,
    pub open_price: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_price: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_loss: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub take_profit: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub magic: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profit: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unrealized_profit: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub swap: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commission: Option<Decimal>,
}

/// `update` 事件中的持仓增量，只有出现的字段才会覆盖
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionDelta {
    pub id: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub side: Option<TradeSide>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub open_price: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_price: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_loss: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub take_profit: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub magic: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profit: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unrealized_profit: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub swap: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commission: Option<Decimal>,
}

impl PositionDelta {
    /// 增量中带齐了开仓信息时，视为网关对新开持仓的通知
    pub fn as_record(&self) -> Option<PositionRecord> {
        Some(PositionRecord {
            id: self.id.clone(),
            side: self.side?,
            symbol: self.symbol.clone()?,
            volume: self.volume?,
            open_price: self.open_price?,
            time: self.time,
            current_price: self.current_price,
            stop_loss: self.stop_loss,
            take_profit: self.take_profit,
            comment: self.comment.clone(),
            client_id: self.client_id.clone(),
            magic: self.magic,
            profit: self.profit,
            unrealized_profit: self.unrealized_profit,
            swap: self.swap,
            commission: self.commission,
        })
    }

    /// 网关报告的未实现盈亏，优先使用 unrealizedProfit
    pub fn reported_profit(&self) -> Option<Decimal> {
        self.unrealized_profit.or(self.profit)
    }

    /// 按字段合并到已有持仓；派生字段由调用方重新计算
    pub fn merge_into(&self, position: &mut TrackedPosition) {
        if let Some(v) = self.volume {
            position.volume = v;
        }
        if let Some(v) = self.open_price {
            position.open_price = v;
        }
        if let Some(v) = self.time {
            position.open_time = Some(v);
        }
        if let Some(v) = self.current_price {
            position.current_price = v;
        }
        if let Some(v) = self.stop_loss {
            position.stop_loss = Some(v);
        }
        if let Some(v) = self.take_profit {
            position.take_profit = Some(v);
        }
        if let Some(v) = &self.comment {
            position.comment = Some(v.clone());
        }
        if let Some(v) = &self.client_id {
            position.client_id = Some(v.clone());
        }
        if let Some(v) = self.magic {
            position.magic = Some(v);
        }
        if let Some(v) = self.reported_profit() {
            position.unrealized_pl = v;
        }
        if let Some(v) = self.swap {
            position.swap = v;
        }
        if let Some(v) = self.commission {
            position.commission = v;
        }
    }
}

/// 账户状态中维护的持仓，附带实时派生的盈亏与风险指标
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackedPosition {
    pub id: String,
    pub symbol: String,
    pub side: TradeSide,
    pub volume: Decimal,
    pub open_price: Decimal,
    pub open_time: Option<DateTime<Utc>>,
    pub stop_loss: Option<Decimal>,
    pub take_profit: Option<Decimal>,
    pub comment: Option<String>,
    pub client_id: Option<String>,
    pub magic: Option<i64>,

    pub current_price: Decimal,
    pub bid: Decimal,
    pub ask: Decimal,
    pub unrealized_pl: Decimal,
    pub unrealized_pl_percent: Decimal,
    pub commission: Decimal,
    pub swap: Decimal,
    /// unrealized_pl - |commission| - |swap|
    pub net_pl: Decimal,
    pub pip_value: Decimal,
    pub pips_profit: Decimal,
    pub spread: Decimal,
    pub spread_cost: Decimal,
    pub margin_used: Decimal,
    pub risk_reward: Option<Decimal>,
}

impl TrackedPosition {
    /// 由完整记录创建，派生字段在写入账户状态前统一刷新
    pub fn from_record(record: PositionRecord) -> Self {
        let current_price = record.current_price.unwrap_or(record.open_price);
        let unrealized_pl = record
            .unrealized_profit
            .or(record.profit)
            .unwrap_or(Decimal::ZERO);
        Self {
            id: record.id,
            symbol: record.symbol,
            side: record.side,
            volume: record.volume,
            open_price: record.open_price,
            open_time: record.time,
            stop_loss: record.stop_loss,
            take_profit: record.take_profit,
            comment: record.comment,
            client_id: record.client_id,
            magic: record.magic,
            current_price,
            bid: current_price,
            ask: current_price,
            unrealized_pl,
            unrealized_pl_percent: Decimal::ZERO,
            commission: record.commission.unwrap_or(Decimal::ZERO),
            swap: record.swap.unwrap_or(Decimal::ZERO),
            net_pl: Decimal::ZERO,
            pip_value: Decimal::ZERO,
            pips_profit: Decimal::ZERO,
            spread: Decimal::ZERO,
            spread_cost: Decimal::ZERO,
            margin_used: Decimal::ZERO,
            risk_reward: None,
        }
    }

    /// 执行回报里用于对账的标识：clientId，其次是 comment
    pub fn correlation_tag(&self) -> Option<&str> {
        self.client_id.as_deref().or(self.comment.as_deref())
    }
}
