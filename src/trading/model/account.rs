use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// 账户快照
///
/// 每次收到 `accountInformation` 时整体替换；`prices` / `update` 中附带的
/// 权益、保证金变化通过 [`AccountDelta`] 按字段合并。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountSnapshot {
    #[serde(default)]
    pub broker: String,
    #[serde(default)]
    pub currency: String,
    #[serde(default)]
    pub balance: Decimal,
    #[serde(default)]
    pub equity: Decimal,
    #[serde(default)]
    pub margin: Decimal,
    #[serde(default)]
    pub free_margin: Decimal,
    #[serde(default)]
    pub leverage: Decimal,
    /// 无持仓时网关无法计算，缺失不是错误
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub margin_level: Option<Decimal>,
    #[serde(default)]
    pub trade_allowed: bool,
}

/// 账户的增量字段，只覆盖出现的字段
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountDelta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub balance: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub equity: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub margin: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub free_margin: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub margin_level: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub leverage: Option<Decimal>,
}

impl AccountDelta {
    pub fn is_empty(&self) -> bool {
        self.balance.is_none()
            && self.equity.is_none()
            && self.margin.is_none()
            && self.free_margin.is_none()
            && self.margin_level.is_none()
            && self.leverage.is_none()
    }

    pub fn merge_into(&self, account: &mut AccountSnapshot) {
        if let Some(v) = self.balance {
            account.balance = v;
        }
        if let Some(v) = self.equity {
            account.equity = v;
        }
        if let Some(v) = self.margin {
            account.margin = v;
        }
        if let Some(v) = self.free_margin {
            account.free_margin = v;
        }
        if let Some(v) = self.margin_level {
            account.margin_level = Some(v);
        }
        if let Some(v) = self.leverage {
            account.leverage = v;
        }
    }
}
